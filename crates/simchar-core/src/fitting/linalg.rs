use faer::Mat;

pub type DenseMatrix = Mat<f64>;

const SINGULAR_RELATIVE_PIVOT_EPSILON: f64 = 1.0e-14;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SolveError {
    #[error("linear solve requires a square matrix, got {rows}x{cols}")]
    NonSquareMatrix { rows: usize, cols: usize },
    #[error("linear solve requires a non-empty matrix")]
    EmptyMatrix,
    #[error("matrix is singular at pivot index {pivot_index}")]
    SingularMatrix { pivot_index: usize },
    #[error("right-hand side length mismatch: expected {expected}, got {actual}")]
    RhsLengthMismatch { expected: usize, actual: usize },
}

/// Solves `matrix * x = rhs` by Gaussian elimination with partial pivoting.
pub fn solve_dense(matrix: &DenseMatrix, rhs: &[f64]) -> Result<Vec<f64>, SolveError> {
    let dimension = validate_square_shape(matrix)?;
    if rhs.len() != dimension {
        return Err(SolveError::RhsLengthMismatch {
            expected: dimension,
            actual: rhs.len(),
        });
    }

    let scale = matrix_infinity_norm(matrix);
    if scale == 0.0 || !scale.is_finite() {
        return Err(SolveError::SingularMatrix { pivot_index: 0 });
    }
    let pivot_threshold = SINGULAR_RELATIVE_PIVOT_EPSILON * scale;

    let mut lu = matrix.clone();
    let mut solution = rhs.to_vec();

    for pivot_col in 0..dimension {
        let pivot_row = (pivot_col..dimension)
            .max_by(|lhs, rhs| {
                lu[(*lhs, pivot_col)]
                    .abs()
                    .total_cmp(&lu[(*rhs, pivot_col)].abs())
            })
            .unwrap_or(pivot_col);

        if lu[(pivot_row, pivot_col)].abs() <= pivot_threshold {
            return Err(SolveError::SingularMatrix {
                pivot_index: pivot_col,
            });
        }

        if pivot_row != pivot_col {
            swap_rows(&mut lu, pivot_col, pivot_row);
            solution.swap(pivot_col, pivot_row);
        }

        let pivot = lu[(pivot_col, pivot_col)];
        for row in (pivot_col + 1)..dimension {
            let multiplier = lu[(row, pivot_col)] / pivot;
            if multiplier == 0.0 {
                continue;
            }
            for col in pivot_col..dimension {
                let updated = lu[(row, col)] - multiplier * lu[(pivot_col, col)];
                lu[(row, col)] = updated;
            }
            solution[row] -= multiplier * solution[pivot_col];
        }
    }

    for row in (0..dimension).rev() {
        let mut value = solution[row];
        for col in (row + 1)..dimension {
            value -= lu[(row, col)] * solution[col];
        }
        solution[row] = value / lu[(row, row)];
    }

    Ok(solution)
}

fn validate_square_shape(matrix: &DenseMatrix) -> Result<usize, SolveError> {
    let rows = matrix.nrows();
    let cols = matrix.ncols();
    if rows == 0 || cols == 0 {
        return Err(SolveError::EmptyMatrix);
    }
    if rows != cols {
        return Err(SolveError::NonSquareMatrix { rows, cols });
    }
    Ok(rows)
}

fn matrix_infinity_norm(matrix: &DenseMatrix) -> f64 {
    (0..matrix.nrows())
        .map(|row| {
            (0..matrix.ncols())
                .map(|col| matrix[(row, col)].abs())
                .sum::<f64>()
        })
        .fold(0.0, f64::max)
}

fn swap_rows(matrix: &mut DenseMatrix, lhs: usize, rhs: usize) {
    for col in 0..matrix.ncols() {
        let value = matrix[(lhs, col)];
        matrix[(lhs, col)] = matrix[(rhs, col)];
        matrix[(rhs, col)] = value;
    }
}
