use crate::domain::{Field, Variable};
use crate::plotting::PlotFormat;
use std::borrow::Cow;
use std::path::{Path, PathBuf};

const FALLBACK_STEM: &str = "simion";

/// Output file names derived from the input file stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNaming {
    output_dir: PathBuf,
    stem: String,
}

impl ArtifactNaming {
    pub fn new(output_dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            stem: stem.into(),
        }
    }

    pub fn for_input(input: &Path, output_dir: impl Into<PathBuf>) -> Self {
        let stem = input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| FALLBACK_STEM.to_string());
        Self::new(output_dir, stem)
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn fit_plot(&self, variable: &Variable, format: PlotFormat) -> PathBuf {
        self.file(&format!(
            "{}_{}_fit_gaus.{}",
            self.stem,
            file_fragment(variable.name()),
            format.extension()
        ))
    }

    pub fn correlation_plot(&self, x: &Variable, y: &Variable, format: PlotFormat) -> PathBuf {
        self.file(&format!(
            "{}_{}_vs_{}.{}",
            self.stem,
            file_fragment(x.name()),
            file_fragment(y.name()),
            format.extension()
        ))
    }

    pub fn emittance_plot(&self, position: Field, format: PlotFormat) -> PathBuf {
        self.file(&format!(
            "{}_{}emittance.{}",
            self.stem,
            position,
            format.extension()
        ))
    }

    pub fn report(&self) -> PathBuf {
        self.file(&format!("{}_results.txt", self.stem))
    }

    fn file(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }
}

/// File-safe spelling of a variable label. Operators become `_div_`, `_mul_`
/// and so on, and a literal underscore is doubled, so distinct labels never
/// share a file. Whitespace carries no meaning in an expression and is dropped.
fn file_fragment(name: &str) -> String {
    let mut fragment = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '-' | '.') => fragment.push(c),
            '_' => fragment.push_str("__"),
            c if c.is_whitespace() => {}
            other => {
                fragment.push('_');
                fragment.push_str(&symbol_token(other));
                fragment.push('_');
            }
        }
    }
    fragment
}

fn symbol_token(symbol: char) -> Cow<'static, str> {
    match symbol {
        '/' => "div".into(),
        '*' => "mul".into(),
        '+' => "plus".into(),
        '(' => "lp".into(),
        ')' => "rp".into(),
        ',' => "comma".into(),
        '\'' => "prime".into(),
        other => format!("u{:x}", u32::from(other)).into(),
    }
}
