use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde_json::Value;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run_simchar(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_simchar"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("simchar binary should run")
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("temp paths should be UTF-8")
}

/// Beam on axis: `x, y ~ N(0, 2)` mm, `vx, vy ~ N(0, 0.2)` mm/us, `vz = 10`.
/// `tof` is a constant and cannot be fitted.
fn write_trajectories(path: &Path, rows: usize) {
    let mut rng = StdRng::seed_from_u64(2024);
    let position = Normal::new(0.0_f64, 2.0).expect("normal distribution should build");
    let velocity = Normal::new(0.0_f64, 0.2).expect("normal distribution should build");

    let mut text = String::from("# SIMION trajectory export\n");
    for index in 1..=rows {
        let _ = writeln!(
            text,
            "{index} 12.5 {:.5} {:.5} 0.0 {:.5} {:.5} 10.0 150.0",
            position.sample(&mut rng),
            position.sample(&mut rng),
            velocity.sample(&mut rng),
            velocity.sample(&mut rng),
        );
    }
    fs::write(path, text).expect("trajectory file should be written");
}

fn assert_non_empty_file(path: &Path) {
    let metadata = fs::metadata(path)
        .unwrap_or_else(|error| panic!("{} should exist: {error}", path.display()));
    assert!(metadata.len() > 0, "{} should not be empty", path.display());
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn analyze_writes_report_and_json_in_request_order() {
    let temp = TempDir::new().expect("tempdir should be created");
    let input = temp.path().join("run.txt");
    let json = temp.path().join("fits.json");
    write_trajectories(&input, 4_000);

    let output = run_simchar(&[
        "analyze",
        path_arg(&input),
        "--variables",
        "x,tof",
        "--no-plots",
        "--json",
        path_arg(&json),
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let report_path = temp.path().join("run").join("run_results.txt");
    let report = fs::read_to_string(&report_path).expect("report should exist");
    let rows = report
        .lines()
        .filter(|line| line.starts_with("x ") || line.starts_with("tof "))
        .collect::<Vec<_>>();
    assert_eq!(rows.len(), 2, "report:\n{report}");
    assert!(rows[0].starts_with("x "));
    assert!(rows[1].starts_with("tof "));
    assert!(rows[1].ends_with("converged=false"));

    let parsed: Value =
        serde_json::from_str(&fs::read_to_string(&json).expect("JSON should be readable"))
            .expect("JSON should parse");
    let entries = parsed.as_array().expect("results should be an array");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["variable"], "x");
    assert_eq!(entries[1]["variable"], "tof");
    assert_eq!(entries[1]["converged"], Value::Bool(false));

    assert!(
        String::from_utf8_lossy(&output.stdout).contains("Fitted 2 variable(s)"),
        "stdout should summarise the run"
    );
}

#[test]
fn append_flag_keeps_previous_tables() {
    let temp = TempDir::new().expect("tempdir should be created");
    let input = temp.path().join("run.txt");
    let output_dir = temp.path().join("reports");
    write_trajectories(&input, 500);

    for extra in [None, Some("--append")] {
        let mut args = vec![
            "analyze",
            path_arg(&input),
            "--variables",
            "x",
            "--no-plots",
            "--output-dir",
            path_arg(&output_dir),
        ];
        args.extend(extra);
        let output = run_simchar(&args);
        assert!(output.status.success(), "stderr: {}", stderr(&output));
    }

    let report =
        fs::read_to_string(output_dir.join("run_results.txt")).expect("report should exist");
    assert_eq!(report.matches("Peak maximum").count(), 2);
}

#[test]
fn analyze_with_plots_writes_every_artifact() {
    let temp = TempDir::new().expect("tempdir should be created");
    let input = temp.path().join("run.txt");
    write_trajectories(&input, 2_000);

    let output = run_simchar(&["analyze", path_arg(&input), "--variables", "x"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(
        String::from_utf8_lossy(&output.stdout).contains("Plots: 4 written, 0 failed"),
        "stdout: {}",
        String::from_utf8_lossy(&output.stdout)
    );

    let run_dir = temp.path().join("run");
    for name in [
        "run_x_fit_gaus.svg",
        "run_x_vs_vx.svg",
        "run_xemittance.svg",
        "run_yemittance.svg",
        "run_results.txt",
    ] {
        assert_non_empty_file(&run_dir.join(name));
    }
}

#[test]
fn correlate_command_exports_the_map() {
    let temp = TempDir::new().expect("tempdir should be created");
    let input = temp.path().join("run.txt");
    let output_dir = temp.path().join("maps");
    write_trajectories(&input, 1_000);

    let output = run_simchar(&[
        "correlate",
        path_arg(&input),
        "y",
        "vy",
        "--output-dir",
        path_arg(&output_dir),
        "--format",
        "png",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let expected = output_dir.join("run_y_vs_vy.png");
    assert_non_empty_file(&expected);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("1000 entries (0 out of range, 0 undefined)"), "{stdout}");
    assert!(stdout.trim_end().ends_with(path_arg(&expected)), "{stdout}");
}

#[test]
fn emittance_command_exports_the_map() {
    let temp = TempDir::new().expect("tempdir should be created");
    let input = temp.path().join("run.txt");
    write_trajectories(&input, 1_000);

    let output = run_simchar(&["emittance", path_arg(&input), "x", "vx"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    assert_non_empty_file(&temp.path().join("run").join("run_xemittance.svg"));
    assert!(
        String::from_utf8_lossy(&output.stdout).starts_with("1000 entries"),
        "stdout: {}",
        String::from_utf8_lossy(&output.stdout)
    );
}

#[test]
fn missing_input_exits_with_io_code() {
    let temp = TempDir::new().expect("tempdir should be created");
    let missing = temp.path().join("absent.txt");

    let output = run_simchar(&["analyze", path_arg(&missing), "--no-plots"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(
        stderr(&output).contains("ERROR: [IO.INPUT_NOT_FOUND]"),
        "stderr: {}",
        stderr(&output)
    );
    assert!(stderr(&output).contains("FATAL EXIT CODE: 3"));
    assert!(!temp.path().join("absent").exists());
}

#[test]
fn malformed_input_exits_with_input_code() {
    let temp = TempDir::new().expect("tempdir should be created");
    let input = temp.path().join("broken.txt");
    fs::write(&input, "1 12.5 0 0 0 0 0 2 150\n2 12.5 0 0 zero 0 0 2 150\n")
        .expect("input should be written");

    let output = run_simchar(&["analyze", path_arg(&input), "--no-plots"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(
        stderr(&output).contains("ERROR: [INPUT.MALFORMED_RECORD] malformed record at line 2"),
        "stderr: {}",
        stderr(&output)
    );
}

#[test]
fn unknown_variable_exits_with_input_code() {
    let temp = TempDir::new().expect("tempdir should be created");
    let input = temp.path().join("run.txt");
    write_trajectories(&input, 50);

    let output = run_simchar(&["analyze", path_arg(&input), "--variables", "x,energy", "--no-plots"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("ERROR: [INPUT.UNKNOWN_VARIABLE]"));
}

#[test]
fn config_file_errors_are_reported() {
    let temp = TempDir::new().expect("tempdir should be created");
    let input = temp.path().join("run.txt");
    let config = temp.path().join("analysis.json");
    write_trajectories(&input, 50);
    fs::write(&config, "{ \"variables\": [").expect("config should be written");

    let output = run_simchar(&[
        "analyze",
        path_arg(&input),
        "--config",
        path_arg(&config),
    ]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("ERROR: [INPUT.CONFIG_PARSE]"));
}

#[test]
fn fit_command_prints_a_single_row() {
    let temp = TempDir::new().expect("tempdir should be created");
    let input = temp.path().join("run.txt");
    write_trajectories(&input, 4_000);

    let output = run_simchar(&[
        "fit",
        path_arg(&input),
        "x",
        "--bins",
        "40",
        "--min",
        "-10",
        "--max",
        "10",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let rows = stdout.lines().filter(|line| line.starts_with("x ")).count();
    assert_eq!(rows, 1, "stdout:\n{stdout}");
    assert!(stdout.starts_with("Variable"));
}

#[test]
fn fit_command_rejects_inverted_range() {
    let temp = TempDir::new().expect("tempdir should be created");
    let input = temp.path().join("run.txt");
    write_trajectories(&input, 10);

    let output = run_simchar(&["fit", path_arg(&input), "x", "--min", "5", "--max", "-5"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("ERROR: [INPUT.INVALID_BINNING]"));
}

#[test]
fn emittance_command_requires_record_columns() {
    let temp = TempDir::new().expect("tempdir should be created");
    let input = temp.path().join("run.txt");
    write_trajectories(&input, 10);

    let output = run_simchar(&["emittance", path_arg(&input), "x", "vx/2"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("ERROR: [INPUT.UNKNOWN_VARIABLE]"));
}

#[test]
fn bare_invocation_is_a_usage_error() {
    let output = run_simchar(&[]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("ERROR: [INPUT.CLI_USAGE]"));
}
