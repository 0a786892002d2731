//! Process runner tests with `/bin/sh` standing in for the simulator.
//!
//! The runner passes the parameter file as the only argument, so with
//! `/bin/sh` as the executable the rendered parameters are the script.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use trenchsweep_core::fakes::{raised, trench_baseline, write_vtp};
use trenchsweep_core::results::{read_data_table, read_geometry_table};
use trenchsweep_core::{
    CsvResultSink, OutputLayout, ParameterTemplate, ProcessRunner, SimulationRunner, SweepConfig,
    SweepError, SweepOrchestrator, TablePaths, VtpExtractor,
};

fn shell_runner(dir: &Path) -> ProcessRunner {
    ProcessRunner::new(
        PathBuf::from("/bin/sh"),
        dir.to_path_buf(),
        OutputLayout::new(dir.join("output"), 8),
    )
}

fn leftover_parameter_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".trenchsweep-"))
        .collect()
}

/// Test: exit code 0 yields the deterministic output paths
#[tokio::test]
async fn test_successful_run() {
    let dir = tempfile::tempdir().unwrap();
    let runner = shell_runner(dir.path());

    let outcome = runner
        .run("mkdir -p output_8bit\necho simulating\n")
        .await
        .expect("run succeeds");

    assert_eq!(outcome.exit_code, 0);
    assert_eq!(
        outcome.outputs.deposited,
        dir.path().join("output_8bit/Interface_1_0.vtp")
    );
    assert!(dir.path().join("output_8bit").is_dir(), "cwd is the project dir");
    assert!(leftover_parameter_files(dir.path()).is_empty());
}

/// Test: non-zero exit is a simulation failure carrying exit code and stderr
#[tokio::test]
async fn test_failed_run() {
    let dir = tempfile::tempdir().unwrap();
    let runner = shell_runner(dir.path());

    let err = runner
        .run("echo 'level set diverged' >&2\nexit 3\n")
        .await
        .unwrap_err();

    match err {
        SweepError::SimulationFailure { exit_code, stderr } => {
            assert_eq!(exit_code, 3);
            assert_eq!(stderr, "level set diverged");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(leftover_parameter_files(dir.path()).is_empty());
}

/// Test: the timeout kills the child and removes the parameter file
#[tokio::test]
async fn test_timeout_kills_child() {
    let dir = tempfile::tempdir().unwrap();
    let runner = shell_runner(dir.path()).with_timeout(1);

    let start = Instant::now();
    let err = runner.run("sleep 30\n").await.unwrap_err();

    assert!(matches!(err, SweepError::SimulationTimeout { timeout_secs: 1 }));
    assert!(start.elapsed() < Duration::from_secs(10));
    assert!(leftover_parameter_files(dir.path()).is_empty());
}

fn shell_template() -> ParameterTemplate {
    ParameterTemplate::parse(
        "# ${GEOMETRY_FILE} ${FD_SCHEME} ${PROCESS_TIME} ${OUTPUT_VOLUME}\n\
         # ${DEPOSITION_RATE} ${STATISTICAL_ACCURACY}\n\
         out=\"${OUTPUT_PATH}_${DISTANCE_BITS}bit\"\n\
         mkdir -p \"$$out\"\n\
         cp baseline.vtp \"$$out/Interface_0_0.vtp\"\n\
         cp deposited_${STICKING_PROBABILITY}.vtp \"$$out/Interface_1_0.vtp\"\n",
    )
    .expect("template")
}

/// Runs a two-probability sweep with `project_dir` as configured and the
/// interface fixtures placed in `root`, wiring the runner the way the CLI does.
async fn shell_sweep(root: &Path, project_dir: PathBuf) -> Result<(usize, TablePaths), SweepError> {
    let baseline = trench_baseline();
    write_vtp(&root.join("baseline.vtp"), &baseline).unwrap();
    write_vtp(&root.join("deposited_1.vtp"), &raised(&baseline, 0.25)).unwrap();
    write_vtp(&root.join("deposited_0.5.vtp"), &raised(&baseline, 0.125)).unwrap();

    let mut config = SweepConfig::default();
    config.simulator.project_dir = project_dir;
    config.sweep.sticking_probabilities = vec![1.0, 0.5];
    config.sweep.repetitions = 2;

    let layout = OutputLayout::new(
        config.resolve(&config.process.output_path),
        config.process.distance_bits,
    );
    let runner = Arc::new(ProcessRunner::new(
        PathBuf::from("/bin/sh"),
        config.project_root(),
        layout,
    ));
    let paths = TablePaths::from_base(&root.join("results"));
    let mut sink = CsvResultSink::create(&paths).unwrap();

    let summary =
        SweepOrchestrator::new(config, shell_template(), runner, Arc::new(VtpExtractor::default()))
            .with_manifest(&paths.manifest)
            .run(&mut sink)
            .await?;
    Ok((summary.completed, paths))
}

/// Test: a full sweep through a real child process, using a shell-script
/// template that copies pre-built interface files into place
#[tokio::test]
async fn test_sweep_through_shell_simulator() {
    let dir = tempfile::tempdir().unwrap();
    let (completed, paths) = shell_sweep(dir.path(), dir.path().to_path_buf())
        .await
        .expect("sweep");
    assert_eq!(completed, 4);

    let geometries = read_geometry_table(&paths.geometry).unwrap();
    assert_eq!(geometries.len(), 1);
    assert_eq!(geometries[0].ys, trench_baseline().ys());

    let rows = read_data_table(&paths.data).unwrap();
    assert_eq!(rows.len(), 4);
    for row in &rows {
        let expected = if row.sticking_probability == 1.0 { 0.25 } else { 0.125 };
        assert!(row.distances.iter().all(|d| (d - expected).abs() < 1e-9));
    }
    assert!(leftover_parameter_files(dir.path()).is_empty());
}

/// Test: a project dir given relative to the current directory is not
/// resolved a second time from inside the simulator's working directory
#[tokio::test]
async fn test_sweep_with_relative_project_dir() {
    let dir = tempfile::tempdir_in(".").unwrap();
    let relative = PathBuf::from(dir.path().file_name().unwrap());
    assert!(relative.is_relative());

    let (completed, paths) = shell_sweep(dir.path(), relative.clone())
        .await
        .expect("sweep");
    assert_eq!(completed, 4);
    assert_eq!(read_data_table(&paths.data).unwrap().len(), 4);

    assert!(dir.path().join("output_8bit/Interface_1_0.vtp").is_file());
    assert!(!dir.path().join(&relative).exists(), "paths doubled up");
}
