//! Supervisor driving real child processes: small shell scripts stand in for
//! the tuner and the player.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tunerd::error::TunerError;
use tunerd::pipeline::{PipelineConfig, PipelineState, PipelineSupervisor};
use tunerd::process::{StraySweeper, SystemLauncher};

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn config(tuner: &Path, player: Option<&Path>, export: bool) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.tuner_binary = tuner.display().to_string();
    config.playback_binary = player.map(|p| p.display().to_string());
    config.export_enabled = export;
    config.chunk_size = 1024;
    config.capacity = 16;
    config.probe_window = Duration::from_millis(300);
    config.probe_interval = Duration::from_millis(20);
    config.terminate_grace = Duration::from_millis(500);
    config.relay_join_timeout = Duration::from_millis(500);
    config
}

fn supervisor(config: PipelineConfig) -> PipelineSupervisor {
    PipelineSupervisor::new(
        config,
        Arc::new(SystemLauncher::new()),
        StraySweeper::disabled(),
    )
}

fn process_exists(pid: i32) -> bool {
    // Signal 0 only checks for existence.
    unsafe { libc::kill(pid, 0) == 0 }
}

#[test]
fn streaming_tuner_fills_the_export_buffer() {
    let dir = TempDir::new().unwrap();
    let tuner = write_script(dir.path(), "fake_rtl_fm", "exec cat /dev/zero");
    let supervisor = supervisor(config(&tuner, None, true));

    let outcome = supervisor.tune("95.5").unwrap();
    assert_eq!(outcome.tuner_argument, "95.5M");

    let chunk = supervisor
        .exporter()
        .poll_timeout(Duration::from_secs(2));
    assert!(!chunk.is_empty());
    assert!(chunk.decode().unwrap().iter().all(|&b| b == 0));
    assert!(supervisor.status().stream_active);

    let outcome = supervisor.stop();
    assert!(outcome.was_running);
    assert_eq!(supervisor.state(), PipelineState::Idle);
    assert!(supervisor.buffer().is_empty());
}

#[test]
fn tuner_receives_frequency_and_rates() {
    let dir = TempDir::new().unwrap();
    let args_file = dir.path().join("args.txt");
    let tuner = write_script(
        dir.path(),
        "fake_rtl_fm",
        &format!("echo \"$@\" > {}\nexec cat /dev/zero", args_file.display()),
    );
    let supervisor = supervisor(config(&tuner, None, true));
    supervisor.tune("101.1 MHz").unwrap();
    supervisor.stop();

    let args = fs::read_to_string(&args_file).unwrap();
    assert_eq!(args.trim(), "-f 101.1M -s 240000 -r 48000 -l 30 -");
}

#[test]
fn tuner_exiting_during_probe_reports_stderr() {
    let dir = TempDir::new().unwrap();
    let tuner = write_script(
        dir.path(),
        "fake_rtl_fm",
        "echo 'No supported devices found.' >&2\nexit 1",
    );
    let supervisor = supervisor(config(&tuner, None, true));

    let err = supervisor.tune("95.5").unwrap_err();
    match err {
        TunerError::EarlyExit {
            process,
            message,
            exit_code,
        } => {
            assert_eq!(process, "fake_rtl_fm");
            assert!(message.contains("No supported devices found."), "got: {message}");
            assert_eq!(exit_code, Some(1));
        }
        other => panic!("Expected EarlyExit, got {:?}", other),
    }
    assert_eq!(supervisor.current_frequency(), None);
}

#[test]
fn informational_stderr_does_not_fail_tune() {
    let dir = TempDir::new().unwrap();
    let tuner = write_script(
        dir.path(),
        "fake_rtl_fm",
        "echo 'Found 1 device(s):' >&2\necho 'Tuned to 95800000 Hz.' >&2\nexec cat /dev/zero",
    );
    let supervisor = supervisor(config(&tuner, None, true));

    assert!(supervisor.tune("95.5").is_ok());
    assert_eq!(supervisor.state(), PipelineState::Running);
    supervisor.stop();
}

#[test]
fn missing_tuner_binary_is_a_spawn_error() {
    let supervisor = supervisor(config(Path::new("/nonexistent/rtl_fm"), None, true));
    let err = supervisor.tune("95.5").unwrap_err();
    match err {
        TunerError::Spawn { process, message } => {
            assert_eq!(process, "rtl_fm");
            assert!(message.contains("not found"), "got: {message}");
        }
        other => panic!("Expected Spawn error, got {:?}", other),
    }
    assert_eq!(supervisor.state(), PipelineState::Idle);
}

#[test]
fn tee_feeds_player_and_buffer() {
    let dir = TempDir::new().unwrap();
    let received = dir.path().join("played.raw");
    let tuner = write_script(dir.path(), "fake_rtl_fm", "exec cat /dev/zero");
    let player = write_script(
        dir.path(),
        "fake_play",
        &format!("exec cat > {}", received.display()),
    );
    let supervisor = supervisor(config(&tuner, Some(&player), true));

    supervisor.tune("95.5").unwrap();
    assert!(
        !supervisor
            .exporter()
            .poll_timeout(Duration::from_secs(2))
            .is_empty()
    );
    supervisor.stop();

    assert!(fs::metadata(&received).unwrap().len() > 0);
}

#[test]
fn chained_player_reads_tuner_output_directly() {
    let dir = TempDir::new().unwrap();
    let received = dir.path().join("played.raw");
    let tuner = write_script(dir.path(), "fake_rtl_fm", "exec cat /dev/zero");
    let player = write_script(
        dir.path(),
        "fake_play",
        &format!("exec head -c 4096 > {}\n", received.display()),
    );
    let mut config = config(&tuner, Some(&player), false);
    config.probe_window = Duration::from_millis(50);
    let player_spec = config.playback_spec().unwrap();
    assert_eq!(player_spec.name, "fake_play");
    let supervisor = supervisor(config);

    // `head` exits after 4096 bytes, possibly inside the probe window, in
    // which case tune reports it. The bytes arrive either way.
    let _ = supervisor.tune("95.5");
    let deadline = Instant::now() + Duration::from_secs(2);
    while fs::metadata(&received).map(|m| m.len()).unwrap_or(0) < 4096
        && Instant::now() < deadline
    {
        std::thread::sleep(Duration::from_millis(20));
    }
    supervisor.stop();

    assert_eq!(fs::metadata(&received).unwrap().len(), 4096);
    assert!(supervisor.buffer().is_empty());
}

#[test]
fn tuner_ignoring_sigterm_is_killed_after_grace() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("pid");
    let tuner = write_script(
        dir.path(),
        "stubborn_rtl_fm",
        &format!(
            "trap '' TERM\necho $$ > {}\nwhile :; do printf 'xxxxxxxx'; sleep 0.01; done",
            pid_file.display()
        ),
    );
    let mut config = config(&tuner, None, true);
    config.terminate_grace = Duration::from_millis(200);
    let supervisor = supervisor(config);

    supervisor.tune("95.5").unwrap();
    let pid: i32 = fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(process_exists(pid));

    let started = Instant::now();
    supervisor.stop();
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!process_exists(pid));
}

#[test]
fn retune_terminates_previous_tuner() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("pids");
    let tuner = write_script(
        dir.path(),
        "fake_rtl_fm",
        &format!("echo $$ >> {}\nexec cat /dev/zero", pid_file.display()),
    );
    let supervisor = supervisor(config(&tuner, None, true));

    supervisor.tune("95.5").unwrap();
    supervisor.tune("99.9").unwrap();

    let pids: Vec<i32> = fs::read_to_string(&pid_file)
        .unwrap()
        .lines()
        .map(|line| line.trim().parse().unwrap())
        .collect();
    assert_eq!(pids.len(), 2);
    assert!(!process_exists(pids[0]));
    assert!(process_exists(pids[1]));

    supervisor.stop();
    assert!(!process_exists(pids[1]));
}
