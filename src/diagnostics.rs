//! System diagnostics and dependency checking.
//!
//! Verifies that the tuner and playback tools the pipeline launches are installed.

use crate::config::Config;
use std::process::Command;

/// Result of a dependency check.
#[derive(Debug, PartialEq)]
pub enum CheckResult {
    /// Tool is installed and working
    Ok,
    /// Tool is not found
    NotFound,
    /// Tool is found but has issues
    Warning(String),
}

/// Check if a command exists and is executable.
fn check_command(command: &str) -> CheckResult {
    match Command::new(command).arg("--version").output() {
        Ok(output) if output.status.success() => CheckResult::Ok,
        Ok(_) => CheckResult::Warning(format!("'{}' found but --version failed", command)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckResult::NotFound,
        Err(e) => CheckResult::Warning(format!("Error checking '{}': {}", command, e)),
    }
}

/// Check a tuner binary. `rtl_fm -h` prints usage and exits non-zero, so
/// any exit status counts as installed.
fn check_tuner(command: &str) -> CheckResult {
    match Command::new(command).arg("-h").output() {
        Ok(_) => CheckResult::Ok,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckResult::NotFound,
        Err(e) => CheckResult::Warning(format!("Error checking '{}': {}", command, e)),
    }
}

/// Print a single check line with an install hint on failure.
fn report(label: &str, result: CheckResult, install_hint: &[&str]) -> bool {
    print!("{}: ", label);
    match result {
        CheckResult::Ok => {
            println!("✓ OK");
            true
        }
        CheckResult::NotFound => {
            println!("✗ NOT FOUND");
            for (i, line) in install_hint.iter().enumerate() {
                if i == 0 {
                    println!("  Install: {}", line);
                } else {
                    println!("           {}", line);
                }
            }
            false
        }
        CheckResult::Warning(msg) => {
            println!("⚠ WARNING: {}", msg);
            false
        }
    }
}

/// Check all dependencies named by `config` and print a summary.
pub fn check_dependencies(config: &Config) {
    println!("Checking system dependencies...\n");

    let tuner_ok = report(
        &format!("{} (tuner)", config.tuner.binary),
        check_tuner(&config.tuner.binary),
        &[
            "sudo apt install rtl-sdr    (Debian/Ubuntu)",
            "sudo pacman -S rtl-sdr      (Arch)",
        ],
    );

    if config.playback.enabled {
        report(
            &format!("{} (playback)", config.playback.binary),
            check_command(&config.playback.binary),
            &[
                "sudo apt install sox        (Debian/Ubuntu)",
                "sudo pacman -S sox          (Arch)",
            ],
        );
    } else {
        println!("{} (playback): - disabled", config.playback.binary);
    }

    if config.supervisor.sweep_enabled {
        report(
            "pkill (stray process sweep)",
            check_command("pkill"),
            &["sudo apt install procps     (Debian/Ubuntu)"],
        );
    }

    println!();
    if tuner_ok {
        println!("✓ Ready to tune.");
    } else {
        println!("⚠ The tuner binary is missing; `tunerd tune` will fail to spawn it.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_result_equality() {
        assert_eq!(CheckResult::Ok, CheckResult::Ok);
        assert_ne!(CheckResult::Ok, CheckResult::NotFound);
        assert_ne!(
            CheckResult::Warning("a".to_string()),
            CheckResult::Warning("b".to_string())
        );
    }

    #[test]
    fn test_check_command_nonexistent() {
        let result = check_command("nonexistent-command-xyz-12345");
        assert_eq!(result, CheckResult::NotFound);
    }

    #[test]
    fn test_check_tuner_accepts_nonzero_exit() {
        // `false` exits 1 for any argument, like `rtl_fm -h`.
        assert_eq!(check_tuner("false"), CheckResult::Ok);
        assert_eq!(
            check_tuner("nonexistent-tuner-xyz-12345"),
            CheckResult::NotFound
        );
    }

    #[test]
    fn test_check_dependencies_runs_without_panic() {
        let mut config = Config::default();
        config.tuner.binary = "nonexistent-tuner-xyz-12345".to_string();
        check_dependencies(&config);
    }
}
