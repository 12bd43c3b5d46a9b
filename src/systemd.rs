//! Systemd user service management.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::warn;

const SERVICE_NAME: &str = "tunerd.service";

/// Unit file for running `exe daemon`, optionally with a config file.
///
/// `KillMode=mixed` sends SIGTERM to the daemon only, so it can stop the tuner
/// process group itself before systemd kills whatever is left.
pub fn service_unit(exe_path: &Path, config: Option<&Path>) -> String {
    let config_arg = config
        .map(|path| format!(" --config {}", path.display()))
        .unwrap_or_default();
    format!(
        r#"[Unit]
Description=tunerd - FM tuner pipeline daemon
After=sound.target

[Service]
Type=simple
ExecStart={} daemon{}
KillMode=mixed
TimeoutStopSec=10
Restart=on-failure
RestartSec=5

[Install]
WantedBy=default.target
"#,
        exe_path.display(),
        config_arg
    )
}

/// Install systemd user service and activate it (start or restart).
///
/// Steps:
/// 1. Resolve systemd user directory (XDG_CONFIG_HOME or HOME)
/// 2. Write unit file pointing at the current executable
/// 3. Reload systemd daemon
/// 4. Restart if active, enable+start if not
pub fn install_and_activate(config: Option<&Path>) -> Result<()> {
    let systemd_dir = service_dir()?;
    fs::create_dir_all(&systemd_dir).context("Failed to create systemd user directory")?;

    let exe_path = std::env::current_exe().context("Failed to get current executable path")?;

    let service_path = systemd_dir.join(SERVICE_NAME);
    fs::write(&service_path, service_unit(&exe_path, config))
        .context("Failed to write service file")?;

    eprintln!("Service file written to: {}", service_path.display());

    run_systemctl(&["daemon-reload"], "daemon-reload")?;

    let is_active = Command::new("systemctl")
        .args(["--user", "is-active", SERVICE_NAME])
        .status()
        .map(|s| s.success())
        .unwrap_or(false);

    if is_active {
        eprintln!("Service is already active, restarting...");
        run_systemctl(&["restart", SERVICE_NAME], "restart tunerd")?;
        println!("Service restarted.");
    } else {
        eprintln!("Enabling and starting service...");
        run_systemctl(
            &["enable", "--now", SERVICE_NAME],
            "enable and start tunerd",
        )?;
        println!("Service enabled and started.");
    }

    Ok(())
}

/// Stop, disable, and remove systemd user service.
///
/// Best-effort cleanup: stop and disable failures are logged but don't halt removal.
/// Reload failure is fatal (indicates systemd communication problem).
pub fn stop_and_disable() -> Result<()> {
    warn_systemctl(&["stop", SERVICE_NAME], "stop service");
    warn_systemctl(&["disable", SERVICE_NAME], "disable service");

    let service_path = service_dir()?.join(SERVICE_NAME);
    if service_path.exists() {
        fs::remove_file(&service_path).context("Failed to remove service file")?;
    }

    run_systemctl(&["daemon-reload"], "daemon-reload")?;

    Ok(())
}

/// Run `systemctl --user <args>` and fail if the command exits non-zero.
fn run_systemctl(args: &[&str], action: &str) -> Result<()> {
    let status = Command::new("systemctl")
        .arg("--user")
        .args(args)
        .status()
        .with_context(|| format!("Failed to run systemctl {action}"))?;

    anyhow::ensure!(
        status.success(),
        "systemctl {action} failed (exit code: {status}). Check: systemctl --user status"
    );
    Ok(())
}

/// Run `systemctl --user <args>`, logging warnings on failure (best-effort cleanup).
fn warn_systemctl(args: &[&str], action: &str) {
    match Command::new("systemctl").arg("--user").args(args).status() {
        Ok(s) if !s.success() => warn!("systemctl {action} exited with {s}"),
        Err(e) => warn!("Failed to run systemctl {action}: {e}"),
        Ok(_) => {}
    }
}

/// Resolve systemd user service directory.
///
/// Checks XDG_CONFIG_HOME first, falls back to HOME/.config.
fn service_dir() -> Result<PathBuf> {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        Ok(PathBuf::from(config_home).join("systemd/user"))
    } else if let Ok(home) = std::env::var("HOME") {
        Ok(PathBuf::from(home).join(".config/systemd/user"))
    } else {
        anyhow::bail!("Could not determine user config directory (HOME or XDG_CONFIG_HOME)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_runs_daemon_subcommand() {
        let unit = service_unit(Path::new("/usr/local/bin/tunerd"), None);
        assert!(unit.contains("ExecStart=/usr/local/bin/tunerd daemon\n"));
        assert!(unit.contains("KillMode=mixed"));
        assert!(unit.contains("WantedBy=default.target"));
    }

    #[test]
    fn test_unit_passes_config_path() {
        let unit = service_unit(
            Path::new("/usr/bin/tunerd"),
            Some(Path::new("/etc/tunerd.toml")),
        );
        assert!(unit.contains("ExecStart=/usr/bin/tunerd daemon --config /etc/tunerd.toml\n"));
    }
}
