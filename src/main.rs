use anyhow::Result;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tunerd::cli::{Cli, Commands};
use tunerd::config::Config;
use tunerd::daemon::run_daemon;
use tunerd::diagnostics::check_dependencies;
use tunerd::ipc::client::send_command;
use tunerd::ipc::protocol::{Command, Response};
use tunerd::ipc::server::IpcServer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = tunerd::logging::init(cli.verbose, cli.quiet) {
        eprintln!("{}", e.yellow());
    }

    match cli.command {
        None => {
            handle_ipc_command(None, Command::Status).await?;
        }
        Some(Commands::Daemon { socket }) => {
            let config = load_config(cli.config.as_deref())?;
            run_daemon(config, socket).await?;
        }
        Some(Commands::Tune { frequency, socket }) => {
            handle_ipc_command(socket, Command::Tune { frequency }).await?;
        }
        Some(Commands::Stop { socket }) => {
            handle_ipc_command(socket, Command::Stop).await?;
        }
        Some(Commands::Frequency { socket }) => {
            handle_ipc_command(socket, Command::Frequency).await?;
        }
        Some(Commands::Status { socket }) => {
            handle_ipc_command(socket, Command::Status).await?;
        }
        Some(Commands::Listen {
            count,
            timeout,
            socket,
        }) => {
            handle_listen(socket, count, timeout).await?;
        }
        Some(Commands::Shutdown { socket }) => {
            handle_ipc_command(socket, Command::Shutdown).await?;
        }
        Some(Commands::Check) => {
            let config = load_config(cli.config.as_deref())?;
            check_dependencies(&config);
        }
        Some(Commands::InstallService) => {
            let config_path = cli.config.as_deref().map(std::path::absolute).transpose()?;
            tunerd::systemd::install_and_activate(config_path.as_deref())?;
        }
        Some(Commands::UninstallService) => {
            tunerd::systemd::stop_and_disable()?;
            println!("{}", "Service stopped and removed.".green());
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "tunerd",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => match tunerd::config::resolve_path(None) {
            Some(default_path) => Config::load_or_default(&default_path)?,
            None => Config::default(),
        },
    };

    Ok(config.with_env_overrides())
}

fn report_connection_error(e: impl std::fmt::Display) -> ! {
    eprintln!(
        "{}",
        format!("Failed to communicate with daemon: {}", e).red()
    );
    eprintln!("Is the daemon running? Start it with: tunerd daemon");
    std::process::exit(1);
}

/// Send a single command to the daemon and print the response.
async fn handle_ipc_command(socket: Option<PathBuf>, command: Command) -> Result<()> {
    let socket_path = socket.unwrap_or_else(IpcServer::default_socket_path);

    let response = match send_command(&socket_path, command).await {
        Ok(response) => response,
        Err(e) => report_connection_error(e),
    };

    match response {
        Response::Tuned {
            display,
            tuner_argument,
            ..
        } => {
            println!("{} {}", "Tuned to".green(), display.green());
            println!("  {} {}", "Tuner argument:".dimmed(), tuner_argument);
        }
        Response::Ok { message } => {
            println!("{}", message.green());
        }
        Response::Frequency { frequency } => match frequency {
            Some(mhz) => println!("{} MHz", mhz),
            None => println!("{}", "Not tuned".dimmed()),
        },
        Response::Status {
            state,
            frequency,
            stream_active,
            chunks_captured,
            buffered,
            capacity,
            evicted,
            uptime_secs,
        } => {
            println!("Status:");
            println!("  {}    {}", "Client:".dimmed(), tunerd::version_string());
            println!("  {}     {}", "State:".dimmed(), state);
            if let Some(mhz) = frequency {
                println!("  {} {} MHz", "Frequency:".dimmed(), mhz);
            }
            println!(
                "  {}    {}",
                "Stream:".dimmed(),
                if stream_active {
                    "active".green().to_string()
                } else {
                    "inactive".dimmed().to_string()
                }
            );
            println!(
                "  {}    {} captured, {}/{} buffered, {} evicted",
                "Chunks:".dimmed(),
                chunks_captured,
                buffered,
                capacity,
                evicted
            );
            if let Some(secs) = uptime_secs {
                println!(
                    "  {}    {}",
                    "Uptime:".dimmed(),
                    humantime::format_duration(Duration::from_secs(secs))
                );
            }
        }
        Response::Audio { sequence, .. } => match sequence {
            Some(seq) => println!("Audio chunk #{}", seq),
            None => println!("{}", "No audio available".dimmed()),
        },
        Response::Error { message } => {
            eprintln!("{}", format!("Error: {}", message).red());
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Poll audio chunks from the daemon and write the raw bytes to stdout.
async fn handle_listen(socket: Option<PathBuf>, count: Option<u64>, timeout: Duration) -> Result<()> {
    let socket_path = socket.unwrap_or_else(IpcServer::default_socket_path);
    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    let mut stdout = std::io::stdout().lock();
    let mut written = 0u64;

    while count.is_none_or(|limit| written < limit) {
        let response = match send_command(
            &socket_path,
            Command::PollAudio {
                timeout_ms: Some(timeout_ms),
            },
        )
        .await
        {
            Ok(response) => response,
            Err(e) => report_connection_error(e),
        };

        let chunk = match response {
            Response::Audio { chunk, .. } => chunk,
            Response::Error { message } => {
                eprintln!("{}", format!("Error: {}", message).red());
                std::process::exit(1);
            }
            other => anyhow::bail!("Unexpected response to poll: {:?}", other),
        };
        if chunk.is_empty() {
            continue;
        }

        let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, chunk)?;
        match stdout.write_all(&bytes).and_then(|()| stdout.flush()) {
            Ok(()) => written += 1,
            // Downstream player closed the pipe.
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
