use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use git_webby::{passwd, Config};
use webby_server::AppState;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the repositories under the project root over HTTP
    Serve {
        /// Configuration file (defaults to ~/.git-webby.toml when present)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Address to listen on, overrides the config file
        #[arg(short, long, value_name = "ADDR")]
        listen: Option<SocketAddr>,

        /// Directory holding the repositories, overrides the config file
        #[arg(short, long, value_name = "DIR")]
        project_root: Option<PathBuf>,
    },
    /// Manage the Basic authentication password file
    Passwd {
        #[command(subcommand)]
        command: PasswdCommand,
    },
}

#[derive(Subcommand, Debug)]
enum PasswdCommand {
    /// Add a user or change its password
    Add {
        file: PathBuf,
        username: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Remove a user
    Remove { file: PathBuf, username: String },
    /// List users
    List { file: PathBuf },
    /// Verify a password, exiting with status 1 when it does not match
    Check {
        file: PathBuf,
        username: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    match args.command {
        Commands::Serve {
            config,
            listen,
            project_root,
        } => {
            init_tracing();
            let mut config = Config::load(config.as_deref())?;
            if let Some(listen) = listen {
                config.listen = listen;
            }
            if let Some(project_root) = project_root {
                config.project_root = project_root;
            }
            serve(config).await?;
        }
        Commands::Passwd { command } => return run_passwd(command),
    }

    Ok(ExitCode::SUCCESS)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config: Config) -> Result<()> {
    let service = config.service_config()?;
    tracing::info!(
        project_root = %service.project_root.display(),
        git = %service.git_path.display(),
        get_any_file = service.get_any_file,
        upload_pack = service.upload_pack,
        receive_pack = service.receive_pack,
        authenticate = service.authenticate,
        "configuration loaded"
    );

    let state = Arc::new(AppState::new(service)?);
    let app = webby_server::app(state);

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", config.listen))?;
    tracing::info!(listen_addr = %config.listen, "git-webby listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

fn run_passwd(command: PasswdCommand) -> Result<ExitCode> {
    match command {
        PasswdCommand::Add {
            file,
            username,
            password,
        } => {
            let password = password_or_stdin(password)?;
            if passwd::add(&file, &username, &password)? {
                println!("Added {username} to {}", file.display());
            } else {
                println!("Updated password for {username} in {}", file.display());
            }
        }
        PasswdCommand::Remove { file, username } => {
            if !passwd::remove(&file, &username)? {
                bail!("no user {username} in {}", file.display());
            }
            println!("Removed {username} from {}", file.display());
        }
        PasswdCommand::List { file } => {
            for username in passwd::list(&file)? {
                println!("{username}");
            }
        }
        PasswdCommand::Check {
            file,
            username,
            password,
        } => {
            let password = password_or_stdin(password)?;
            return report_check(&file, &username, &password);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn report_check(file: &Path, username: &str, password: &str) -> Result<ExitCode> {
    if passwd::check(file, username, password)? {
        println!("Password for {username} is correct");
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("Password verification failed for {username}");
        Ok(ExitCode::FAILURE)
    }
}

fn password_or_stdin(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("empty password");
    }
    Ok(password)
}
