use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use remote_core::{RemoteController, ScanStatus};
use serde::Serialize;
use shared::{
    domain::DiscoveredDevice,
    error::{ErrorKind, RemoteError},
    protocol::{Command, DEFAULT_QUICK_LAUNCH, STREAMING_APPS},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser, Debug)]
#[command(about = "Find the streaming device on the local network and drive it")]
struct Args {
    /// Settings file; defaults to ./remote.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Scan the local subnets and print the device that answered.
    Scan {
        #[arg(long)]
        json: bool,
    },
    /// Scan, then send each command in order.
    Send {
        #[arg(required = true)]
        commands: Vec<Command>,
    },
    /// List the apps that can be launched by name.
    Apps,
    /// Scan, then read one command per line from stdin.
    Interactive,
}

#[derive(Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum ScanReport {
    Found { device: DiscoveredDevice, url: String },
    Failed { error: RemoteError },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    if let Mode::Apps = args.command {
        print_apps();
        return Ok(());
    }

    let settings = config::load_settings(args.config.as_deref())?;
    let remote = RemoteController::new(settings.remote_settings())
        .context("failed to set up the remote controller")?;

    match args.command {
        Mode::Scan { json } => scan(&remote, json).await,
        Mode::Send { commands } => send(&remote, &commands).await,
        Mode::Interactive => interactive(&remote).await,
        Mode::Apps => Ok(()),
    }
}

async fn connect(remote: &RemoteController) -> Result<DiscoveredDevice, RemoteError> {
    let ticket = remote.discover();
    match remote.wait_for_scan(ticket).await {
        ScanStatus::Completed {
            result: Ok(device), ..
        } => Ok(device),
        ScanStatus::Completed {
            result: Err(err), ..
        } => Err(RemoteError::from(&err)),
        other => Err(RemoteError::new(
            ErrorKind::DeviceNotFound,
            format!("scan did not complete: {other:?}"),
        )),
    }
}

async fn scan(remote: &RemoteController, json: bool) -> Result<()> {
    let report = match connect(remote).await {
        Ok(device) => ScanReport::Found {
            device,
            url: device.base_url(),
        },
        Err(error) => ScanReport::Failed { error },
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    match report {
        ScanReport::Found { url, .. } => {
            if !json {
                println!("Connected to {url}");
            }
            Ok(())
        }
        ScanReport::Failed { error } => Err(anyhow!(error)),
    }
}

async fn send(remote: &RemoteController, commands: &[Command]) -> Result<()> {
    let device = connect(remote).await?;
    println!("Connected to {}", device.base_url());

    for command in commands {
        let ack = remote
            .dispatch(*command)
            .await
            .with_context(|| format!("failed to send {command}"))?;
        println!("{command} -> {}", ack.status);
    }
    Ok(())
}

async fn interactive(remote: &Arc<RemoteController>) -> Result<()> {
    let _ticker = remote.start_activity_ticker();
    match connect(remote).await {
        Ok(device) => println!("Connected to {}", device.base_url()),
        Err(err) => println!("{}", err.message),
    }
    println!("Type a command (home, up, ok, netflix, launch:<id>), 'scan' or 'quit'.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            "scan" => match connect(remote).await {
                Ok(device) => println!("Connected to {}", device.base_url()),
                Err(err) => println!("{}", err.message),
            },
            raw => match raw.parse::<Command>() {
                Ok(command) => match remote.dispatch(command).await {
                    Ok(ack) => println!("{command} -> {}", ack.status),
                    Err(err) => {
                        let err = RemoteError::from(&err);
                        if err.suggests_rescan() {
                            println!("{} (type 'scan' to search again)", err.message);
                        } else {
                            println!("{}", err.message);
                        }
                    }
                },
                Err(err) => println!("{err}"),
            },
        }
        println!("activity {:.2}", remote.activity_intensity());
    }
    Ok(())
}

fn print_apps() {
    for app in STREAMING_APPS {
        let marker = if DEFAULT_QUICK_LAUNCH.contains(&app.name) {
            "*"
        } else {
            " "
        };
        println!("{marker} {:<12} {}", app.name, app.app_id);
    }
    println!("* bound to a quick-launch button by default");
}
