// src/main.rs

use anyhow::{bail, Context, Result};
use audiobook_client::prelude::*;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "audiobook-client", version, about = "Upload books to the audiobook service")]
struct Cli {
    /// TOML file with client settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend origin; overrides the config file and AUDIOBOOK_API_URL.
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a manuscript and wait for the analysis.
    Upload { path: PathBuf },
    /// Simplify a passage for young readers.
    Simplify { text: String },
    /// Generate narration for a passage.
    Audiobook { text: String },
    /// Print the download URL for a stored file.
    Url { kind: UrlKind, name: String },
    /// Check that the backend is reachable.
    Ping,
}

#[derive(Clone, Copy, ValueEnum)]
enum UrlKind {
    File,
    Audio,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("audiobook_client=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    debug!(base_url = %config.base_url, "configuration resolved");

    match cli.command {
        Command::Upload { path } => upload(&config, path).await,
        Command::Simplify { text } => {
            let response = TransportClient::new(&config)?.simplify(&text).await?;
            println!("{}", response.simplified_story);
            Ok(())
        }
        Command::Audiobook { text } => {
            let client = TransportClient::new(&config)?;
            let response = client.generate_audiobook(&text).await?;
            println!("{}", response.message);
            for file in &response.audio_files {
                let name = file.rsplit('/').next().unwrap_or(file);
                println!("  {}", client.audio_url(name));
            }
            Ok(())
        }
        Command::Url { kind, name } => {
            let client = TransportClient::new(&config)?;
            let url = match kind {
                UrlKind::File => client.file_url(&name),
                UrlKind::Audio => client.audio_url(&name),
            };
            println!("{url}");
            Ok(())
        }
        Command::Ping => {
            let message = TransportClient::new(&config)?.ping().await?;
            println!("{message}");
            Ok(())
        }
    }
}

/// Config file, then environment, then command-line flags.
fn resolve_config(cli: &Cli) -> Result<ClientConfig> {
    let config = match &cli.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClientConfig::default(),
    };
    let mut config = config.apply_env()?;
    if let Some(url) = &cli.api_url {
        config.base_url = url.clone();
        config.validate()?;
    }
    Ok(config)
}

async fn upload(config: &ClientConfig, path: PathBuf) -> Result<()> {
    let orchestrator = UploadOrchestrator::from_config(config)?;
    let mut events = orchestrator.subscribe();

    orchestrator.select_path(&path).await?;
    let file = orchestrator.snapshot().file.context("no file selected")?;
    println!("Selected file: {} ({} bytes)", file.name, file.size);

    orchestrator.submit().await?;

    loop {
        match events.recv().await {
            Ok(UploadEvent::Progress { percent, label }) => {
                println!("[{percent:>3}%] {label}");
            }
            Ok(UploadEvent::Navigate(navigation)) => {
                info!(route = %navigation.route, "upload complete");
                render_navigation(config, &navigation)?;
                return Ok(());
            }
            Ok(UploadEvent::Failed { message }) => bail!("{message}"),
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "progress output lagged"),
            Err(RecvError::Closed) => bail!("upload ended without a result"),
        }
    }
}

fn render_navigation(config: &ClientConfig, navigation: &Navigation) -> Result<()> {
    let client = TransportClient::new(config)?;
    println!();
    println!("Book ready: {}", navigation.route);
    println!("Stored at:  {}", client.file_url(&navigation.filename));

    let Some(analysis) = &navigation.analysis else {
        return Ok(());
    };
    println!("Target age group: {}", analysis.target_age_group);
    if !analysis.characters.is_empty() {
        println!("Characters:");
        for character in &analysis.characters {
            println!(
                "  {} ({} lines, first at line {}): \"{}\"",
                character.name,
                character.dialogue_count,
                character.first_appearance,
                character.sample_dialogue
            );
        }
    }
    if !analysis.simplified_text.is_empty() {
        println!();
        println!("{}", analysis.simplified_text);
    }
    Ok(())
}
