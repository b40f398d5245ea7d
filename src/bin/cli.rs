//! Pokedex CLI
//!
//! Command-line interface for a running Pokedex server:
//! - List and show entries
//! - Add an entry with its image and cry
//! - Check status
//! - Generate a config file

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use pokedex::api::dto::{EntryListResponse, SubmitRequest, UploadDto};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "pokedex-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Browse and extend a Pokedex catalog")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API server URL
    #[arg(long, default_value = "http://localhost:8082", global = true)]
    pub api_url: String,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List all entries
    List,

    /// Show one entry
    Show {
        /// Entry id, e.g. 0001
        id: String,
    },

    /// Add an entry
    Add {
        /// Entry id (at most 4 characters)
        #[arg(long)]
        id: String,
        /// Display name
        #[arg(long)]
        name: String,
        /// Image file (png, jpg, jpeg)
        #[arg(long)]
        image: PathBuf,
        /// Audio file (mp3, wav, opus)
        #[arg(long)]
        audio: Option<PathBuf>,
    },

    /// Show server status
    Status,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::List => {
            let response = client
                .get(format!("{}/api/v1/entries", cli.api_url))
                .send()
                .await
                .with_context(|| connect_hint(&cli.api_url))?;
            let response = check(response).await?;

            if cli.format == "json" {
                let data: serde_json::Value = response.json().await?;
                println!("{}", serde_json::to_string_pretty(&data)?);
                return Ok(());
            }

            let list: EntryListResponse = response.json().await?;
            if list.entries.is_empty() {
                println!("No entries yet.");
                println!();
                println!("Add the first one with:");
                println!("  pokedex-cli add --id 0001 --name Bulbasaur --image bulbasaur.png");
                return Ok(());
            }

            println!("{:<6} {:<20} {:<32} {}", "ID", "Name", "Image", "Audio");
            println!("{}", "-".repeat(80));
            for entry in &list.entries {
                println!(
                    "{:<6} {:<20} {:<32} {}",
                    entry.id,
                    entry.name,
                    entry.img_path,
                    if entry.has_audio() { entry.audio_path.as_str() } else { "-" }
                );
            }
            println!();
            println!("{} entries", list.total);
        }

        Commands::Show { id } => {
            let response = client
                .get(format!(
                    "{}/api/v1/entries/{}",
                    cli.api_url,
                    urlencoding::encode(&id)
                ))
                .send()
                .await
                .with_context(|| connect_hint(&cli.api_url))?;
            let data: serde_json::Value = check(response).await?.json().await?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                println!("{}", data["label"].as_str().unwrap_or_default());
                println!("  Image: {}", data["entry"]["img_path"].as_str().unwrap_or_default());
                println!("         {}", describe_uri(data["image"].as_str()));
                if let Some(audio) = data["entry"]["audio_path"].as_str().filter(|a| !a.is_empty()) {
                    println!("  Audio: {}", audio);
                    println!("         {}", describe_uri(data["audio"].as_str()));
                }
            }
        }

        Commands::Add {
            id,
            name,
            image,
            audio,
        } => {
            let request = SubmitRequest {
                id,
                name,
                image: Some(read_upload(&image)?),
                audio: audio.as_deref().map(read_upload).transpose()?,
            };

            println!("Uploading {} ...", request.name);
            let response = client
                .post(format!("{}/api/v1/entries", cli.api_url))
                .json(&request)
                .send()
                .await
                .with_context(|| connect_hint(&cli.api_url))?;
            let report: serde_json::Value = check(response).await?.json().await?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Added {} {} ({} entries total)",
                    report["entry"]["id"].as_str().unwrap_or_default(),
                    report["entry"]["name"].as_str().unwrap_or_default(),
                    report["total_entries"].as_u64().unwrap_or(0)
                );
            }
        }

        Commands::Status => {
            let response = client
                .get(format!("{}/health", cli.api_url))
                .send()
                .await
                .with_context(|| connect_hint(&cli.api_url))?;
            let health: serde_json::Value = check(response).await?.json().await?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&health)?);
                return Ok(());
            }

            println!("Pokedex v{}", health["version"].as_str().unwrap_or("unknown"));
            println!();
            println!("Status: {}", health["status"].as_str().unwrap_or("unknown"));
            println!("Store:  {}", health["store"].as_str().unwrap_or("unknown"));
            println!("Branch: {}", health["branch"].as_str().unwrap_or("unknown"));
            if let Some(entries) = health["entries"].as_u64() {
                println!("Entries: {}", entries);
            }
            println!("Sessions: {}", health["sessions"].as_u64().unwrap_or(0));
            println!("Cached media: {}", health["media_cached"].as_u64().unwrap_or(0));
            println!();
            println!(
                "Uptime: {}",
                format_duration(health["uptime_seconds"].as_u64().unwrap_or(0))
            );
        }

        Commands::Config { output } => {
            let config = pokedex::config::generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

fn connect_hint(api_url: &str) -> String {
    format!(
        "Cannot connect to Pokedex at {} (start it with: cargo run --bin pokedex)",
        api_url
    )
}

/// Turn an error response into an error carrying the server's message
async fn check(response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body: serde_json::Value = response.json().await.unwrap_or_default();
    match body["error"]["message"].as_str() {
        Some(message) => bail!("{} ({})", message, status),
        None => bail!("Request failed ({})", status),
    }
}

fn read_upload(path: &Path) -> anyhow::Result<UploadDto> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid file name: {:?}", path))?;
    Ok(UploadDto::encode(file_name, &bytes))
}

fn describe_uri(uri: Option<&str>) -> String {
    match uri {
        Some(uri) if uri == pokedex::PLACEHOLDER_IMAGE => "(unavailable, placeholder shown)".to_string(),
        Some(uri) => {
            let mime = uri
                .strip_prefix("data:")
                .and_then(|rest| rest.split(';').next())
                .unwrap_or("unknown");
            format!("{} ({} bytes encoded)", mime, uri.len())
        }
        None => "(unavailable)".to_string(),
    }
}

fn format_duration(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m {}s", minutes, seconds % 60)
    }
}
