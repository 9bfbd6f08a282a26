#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::Parser;

const CONFIG_ENV: &str = "REVERB_CONFIG";

/// Echoes every message it receives back to the sender
#[derive(Parser, Debug)]
#[command(name = "reverb")]
#[command(about = "A diagnostic mail responder", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = find_config_file(
        cli.config,
        std::env::var(CONFIG_ENV).ok(),
        &default_paths(),
    )?;
    let config_content = std::fs::read_to_string(&config_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config from {}: {}",
            config_path.display(),
            e
        )
    })?;
    let reverb: reverb::controller::Reverb = ron::from_str(&config_content)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", config_path.display()))?;

    reverb.run().await
}

fn default_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("./reverb.config.ron"),
        PathBuf::from("/etc/reverb/reverb.config.ron"),
    ]
}

/// Find the configuration file using the following precedence:
/// 1. `--config`
/// 2. `REVERB_CONFIG` environment variable
/// 3. ./reverb.config.ron (current working directory)
/// 4. /etc/reverb/reverb.config.ron (system-wide config)
fn find_config_file(
    flag: Option<PathBuf>,
    env: Option<String>,
    defaults: &[PathBuf],
) -> anyhow::Result<PathBuf> {
    if let Some(path) = flag {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("--config points to non-existent file: {}", path.display());
    }

    if let Some(env_path) = env {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    if let Some(path) = defaults.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = defaults
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - --config\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}
