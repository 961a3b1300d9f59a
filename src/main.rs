//! tcd-panel CLI - drive cockpit controls and grab MFD frames from the
//! command line.
//!
//! This is the main binary entry point. See the `tcd_panel` library for the
//! core functionality.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tcd_panel::commands::{self, controls::Hat, controls::Rocker};
use tcd_panel::{DisplayKind, InputValue, PanelConfig};

#[derive(Parser)]
#[command(name = "tcd-panel")]
#[command(version)]
#[command(about = "Cockpit panel client for the tcd backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every update on the given control channels
    Watch {
        /// Channel names
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Send one input to a control channel
    Send {
        /// Channel name
        name: String,
        /// `inc`, `dec`, `toggle` or an integer
        value: InputValue,
    },
    /// Click a push button
    Click {
        /// Channel name
        name: String,
    },
    /// Push a three-way rocker and let it spring back
    Push3 {
        /// Channel name
        name: String,
        /// Direction to push
        #[arg(value_enum)]
        direction: Rocker,
    },
    /// Flick the F-16C ICP DCS switch
    Icp {
        /// Direction to flick
        #[arg(value_enum)]
        direction: Hat,
    },
    /// Save JPEG frames of a display
    Frames {
        /// Display (LeftMfcd, RightMfcd, CenterMfd)
        kind: DisplayKind,
        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Number of frames to save
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Negotiate a WebRTC video stream of a display
    Offer {
        /// Display (LeftMfcd, RightMfcd, CenterMfd)
        kind: DisplayKind,
    },
    /// Show the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    let config = PanelConfig::load()?;
    log::debug!("Using backend {} (debug: {})", config.host, config.debug);

    match cli.command {
        Commands::Watch { names } => {
            commands::controls::watch(&config, &names).await?;
        }
        Commands::Send { name, value } => {
            commands::controls::send(&config, &name, value).await?;
        }
        Commands::Click { name } => {
            commands::controls::click(&config, &name).await?;
        }
        Commands::Push3 { name, direction } => {
            commands::controls::push3(&config, &name, direction).await?;
        }
        Commands::Icp { direction } => {
            commands::controls::icp(&config, direction).await?;
        }
        Commands::Frames { kind, out, count } => {
            commands::mfd::frames(&config, kind, &out, count).await?;
        }
        Commands::Offer { kind } => {
            commands::mfd::offer(&config, kind).await?;
        }
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                let path = config.save()?;
                println!("Saved to {}", path.display());
            }
        }
    }

    Ok(())
}
