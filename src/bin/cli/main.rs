mod app;
mod commands;
mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "layouts-cli", about = "Manage personal and shared layouts", version)]
struct Cli {
    /// Config file (default: <config dir>/layouts/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Treat the remote as unreachable
    #[arg(long, global = true)]
    offline: bool,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List layouts
    List,

    /// Show a layout and its content
    Show {
        /// Layout id (or unique prefix)
        id: String,
    },

    /// Create a new layout
    New {
        name: String,
        /// Layout content as JSON (use "-" to read from stdin)
        #[arg(long)]
        data: Option<String>,
        /// Share with the workspace, editable by everyone
        #[arg(long, conflicts_with = "read_only")]
        shared: bool,
        /// Share with the workspace, editable by nobody
        #[arg(long)]
        read_only: bool,
    },

    /// Rename a layout
    Rename { id: String, name: String },

    /// Replace the unsaved content of a layout
    Edit {
        id: String,
        /// Layout content as JSON (use "-" to read from stdin)
        #[arg(long)]
        data: String,
    },

    /// Save unsaved changes
    Save { id: String },

    /// Discard unsaved changes
    Revert { id: String },

    /// Delete a layout
    Delete { id: String },

    /// Copy a layout into a new personal layout
    Copy { id: String, name: String },

    /// Reconcile with the remote layout server
    Sync,

    /// Keep syncing in the background per the [sync] config until Ctrl-C
    Watch,
}

/// Parse JSON content, reading stdin for "-"
fn resolve_data(data: &str) -> anyhow::Result<serde_json::Value> {
    let text = if data == "-" {
        let mut buf = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf)?;
        buf
    } else {
        data.to_string()
    };
    Ok(serde_json::from_str(&text)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let use_color = !cli.no_color && atty_check();
    let app = app::App::new(cli.config.as_deref(), cli.offline).await?;

    match cli.command {
        Command::List => {
            commands::list::run(&app, &cli.format, use_color).await?;
        }
        Command::Show { id } => {
            commands::show::run(&app, &id, &cli.format, use_color).await?;
        }
        Command::New {
            name,
            data,
            shared,
            read_only,
        } => {
            let data = data.as_deref().map(resolve_data).transpose()?;
            commands::edit::run_new(&app, name, data, shared, read_only, &cli.format, use_color)
                .await?;
        }
        Command::Rename { id, name } => {
            commands::edit::run_rename(&app, &id, name, &cli.format, use_color).await?;
        }
        Command::Edit { id, data } => {
            let data = resolve_data(&data)?;
            commands::edit::run_edit(&app, &id, data, &cli.format, use_color).await?;
        }
        Command::Save { id } => {
            commands::edit::run_save(&app, &id, &cli.format, use_color).await?;
        }
        Command::Revert { id } => {
            commands::edit::run_revert(&app, &id, &cli.format, use_color).await?;
        }
        Command::Delete { id } => {
            commands::edit::run_delete(&app, &id).await?;
        }
        Command::Copy { id, name } => {
            commands::edit::run_copy(&app, &id, name, &cli.format, use_color).await?;
        }
        Command::Sync => {
            commands::sync::run(&app, &cli.format).await?;
        }
        Command::Watch => {
            commands::watch::run(&app, use_color).await?;
        }
    }

    Ok(())
}

/// Check if stdout is a terminal (for color support)
fn atty_check() -> bool {
    unsafe { libc_isatty(1) != 0 }
}

extern "C" {
    #[link_name = "isatty"]
    fn libc_isatty(fd: i32) -> i32;
}
