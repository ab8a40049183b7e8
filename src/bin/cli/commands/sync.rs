use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;

use crate::app::App;
use crate::OutputFormat;

pub async fn run(app: &App, format: &OutputFormat) -> Result<()> {
    let Some(remote) = &app.config.remote else {
        bail!("No remote layout server configured");
    };
    if !app.manager.is_online() {
        bail!("Cannot sync while offline");
    }

    // Ctrl-C stops the pass between operations
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let result = app
        .manager
        .sync_with_remote(cancel)
        .await
        .with_context(|| format!("Failed to sync with {}", remote.server_url))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Plain => {
            if result.cancelled {
                println!("Sync cancelled");
            }
            println!(
                "Synced workspace {} in {}ms: {} added, {} updated, {} restored, {} removed remotely, {} deleted remotely, {} purged",
                remote.workspace,
                result.duration_ms,
                result.layouts_added,
                result.layouts_updated,
                result.layouts_restored,
                result.marked_remotely_deleted,
                result.remote_deletes,
                result.layouts_purged,
            );
            if result.conflicts > 0 {
                println!(
                    "{} layout(s) changed remotely while they had unsaved changes",
                    result.conflicts
                );
            }
        }
    }

    Ok(())
}
