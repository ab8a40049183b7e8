use anyhow::{bail, Result};

use layouts_lib::sync::{start_sync_scheduler, LayoutEvent, LayoutEventKind};

use crate::app::App;
use crate::render::terminal::render_layout_line;

/// Run the sync scheduler in the foreground until Ctrl-C, printing changes
pub async fn run(app: &App, use_color: bool) -> Result<()> {
    if !app.manager.supports_sharing() {
        bail!("No remote layout server configured");
    }

    let change_listener = app.manager.subscribe(LayoutEventKind::Change, move |event| {
        if let LayoutEvent::Change { updated_layout } = event {
            match updated_layout {
                Some(layout) => println!("changed  {}", render_layout_line(layout, use_color)),
                None => println!("layouts changed"),
            }
        }
    });
    let error_manager = app.manager.clone();
    let error_listener = app.manager.subscribe(LayoutEventKind::ErrorChanged, move |_| {
        if let Some(e) = error_manager.error() {
            eprintln!("sync error: {}", e);
        }
    });

    let scheduler = start_sync_scheduler(app.manager.clone(), &app.config.sync);
    scheduler.sync_now();
    println!("Watching {} (Ctrl-C to stop)", app.manager.namespace());

    tokio::signal::ctrl_c().await?;
    scheduler.shutdown();

    app.manager.unsubscribe(LayoutEventKind::Change, change_listener);
    app.manager.unsubscribe(LayoutEventKind::ErrorChanged, error_listener);
    Ok(())
}
