use anyhow::{Context, Result};

use crate::app::App;
use crate::render::terminal::render_layout_line;
use crate::OutputFormat;

pub async fn run(app: &App, format: &OutputFormat, use_color: bool) -> Result<()> {
    let layouts = app
        .manager
        .get_layouts()
        .await
        .context("Failed to list layouts")?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&layouts)?);
        }
        OutputFormat::Plain => {
            println!("{} ({})", app.manager.namespace(), online_label(app));
            if layouts.is_empty() {
                println!("    (no layouts)");
            }
            for layout in &layouts {
                println!("    {}", render_layout_line(layout, use_color));
            }
        }
    }

    Ok(())
}

fn online_label(app: &App) -> &'static str {
    match (app.manager.supports_sharing(), app.manager.is_online()) {
        (false, _) => "personal only",
        (true, true) => "online",
        (true, false) => "offline",
    }
}
