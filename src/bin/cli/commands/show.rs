use anyhow::Result;

use crate::app::App;
use crate::render::terminal::render_layout;
use crate::OutputFormat;

pub async fn run(app: &App, id: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let layout = app.find_layout(id).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&layout)?),
        OutputFormat::Plain => println!("{}", render_layout(&layout, use_color)),
    }

    Ok(())
}
