use anyhow::{Context, Result};
use serde_json::Value;

use layouts_lib::storage::{Layout, LayoutPermission, LayoutUpdate, NewLayout};

use crate::app::App;
use crate::render::terminal::render_layout_line;
use crate::OutputFormat;

fn print_layout(layout: &Layout, format: &OutputFormat, use_color: bool) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(layout)?),
        OutputFormat::Plain => println!("{}", render_layout_line(layout, use_color)),
    }
    Ok(())
}

pub async fn run_new(
    app: &App,
    name: String,
    data: Option<Value>,
    shared: bool,
    read_only: bool,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    let permission = match (shared, read_only) {
        (_, true) => LayoutPermission::OrgRead,
        (true, false) => LayoutPermission::OrgWrite,
        (false, false) => LayoutPermission::CreatorWrite,
    };
    let layout = app
        .manager
        .save_new_layout(NewLayout {
            name,
            data: data.unwrap_or_else(|| Value::Object(Default::default())),
            permission,
        })
        .await
        .context("Failed to create layout")?;
    print_layout(&layout, format, use_color)
}

pub async fn run_rename(
    app: &App,
    id: &str,
    name: String,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    let layout = app.find_layout(id).await?;
    let layout = app
        .manager
        .update_layout(LayoutUpdate {
            id: layout.id,
            name: Some(name),
            data: None,
        })
        .await
        .context("Failed to rename layout")?;
    print_layout(&layout, format, use_color)
}

pub async fn run_edit(
    app: &App,
    id: &str,
    data: Value,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    let layout = app.find_layout(id).await?;
    let layout = app
        .manager
        .update_layout(LayoutUpdate {
            id: layout.id,
            name: None,
            data: Some(data),
        })
        .await
        .context("Failed to edit layout")?;
    print_layout(&layout, format, use_color)
}

pub async fn run_save(app: &App, id: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let layout = app.find_layout(id).await?;
    let layout = app
        .manager
        .overwrite_layout(layout.id)
        .await
        .context("Failed to save layout")?;
    print_layout(&layout, format, use_color)
}

pub async fn run_revert(app: &App, id: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let layout = app.find_layout(id).await?;
    let layout = app
        .manager
        .revert_layout(layout.id)
        .await
        .context("Failed to revert layout")?;
    print_layout(&layout, format, use_color)
}

pub async fn run_delete(app: &App, id: &str) -> Result<()> {
    let layout = app.find_layout(id).await?;
    app.manager
        .delete_layout(layout.id)
        .await
        .context("Failed to delete layout")?;
    println!("Deleted {}", layout.name);
    Ok(())
}

pub async fn run_copy(
    app: &App,
    id: &str,
    name: String,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    let layout = app.find_layout(id).await?;
    let copy = app
        .manager
        .make_personal_copy(layout.id, name)
        .await
        .context("Failed to copy layout")?;
    print_layout(&copy, format, use_color)
}
