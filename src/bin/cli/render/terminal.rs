use layouts_lib::storage::{Layout, LayoutPermission, SyncStatus};

/// ANSI color codes
pub struct Color;

impl Color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";
}

fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, Color::RESET)
    } else {
        text.to_string()
    }
}

fn permission_label(permission: LayoutPermission) -> &'static str {
    match permission {
        LayoutPermission::CreatorWrite => "personal",
        LayoutPermission::OrgWrite => "shared",
        LayoutPermission::OrgRead => "shared, read-only",
    }
}

/// One-line summary: `<short id>  <name> [permission] *`
pub fn render_layout_line(layout: &Layout, use_color: bool) -> String {
    let short_id: String = layout.id.to_string().chars().take(8).collect();
    let mut line = format!(
        "{}  {} {}",
        paint(&short_id, Color::GRAY, use_color),
        paint(&layout.name, Color::BOLD, use_color),
        paint(
            &format!("[{}]", permission_label(layout.permission)),
            Color::CYAN,
            use_color
        ),
    );
    if layout.has_unsaved_changes() {
        line.push_str(&paint(" *", Color::YELLOW, use_color));
    }
    line
}

/// Full view with metadata header and pretty-printed content
pub fn render_layout(layout: &Layout, use_color: bool) -> String {
    let mut lines = vec![render_layout_line(layout, use_color)];
    lines.push(paint(&format!("id:       {}", layout.id), Color::DIM, use_color));

    let saved = format!("saved:    {}", layout.baseline.saved_at.to_rfc3339());
    lines.push(paint(&saved, Color::DIM, use_color));

    if let Some(info) = &layout.sync_info {
        let status = match info.status {
            SyncStatus::Tracked => info.status.to_string(),
            _ => paint(&info.status.to_string(), Color::YELLOW, use_color),
        };
        lines.push(format!("{}{}", paint("sync:     ", Color::DIM, use_color), status));
    }
    if let Some(external_id) = &layout.external_id {
        lines.push(paint(&format!("remote:   {}", external_id), Color::DIM, use_color));
    }
    if layout.has_unsaved_changes() {
        lines.push(paint("(unsaved changes)", Color::YELLOW, use_color));
    }

    lines.push(String::new());
    lines.push(
        serde_json::to_string_pretty(layout.current_data())
            .unwrap_or_else(|_| layout.current_data().to_string()),
    );
    lines.join("\n")
}
