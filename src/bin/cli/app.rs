use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use layouts_lib::config::LayoutsConfig;
use layouts_lib::remote::{HttpLayoutClient, RemoteLayoutStorage};
use layouts_lib::storage::{FileLayoutStorage, Layout};
use layouts_lib::sync::LayoutManager;

/// Shared application state for CLI commands
pub struct App {
    pub config: LayoutsConfig,
    pub manager: LayoutManager,
}

impl App {
    /// Build the manager from the config file
    pub async fn new(config_path: Option<&Path>, offline: bool) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => LayoutsConfig::default_path().context("Failed to locate config file")?,
        };
        let config = LayoutsConfig::load(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

        let data_dir = config
            .resolve_data_dir()
            .context("Failed to get data directory")?;
        let storage = FileLayoutStorage::new(data_dir);
        storage
            .init()
            .await
            .context("Failed to initialize layout storage")?;

        let remote = match &config.remote {
            Some(remote_config) => {
                let client = HttpLayoutClient::new(remote_config)
                    .context("Failed to create remote layout client")?;
                Some(Arc::new(client) as Arc<dyn RemoteLayoutStorage>)
            }
            None => None,
        };

        let manager = LayoutManager::new(Arc::new(storage), remote);
        manager.set_online(config.start_online && !offline);

        Ok(Self { config, manager })
    }

    /// Find a layout by id or unique id prefix
    pub async fn find_layout(&self, id: &str) -> Result<Layout> {
        let layouts = self
            .manager
            .get_layouts()
            .await
            .context("Failed to list layouts")?;

        let id_lower = id.to_lowercase();
        if let Some(layout) = layouts.iter().find(|l| l.id.to_string() == id_lower) {
            return Ok(layout.clone());
        }

        let matches: Vec<&Layout> = layouts
            .iter()
            .filter(|l| l.id.to_string().starts_with(&id_lower))
            .collect();

        match matches.len() {
            0 => {
                // Not cached yet; the manager may find it remotely
                if let Ok(uuid) = id.parse() {
                    if let Some(layout) = self.manager.get_layout(uuid).await? {
                        return Ok(layout);
                    }
                }
                bail!("No layout matching '{}'", id)
            }
            1 => Ok(matches[0].clone()),
            _ => bail!(
                "Ambiguous layout id '{}'. Matches:\n{}",
                id,
                matches
                    .iter()
                    .map(|l| format!("  - {} {}", l.id, l.name))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
        }
    }
}
