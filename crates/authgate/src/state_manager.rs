//! Catalog source with hot reload
//!
//! Loads the catalog document, normalizes it, and installs it into the
//! shared catalog. File sources are watched with a debounced notifier and
//! reloaded on change; a bad reload logs and keeps the previous generation.
//! Symlink retargeting (the usual mounted-configmap update shape) counts as
//! a change.

use std::path::{absolute, Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use notify::{EventKind, RecursiveMode};
use pipeline_core::Catalog;
use tokio::fs;
use tracing::{error, info};

use crate::types::local::NormalizedLocalConfig;

#[derive(Debug, Clone)]
pub enum ConfigSource {
    File(PathBuf),
    Static(String),
}

pub struct StateManager {
    catalog: Catalog,
    client: reqwest::Client,
    source: ConfigSource,
}

impl StateManager {
    pub fn new(catalog: Catalog, client: reqwest::Client, source: ConfigSource) -> Self {
        Self {
            catalog,
            client,
            source,
        }
    }

    /// Load the catalog once; for file sources, keep watching for changes.
    /// The initial load must succeed, later reloads are best-effort.
    pub async fn run(self) -> anyhow::Result<()> {
        match self.source.clone() {
            ConfigSource::File(path) => self.watch_config_file(&path).await,
            ConfigSource::Static(_) => {
                self.reload().await?;
                Ok(())
            }
        }
    }

    async fn read_to_string(&self) -> anyhow::Result<String> {
        match &self.source {
            ConfigSource::File(path) => fs::read_to_string(path)
                .await
                .with_context(|| format!("reading catalog from {}", path.display())),
            ConfigSource::Static(contents) => Ok(contents.clone()),
        }
    }

    async fn reload(&self) -> anyhow::Result<usize> {
        let contents = self.read_to_string().await?;
        let normalized = NormalizedLocalConfig::from(self.client.clone(), &contents)?;
        let apis = normalized.apis.len();
        let hosts = self.catalog.replace(normalized.apis);
        info!(apis, hosts, "catalog installed");
        Ok(hosts)
    }

    async fn watch_config_file(self, path: &Path) -> anyhow::Result<()> {
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);

        // 250ms debounce soaks up editor/configmap rewrite bursts
        let mut watcher =
            notify_debouncer_full::new_debouncer(Duration::from_millis(250), None, move |res| {
                futures::executor::block_on(async {
                    let _ = tx.send(res).await;
                });
            })
            .map_err(|e| anyhow::anyhow!("failed to create file watcher: {e}"))?;

        let abspath = absolute(path)?;
        let parent = abspath
            .parent()
            .context("failed to get the parent of the catalog file")?;
        watcher
            .watch(parent, RecursiveMode::NonRecursive)
            .map_err(|e| anyhow::anyhow!("failed to watch catalog file: {e}"))?;

        self.reload().await?;
        info!(path = %abspath.display(), "watching catalog file");

        let manager = self;
        tokio::task::spawn(async move {
            let mut real_config_path = resolve_symlink(&abspath).await;

            while let Some(Ok(events)) = rx.recv().await {
                let current_config_path = resolve_symlink(&abspath).await;
                let touched = events.iter().any(|e| {
                    matches!(e.kind, EventKind::Modify(_) | EventKind::Create(_))
                        && e.paths.iter().any(|p| p == &abspath)
                }) || current_config_path != real_config_path;

                if touched {
                    real_config_path = current_config_path;
                    info!("catalog file changed, reloading");
                    match manager.reload().await {
                        Ok(hosts) => info!(hosts, "catalog reloaded"),
                        Err(e) => {
                            error!(error = %e, "failed to reload catalog, keeping previous generation")
                        }
                    }
                }
            }
            drop(watcher);
        });

        Ok(())
    }
}

/// Final target of a symlink; the path itself when it is a plain file or
/// resolution fails.
async fn resolve_symlink(path: &Path) -> PathBuf {
    match fs::symlink_metadata(path).await {
        Ok(metadata) if metadata.file_type().is_symlink() => fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}
