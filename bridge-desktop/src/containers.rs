//! Directory-backed ubiquity containers

use async_trait::async_trait;
use bridge_traits::{error::Result, ubiquity::UbiquityContainers};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Resolves container identifiers to directories on the local disk
///
/// A container is available when its directory exists. Removing the
/// directory behaves like a signed-out user: the next resolution fails.
///
/// - Explicit mappings registered with [`with_container`](Self::with_container) win
/// - Otherwise the container lives at `<base_dir>/<container id>`
pub struct DirectoryContainers {
    base_dir: PathBuf,
    overrides: HashMap<String, PathBuf>,
}

impl DirectoryContainers {
    /// Containers under the platform data directory
    pub fn new() -> Self {
        let base_dir = dirs::data_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".local")
                    .join("share")
            })
            .join("cloudkit-db")
            .join("Mobile Documents");

        Self::with_base_dir(base_dir)
    }

    /// Containers under a custom directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            overrides: HashMap::new(),
        }
    }

    /// Map one container identifier to a specific directory
    pub fn with_container(mut self, container_id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.overrides.insert(container_id.into(), root.into());
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn candidate(&self, container_id: &str) -> Option<PathBuf> {
        if let Some(root) = self.overrides.get(container_id) {
            return Some(root.clone());
        }

        let valid = !container_id.is_empty()
            && container_id != "."
            && container_id != ".."
            && !container_id.contains(['/', '\\']);
        valid.then(|| self.base_dir.join(container_id))
    }
}

impl Default for DirectoryContainers {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UbiquityContainers for DirectoryContainers {
    async fn container_url(&self, container_id: &str) -> Result<Option<PathBuf>> {
        let Some(root) = self.candidate(container_id) else {
            debug!(container_id, "Rejected container identifier");
            return Ok(None);
        };

        match fs::metadata(&root).await {
            Ok(metadata) if metadata.is_dir() => Ok(Some(root)),
            _ => {
                debug!(container_id, "Container directory unavailable");
                Ok(None)
            }
        }
    }
}
