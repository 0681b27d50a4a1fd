//! Source discovery from the plugin directory.
//!
//! Each `*.toml` file in the directory is a [`SourceManifest`]. A manifest
//! that fails to load is logged and skipped; other sources still load.

use std::path::Path;
use std::sync::Arc;

use reqwest::Client;

use crate::error::{AppError, Result};
use crate::source::{HttpSource, SourceManifest, SourceRegistry};

/// Load one manifest file.
pub fn load_manifest(path: &Path) -> Result<SourceManifest> {
    let content = std::fs::read_to_string(path)?;
    let manifest: SourceManifest = toml::from_str(&content)?;
    manifest.validate()?;
    Ok(manifest)
}

/// Build a registry from every manifest under `plugin_dir`.
///
/// A missing directory yields an empty registry. An unreadable directory is
/// a configuration error.
pub fn discover(plugin_dir: &Path, client: &Client) -> Result<SourceRegistry> {
    let mut registry = SourceRegistry::new();

    if !plugin_dir.exists() {
        log::warn!(
            "Plugin directory {} does not exist, no sources loaded",
            plugin_dir.display()
        );
        return Ok(registry);
    }

    let entries = std::fs::read_dir(plugin_dir).map_err(|e| {
        AppError::config(format!(
            "cannot read plugin directory {}: {}",
            plugin_dir.display(),
            e
        ))
    })?;

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    for path in paths {
        match load_manifest(&path) {
            Ok(manifest) => {
                log::info!("Loaded source {} from {}", manifest.id, path.display());
                registry.insert(Arc::new(HttpSource::new(manifest, client.clone())));
            }
            Err(e) => {
                log::warn!("Skipping source manifest {}: {}", path.display(), e);
            }
        }
    }

    log::info!("{} sources available: {:?}", registry.len(), registry.ids());
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const VALID: &str = r#"
id = "demo"
chapters_url = "https://api.example.com/manga/{manga}/chapters"
pages_url = "https://api.example.com/manga/{manga}/chapters/{chapter}/pages"
"#;

    #[test]
    fn test_discover_skips_bad_manifests() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("demo.toml"), VALID).unwrap();
        std::fs::write(tmp.path().join("broken.toml"), "id = ").unwrap();
        std::fs::write(tmp.path().join("readme.txt"), "not a manifest").unwrap();

        let registry = discover(tmp.path(), &Client::new()).unwrap();
        assert_eq!(registry.ids(), vec!["demo"]);
    }

    #[test]
    fn test_discover_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let registry = discover(&tmp.path().join("absent"), &Client::new()).unwrap();
        assert!(registry.is_empty());
    }
}
