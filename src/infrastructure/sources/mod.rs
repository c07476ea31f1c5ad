//! Declarative location and map definitions on disk.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::domain::error::DomainError;
use crate::domain::model::{Location, MapDefinition};
use crate::domain::repository::{LocationSource, MapSource, Result};

/// Loads every `*.yaml`, `*.yml` and `*.json` file of a directory. A file
/// may hold one location or a list of them.
pub struct YamlLocationSource {
    dir: PathBuf,
}

impl YamlLocationSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Location>),
    One(Box<Location>),
}

impl LocationSource for YamlLocationSource {
    fn load(&self) -> Result<Vec<Location>> {
        let mut locations = Vec::new();

        if !self.dir.exists() {
            tracing::warn!("Location directory not found: {:?}", self.dir);
            return Ok(locations);
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)
            .map_err(|e| DomainError::Config(format!("{:?}: {}", self.dir, e)))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        // Stable order so link preference does not depend on the filesystem
        files.sort();

        for path in files {
            let Some(format) = Format::of(&path) else {
                continue;
            };
            match load_file::<OneOrMany>(&path, format) {
                Ok(OneOrMany::Many(list)) => {
                    tracing::debug!("Loaded {} locations from {:?}", list.len(), path);
                    locations.extend(list);
                }
                Ok(OneOrMany::One(location)) => {
                    tracing::debug!("Loaded location {} from {:?}", location.id, path);
                    locations.push(*location);
                }
                Err(e) => {
                    tracing::error!("Failed to load locations from {:?}: {}", path, e);
                }
            }
        }

        tracing::info!("Loaded {} locations from {:?}", locations.len(), self.dir);
        Ok(locations)
    }
}

/// Loads `<dir>/<name>.yaml` (or `.yml`/`.json`) map definitions.
pub struct YamlMapSource {
    dir: PathBuf,
}

impl YamlMapSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory reference images are resolved against
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl MapSource for YamlMapSource {
    fn load_map(&self, name: &str) -> Result<MapDefinition> {
        for ext in ["yaml", "yml", "json"] {
            let path = self.dir.join(format!("{}.{}", name, ext));
            if let Some(format) = path.is_file().then(|| Format::of(&path)).flatten() {
                let map = load_file::<MapDefinition>(&path, format)
                    .map_err(|e| DomainError::Config(format!("{:?}: {}", path, e)))?;
                tracing::debug!(map = %map.name, nodes = map.nodes.len(), "Loaded map");
                return Ok(map);
            }
        }
        Err(DomainError::Config(format!("map {} not found in {:?}", name, self.dir)))
    }
}

#[derive(Clone, Copy)]
enum Format {
    Yaml,
    Json,
}

impl Format {
    fn of(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Some(Self::Yaml),
            Some("json") => Some(Self::Json),
            _ => None,
        }
    }
}

fn load_file<T: DeserializeOwned>(path: &Path, format: Format) -> anyhow::Result<T> {
    let content = fs::read_to_string(path)?;
    let value = match format {
        Format::Yaml => serde_yaml::from_str(&content)?,
        Format::Json => serde_json::from_str(&content)?,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::temp_dir;

    #[test]
    fn test_load_mixed_formats() {
        let dir = temp_dir("locations");
        fs::write(
            dir.join("a.yaml"),
            concat!(
                "- id: home\n",
                "  links:\n",
                "    - dest: shop\n",
                "      kind: rect\n",
                "      rect: { x: 1, y: 2, width: 3, height: 4 }\n",
                "- id: shop\n",
            ),
        )
        .unwrap();
        fs::write(dir.join("b.json"), r#"{"id": "settings", "mode": "or"}"#).unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();
        fs::write(dir.join("c.yml"), "id: [broken").unwrap();

        let locations = YamlLocationSource::new(&dir).load().unwrap();
        let ids: Vec<_> = locations.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["home", "shop", "settings"]);
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let source = YamlLocationSource::new("/nonexistent/wayfarer");
        assert!(source.load().unwrap().is_empty());
    }

    #[test]
    fn test_load_map() {
        let dir = temp_dir("maps");
        fs::write(
            dir.join("sector.yaml"),
            concat!(
                "name: sector\n",
                "reference_image: sector.png\n",
                "nodes:\n",
                "  - { name: n1, x: 10, y: 20, width: 30, height: 30, type: heliport }\n",
            ),
        )
        .unwrap();
        let source = YamlMapSource::new(&dir);
        let map = source.load_map("sector").unwrap();
        assert_eq!(map.nodes.len(), 1);
        assert!(map.node("n1").is_some());
        assert!(matches!(source.load_map("other"), Err(DomainError::Config(_))));
        fs::remove_dir_all(dir).ok();
    }
}
