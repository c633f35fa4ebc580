//! Spec file IO.

use crate::error::LoadError;
use crate::model::GraphSpec;
use std::fs;
use std::path::Path;

impl GraphSpec {
    /// Parses a spec from JSON text.
    pub fn from_json(json: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Pretty JSON in canonical order.
    pub fn to_json_pretty(&self) -> Result<String, LoadError> {
        Ok(serde_json::to_string_pretty(&crate::canonicalize(self))?)
    }

    /// Loads a spec from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Saves the canonical form as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        let path = path.as_ref();
        let write_err = |source| LoadError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, self.to_json_pretty()?).map_err(write_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeDef;
    use tempfile::TempDir;

    #[test]
    fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("graph.json");
        let spec = GraphSpec::default()
            .with_node(NodeDef::new("z", "gain"))
            .with_node(NodeDef::new("a", "noise"));
        spec.save(&path).unwrap();

        let loaded = GraphSpec::load(&path).unwrap();
        assert_eq!(loaded, crate::canonicalize(&spec));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = GraphSpec::load("/nonexistent/graph.json").unwrap_err();
        assert!(matches!(err, LoadError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/graph.json"));
    }
}
