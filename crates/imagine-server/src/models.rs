use std::path::{Path, PathBuf};

use crate::error::{ApiError, ApiResult};

const MODEL_EXTENSIONS: [&str; 2] = ["safetensors", "ckpt"];

/// Read-only view of the installed model files.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    dir: PathBuf,
}

impl ModelRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Model names (file stems) sorted ascending. Creates the models
    /// directory on first use so an empty install lists cleanly.
    pub fn list(&self) -> ApiResult<Vec<String>> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| ApiError::Internal(anyhow::Error::new(e).context("creating models dir")))?;

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .map_err(|e| ApiError::Internal(anyhow::Error::new(e).context("reading models dir")))?
        {
            let path = entry
                .map_err(|e| ApiError::Internal(anyhow::Error::new(e)))?
                .path();
            let has_model_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| MODEL_EXTENSIONS.contains(&e));
            if has_model_ext {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Resolve a model name to its file path, preferring `.safetensors`.
    pub fn resolve(&self, name: &str) -> ApiResult<PathBuf> {
        for ext in MODEL_EXTENSIONS {
            let candidate = self.dir.join(format!("{name}.{ext}"));
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(ApiError::Validation(format!("Unknown model '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::new(dir.path());
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("zeta.safetensors"), b"").unwrap();
        std::fs::write(dir.path().join("alpha.ckpt"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let registry = ModelRegistry::new(dir.path());
        assert_eq!(registry.list().unwrap(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_resolve_prefers_safetensors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m.safetensors"), b"").unwrap();
        std::fs::write(dir.path().join("m.ckpt"), b"").unwrap();

        let registry = ModelRegistry::new(dir.path());
        let path = registry.resolve("m").unwrap();
        assert_eq!(path.extension().unwrap(), "safetensors");
    }

    #[test]
    fn test_resolve_unknown_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::new(dir.path());
        assert!(matches!(
            registry.resolve("missing"),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_list_creates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("models");
        let registry = ModelRegistry::new(&nested);
        assert!(registry.list().unwrap().is_empty());
        assert!(nested.is_dir());
    }
}
