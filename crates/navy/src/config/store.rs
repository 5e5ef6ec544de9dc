//! Reading the resolved compose configuration and persisting the compiled one

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ConfigDocument, ConfigError};
use crate::runtime::ComposeClient;

/// Config store backed by `docker-compose config` and a compiled file on disk
#[derive(Debug, Clone)]
pub struct ComposeConfigStore {
    client: Arc<ComposeClient>,
}

impl ComposeConfigStore {
    pub fn new(client: Arc<ComposeClient>) -> Self {
        Self { client }
    }

    pub fn compiled_path(&self) -> &Path {
        self.client.compiled_path()
    }

    /// Resolve the configuration from the user's original compose files.
    ///
    /// Never reads the compiled file, so middleware is never fed its own
    /// earlier output.
    pub async fn get_config(&self) -> Result<ConfigDocument, ConfigError> {
        let opts = self.client.options().original_source().quiet();
        let output = self
            .client
            .exec("config", &[], opts)
            .await
            .map_err(ConfigError::Resolve)?;
        ConfigDocument::from_yaml(&output)
    }

    /// Replace the compiled file with `config`
    pub async fn write_config(&self, config: &ConfigDocument) -> Result<(), ConfigError> {
        let yaml = config.to_yaml()?;
        write_atomic(self.compiled_path(), yaml.into_bytes()).await?;
        log::debug!(
            target: self.client.log_target(),
            "Wrote {}",
            self.compiled_path().display()
        );
        Ok(())
    }

    /// Delete the compiled file if it exists
    pub async fn remove_config(&self) -> Result<(), ConfigError> {
        let path = self.compiled_path();
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConfigError::Remove {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

/// Write `contents` to a temp file next to `path`, then rename it over `path`.
///
/// Readers see either the previous file or the complete new one.
pub async fn write_atomic(path: &Path, contents: Vec<u8>) -> Result<(), ConfigError> {
    let target = path.to_path_buf();
    let write_err = |source: std::io::Error| ConfigError::Write {
        path: target.clone(),
        source,
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    tokio::fs::create_dir_all(&dir).await.map_err(write_err)?;

    let destination = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&destination).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| write_err(std::io::Error::other(e)))?
    .map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_atomic_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev").join("docker-compose.tmp.yml");

        write_atomic(&path, b"services: {}\n".to_vec()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "services: {}\n");
    }

    #[tokio::test]
    async fn test_write_atomic_fully_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compiled.yml");

        write_atomic(&path, b"a much longer first document\n".to_vec())
            .await
            .unwrap();
        write_atomic(&path, b"short\n".to_vec()).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "short\n");

        // No temp files left behind
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_write_atomic_failure_leaves_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compiled.yml");
        write_atomic(&path, b"original\n".to_vec()).await.unwrap();

        // A directory in place of the target makes the rename fail
        let blocked = dir.path().join("blocked");
        std::fs::create_dir_all(blocked.join("inner")).unwrap();
        let err = write_atomic(&blocked, b"new\n".to_vec()).await.unwrap_err();
        assert!(matches!(err, ConfigError::Write { .. }));

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original\n");
    }
}
