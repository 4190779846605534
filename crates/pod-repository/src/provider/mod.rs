//! Sources of repository units

use std::future::Future;

use camino::Utf8Path;
use tracing::{debug, info};

use pod_core::error::PodError;
use pod_core::types::Unit;

use crate::api::RepositoryIndex;
use crate::RepositoryResult;

/// Source of the units of a repository snapshot
pub trait RepositoryProvider: Send + Sync {
    /// All units of the snapshot at `location`
    fn list_units(&self, location: &Utf8Path) -> impl Future<Output = RepositoryResult<Vec<Unit>>> + Send;
}

/// Snapshots stored as JSON index files on the local file system
#[derive(Debug, Clone, Default)]
pub struct FileRepository;

impl FileRepository {
    pub fn new() -> Self {
        Self
    }

    /// Read and parse an index file without converting its records
    pub async fn read_index(&self, location: &Utf8Path) -> RepositoryResult<RepositoryIndex> {
        let content = tokio::fs::read_to_string(location)
            .await
            .map_err(|e| PodError::io(format!("Failed to read repository {}", location), e))?;
        RepositoryIndex::from_json(&content, location.as_str())
    }
}

impl RepositoryProvider for FileRepository {
    async fn list_units(&self, location: &Utf8Path) -> RepositoryResult<Vec<Unit>> {
        debug!("Reading repository index {}", location);
        let index = self.read_index(location).await?;
        let units = index.to_units()?;
        info!(
            "Loaded {} unit(s) from {}",
            units.len(),
            index.name.as_deref().unwrap_or(location.as_str())
        );
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use pod_core::types::Version;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_list_units_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().join("index.json")).unwrap();
        tokio::fs::write(
            &path,
            r#"{ "units": [{ "id": "lib", "version": "2.1.0" }, { "id": "util", "version": "1.0.0" }] }"#,
        )
        .await
        .unwrap();

        let units = FileRepository::new().list_units(&path).await.unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].id(), "lib");
        assert_eq!(units[0].version(), &Version::new(2, 1, 0));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().join("absent.json")).unwrap();

        let err = FileRepository::new().list_units(&path).await.unwrap_err();
        assert!(matches!(err, PodError::Io { .. }));
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn test_read_index_keeps_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().join("index.json")).unwrap();
        std::fs::write(&path, r#"{ "name": "platform", "units": [] }"#).unwrap();

        let index = tokio_test::block_on(FileRepository::new().read_index(&path)).unwrap();
        assert_eq!(index.name.as_deref(), Some("platform"));
        assert!(index.units.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_reports_location() {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().join("index.json")).unwrap();
        tokio::fs::write(&path, "{ \"units\": [ }").await.unwrap();

        let err = FileRepository::new().list_units(&path).await.unwrap_err();
        assert!(matches!(err, PodError::DescriptorSyntax { ref location, line: 1, .. } if location == path.as_str()));
    }
}
