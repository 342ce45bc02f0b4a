use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{Secret, SecretStore, StageAck};
use crate::errors::StagingError;

#[cfg(unix)]
const OWNER_READ_WRITE: u32 = 0o600;

/// Stores the staged secret in one file with owner-only permissions.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "secret".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_failed(&self, source: std::io::Error) -> StagingError {
        StagingError::WriteFailed {
            path: self.path.clone(),
            source,
        }
    }

    async fn write_restricted(&self, tmp: &Path, value: &str) -> std::io::Result<()> {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(OWNER_READ_WRITE);

        let mut file = options.open(tmp).await?;
        file.write_all(value.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        // A pre-existing temp file keeps its old mode; force it.
        set_owner_only(tmp).await?;
        tokio::fs::rename(tmp, &self.path).await?;
        set_owner_only(&self.path).await
    }
}

#[cfg(unix)]
async fn set_owner_only(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(OWNER_READ_WRITE)).await
}

#[cfg(not(unix))]
async fn set_owner_only(path: &Path) -> std::io::Result<()> {
    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_readonly(false);
    tokio::fs::set_permissions(path, perms).await
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn stage(&self, raw: &str) -> Result<StageAck, StagingError> {
        let secret = Secret::parse(raw)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.write_failed(e))?;
        }

        let tmp = self.temp_path();
        if let Err(e) = self.write_restricted(&tmp, secret.expose()).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(self.write_failed(e));
        }

        tracing::info!(path = %self.path.display(), secret = %secret, "Staged credential");
        Ok(StageAck {
            masked: secret.masked(),
            location: self.location(),
        })
    }

    async fn consume(&self) -> Result<Secret, StagingError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Secret::parse(&content).map_err(|_| StagingError::NotStaged),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StagingError::NotStaged),
            Err(source) => Err(StagingError::ReadFailed {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn clear(&self) -> Result<(), StagingError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Removed staged credential");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StagingError::ClearFailed {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_stage_then_consume_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("github_pat"));

        let ack = store.stage("ghp_abc123").await.unwrap();
        assert_eq!(ack.masked, "******c123");

        let secret = store.consume().await.unwrap();
        assert_eq!(secret.expose(), "ghp_abc123");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stage_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("github_pat");
        let store = FileSecretStore::new(&path);
        store.stage("ghp_abc123").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stage_tightens_permissions_of_existing_file() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("github_pat");
        std::fs::write(&path, "old").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        FileSecretStore::new(&path).stage("ghp_new").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_stage_overwrites_previous_value() {
        let dir = tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("github_pat"));
        store.stage("ghp_first_value").await.unwrap();
        store.stage("ghp_second").await.unwrap();
        assert_eq!(store.consume().await.unwrap().expose(), "ghp_second");
        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "ghp_second"
        );
    }

    #[tokio::test]
    async fn test_stage_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("instance").join("nested").join("github_pat");
        let store = FileSecretStore::new(&path);
        store.stage("ghp_abc123").await.unwrap();
        assert!(path.exists());
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_stage_empty_is_rejected_and_keeps_previous() {
        let dir = tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("github_pat"));
        store.stage("ghp_keep").await.unwrap();

        let err = store.stage("").await.unwrap_err();
        assert!(matches!(err, StagingError::Empty));
        assert_eq!(store.consume().await.unwrap().expose(), "ghp_keep");
    }

    #[tokio::test]
    async fn test_stage_keeps_surrounding_whitespace() {
        let dir = tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("github_pat"));

        store.stage(" ghp_abc123 ").await.unwrap();
        assert_eq!(store.consume().await.unwrap().expose(), " ghp_abc123 ");

        store.stage("   ").await.unwrap();
        assert_eq!(store.consume().await.unwrap().expose(), "   ");
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "   ");
    }

    #[tokio::test]
    async fn test_stage_into_unwritable_location_fails() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let store = FileSecretStore::new(blocker.join("github_pat"));

        let err = store.stage("ghp_abc123").await.unwrap_err();
        assert!(matches!(err, StagingError::WriteFailed { .. }));
    }

    #[tokio::test]
    async fn test_consume_without_stage_is_not_staged() {
        let dir = tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("github_pat"));
        assert!(matches!(
            store.consume().await,
            Err(StagingError::NotStaged)
        ));
    }

    #[tokio::test]
    async fn test_consume_empty_file_is_not_staged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("github_pat");
        std::fs::write(&path, "").unwrap();
        let store = FileSecretStore::new(&path);
        assert!(matches!(
            store.consume().await,
            Err(StagingError::NotStaged)
        ));
    }

    #[tokio::test]
    async fn test_consume_does_not_delete() {
        let dir = tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("github_pat"));
        store.stage("ghp_abc123").await.unwrap();
        store.consume().await.unwrap();
        store.consume().await.unwrap();
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_clear_removes_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("github_pat"));
        store.stage("ghp_abc123").await.unwrap();

        store.clear().await.unwrap();
        assert!(!store.path().exists());
        assert!(matches!(
            store.consume().await,
            Err(StagingError::NotStaged)
        ));

        store.clear().await.unwrap();
    }
}
