//! A record store backed by a local JSON file

use std::{
    error, io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{fs::OpenOptions, sync::Mutex};

use super::{Document, RecordStore, RefreshRecord, StoreError};
use crate::braids::{ContactAddress, Identity};

/// A record store that keeps its principals and records in a JSON document
///
/// Every operation loads the document, applies its change and writes the
/// result back while holding a lock, so operations issued through the same
/// store never interleave. Writes go to a sibling temporary file which is
/// then renamed over the original. A missing file reads as an empty store.
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileRecordStore {
    /// Constructs a new file record store at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// The location of the backing document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Registers a principal and the address its alerts go to
    ///
    /// # Errors
    ///
    /// If the document cannot be read or written.
    pub async fn register_principal(
        &self,
        identity: Identity,
        contact: ContactAddress,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await.map_err(StoreError::backend)?;
        document.register_principal(identity, contact);
        self.persist(&document).await.map_err(StoreError::backend)
    }

    async fn load(&self) -> Result<Document, io::Error> {
        use tokio::io::AsyncReadExt;

        let mut file = match OpenOptions::new().read(true).open(&self.path).await {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Document::default()),
            Err(err) => return Err(err),
        };

        let mut data = String::new();
        file.read_to_string(&mut data).await?;
        let document = serde_json::from_str(&data)?;
        Ok(document)
    }

    async fn persist(&self, document: &Document) -> Result<(), io::Error> {
        use tokio::io::AsyncWriteExt;

        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        let mut file_opts = OpenOptions::new();

        file_opts.create(true).truncate(true).write(true);

        #[cfg(unix)]
        file_opts.mode(0o600);

        let mut file = file_opts.open(&temp).await?;
        let data = serde_json::to_string_pretty(document)?;
        file.write_all(data.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp, &self.path).await?;
        tracing::trace!(path = %self.path.display(), "persisted record store");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    /// Removes and returns the live record for `identity`
    ///
    /// The removal is written back before the record is returned, with one
    /// retry. If both writes fail, `Backend` is returned and the record is
    /// left in the document on disk.
    async fn fetch_and_invalidate(&self, identity: Identity) -> Result<RefreshRecord, StoreError> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await.map_err(StoreError::backend)?;
        let record = document.take_record(identity)?;

        if let Err(err) = self.persist(&document).await {
            tracing::warn!(
                error = (&err as &dyn error::Error),
                path = %self.path.display(),
                "unable to persist record removal, retrying"
            );
            if let Err(err) = self.persist(&document).await {
                tracing::error!(
                    error = (&err as &dyn error::Error),
                    path = %self.path.display(),
                    %identity,
                    "record removal was not persisted, record remains on disk"
                );
                return Err(StoreError::backend(err));
            }
        }

        Ok(record)
    }

    async fn replace_record(&self, record: RefreshRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await.map_err(StoreError::backend)?;
        document.put_record(record)?;
        self.persist(&document).await.map_err(StoreError::backend)
    }

    async fn lookup_contact_address(
        &self,
        identity: Identity,
    ) -> Result<ContactAddress, StoreError> {
        let _guard = self.lock.lock().await;
        let document = self.load().await.map_err(StoreError::backend)?;
        document.contact_address(identity)
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use color_eyre::Result;
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        braids::{Fingerprint, InstanceId},
        clock::UnixTime,
    };

    fn record(identity: Identity) -> RefreshRecord {
        RefreshRecord::new(
            identity,
            Fingerprint::from_static("$pbkdf2-sha256$i=1$AA$AA"),
            IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)),
            InstanceId::from_static("jti"),
            InstanceId::from_static("refresh"),
            UnixTime(100),
        )
    }

    #[tokio::test]
    async fn missing_file_is_an_empty_store() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileRecordStore::new(dir.path().join("store.json"));

        assert!(matches!(
            store.fetch_and_invalidate(Identity::new_v4()).await,
            Err(StoreError::NotFound)
        ));
        assert!(!store.path().exists());
        Ok(())
    }

    #[tokio::test]
    async fn records_survive_a_new_instance() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("store.json");
        let identity = Identity::new_v4();

        let first = FileRecordStore::new(&path);
        first
            .register_principal(identity, ContactAddress::from_static("a@example.com"))
            .await?;
        first.replace_record(record(identity)).await?;
        drop(first);

        let second = FileRecordStore::new(&path);
        assert_eq!(
            second.lookup_contact_address(identity).await?,
            ContactAddress::from_static("a@example.com")
        );
        assert_eq!(
            second.fetch_and_invalidate(identity).await?,
            record(identity)
        );

        let third = FileRecordStore::new(&path);
        assert!(matches!(
            third.fetch_and_invalidate(identity).await,
            Err(StoreError::NotFound)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_principals_are_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileRecordStore::new(dir.path().join("store.json"));

        assert!(matches!(
            store.replace_record(record(Identity::new_v4())).await,
            Err(StoreError::UnknownIdentity)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_document_is_a_backend_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("store.json");
        std::fs::write(&path, "not json")?;

        let store = FileRecordStore::new(&path);
        assert!(matches!(
            store.fetch_and_invalidate(Identity::new_v4()).await,
            Err(StoreError::Backend(_))
        ));
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn unpersisted_removal_is_a_backend_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("store.json");
        let identity = Identity::new_v4();

        let store = FileRecordStore::new(&path);
        store
            .register_principal(identity, ContactAddress::from_static("a@example.com"))
            .await?;
        store.replace_record(record(identity)).await?;

        let blocker = dir.path().join("store.json.tmp");
        std::fs::create_dir(&blocker)?;

        assert!(matches!(
            store.fetch_and_invalidate(identity).await,
            Err(StoreError::Backend(_))
        ));
        assert!(logs_contain("unable to persist record removal, retrying"));
        assert!(logs_contain("record removal was not persisted"));

        std::fs::remove_dir(&blocker)?;
        assert_eq!(store.fetch_and_invalidate(identity).await?, record(identity));
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn document_is_private_to_owner() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("store.json");
        let store = FileRecordStore::new(&path);
        store
            .register_principal(Identity::new_v4(), ContactAddress::from_static("a@example.com"))
            .await?;

        let mode = std::fs::metadata(&path)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        Ok(())
    }
}
