//! An in-memory record store

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Document, RecordStore, RefreshRecord, StoreError};
use crate::braids::{ContactAddress, Identity};

/// A record store held entirely in memory
///
/// Every operation runs inside a single critical section, so a fetch and
/// invalidate can never interleave with another operation. Nothing survives
/// the process.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    document: Mutex<Document>,
}

impl InMemoryRecordStore {
    /// Constructs a new, empty in-memory record store
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a principal and the address its alerts go to
    pub async fn register_principal(&self, identity: Identity, contact: ContactAddress) {
        self.document
            .lock()
            .await
            .register_principal(identity, contact);
    }

    /// A copy of the live record for `identity`, without consuming it
    pub async fn peek_record(&self, identity: Identity) -> Option<RefreshRecord> {
        self.document.lock().await.record(identity).cloned()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn fetch_and_invalidate(&self, identity: Identity) -> Result<RefreshRecord, StoreError> {
        self.document.lock().await.take_record(identity)
    }

    async fn replace_record(&self, record: RefreshRecord) -> Result<(), StoreError> {
        self.document.lock().await.put_record(record)
    }

    async fn lookup_contact_address(
        &self,
        identity: Identity,
    ) -> Result<ContactAddress, StoreError> {
        self.document.lock().await.contact_address(identity)
    }
}
