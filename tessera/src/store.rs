//! Refresh record storage
//!
//! A store holds at most one live [`RefreshRecord`] per identity. The two
//! mutating operations are each atomic: reading a record for rotation
//! removes it in the same step, and writing a record replaces any prior one.
//! All consistency between concurrent rotations rests on these guarantees.

use std::{collections::BTreeMap, error, net::IpAddr, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    braids::{ContactAddress, Fingerprint, FingerprintRef, Identity, InstanceId, InstanceIdRef},
    clock::UnixTime,
};

pub mod file;
pub mod in_memory;

pub use file::FileRecordStore;
pub use in_memory::InMemoryRecordStore;

/// The stored counterpart of an issued refresh token
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRecord {
    identity: Identity,
    fingerprint: Fingerprint,
    source_address: IpAddr,
    jti: InstanceId,
    refresh_jti: InstanceId,
    expires_at: UnixTime,
}

impl RefreshRecord {
    /// Constructs a new refresh record
    ///
    /// `jti` is the identifier of the access token issued alongside the
    /// refresh token, which ties the two together. `refresh_jti` is the
    /// identifier of the refresh token itself.
    pub fn new(
        identity: Identity,
        fingerprint: Fingerprint,
        source_address: IpAddr,
        jti: InstanceId,
        refresh_jti: InstanceId,
        expires_at: UnixTime,
    ) -> Self {
        Self {
            identity,
            fingerprint,
            source_address,
            jti,
            refresh_jti,
            expires_at,
        }
    }

    /// The principal this record belongs to
    #[inline]
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// The fingerprint of the refresh token's signature
    #[inline]
    pub fn fingerprint(&self) -> &FingerprintRef {
        &self.fingerprint
    }

    /// The address the pair was issued to
    #[inline]
    pub fn source_address(&self) -> IpAddr {
        self.source_address
    }

    /// The `jti` of the paired access token
    #[inline]
    pub fn jti(&self) -> &InstanceIdRef {
        &self.jti
    }

    /// The `jti` of the refresh token this record was created for
    #[inline]
    pub fn refresh_jti(&self) -> &InstanceIdRef {
        &self.refresh_jti
    }

    /// When the record stops being redeemable
    #[inline]
    pub fn expires_at(&self) -> UnixTime {
        self.expires_at
    }
}

/// An error returned by a record store
#[derive(Debug, Error)]
pub enum StoreError {
    /// No live record exists for the identity
    #[error("no refresh record found")]
    NotFound,

    /// The identity is not a registered principal
    #[error("unknown identity")]
    UnknownIdentity,

    /// The backing storage failed
    #[error("record store backend failure")]
    Backend(#[source] Box<dyn error::Error + Send + Sync + 'static>),
}

impl StoreError {
    /// Wraps a backend failure
    pub fn backend(source: impl Into<Box<dyn error::Error + Send + Sync + 'static>>) -> Self {
        Self::Backend(source.into())
    }
}

/// Durable storage for refresh records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Removes and returns the live record for `identity`
    ///
    /// The record is gone once this returns `Ok`, whatever the caller later
    /// decides about it. A `Backend` error leaves the record's state
    /// unknown; durable stores may still hold it.
    async fn fetch_and_invalidate(&self, identity: Identity) -> Result<RefreshRecord, StoreError>;

    /// Stores `record`, displacing any prior record for the same identity
    async fn replace_record(&self, record: RefreshRecord) -> Result<(), StoreError>;

    /// The contact address registered for `identity`
    async fn lookup_contact_address(&self, identity: Identity)
        -> Result<ContactAddress, StoreError>;
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for Box<T> {
    async fn fetch_and_invalidate(&self, identity: Identity) -> Result<RefreshRecord, StoreError> {
        T::fetch_and_invalidate(self, identity).await
    }

    async fn replace_record(&self, record: RefreshRecord) -> Result<(), StoreError> {
        T::replace_record(self, record).await
    }

    async fn lookup_contact_address(
        &self,
        identity: Identity,
    ) -> Result<ContactAddress, StoreError> {
        T::lookup_contact_address(self, identity).await
    }
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    async fn fetch_and_invalidate(&self, identity: Identity) -> Result<RefreshRecord, StoreError> {
        T::fetch_and_invalidate(self, identity).await
    }

    async fn replace_record(&self, record: RefreshRecord) -> Result<(), StoreError> {
        T::replace_record(self, record).await
    }

    async fn lookup_contact_address(
        &self,
        identity: Identity,
    ) -> Result<ContactAddress, StoreError> {
        T::lookup_contact_address(self, identity).await
    }
}

/// Principals and their live records, as held by the reference stores
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Document {
    #[serde(default)]
    principals: BTreeMap<Identity, ContactAddress>,
    #[serde(default)]
    records: BTreeMap<Identity, RefreshRecord>,
}

impl Document {
    pub(crate) fn register_principal(&mut self, identity: Identity, contact: ContactAddress) {
        self.principals.insert(identity, contact);
    }

    pub(crate) fn take_record(&mut self, identity: Identity) -> Result<RefreshRecord, StoreError> {
        self.records.remove(&identity).ok_or(StoreError::NotFound)
    }

    pub(crate) fn put_record(&mut self, record: RefreshRecord) -> Result<(), StoreError> {
        if !self.principals.contains_key(&record.identity) {
            return Err(StoreError::UnknownIdentity);
        }

        self.records.insert(record.identity, record);
        Ok(())
    }

    pub(crate) fn contact_address(&self, identity: Identity) -> Result<ContactAddress, StoreError> {
        self.principals
            .get(&identity)
            .cloned()
            .ok_or(StoreError::UnknownIdentity)
    }

    pub(crate) fn record(&self, identity: Identity) -> Option<&RefreshRecord> {
        self.records.get(&identity)
    }
}
