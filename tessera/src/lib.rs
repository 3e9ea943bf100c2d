//! Issuance and single-use rotation of address-bound token pairs
//!
//! A client is issued a pair of credentials: a short-lived access token that
//! proves its identity for fifteen minutes, and a refresh token that can be
//! exchanged exactly once for a new pair. Both are bound to the network
//! address of the request that obtained them.
//!
//! Access tokens are self-contained HS512 JWTs. Refresh tokens are HS256 JWTs
//! handed to clients in an opaque base64url form, and each one has a single
//! live [`RefreshRecord`][store::RefreshRecord] holding a salted fingerprint
//! of its signature. There is at most one such record per identity, so
//! revoking everything a principal holds only ever means deleting one
//! record.
//!
//! Rotation consumes the record before checking anything else about it. A
//! refresh token that is replayed, paired with the wrong access token,
//! expired, tampered with, or presented from a different address is refused,
//! and the principal must be issued a fresh pair. A refresh attempted from a
//! foreign address additionally sends an alert through a
//! [`Notifier`][notify::Notifier].
//!
//! ```
//! use std::{net::IpAddr, sync::Arc};
//!
//! use tessera::{
//!     notify::TracingNotifier, store::InMemoryRecordStore, ContactAddress, CredentialCodec,
//!     Identity, RotationError, SigningKey, TokenAuthority,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let store = Arc::new(InMemoryRecordStore::new());
//! let identity = Identity::new_v4();
//! store
//!     .register_principal(identity, ContactAddress::from_static("user@example.com"))
//!     .await;
//!
//! let codec = CredentialCodec::new(SigningKey::new(b"a very secret key".to_vec())?);
//! let authority = TokenAuthority::new(codec, store, Arc::new(TracingNotifier));
//!
//! let address: IpAddr = "1.2.3.4".parse()?;
//! let first = authority.issue(identity, address).await?;
//! let second = authority
//!     .rotate(first.access_token(), first.refresh_token(), address)
//!     .await?;
//!
//! let replayed = authority
//!     .rotate(first.access_token(), first.refresh_token(), address)
//!     .await;
//! assert!(matches!(replayed, Err(RotationError::RefreshNotFound)));
//! # drop(second);
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! The following features are supported by this crate:
//!
//! * `webhook` (default): Provides a [`Notifier`][notify::Notifier] that posts alerts to an
//!   HTTP endpoint using [reqwest].
//! * `rustls-tls`: Uses `rustls` for the webhook's TLS connections.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod authority;
mod braids;
pub mod clock;
mod codec;
pub mod error;
pub mod fingerprint;
pub mod hmac;
mod issuance;
pub mod jwt;
pub mod notify;
mod rotation;
pub mod store;


pub use authority::{TokenAuthority, DEFAULT_NOTIFY_TIMEOUT};
pub use braids::*;
pub use codec::{AccessClaims, AccessStatus, CredentialCodec, LifetimeConfig, RefreshClaims};
pub use fingerprint::Fingerprinter;
pub use hmac::{SigningAlgorithm, SigningKey};
pub use issuance::{IssuanceError, TokenPair};
pub use rotation::RotationError;
