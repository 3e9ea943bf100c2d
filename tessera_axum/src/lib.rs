//! An HTTP surface for a `tessera` token authority
//!
//! [`router`] exposes two routes:
//!
//! * `POST /tokenapi/v1/auth/token?client_id=<uuid>` issues a fresh pair for
//!   the given identity, bound to the caller's address.
//! * `POST /tokenapi/v1/auth/refresh` rotates the pair given in a JSON body of
//!   the form `{ "access_token": …, "refresh_token": … }`.
//!
//! Both respond with `{ "access_token": …, "refresh_token": … }` on success
//! and `{ "status": "Error", "error": … }` otherwise.
//!
//! The caller's address is taken from `X-Real-IP`, then `X-Forwarded-For`,
//! then the connection itself. For the last to work, serve the router with
//! [`into_make_service_with_connect_info`][axum::Router::into_make_service_with_connect_info].

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

use std::sync::Arc;

use axum::{routing::post, Router};
use tessera::{clock::Clock, notify::Notifier, store::RecordStore, TokenAuthority};

pub mod address;
pub mod config;
pub mod error;
mod handlers;

pub use address::SourceAddress;
pub use error::ApiError;

/// The path tokens are issued on
pub const ISSUE_PATH: &str = "/tokenapi/v1/auth/token";

/// The path token pairs are rotated on
pub const REFRESH_PATH: &str = "/tokenapi/v1/auth/refresh";

/// Builds a router serving issuance and rotation for `authority`
pub fn router<S, N, C>(authority: Arc<TokenAuthority<S, N, C>>) -> Router
where
    S: RecordStore + 'static,
    N: Notifier + 'static,
    C: Clock + 'static,
{
    Router::new()
        .route(ISSUE_PATH, post(handlers::issue_tokens::<S, N, C>))
        .route(REFRESH_PATH, post(handlers::refresh_tokens::<S, N, C>))
        .with_state(authority)
}
