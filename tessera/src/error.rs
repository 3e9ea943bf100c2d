//! Common errors

#![allow(missing_copy_implementations)]

use std::error::Error as StdError;

use thiserror::Error;

use crate::hmac::SigningAlgorithm;

/// The token was signed with an algorithm other than the one expected
/// for its credential type
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("token algorithm '{alg}' is not accepted here")]
pub struct IncompatibleAlgorithm {
    alg: SigningAlgorithm,
}

impl IncompatibleAlgorithm {
    /// The algorithm named by the rejected token
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.alg
    }
}

#[inline]
pub(crate) fn incompatible_algorithm(alg: SigningAlgorithm) -> IncompatibleAlgorithm {
    IncompatibleAlgorithm { alg }
}

/// The JWT is malformed and cannot be parsed out into header, payload, and signature sections
#[derive(Clone, Copy, Debug, Error)]
#[error("malformed JWT")]
pub struct MalformedJwt {
    _p: (),
}

pub(crate) fn malformed_jwt() -> MalformedJwt {
    MalformedJwt { _p: () }
}

/// The JWT header section is malformed
#[derive(Debug, Error)]
#[error("malformed JWT header")]
pub struct MalformedJwtHeader {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn malformed_jwt_header(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> MalformedJwtHeader {
    MalformedJwtHeader {
        source: source.into(),
    }
}

/// The JWT payload section is malformed
#[derive(Debug, Error)]
#[error("malformed JWT payload")]
pub struct MalformedJwtPayload {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn malformed_jwt_payload(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> MalformedJwtPayload {
    MalformedJwtPayload {
        source: source.into(),
    }
}

/// The JWT signature section is malformed
#[derive(Debug, Error)]
#[error("malformed JWT signature")]
pub struct MalformedJwtSignature {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn malformed_jwt_signature(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> MalformedJwtSignature {
    MalformedJwtSignature {
        source: source.into(),
    }
}

/// The signature did not match
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("signature mismatch")]
pub struct SignatureMismatch {
    _p: (),
}

pub(crate) const fn signature_mismatch() -> SignatureMismatch {
    SignatureMismatch { _p: () }
}

/// A signing key must contain at least one byte
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("signing key is empty")]
pub struct EmptySigningKey {
    _p: (),
}

pub(crate) const fn empty_signing_key() -> EmptySigningKey {
    EmptySigningKey { _p: () }
}

/// Unexpected error (possibly a bug)
#[derive(Debug, Error)]
#[error("unexpected error")]
pub struct Unexpected {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn unexpected(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> Unexpected {
    Unexpected {
        source: source.into(),
    }
}

/// An error occurring while verifying a JWT
#[derive(Debug, Error)]
pub enum JwtVerifyError {
    /// The JWT is malformed, without a discernible header, payload, and signature
    #[error(transparent)]
    MalformedToken(#[from] MalformedJwt),

    /// The JWT header is malformed
    #[error(transparent)]
    MalformedTokenHeader(#[from] MalformedJwtHeader),

    /// The JWT payload is malformed
    #[error(transparent)]
    MalformedTokenPayload(#[from] MalformedJwtPayload),

    /// The JWT signature is malformed
    #[error(transparent)]
    MalformedTokenSignature(#[from] MalformedJwtSignature),

    /// The JWT names an algorithm that is not accepted
    #[error(transparent)]
    IncompatibleAlgorithm(#[from] IncompatibleAlgorithm),

    /// The signature is invalid
    #[error(transparent)]
    SignatureMismatch(#[from] SignatureMismatch),
}

impl JwtVerifyError {
    /// Whether the error is due to an unaccepted algorithm
    #[must_use]
    pub fn is_incompatible_alg(&self) -> bool {
        matches!(self, Self::IncompatibleAlgorithm(_))
    }

    /// Whether the error is due to a signature mismatch
    #[must_use]
    pub fn is_signature_mismatch(&self) -> bool {
        matches!(self, Self::SignatureMismatch(_))
    }
}

/// An error occurring while producing a JWT
#[derive(Debug, Error)]
pub enum JwtSigningError {
    /// The JWT header could not be serialized
    #[error(transparent)]
    MalformedJwtHeader(#[from] MalformedJwtHeader),

    /// The JWT payload could not be serialized
    #[error(transparent)]
    MalformedJwtPayload(#[from] MalformedJwtPayload),
}

/// The credential failed verification
///
/// Covers every reason a credential is unusable: a malformed token, an
/// unexpected algorithm, a bad signature, or claims that do not decode.
#[derive(Debug, Error)]
#[error("invalid credential")]
pub struct InvalidCredential {
    #[from]
    source: JwtVerifyError,
}

impl InvalidCredential {
    /// The specific verification failure
    pub fn reason(&self) -> &JwtVerifyError {
        &self.source
    }
}

/// The transport form of a refresh token could not be decoded
#[derive(Debug, Error)]
#[error("malformed transport encoding")]
pub struct MalformedTransport {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn malformed_transport(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> MalformedTransport {
    MalformedTransport {
        source: source.into(),
    }
}

/// A presented refresh token was rejected before it could be matched
/// against its stored record
#[derive(Debug, Error)]
pub enum RefreshTokenRejected {
    /// The transport form did not decode
    #[error(transparent)]
    Transport(#[from] MalformedTransport),

    /// The decoded token is not a valid refresh credential
    #[error(transparent)]
    Credential(#[from] InvalidCredential),
}

/// An error occurring while computing or checking a fingerprint
#[derive(Debug, Error)]
pub enum FingerprintError {
    /// The token has no signature section to fingerprint
    #[error("token has no signature section")]
    MissingSignature,

    /// The stored fingerprint could not be parsed
    #[error("stored fingerprint is malformed")]
    MalformedHash,

    /// The token's signature does not match the fingerprint
    #[error("token does not match fingerprint")]
    Mismatch,

    /// A fresh salt could not be generated
    #[error(transparent)]
    Unexpected(#[from] Unexpected),
}
