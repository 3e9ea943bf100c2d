use std::{error, net::IpAddr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    authority::TokenAuthority,
    braids::{AccessToken, AccessTokenRef, Identity, TransportToken, TransportTokenRef},
    clock::Clock,
    error::{FingerprintError, JwtSigningError},
    store::{RecordStore, RefreshRecord, StoreError},
};

/// An access token and the transport form of its paired refresh token
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    access_token: AccessToken,
    refresh_token: TransportToken,
}

impl TokenPair {
    /// The access token
    #[inline]
    pub fn access_token(&self) -> &AccessTokenRef {
        &self.access_token
    }

    /// The refresh token, in the form handed to clients
    #[inline]
    pub fn refresh_token(&self) -> &TransportTokenRef {
        &self.refresh_token
    }

    /// Splits the pair into its parts
    #[inline]
    pub fn into_parts(self) -> (AccessToken, TransportToken) {
        (self.access_token, self.refresh_token)
    }
}

/// An error while issuing a token pair
#[derive(Debug, Error)]
pub enum IssuanceError {
    /// The identity is not a registered principal
    #[error("unknown identity")]
    UnknownIdentity,

    /// The credentials could not be signed
    #[error("unable to sign credentials")]
    Signing(#[from] JwtSigningError),

    /// The refresh token could not be fingerprinted
    #[error("unable to fingerprint refresh token")]
    Fingerprint(#[from] FingerprintError),

    /// The refresh record could not be stored
    #[error("unable to store refresh record")]
    Store(#[source] StoreError),
}

impl IssuanceError {
    /// Whether the identity is not a registered principal
    #[must_use]
    pub fn is_unknown_identity(&self) -> bool {
        matches!(self, Self::UnknownIdentity)
    }
}

impl From<StoreError> for IssuanceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownIdentity => Self::UnknownIdentity,
            err => Self::Store(err),
        }
    }
}

impl<S, N, C> TokenAuthority<S, N, C>
where
    S: RecordStore,
    C: Clock,
{
    /// Issues a fresh pair for `identity`, bound to `source_address`
    ///
    /// Any pair previously issued to `identity` stops being redeemable.
    ///
    /// # Errors
    ///
    /// If the identity is unknown, or the pair cannot be signed,
    /// fingerprinted or stored.
    #[tracing::instrument(skip_all, fields(%identity, %source_address))]
    pub async fn issue(
        &self,
        identity: Identity,
        source_address: IpAddr,
    ) -> Result<TokenPair, IssuanceError> {
        match self.mint(identity, source_address).await {
            Ok(pair) => {
                tracing::info!("issued token pair");
                Ok(pair)
            }
            Err(err) => {
                tracing::warn!(
                    error = (&err as &dyn error::Error),
                    "unable to issue token pair"
                );
                Err(err)
            }
        }
    }

    pub(crate) async fn mint(
        &self,
        identity: Identity,
        source_address: IpAddr,
    ) -> Result<TokenPair, IssuanceError> {
        let (access_token, jti) = self.codec.issue_access(identity, source_address)?;
        let (refresh_token, refresh_jti) = self.codec.issue_refresh(source_address)?;
        let fingerprint = self.fingerprinter.fingerprint(&refresh_token)?;
        tracing::debug!(%jti, "signed and fingerprinted new pair");

        let record = RefreshRecord::new(
            identity,
            fingerprint,
            source_address,
            jti,
            refresh_jti,
            self.codec.refresh_expiry(),
        );
        self.store.replace_record(record).await?;

        Ok(TokenPair {
            access_token,
            refresh_token: refresh_token.encode_transport(),
        })
    }
}
