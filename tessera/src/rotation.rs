use std::{error, net::IpAddr};

use thiserror::Error;

use crate::{
    authority::TokenAuthority,
    braids::{AccessTokenRef, TransportTokenRef},
    clock::Clock,
    error::{FingerprintError, InvalidCredential, RefreshTokenRejected},
    issuance::{IssuanceError, TokenPair},
    notify::Notifier,
    store::{RecordStore, StoreError},
};

/// The reason a rotation was refused
///
/// Once a rotation has reached the store, the stored record is gone no
/// matter which of these is returned. The principal must then be issued a
/// new pair from scratch.
#[derive(Debug, Error)]
pub enum RotationError {
    /// The access token is not an authentic access token
    #[error("invalid access token")]
    InvalidAccessToken(#[source] InvalidCredential),

    /// The refresh token is malformed or not an authentic refresh token
    #[error("invalid refresh token")]
    InvalidRefreshToken(#[source] RefreshTokenRejected),

    /// No live record exists for the presented refresh token
    #[error("refresh token not found")]
    RefreshNotFound,

    /// The access token was not issued alongside the refresh token
    #[error("access token does not belong to the refresh token")]
    TokenPairMismatch,

    /// The refresh record has expired
    #[error("refresh token expired")]
    RefreshExpired,

    /// The refresh token does not match its stored fingerprint
    #[error("refresh token was tampered with or reused")]
    RefreshTamperedOrReused(#[source] FingerprintError),

    /// The request came from an address other than the one the pair was
    /// issued to
    #[error("request address does not match the issued address")]
    SourceAddressMismatch,

    /// The replacement pair could not be issued
    #[error("unable to issue replacement tokens")]
    IssuanceFailed(#[source] IssuanceError),

    /// The record store failed while fetching the record
    #[error("record store failure")]
    Store(#[source] StoreError),
}

impl RotationError {
    /// Whether the replacement pair was refused because the identity is no
    /// longer a registered principal
    #[must_use]
    pub fn is_unknown_identity(&self) -> bool {
        matches!(self, Self::IssuanceFailed(err) if err.is_unknown_identity())
    }
}

impl<S, N, C> TokenAuthority<S, N, C>
where
    S: RecordStore + 'static,
    N: Notifier + 'static,
    C: Clock,
{
    /// Exchanges a paired access and refresh token for a new pair
    ///
    /// An expired access token is accepted as long as it is authentic. The
    /// refresh token is single use: its record is consumed by the attempt
    /// whether or not the attempt succeeds. A request from an address other
    /// than the one the pair was issued to also sends a theft alert to the
    /// principal.
    ///
    /// # Errors
    ///
    /// Returns the first check that failed. See [`RotationError`].
    #[tracing::instrument(
        skip_all,
        fields(%source_address, identity = tracing::field::Empty),
    )]
    pub async fn rotate(
        &self,
        access_token: &AccessTokenRef,
        refresh_token: &TransportTokenRef,
        source_address: IpAddr,
    ) -> Result<TokenPair, RotationError> {
        let status = self.codec.verify_access(access_token).map_err(|err| {
            tracing::debug!(error = (&err as &dyn error::Error), "access token rejected");
            RotationError::InvalidAccessToken(err)
        })?;

        if status.is_expired() {
            tracing::debug!("access token expired, continuing with rotation");
        }

        let claims = status.into_claims();
        let identity = claims.identity();
        tracing::Span::current().record("identity", tracing::field::display(identity));

        let refresh = refresh_token.decode().map_err(|err| {
            tracing::debug!(error = (&err as &dyn error::Error), "refresh token rejected");
            RotationError::InvalidRefreshToken(err.into())
        })?;
        let refresh_claims = self.codec.inspect_refresh(&refresh).map_err(|err| {
            tracing::debug!(error = (&err as &dyn error::Error), "refresh token rejected");
            RotationError::InvalidRefreshToken(err.into())
        })?;

        let record = match self.store.fetch_and_invalidate(identity).await {
            Ok(record) => record,
            Err(StoreError::NotFound) => {
                tracing::debug!("no live refresh record");
                return Err(RotationError::RefreshNotFound);
            }
            Err(err) => {
                tracing::error!(
                    error = (&err as &dyn error::Error),
                    "unable to fetch refresh record"
                );
                return Err(RotationError::Store(err));
            }
        };

        let access_matches = record.jti() == claims.jti();
        let refresh_matches = record.refresh_jti() == refresh_claims.jti();

        if !access_matches && !refresh_matches {
            tracing::warn!("neither token was issued for the live record");
            return Err(RotationError::RefreshNotFound);
        }

        if !access_matches || !refresh_matches {
            tracing::warn!(
                jti = %claims.jti(),
                access_matches,
                refresh_matches,
                "access token does not belong to refresh token"
            );
            return Err(RotationError::TokenPairMismatch);
        }

        if record.expires_at() < self.codec.now() {
            tracing::debug!(expired_at = record.expires_at().0, "refresh record expired");
            return Err(RotationError::RefreshExpired);
        }

        self.fingerprinter
            .verify(record.fingerprint(), &refresh)
            .map_err(|err| {
                tracing::warn!(
                    error = (&err as &dyn error::Error),
                    "refresh token does not match its fingerprint"
                );
                RotationError::RefreshTamperedOrReused(err)
            })?;

        let token_address = self.codec.extract_source_address(&refresh).map_err(|err| {
            tracing::warn!(
                error = (&err as &dyn error::Error),
                "refresh token signature rejected"
            );
            RotationError::InvalidRefreshToken(err.into())
        })?;

        if token_address != source_address || record.source_address() != source_address {
            tracing::warn!(
                %token_address,
                record_address = %record.source_address(),
                "refresh attempted from an unexpected address"
            );
            self.dispatch_alert(identity, source_address);
            return Err(RotationError::SourceAddressMismatch);
        }

        let pair = self
            .mint(identity, source_address)
            .await
            .map_err(|err| {
                tracing::error!(
                    error = (&err as &dyn error::Error),
                    "unable to issue replacement tokens"
                );
                RotationError::IssuanceFailed(err)
            })?;

        tracing::info!("rotated token pair");
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::{IpAddr, Ipv4Addr},
        sync::Arc,
        time::Duration,
    };

    use color_eyre::Result;
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        braids::{AccessTokenRef, RefreshToken},
        clock::DurationSecs,
        store::RefreshRecord,
        test,
    };

    const HOME: IpAddr = IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4));
    const AWAY: IpAddr = IpAddr::V4(Ipv4Addr::new(5, 6, 7, 8));

    #[tokio::test]
    async fn rotation_is_single_use() -> Result<()> {
        let h = test::Harness::new().await?;
        let first = h.authority.issue(h.identity, HOME).await?;

        let second = h
            .authority
            .rotate(first.access_token(), first.refresh_token(), HOME)
            .await?;
        assert_ne!(first, second);
        h.authority.codec().verify_access(second.access_token())?;

        let replay = h
            .authority
            .rotate(first.access_token(), first.refresh_token(), HOME)
            .await;
        assert!(matches!(replay, Err(RotationError::RefreshNotFound)));
        Ok(())
    }

    #[tokio::test]
    async fn rotated_pair_can_itself_be_rotated() -> Result<()> {
        let h = test::Harness::new().await?;
        let mut pair = h.authority.issue(h.identity, HOME).await?;

        for _ in 0..3 {
            pair = h
                .authority
                .rotate(pair.access_token(), pair.refresh_token(), HOME)
                .await?;
        }

        assert!(h.authority.store().peek_record(h.identity).await.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn tokens_from_different_issuances_do_not_pair() -> Result<()> {
        let h = test::Harness::new().await?;
        let first = h.authority.issue(h.identity, HOME).await?;
        let second = h.authority.issue(h.identity, HOME).await?;

        let mixed = h
            .authority
            .rotate(first.access_token(), second.refresh_token(), HOME)
            .await;
        assert!(matches!(mixed, Err(RotationError::TokenPairMismatch)));

        let retry = h
            .authority
            .rotate(second.access_token(), second.refresh_token(), HOME)
            .await;
        assert!(matches!(retry, Err(RotationError::RefreshNotFound)));
        Ok(())
    }

    #[tokio::test]
    async fn current_access_token_with_superseded_refresh_token_does_not_pair() -> Result<()> {
        let h = test::Harness::new().await?;
        let first = h.authority.issue(h.identity, HOME).await?;
        let second = h.authority.issue(h.identity, HOME).await?;

        let mixed = h
            .authority
            .rotate(second.access_token(), first.refresh_token(), HOME)
            .await;
        assert!(matches!(mixed, Err(RotationError::TokenPairMismatch)));
        assert!(h.authority.store().peek_record(h.identity).await.is_none());
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn record_address_must_match_as_well_as_token_address() -> Result<()> {
        let mut h = test::Harness::new().await?;
        let pair = h.authority.issue(h.identity, HOME).await?;

        let live = h
            .authority
            .store()
            .peek_record(h.identity)
            .await
            .ok_or_else(|| color_eyre::eyre::eyre!("no record stored"))?;
        let moved = RefreshRecord::new(
            live.identity(),
            live.fingerprint().to_owned(),
            AWAY,
            live.jti().to_owned(),
            live.refresh_jti().to_owned(),
            live.expires_at(),
        );
        h.authority.store().replace_record(moved).await?;

        let result = h
            .authority
            .rotate(pair.access_token(), pair.refresh_token(), HOME)
            .await;
        assert!(matches!(result, Err(RotationError::SourceAddressMismatch)));

        let (_, alert) = tokio::time::timeout(Duration::from_secs(1), h.alerts.recv())
            .await?
            .ok_or_else(|| color_eyre::eyre::eyre!("notifier dropped"))?;
        assert_eq!(alert.source_address(), HOME);

        tokio::task::yield_now().await;
        assert!(h.alerts.try_recv().is_err());
        assert!(logs_contain("refresh attempted from an unexpected address"));
        Ok(())
    }

    #[tokio::test]
    async fn superseded_pair_is_not_redeemable() -> Result<()> {
        let h = test::Harness::new().await?;
        let first = h.authority.issue(h.identity, HOME).await?;
        h.authority.issue(h.identity, HOME).await?;

        let stale = h
            .authority
            .rotate(first.access_token(), first.refresh_token(), HOME)
            .await;
        assert!(matches!(stale, Err(RotationError::RefreshNotFound)));
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn foreign_address_is_refused_and_reported_once() -> Result<()> {
        let mut h = test::Harness::new().await?;
        let pair = h.authority.issue(h.identity, HOME).await?;

        let result = h
            .authority
            .rotate(pair.access_token(), pair.refresh_token(), AWAY)
            .await;
        assert!(matches!(result, Err(RotationError::SourceAddressMismatch)));

        let (contact, alert) = tokio::time::timeout(Duration::from_secs(1), h.alerts.recv())
            .await?
            .ok_or_else(|| color_eyre::eyre::eyre!("notifier dropped"))?;
        assert_eq!(contact.as_str(), test::CONTACT);
        assert_eq!(alert.identity(), h.identity);
        assert_eq!(alert.source_address(), AWAY);

        tokio::task::yield_now().await;
        assert!(h.alerts.try_recv().is_err());
        assert!(h.authority.store().peek_record(h.identity).await.is_none());
        assert!(logs_contain("refresh attempted from an unexpected address"));
        Ok(())
    }

    #[tokio::test]
    async fn expired_record_is_refused() -> Result<()> {
        let h = test::Harness::new().await?;
        let pair = h.authority.issue(h.identity, HOME).await?;

        h.clock.advance(DurationSecs(86_401));
        let result = h
            .authority
            .rotate(pair.access_token(), pair.refresh_token(), HOME)
            .await;
        assert!(matches!(result, Err(RotationError::RefreshExpired)));
        Ok(())
    }

    #[tokio::test]
    async fn record_is_redeemable_through_its_final_second() -> Result<()> {
        let h = test::Harness::new().await?;
        let pair = h.authority.issue(h.identity, HOME).await?;

        h.clock.advance(DurationSecs(86_400));
        h.authority
            .rotate(pair.access_token(), pair.refresh_token(), HOME)
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn expired_access_token_still_rotates() -> Result<()> {
        let h = test::Harness::new().await?;
        let pair = h.authority.issue(h.identity, HOME).await?;

        h.clock.advance(DurationSecs(16 * 60));
        assert!(h
            .authority
            .codec()
            .verify_access(pair.access_token())?
            .is_expired());

        let next = h
            .authority
            .rotate(pair.access_token(), pair.refresh_token(), HOME)
            .await?;
        assert!(!h
            .authority
            .codec()
            .verify_access(next.access_token())?
            .is_expired());
        Ok(())
    }

    #[tokio::test]
    async fn altered_signature_is_refused_and_consumes_record() -> Result<()> {
        let h = test::Harness::new().await?;
        let pair = h.authority.issue(h.identity, HOME).await?;

        let raw = pair.refresh_token().decode()?;
        let mut tampered = raw.as_str().to_owned();
        let last = tampered.pop().unwrap_or('A');
        tampered.push(if last == 'A' { 'B' } else { 'A' });
        let tampered = RefreshToken::new(tampered).encode_transport();

        let result = h
            .authority
            .rotate(pair.access_token(), &tampered, HOME)
            .await;
        assert!(matches!(
            result,
            Err(RotationError::RefreshTamperedOrReused(
                FingerprintError::Mismatch
            ))
        ));

        let retry = h
            .authority
            .rotate(pair.access_token(), pair.refresh_token(), HOME)
            .await;
        assert!(matches!(retry, Err(RotationError::RefreshNotFound)));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_token_is_not_accepted_as_access_token() -> Result<()> {
        let h = test::Harness::new().await?;
        let pair = h.authority.issue(h.identity, HOME).await?;
        let raw = pair.refresh_token().decode()?;

        let result = h
            .authority
            .rotate(
                AccessTokenRef::from_str(raw.as_str()),
                pair.refresh_token(),
                HOME,
            )
            .await;
        assert!(matches!(result, Err(RotationError::InvalidAccessToken(_))));
        assert!(h.authority.store().peek_record(h.identity).await.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn malformed_refresh_token_leaves_record_in_place() -> Result<()> {
        let h = test::Harness::new().await?;
        let pair = h.authority.issue(h.identity, HOME).await?;

        for bad in ["not base64!", "bm90IGEgdG9rZW4"] {
            let result = h
                .authority
                .rotate(
                    pair.access_token(),
                    TransportTokenRef::from_str(bad),
                    HOME,
                )
                .await;
            assert!(
                matches!(result, Err(RotationError::InvalidRefreshToken(_))),
                "{:?} was accepted",
                bad
            );
        }

        assert!(h.authority.store().peek_record(h.identity).await.is_some());
        h.authority
            .rotate(pair.access_token(), pair.refresh_token(), HOME)
            .await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_rotations_yield_a_single_success() -> Result<()> {
        let h = test::Harness::new().await?;
        let pair = Arc::new(h.authority.issue(h.identity, HOME).await?);
        let authority = Arc::new(h.authority);

        let attempts: Vec<_> = (0..2)
            .map(|_| {
                let authority = Arc::clone(&authority);
                let pair = Arc::clone(&pair);
                tokio::spawn(async move {
                    authority
                        .rotate(pair.access_token(), pair.refresh_token(), HOME)
                        .await
                })
            })
            .collect();

        let mut successes = 0;
        for attempt in attempts {
            match attempt.await? {
                Ok(_) => successes += 1,
                Err(RotationError::RefreshNotFound) => {}
                Err(err) => return Err(err.into()),
            }
        }

        assert_eq!(successes, 1);
        Ok(())
    }

    #[tokio::test]
    async fn failed_replacement_is_an_issuance_failure() -> Result<()> {
        let h = test::FlakyHarness::new().await?;
        let pair = h.authority.issue(h.identity, HOME).await?;

        h.authority.store().fail_replacements();
        let result = h
            .authority
            .rotate(pair.access_token(), pair.refresh_token(), HOME)
            .await;
        assert!(matches!(
            result,
            Err(RotationError::IssuanceFailed(IssuanceError::Store(
                StoreError::Backend(_)
            )))
        ));
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn failing_notifier_does_not_change_the_outcome() -> Result<()> {
        let h = test::Harness::with_notifier(test::FailingNotifier).await?;
        let pair = h.authority.issue(h.identity, HOME).await?;

        let result = h
            .authority
            .rotate(pair.access_token(), pair.refresh_token(), AWAY)
            .await;
        assert!(matches!(result, Err(RotationError::SourceAddressMismatch)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(logs_contain("failed to deliver theft alert"));
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn hanging_notifier_is_abandoned() -> Result<()> {
        let h = test::Harness::with_notifier(test::HangingNotifier).await?;
        let authority = h.authority.with_notify_timeout(Duration::from_millis(20));
        let pair = authority.issue(h.identity, HOME).await?;

        let result = tokio::time::timeout(
            Duration::from_millis(500),
            authority.rotate(pair.access_token(), pair.refresh_token(), AWAY),
        )
        .await?;
        assert!(matches!(result, Err(RotationError::SourceAddressMismatch)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(logs_contain("theft alert timed out"));
        Ok(())
    }
}
