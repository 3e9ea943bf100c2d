use std::{error, fmt, net::IpAddr, sync::Arc, time::Duration};

use thiserror::Error;
use tracing::Instrument;

use crate::{
    braids::Identity,
    clock::System,
    codec::CredentialCodec,
    fingerprint::Fingerprinter,
    notify::{Alert, Notifier, NotifyError},
    store::{RecordStore, StoreError},
};

/// How long a theft alert may take before it is abandoned
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(2);

/// Issues and rotates token pairs
///
/// The authority ties together the credential codec, the fingerprinter, a
/// [`RecordStore`] and a [`Notifier`]. Cloning is cheap; the store and
/// notifier are shared between clones.
pub struct TokenAuthority<S, N, C = System> {
    pub(crate) codec: CredentialCodec<C>,
    pub(crate) fingerprinter: Fingerprinter,
    pub(crate) store: Arc<S>,
    notifier: Arc<N>,
    notify_timeout: Duration,
}

impl<S, N, C> TokenAuthority<S, N, C> {
    /// Constructs a new token authority
    pub fn new(codec: CredentialCodec<C>, store: Arc<S>, notifier: Arc<N>) -> Self {
        Self {
            codec,
            fingerprinter: Fingerprinter::default(),
            store,
            notifier,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    /// Replaces the fingerprinter used for refresh tokens
    pub fn with_fingerprinter(self, fingerprinter: Fingerprinter) -> Self {
        Self {
            fingerprinter,
            ..self
        }
    }

    /// Overrides how long a theft alert may take
    pub fn with_notify_timeout(self, notify_timeout: Duration) -> Self {
        Self {
            notify_timeout,
            ..self
        }
    }

    /// The record store backing this authority
    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The codec used to sign and verify credentials
    #[inline]
    pub fn codec(&self) -> &CredentialCodec<C> {
        &self.codec
    }
}

impl<S, N, C: Clone> Clone for TokenAuthority<S, N, C> {
    fn clone(&self) -> Self {
        Self {
            codec: self.codec.clone(),
            fingerprinter: self.fingerprinter.clone(),
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            notify_timeout: self.notify_timeout,
        }
    }
}

impl<S, N, C: fmt::Debug> fmt::Debug for TokenAuthority<S, N, C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("codec", &self.codec)
            .field("fingerprinter", &self.fingerprinter)
            .field("notify_timeout", &self.notify_timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
enum AlertFailure {
    #[error("unable to look up contact address")]
    Lookup(#[source] StoreError),
    #[error(transparent)]
    Delivery(#[from] NotifyError),
}

impl<S, N, C> TokenAuthority<S, N, C>
where
    S: RecordStore + 'static,
    N: Notifier + 'static,
{
    /// Sends a theft alert for `identity` in the background
    ///
    /// The caller never waits on delivery. Lookup and delivery together are
    /// bounded by the notify timeout, and their outcome is only logged.
    pub(crate) fn dispatch_alert(&self, identity: Identity, source_address: IpAddr) {
        let store = Arc::clone(&self.store);
        let notifier = Arc::clone(&self.notifier);
        let budget = self.notify_timeout;
        let alert = Alert::new(identity, source_address);

        let delivery = async move {
            let contact = store
                .lookup_contact_address(identity)
                .await
                .map_err(AlertFailure::Lookup)?;
            notifier.notify(&contact, &alert).await?;
            Ok::<_, AlertFailure>(())
        };

        tokio::spawn(
            async move {
                match tokio::time::timeout(budget, delivery).await {
                    Ok(Ok(())) => tracing::debug!("theft alert delivered"),
                    Ok(Err(err)) => tracing::warn!(
                        error = (&err as &dyn error::Error),
                        "failed to deliver theft alert"
                    ),
                    Err(_) => tracing::warn!(
                        timeout_ms = budget.as_millis() as u64,
                        "theft alert timed out"
                    ),
                }
            }
            .instrument(tracing::Span::current()),
        );
    }
}
