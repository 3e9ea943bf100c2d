//! Out-of-band alerts about suspected credential theft
//!
//! When a refresh token is presented from an address other than the one it
//! was issued to, the principal is told about it through a [`Notifier`].
//! Delivery is best effort: the outcome is logged and never changes the
//! result of the rotation that triggered it.

use std::{error, net::IpAddr, sync::Arc};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::braids::{ContactAddressRef, Identity};

#[cfg(feature = "webhook")]
#[cfg_attr(docsrs, doc(cfg(feature = "webhook")))]
pub mod webhook;

#[cfg(feature = "webhook")]
pub use webhook::WebhookNotifier;

/// The subject line given to every alert
pub const ALERT_SUBJECT: &str = "WARN";

/// The message given to every alert
pub const ALERT_MESSAGE: &str = "Someone tried to log into your account";

/// Details of a suspicious rotation attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Alert {
    identity: Identity,
    source_address: IpAddr,
}

impl Alert {
    /// Constructs a new alert
    pub fn new(identity: Identity, source_address: IpAddr) -> Self {
        Self {
            identity,
            source_address,
        }
    }

    /// The principal whose credentials were presented
    #[inline]
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// The address the credentials were presented from
    #[inline]
    pub fn source_address(&self) -> IpAddr {
        self.source_address
    }
}

/// An alert could not be delivered
#[derive(Debug, Error)]
#[error("unable to deliver alert")]
pub struct NotifyError {
    #[source]
    source: Box<dyn error::Error + Send + Sync + 'static>,
}

impl NotifyError {
    /// Wraps the underlying delivery failure
    pub fn new(source: impl Into<Box<dyn error::Error + Send + Sync + 'static>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// A sink for theft alerts
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers `alert` to `contact`
    async fn notify(&self, contact: &ContactAddressRef, alert: &Alert) -> Result<(), NotifyError>;
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Box<T> {
    async fn notify(&self, contact: &ContactAddressRef, alert: &Alert) -> Result<(), NotifyError> {
        T::notify(self, contact, alert).await
    }
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn notify(&self, contact: &ContactAddressRef, alert: &Alert) -> Result<(), NotifyError> {
        T::notify(self, contact, alert).await
    }
}

/// A notifier that only records alerts in the log
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, contact: &ContactAddressRef, alert: &Alert) -> Result<(), NotifyError> {
        tracing::warn!(
            %contact,
            identity = %alert.identity,
            source_address = %alert.source_address,
            subject = ALERT_SUBJECT,
            "{}",
            ALERT_MESSAGE,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use tracing_test::traced_test;

    use super::*;

    #[tokio::test]
    #[traced_test]
    async fn tracing_notifier_logs_the_alert() -> color_eyre::Result<()> {
        let alert = Alert::new(Identity::new_v4(), IpAddr::V4(Ipv4Addr::new(5, 6, 7, 8)));
        let notifier: Box<dyn Notifier> = Box::new(TracingNotifier);

        notifier
            .notify(ContactAddressRef::from_static("u@example.com"), &alert)
            .await?;

        assert!(logs_contain("Someone tried to log into your account"));
        assert!(logs_contain("5.6.7.8"));
        Ok(())
    }

    #[test]
    fn alert_serializes_plainly() -> color_eyre::Result<()> {
        let identity = Identity::new_v4();
        let alert = Alert::new(identity, IpAddr::V4(Ipv4Addr::new(5, 6, 7, 8)));

        assert_eq!(
            serde_json::to_value(&alert)?,
            serde_json::json!({
                "identity": identity.to_string(),
                "source_address": "5.6.7.8",
            })
        );
        Ok(())
    }
}
