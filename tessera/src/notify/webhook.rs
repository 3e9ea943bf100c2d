//! A notifier that posts alerts to an HTTP endpoint

use async_trait::async_trait;
use serde::Serialize;

use super::{Alert, Notifier, NotifyError, ALERT_MESSAGE, ALERT_SUBJECT};
use crate::braids::ContactAddressRef;

/// Posts each alert as a JSON document to a fixed URL
///
/// The receiving service is responsible for relaying the message to the
/// principal's contact address, typically by mail.
#[derive(Clone, Debug)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: reqwest::Url,
}

impl WebhookNotifier {
    /// Constructs a new webhook notifier
    pub fn new(client: reqwest::Client, url: reqwest::Url) -> Self {
        Self { client, url }
    }
}

#[derive(Debug, Serialize)]
struct Payload<'a> {
    to: &'a ContactAddressRef,
    subject: &'static str,
    body: &'static str,
    #[serde(flatten)]
    alert: &'a Alert,
}

impl<'a> Payload<'a> {
    fn new(contact: &'a ContactAddressRef, alert: &'a Alert) -> Self {
        Self {
            to: contact,
            subject: ALERT_SUBJECT,
            body: ALERT_MESSAGE,
            alert,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[tracing::instrument(
        err,
        skip_all,
        fields(url = %self.url, identity = %alert.identity()),
    )]
    async fn notify(&self, contact: &ContactAddressRef, alert: &Alert) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(self.url.clone())
            .json(&Payload::new(contact, alert))
            .send()
            .await
            .map_err(NotifyError::new)?;

        tracing::debug!(response.status = resp.status().as_u16(), "webhook responded");

        resp.error_for_status().map_err(NotifyError::new)?;
        Ok(())
    }
}
