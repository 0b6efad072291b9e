//! Outbound mail capability
//!
//! Login codes leave the core through a [`Notifier`]. Delivery failures are
//! returned to the caller, which decides whether they are fatal (login treats
//! them as non-fatal).

use crate::config::MailConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    pub fn login_code(to: &str, code: &str, ttl_seconds: u64) -> Self {
        Self {
            to: to.to_string(),
            subject: "Your campus election login code".to_string(),
            body: format!(
                "Your login code is {code}. It expires in {} minutes. \
                 If you did not try to sign in, you can ignore this message.",
                ttl_seconds.div_ceil(60)
            ),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<()>;
}

/// Delivers mail through a JSON HTTP mail API
pub struct HttpMailNotifier {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from_address: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl HttpMailNotifier {
    pub fn new(api_url: &str, config: &MailConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::internal(format!("failed to create mail client: {e}")))?;

        Ok(Self {
            http,
            api_url: api_url.to_string(),
            api_key: config.api_key.clone(),
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl Notifier for HttpMailNotifier {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        let body = SendRequest {
            from: &self.from_address,
            to: &message.to,
            subject: &message.subject,
            text: &message.body,
        };

        let mut request = self.http.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::unavailable("mail", format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::unavailable(
                "mail",
                format!("mail API returned HTTP {}", response.status()),
            ));
        }

        tracing::debug!(to = %message.to, "Mail accepted by provider");
        Ok(())
    }
}

/// Writes messages to the log instead of sending them
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        tracing::info!(to = %message.to, subject = %message.subject, "📧 Mail not sent (no mail API configured)");
        Ok(())
    }
}

/// Keeps sent messages in memory
#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<MailMessage>>,
    failing: std::sync::atomic::AtomicBool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send fail
    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn last_to(&self, to: &str) -> Option<MailMessage> {
        self.sent().into_iter().rev().find(|message| message.to == to)
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::unavailable("mail", "mail sink rejected the message"));
        }
        self.sent
            .lock()
            .map_err(|_| Error::internal("mail outbox poisoned"))?
            .push(message.clone());
        Ok(())
    }
}

/// Pick the notifier the mail configuration asks for
pub fn notifier_from_config(config: &MailConfig) -> Result<Arc<dyn Notifier>> {
    match &config.api_url {
        Some(url) => {
            tracing::info!(api_url = %url, "Mail delivery via HTTP API");
            Ok(Arc::new(HttpMailNotifier::new(url, config)?))
        }
        None => {
            tracing::warn!("MAIL_API_URL not set, login codes will only be logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}
