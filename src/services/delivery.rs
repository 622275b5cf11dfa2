//! Outbound notification delivery
//!
//! Push goes to a gateway webhook as JSON, signed with HMAC-SHA256 over the
//! raw body (`X-MundoTango-Signature: sha256=<hex>`). Email goes out over
//! SMTP with lettre. Both channels are optional.

use anyhow::{anyhow, Context, Result};
use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;

use crate::config::NotificationConfig;
use crate::models::{Notification, User};

pub const SIGNATURE_HEADER: &str = "X-MundoTango-Signature";

const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `body` under `secret`
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow!("Invalid push secret: {}", e))?;
    mac.update(body);
    Ok(HEXLOWER.encode(&mac.finalize().into_bytes()))
}

#[derive(Debug, Serialize)]
struct PushPayload<'a> {
    user_id: i64,
    notification_id: i64,
    kind: &'a str,
    message: &'a str,
    target_type: Option<&'a str>,
    target_id: Option<i64>,
    created_at: String,
}

struct PushClient {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl PushClient {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let payload = PushPayload {
            user_id: notification.user_id,
            notification_id: notification.id,
            kind: notification.kind.as_str(),
            message: &notification.message,
            target_type: notification.target_type.as_deref(),
            target_id: notification.target_id,
            created_at: notification.created_at.to_rfc3339(),
        };
        let body = serde_json::to_vec(&payload).context("Failed to encode push payload")?;

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, format!("sha256={}", sign_payload(secret, &body)?));
        }

        let response = request
            .body(body)
            .send()
            .await
            .context("Push webhook request failed")?;
        if !response.status().is_success() {
            return Err(anyhow!("Push webhook returned {}", response.status()));
        }
        Ok(())
    }
}

struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl Mailer {
    fn from_config(config: &NotificationConfig) -> Result<Option<Self>> {
        if !config.email_enabled() {
            return Ok(None);
        }
        let host = config.smtp_host.as_deref().unwrap_or_default();
        let from = config
            .smtp_from
            .as_deref()
            .unwrap_or_default()
            .parse::<Mailbox>()
            .map_err(|e| anyhow!("Invalid smtp_from address: {}", e))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(config.smtp_port);
        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Some(Self {
            transport: builder.build(),
            from,
        }))
    }

    async fn send(&self, recipient: &User, notification: &Notification) -> Result<()> {
        let to = recipient
            .email
            .parse::<Mailbox>()
            .map_err(|e| anyhow!("Invalid recipient address: {}", e))?;
        let greeting = recipient.name.as_deref().unwrap_or(&recipient.username);

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(format!("[Mundo Tango] {}", notification.message))
            .header(ContentType::TEXT_PLAIN)
            .body(format!(
                "Hola {},\n\n{}\n\nMundo Tango",
                greeting, notification.message
            ))
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }
}

/// Push and email channels built from configuration
pub struct Delivery {
    push: Option<PushClient>,
    mail: Option<Mailer>,
}

impl Delivery {
    pub fn from_config(config: &NotificationConfig) -> Result<Self> {
        let push = match config.push_webhook_url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => Some(PushClient {
                client: reqwest::Client::builder()
                    .user_agent("MundoTango-Push")
                    .timeout(PUSH_TIMEOUT)
                    .build()
                    .context("Failed to build HTTP client")?,
                url: url.to_string(),
                secret: config.push_secret.clone(),
            }),
            None => None,
        };
        Ok(Self {
            push,
            mail: Mailer::from_config(config)?,
        })
    }

    /// No outbound channels; notifications are only stored
    pub fn disabled() -> Self {
        Self { push: None, mail: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.push.is_some() || self.mail.is_some()
    }

    /// Send on every configured channel. Failures are logged, never returned.
    pub async fn deliver(&self, recipient: &User, notification: &Notification) {
        if let Some(push) = &self.push {
            if let Err(e) = push.send(notification).await {
                tracing::warn!(notification_id = notification.id, "Push delivery failed: {:#}", e);
            }
        }
        if notification.kind.sends_email() {
            if let Some(mail) = &self.mail {
                if let Err(e) = mail.send(recipient, notification).await {
                    tracing::warn!(notification_id = notification.id, "Email delivery failed: {:#}", e);
                }
            }
        }
    }
}
