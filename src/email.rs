//! Password-reset notifications.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::{EmailConfig, Environment};
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver (or, outside production, surface) a reset link carrying `token`.
    async fn send_password_reset(&self, to_email: &str, to_name: &str, token: &str)
        -> AppResult<()>;
}

pub struct EmailService {
    environment: Environment,
    frontend_url: String,
    from_email: String,
    from_name: String,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl EmailService {
    pub fn new(config: &EmailConfig) -> AppResult<Self> {
        let transport = match &config.smtp {
            Some(smtp) => Some(
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
                    .map_err(|e| AppError::Internal(format!("create SMTP transport: {}", e)))?
                    .port(smtp.port)
                    .credentials(Credentials::new(
                        smtp.username.clone(),
                        smtp.password.clone(),
                    ))
                    .build(),
            ),
            None => None,
        };

        if config.environment == Environment::Production && transport.is_none() {
            tracing::warn!("Production mode without [email.smtp]: password resets will fail");
        }

        Ok(Self {
            environment: config.environment,
            frontend_url: config.frontend_url.trim_end_matches('/').to_string(),
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
            transport,
        })
    }

    pub fn reset_link(&self, token: &str) -> String {
        format!("{}/reset-password?token={}", self.frontend_url, token)
    }

    async fn deliver(
        &self,
        transport: &AsyncSmtpTransport<Tokio1Executor>,
        to_email: &str,
        to_name: &str,
        reset_link: &str,
    ) -> AppResult<()> {
        let from = mailbox(&self.from_name, &self.from_email)?;
        let to = mailbox(to_name, to_email)?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject("Password Reset Request - StudyHall")
            .header(ContentType::TEXT_HTML)
            .body(reset_body(to_name, reset_link))
            .map_err(|e| AppError::Internal(format!("build email message: {}", e)))?;

        transport
            .send(message)
            .await
            .map_err(|e| AppError::Internal(format!("send SMTP email: {}", e)))?;

        tracing::info!("Sent password reset email to {}", to_email);
        Ok(())
    }
}

#[async_trait]
impl Mailer for EmailService {
    async fn send_password_reset(
        &self,
        to_email: &str,
        to_name: &str,
        token: &str,
    ) -> AppResult<()> {
        let link = self.reset_link(token);

        match self.environment {
            Environment::Development => {
                tracing::info!(email = %to_email, reset_link = %link, "Development mode: password reset link");
                if let Some(transport) = &self.transport {
                    if let Err(e) = self.deliver(transport, to_email, to_name, &link).await {
                        tracing::warn!("SMTP delivery failed in development mode: {}", e);
                    }
                }
                Ok(())
            }
            Environment::Production => {
                let transport = self.transport.as_ref().ok_or_else(|| {
                    AppError::Internal("SMTP credentials are not configured".into())
                })?;
                self.deliver(transport, to_email, to_name, &link).await
            }
        }
    }
}

fn mailbox(name: &str, email: &str) -> AppResult<Mailbox> {
    let address: Address = email
        .parse()
        .map_err(|e| AppError::Internal(format!("parse email address {}: {}", email, e)))?;
    let name = Some(name.to_string()).filter(|n| !n.is_empty());
    Ok(Mailbox::new(name, address))
}

fn reset_body(to_name: &str, reset_link: &str) -> String {
    let greeting = if to_name.is_empty() {
        "Hello,".to_string()
    } else {
        format!("Hello {},", to_name)
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Password Reset Request</title></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <h2>Password Reset Request</h2>
    <p>{greeting}</p>
    <p>We received a request to reset your StudyHall password. If you made this request, open the link below to choose a new password:</p>
    <p><a href="{reset_link}">Reset my password</a></p>
    <p>Or copy and paste this link into your browser:</p>
    <p>{reset_link}</p>
    <p>This link expires in 24 hours. If you didn't request a reset, you can ignore this email.</p>
</body>
</html>"#
    )
}
