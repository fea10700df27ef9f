//! Outbound email.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::config::SmtpConfig;
use crate::services::ServiceError;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        user_id: Uuid,
        base_url: &str,
    ) -> Result<(), ServiceError>;

    async fn send_setup_password_email(
        &self,
        to_email: &str,
        setup_token: &str,
        user_id: Uuid,
        base_url: &str,
    ) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct SmtpEmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl SmtpEmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, ServiceError> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| ServiceError::Config(anyhow::anyhow!("smtp relay: {e}")))?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(Self {
            mailer,
            from_email: config.from.clone(),
        })
    }

    async fn send(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: String,
        html_body: String,
    ) -> Result<(), ServiceError> {
        let email = Message::builder()
            .from(self
                .from_email
                .parse()
                .map_err(|e: lettre::address::AddressError| {
                    ServiceError::Config(anyhow::anyhow!("from address: {e}"))
                })?)
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| {
                    ServiceError::Email(format!("invalid recipient: {e}"))
                })?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )?;

        // SMTP send is blocking; keep it off the async runtime.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("send task failed: {e}")))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(to = %to_email, error = %e, "email send failed");
                Err(ServiceError::Email(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailService {
    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        user_id: Uuid,
        base_url: &str,
    ) -> Result<(), ServiceError> {
        let link = format!("{base_url}/reset-password?token={reset_token}&user={user_id}");

        let html = format!(
            "<html><body style=\"font-family: Arial, sans-serif;\">\
             <h2>Password Reset Request</h2>\
             <p>We received a request to reset your password. Click the link below to set a new one:</p>\
             <p><a href=\"{link}\">Reset Password</a></p>\
             <p style=\"color: #666; font-size: 12px;\">This link expires in 1 hour. \
             If you didn't request this, you can ignore this email.</p>\
             </body></html>"
        );
        let plain = format!(
            "Password Reset Request\n\nVisit the following link to set a new password:\n\n{link}\n\n\
             This link expires in 1 hour. If you didn't request this, you can ignore this email."
        );

        self.send(to_email, "Reset Your Password", plain, html).await
    }

    async fn send_setup_password_email(
        &self,
        to_email: &str,
        setup_token: &str,
        user_id: Uuid,
        base_url: &str,
    ) -> Result<(), ServiceError> {
        let link = format!("{base_url}/setup-password?token={setup_token}&user={user_id}");

        let html = format!(
            "<html><body style=\"font-family: Arial, sans-serif;\">\
             <h2>Finish setting up your account</h2>\
             <p>An account was created for you. Choose a password to activate it:</p>\
             <p><a href=\"{link}\">Set Password</a></p>\
             <p style=\"color: #666; font-size: 12px;\">This link expires in 24 hours. \
             Contact your administrator if it has already expired.</p>\
             </body></html>"
        );
        let plain = format!(
            "Finish setting up your account\n\nChoose a password to activate it:\n\n{link}\n\n\
             This link expires in 24 hours. Contact your administrator if it has already expired."
        );

        self.send(to_email, "Set Up Your Account", plain, html).await
    }
}

/// Captured outbound mail, for assertions and local runs.
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub token: String,
    pub user_id: Uuid,
}

/// Mock provider that records instead of sending.
#[derive(Default)]
pub struct MockEmailService {
    reset_emails: Mutex<Vec<SentEmail>>,
    setup_emails: Mutex<Vec<SentEmail>>,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_reset_email(&self) -> Option<SentEmail> {
        self.reset_emails.lock().ok()?.last().cloned()
    }

    pub fn last_setup_email(&self) -> Option<SentEmail> {
        self.setup_emails.lock().ok()?.last().cloned()
    }

    pub fn reset_email_count(&self) -> usize {
        self.reset_emails.lock().map(|v| v.len()).unwrap_or(0)
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        user_id: Uuid,
        _base_url: &str,
    ) -> Result<(), ServiceError> {
        if let Ok(mut sent) = self.reset_emails.lock() {
            sent.push(SentEmail {
                to: to_email.to_string(),
                token: reset_token.to_string(),
                user_id,
            });
        }
        Ok(())
    }

    async fn send_setup_password_email(
        &self,
        to_email: &str,
        setup_token: &str,
        user_id: Uuid,
        _base_url: &str,
    ) -> Result<(), ServiceError> {
        if let Ok(mut sent) = self.setup_emails.lock() {
            sent.push(SentEmail {
                to: to_email.to_string(),
                token: setup_token.to_string(),
                user_id,
            });
        }
        Ok(())
    }
}
