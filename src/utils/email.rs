use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{MultiPart, SinglePart, header};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::instrument;

use crate::config::email::EmailConfig;
use crate::utils::errors::AppError;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound mail seam. Handlers depend on this trait rather than on SMTP
/// directly, so tests can inject a recording fake.
#[async_trait]
pub trait EmailNotifier: Send + Sync {
    async fn send_verification_code(
        &self,
        to_email: &str,
        code: &str,
        ttl_minutes: u64,
    ) -> Result<(), AppError>;

    async fn send_password_reset_code(
        &self,
        to_email: &str,
        code: &str,
        ttl_minutes: u64,
    ) -> Result<(), AppError>;
}

/// SMTP-backed notifier.
pub struct SmtpNotifier {
    config: EmailConfig,
}

impl SmtpNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    #[instrument(skip(self, text_body, html_body))]
    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), AppError> {
        let from = format!("{} <{}>", self.config.from_name, self.config.from_email);

        let email = Message::builder()
            .from(
                from.parse()
                    .map_err(|e| AppError::internal(format!("Invalid from address: {e}")))?,
            )
            .to(to_email
                .parse()
                .map_err(|e| AppError::validation(format!("Invalid recipient address: {e}")))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )
            .map_err(|e| AppError::internal(format!("Failed to build email: {e}")))?;

        let mailer = if self.config.smtp_username.is_empty() {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
                .port(self.config.smtp_port)
                .build()
        } else {
            let creds = Credentials::new(
                self.config.smtp_username.clone(),
                self.config.smtp_password.clone(),
            );

            SmtpTransport::relay(&self.config.smtp_host)
                .map_err(|e| AppError::internal(format!("Failed to create SMTP relay: {e}")))?
                .port(self.config.smtp_port)
                .credentials(creds)
                .build()
        };

        // The sync transport runs on the blocking pool; a hung relay must
        // not stall the request past the transport deadline.
        let send = tokio::task::spawn_blocking(move || mailer.send(&email));

        match tokio::time::timeout(SEND_TIMEOUT, send).await {
            Ok(Ok(Ok(_))) => Ok(()),
            Ok(Ok(Err(e))) => Err(AppError::TransportUnavailable(format!("SMTP send: {e}"))),
            Ok(Err(e)) => Err(AppError::internal(format!("Email task failed: {e}"))),
            Err(_) => Err(AppError::TransportUnavailable(
                "SMTP send timed out".to_string(),
            )),
        }
    }
}

#[async_trait]
impl EmailNotifier for SmtpNotifier {
    #[instrument(skip(self, code))]
    async fn send_verification_code(
        &self,
        to_email: &str,
        code: &str,
        ttl_minutes: u64,
    ) -> Result<(), AppError> {
        if !self.config.enabled {
            tracing::debug!(to = %to_email, "SMTP disabled, skipping verification email");
            return Ok(());
        }

        let text_body = format!(
            "Your {} email verification code is: {}\n\n\
             The code expires in {} minutes.\n\n\
             If you didn't request this, you can ignore this email.",
            self.config.from_name, code, ttl_minutes
        );
        let html_body = format!(
            "<p>Your {} email verification code is:</p>\
             <p style=\"font-size:24px;font-weight:bold;letter-spacing:2px\">{}</p>\
             <p>The code expires in {} minutes.</p>\
             <p>If you didn't request this, you can ignore this email.</p>",
            self.config.from_name, code, ttl_minutes
        );

        self.send_email(to_email, "Verify your email address", &text_body, &html_body)
            .await
    }

    #[instrument(skip(self, code))]
    async fn send_password_reset_code(
        &self,
        to_email: &str,
        code: &str,
        ttl_minutes: u64,
    ) -> Result<(), AppError> {
        if !self.config.enabled {
            tracing::debug!(to = %to_email, "SMTP disabled, skipping reset email");
            return Ok(());
        }

        let text_body = format!(
            "Your {} password reset code is: {}\n\n\
             The code expires in {} minutes.\n\n\
             If you didn't request a reset, please contact support.",
            self.config.from_name, code, ttl_minutes
        );
        let html_body = format!(
            "<p>Your {} password reset code is:</p>\
             <p style=\"font-size:24px;font-weight:bold;letter-spacing:2px\">{}</p>\
             <p>The code expires in {} minutes.</p>\
             <p>If you didn't request a reset, please contact support.</p>",
            self.config.from_name, code, ttl_minutes
        );

        self.send_email(to_email, "Password reset code", &text_body, &html_body)
            .await
    }
}
