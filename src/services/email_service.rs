use crate::config::EmailConfig;
use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to build email message: {0}")]
    MessageBuild(String),
    #[error("Failed to send email: {0}")]
    SendFailed(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Outbound code delivery. Dispatch is best-effort: the OTP engine persists
/// the code first and only logs a failed send.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_signup_code(&self, to_email: &str, code: &str) -> Result<(), NotifyError>;
    async fn send_login_code(&self, to_email: &str, code: &str) -> Result<(), NotifyError>;
}

/// Fallback notifier used when SMTP is not configured. Codes are written to
/// the log so local flows stay testable end to end.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_signup_code(&self, to_email: &str, code: &str) -> Result<(), NotifyError> {
        tracing::info!("📧 [MOCK EMAIL] Signup code for {}: {}", to_email, code);
        Ok(())
    }

    async fn send_login_code(&self, to_email: &str, code: &str) -> Result<(), NotifyError> {
        tracing::info!("📧 [MOCK EMAIL] Login code for {}: {}", to_email, code);
        Ok(())
    }
}

pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl SmtpNotifier {
    pub fn from_config(config: &EmailConfig) -> Result<Self, NotifyError> {
        let smtp_host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| NotifyError::ConfigError("SMTP_HOST not set".to_string()))?;

        if config.smtp_username.is_empty() || config.smtp_password.is_empty() {
            return Err(NotifyError::ConfigError(
                "SMTP_USERNAME and SMTP_PASSWORD required".to_string(),
            ));
        }
        if config.from_email.is_empty() {
            return Err(NotifyError::ConfigError(
                "SMTP_FROM_EMAIL not set".to_string(),
            ));
        }

        let credentials =
            Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)
            .map_err(|e| NotifyError::ConfigError(format!("SMTP relay error: {}", e)))?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
        })
    }

    async fn send(&self, to_email: &str, subject: &str, html_body: String) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(
                format!("{} <{}>", self.from_name, self.from_email)
                    .parse()
                    .map_err(|e| {
                        NotifyError::MessageBuild(format!("Invalid from address: {}", e))
                    })?,
            )
            .to(to_email
                .parse()
                .map_err(|e| NotifyError::MessageBuild(format!("Invalid to address: {}", e)))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body)
            .map_err(|e| NotifyError::MessageBuild(e.to_string()))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| NotifyError::SendFailed(e.to_string()))?;

        Ok(())
    }
}

// The code sits in a single selectable element so every mail client lets the
// user copy it in one gesture.
fn code_card(heading: &str, code: &str) -> String {
    let code_escaped = code.replace('<', "&lt;").replace('>', "&gt;");
    format!(
        r#"
<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
</head>
<body style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h1 style="color: #333;">{}</h1>
    <p>Use the code below to continue:</p>
    <p style="text-align: center; margin: 30px 0;">
        <code style="font-family: monospace; font-size: 28px; font-weight: 600; letter-spacing: 0.35em; background-color: #f5f5f5; padding: 16px 28px; border-radius: 4px; display: inline-block;">{}</code>
    </p>
    <p style="color: #999; font-size: 12px; margin-top: 40px;">This code will expire in 10 minutes. If you didn't request it, you can safely ignore this email.</p>
</body>
</html>
"#,
        heading, code_escaped
    )
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_signup_code(&self, to_email: &str, code: &str) -> Result<(), NotifyError> {
        let html_body = code_card("Confirm your signup", code);
        self.send(to_email, "Your signup verification code", html_body)
            .await
    }

    async fn send_login_code(&self, to_email: &str, code: &str) -> Result<(), NotifyError> {
        let html_body = code_card("Your login code", code);
        self.send(to_email, "Your login code", html_body).await
    }
}

pub fn create_notifier(config: &EmailConfig) -> Box<dyn Notifier> {
    if config.smtp_host.is_some() {
        match SmtpNotifier::from_config(config) {
            Ok(notifier) => {
                tracing::info!("Using SMTP notifier");
                Box::new(notifier)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize SMTP notifier: {}. Falling back to log notifier",
                    e
                );
                Box::new(LogNotifier)
            }
        }
    } else {
        tracing::info!("SMTP not configured. Codes will be logged to console");
        Box::new(LogNotifier)
    }
}
