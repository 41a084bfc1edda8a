use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use rotation_config::MailConfig;
use rotation_domain::ports::{Mailer, OutgoingMail};
use rotation_errors::{RotationError, RotationResult};
use tracing::{debug, instrument, warn};

/// 基于 lettre 的 SMTP 发送器，传输层在构造时建好并复用
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let from: Mailbox = config
            .sender()
            .parse()
            .with_context(|| format!("无效的发件人地址: {}", config.sender()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .with_context(|| format!("无法创建SMTP连接: {}", config.smtp_host))?
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.timeout_seconds)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, mail: &OutgoingMail) -> RotationResult<Message> {
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e| RotationError::delivery(&mail.to, format!("无效的收件人地址: {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.clone())
            .map_err(|e| RotationError::delivery(&mail.to, format!("构建邮件失败: {e}")))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[instrument(skip(self, mail), fields(to = %mail.to, subject = %mail.subject))]
    async fn send(&self, mail: &OutgoingMail) -> RotationResult<()> {
        let message = self.build_message(mail)?;

        self.transport.send(message).await.map_err(|e| {
            warn!("SMTP发送失败: {}", e);
            RotationError::delivery(&mail.to, format!("SMTP发送失败: {e}"))
        })?;

        debug!("📤 邮件已发送: {}", mail.to);
        Ok(())
    }
}
