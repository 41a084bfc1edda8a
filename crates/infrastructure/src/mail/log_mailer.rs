use async_trait::async_trait;
use rotation_domain::ports::{Mailer, OutgoingMail};
use rotation_errors::RotationResult;
use tracing::info;

/// 不外发，只记录日志；开发环境和未配置SMTP时使用
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

impl LogMailer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> RotationResult<()> {
        info!(to = %mail.to, subject = %mail.subject, "📧 邮件(未发送): {}", mail.body);
        Ok(())
    }
}
