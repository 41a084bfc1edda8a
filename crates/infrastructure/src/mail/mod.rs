//! 外发邮件适配器
//!
//! `mail.enabled = true` 时通过 SMTP 发送，否则只写日志。

mod log_mailer;
mod smtp_mailer;

pub use log_mailer::LogMailer;
pub use smtp_mailer::SmtpMailer;

use std::sync::Arc;

use anyhow::Result;
use rotation_config::MailConfig;
use rotation_domain::ports::Mailer;
use tracing::info;

pub fn build_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    if config.enabled {
        info!("使用SMTP邮件发送: {}:{}", config.smtp_host, config.smtp_port);
        Ok(Arc::new(SmtpMailer::new(config)?))
    } else {
        info!("邮件发送未启用，邮件内容只写入日志");
        Ok(Arc::new(LogMailer::new()))
    }
}
