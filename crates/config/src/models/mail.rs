use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// SMTP 邮件配置。disabled 时邮件只写日志
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
    pub from_name: String,
    /// 交接时是否同时给新负责人发邮件
    pub email_on_handoff: bool,
    pub timeout_seconds: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: "localhost".to_string(),
            smtp_port: 587,
            username: None,
            password: None,
            from_address: "tasks@localhost.localdomain".to_string(),
            from_name: "Task Manager".to_string(),
            email_on_handoff: true,
            timeout_seconds: 30,
        }
    }
}

impl MailConfig {
    /// `"Name <address>"` 形式的发件人
    pub fn sender(&self) -> String {
        if self.from_name.trim().is_empty() {
            self.from_address.clone()
        } else {
            format!("{} <{}>", self.from_name, self.from_address)
        }
    }
}

impl ConfigValidator for MailConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if !self.enabled {
            return Ok(());
        }

        ValidationUtils::validate_not_empty(&self.smtp_host, "mail.smtp_host")?;
        ValidationUtils::validate_port(self.smtp_port, "mail.smtp_port")?;
        ValidationUtils::validate_email(&self.from_address, "mail.from_address")?;
        ValidationUtils::validate_timeout_seconds(self.timeout_seconds, "mail.timeout_seconds")?;

        if self.username.is_some() != self.password.is_some() {
            return Err(crate::ConfigError::Validation(
                "mail.username and mail.password must be set together".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_mail_skips_validation() {
        let config = MailConfig {
            smtp_host: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_enabled_mail_validation() {
        let config = MailConfig {
            enabled: true,
            smtp_host: "smtp.example.com".to_string(),
            from_address: "tasks@example.com".to_string(),
            username: Some("tasks".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let mut invalid = config.clone();
        invalid.password = None;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.smtp_port = 0;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_sender_format() {
        let config = MailConfig {
            from_address: "tasks@example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(config.sender(), "Task Manager <tasks@example.com>");

        let bare = MailConfig {
            from_name: String::new(),
            ..config
        };
        assert_eq!(bare.sender(), "tasks@example.com");
    }
}
