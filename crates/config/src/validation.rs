use std::net::SocketAddr;

use crate::ConfigResult;

/// Trait for configuration validation
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// General validation utilities
pub struct ValidationUtils;

impl ValidationUtils {
    /// Validate that a string is not empty
    pub fn validate_not_empty(value: &str, field_name: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// Validate that a port number is valid
    pub fn validate_port(port: u16, field_name: &str) -> ConfigResult<()> {
        if port == 0 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} cannot be 0"
            )));
        }
        Ok(())
    }

    /// Validate that a count is reasonable
    pub fn validate_count(count: usize, field_name: &str) -> ConfigResult<()> {
        if count == 0 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if count > 10000 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be less than or equal to 10000"
            )));
        }
        Ok(())
    }

    pub fn validate_timeout_seconds(timeout: u64, field_name: &str) -> ConfigResult<()> {
        if timeout == 0 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if timeout > 86_400 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be less than or equal to 86400 (1 day)"
            )));
        }
        Ok(())
    }

    pub fn validate_socket_addr(value: &str, field_name: &str) -> ConfigResult<()> {
        value.parse::<SocketAddr>().map(|_| ()).map_err(|e| {
            crate::ConfigError::Validation(format!("{field_name} is not a valid address: {e}"))
        })
    }

    /// Very small sanity check, the SMTP layer does the real parsing
    pub fn validate_email(value: &str, field_name: &str) -> ConfigResult<()> {
        Self::validate_not_empty(value, field_name)?;
        match value.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
            _ => Err(crate::ConfigError::Validation(format!(
                "{field_name} must be an email address"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_empty() {
        assert!(ValidationUtils::validate_not_empty("x", "f").is_ok());
        assert!(ValidationUtils::validate_not_empty("  ", "f").is_err());
    }

    #[test]
    fn test_validate_socket_addr() {
        assert!(ValidationUtils::validate_socket_addr("127.0.0.1:8080", "api").is_ok());
        assert!(ValidationUtils::validate_socket_addr("localhost", "api").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(ValidationUtils::validate_email("tasks@example.com", "from").is_ok());
        assert!(ValidationUtils::validate_email("tasks", "from").is_err());
        assert!(ValidationUtils::validate_email("@example.com", "from").is_err());
    }

    #[test]
    fn test_validate_count() {
        assert!(ValidationUtils::validate_count(0, "n").is_err());
        assert!(ValidationUtils::validate_count(8, "n").is_ok());
        assert!(ValidationUtils::validate_count(10001, "n").is_err());
    }
}
