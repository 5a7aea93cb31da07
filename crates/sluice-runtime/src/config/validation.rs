//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BootConfig, LogOutput, LoggingConfig, ResponseConfig, ServerConfig, SluiceConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &SluiceConfig) -> ConfigResult<()> {
    validate_server_config(&config.server)?;
    validate_response_config(&config.response)?;
    validate_boot_config(&config.boot)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_server_config(server: &ServerConfig) -> ConfigResult<()> {
    if server.host.trim().is_empty() {
        return Err(ConfigError::missing_field("server.host"));
    }
    if server.port == 0 {
        return Err(ConfigError::InvalidPort(server.port));
    }
    if let Some(header) = &server.forwarded_ip_header
        && header.trim().is_empty()
    {
        return Err(ConfigError::validation(
            "server.forwarded_ip_header must not be empty when set",
        ));
    }
    Ok(())
}

fn validate_response_config(response: &ResponseConfig) -> ConfigResult<()> {
    if !(100..=599).contains(&response.missing_params_status) {
        return Err(ConfigError::InvalidStatus {
            field: "response.missing_params_status",
            code: response.missing_params_status,
        });
    }
    if response.charset.trim().is_empty() {
        return Err(ConfigError::missing_field("response.charset"));
    }
    if response.default_content_type.trim().is_empty() {
        return Err(ConfigError::missing_field("response.default_content_type"));
    }
    Ok(())
}

fn validate_boot_config(boot: &BootConfig) -> ConfigResult<()> {
    if boot.post_scan_workers == 0 {
        return Err(ConfigError::validation(
            "boot.post_scan_workers must be greater than 0",
        ));
    }
    if boot.post_scan_timeout_secs == 0 {
        return Err(ConfigError::validation(
            "boot.post_scan_timeout_secs must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    for module in logging.filters.keys() {
        if module.trim().is_empty() || module.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid logging filter target: {module:?}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&SluiceConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_port_and_host() {
        let mut config = SluiceConfig::default();
        config.server.port = 0;
        assert!(matches!(validate_config(&config), Err(ConfigError::InvalidPort(0))));

        let mut config = SluiceConfig::default();
        config.server.host = " ".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_validate_status_range() {
        let mut config = SluiceConfig::default();
        config.response.missing_params_status = 99;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidStatus { code: 99, .. })
        ));

        config.response.missing_params_status = 422;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_boot_and_logging() {
        let mut config = SluiceConfig::default();
        config.boot.post_scan_workers = 0;
        assert!(validate_config(&config).is_err());

        let mut config = SluiceConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());
        config.logging.file_path = Some("sluice.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
