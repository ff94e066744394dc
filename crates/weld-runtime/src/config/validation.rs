//! Configuration validation utilities.

use super::error::{SettingsError, SettingsResult};
use super::schema::{HostSettings, LogOutput, LoggingConfig, WeldConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &WeldConfig) -> SettingsResult<()> {
    validate_logging_config(&config.logging)?;
    validate_host_settings(&config.host)?;
    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> SettingsResult<()> {
    if logging.output == LogOutput::File {
        match &logging.file_path {
            None => return Err(SettingsError::missing_field("logging.file_path")),
            Some(path) if path.file_name().is_none() => {
                return Err(SettingsError::validation(format!(
                    "Log file path has no file name: {}",
                    path.display()
                )));
            }
            Some(_) => {}
        }
    }

    for module in logging.filters.keys() {
        if module.is_empty() || module.contains(char::is_whitespace) {
            return Err(SettingsError::validation(format!(
                "Invalid log filter target: {module:?}"
            )));
        }
    }

    Ok(())
}

/// Validates the settings used for `%token%` resolution.
fn validate_host_settings(host: &HostSettings) -> SettingsResult<()> {
    for name in host.settings.keys() {
        validate_setting_name(name)?;
    }

    if let Some(prefix) = &host.name_resolution.env_prefix {
        if prefix.contains('%') || prefix.contains('=') {
            return Err(SettingsError::validation(format!(
                "Environment prefix cannot contain '%' or '=': {prefix:?}"
            )));
        }
    }

    Ok(())
}

/// A setting name must be usable between two `%` delimiters.
fn validate_setting_name(name: &str) -> SettingsResult<()> {
    if name.is_empty() {
        return Err(SettingsError::validation("Setting names cannot be empty"));
    }

    if name.contains('%') {
        return Err(SettingsError::validation(format!(
            "Setting name cannot contain '%': {name:?}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&WeldConfig::default()).is_ok());
    }

    #[test]
    fn test_file_output_requires_path() {
        let mut config = WeldConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(SettingsError::MissingField { .. })
        ));

        config.logging.file_path = Some(PathBuf::from("logs/weld.log"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_setting_names() {
        let mut config = WeldConfig::default();
        config.host.settings.insert("queue".into(), "orders".into());
        assert!(validate_config(&config).is_ok());

        config.host.settings.insert("bad%name".into(), "x".into());
        assert!(matches!(
            validate_config(&config),
            Err(SettingsError::ValidationError { .. })
        ));

        let mut config = WeldConfig::default();
        config.host.settings.insert(String::new(), "x".into());
        assert!(validate_config(&config).is_err());
    }
}
