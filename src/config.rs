use std::env;

use crate::error::VarselError;

/// Runtime settings, read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// HTTP server port (ingest + OTLP + health).
    pub http_port: u16,
    /// Hard cap on records per ingestion request.
    pub max_batch_size: usize,
    /// Concurrent rule evaluations per record.
    pub eval_concurrency: usize,
    /// When false, the cache gateway runs in no-cache mode: every get is a
    /// miss, every write a no-op.
    pub cache_enabled: bool,
    /// Default TTL for cached values, in seconds.
    pub cache_ttl_secs: u64,
    /// Optional directory of Sigma rule YAML files loaded at startup.
    pub rules_dir: Option<String>,
    /// Project the startup rules are loaded into.
    pub default_project: String,
}

impl Settings {
    /// Validates the settings and returns an error if invalid.
    pub fn validate(&self) -> Result<(), VarselError> {
        validate_port(self.http_port)?;
        if self.max_batch_size == 0 {
            return Err(VarselError::Config("Max batch size cannot be 0".into()));
        }
        if self.eval_concurrency == 0 {
            return Err(VarselError::Config("Eval concurrency cannot be 0".into()));
        }
        if self.cache_ttl_secs == 0 {
            return Err(VarselError::Config("Cache TTL cannot be 0".into()));
        }
        Ok(())
    }
}

/// Validates that the port is in valid range (1-65535).
fn validate_port(port: u16) -> Result<(), VarselError> {
    if port == 0 {
        return Err(VarselError::Config("Port cannot be 0".into()));
    }
    Ok(())
}

pub fn get_configuration() -> Result<Settings, Box<dyn std::error::Error>> {
    let http_port = env::var("HTTP_PORT")
        .unwrap_or_else(|_| "8600".to_string())
        .parse::<u16>()?;
    let max_batch_size = env::var("VARSEL_MAX_BATCH_SIZE")
        .unwrap_or_else(|_| "1000".to_string())
        .parse::<usize>()?;
    let eval_concurrency = env::var("VARSEL_EVAL_CONCURRENCY")
        .unwrap_or_else(|_| "8".to_string())
        .parse::<usize>()?;
    let cache_enabled = env::var("VARSEL_CACHE_ENABLED")
        .map(|v| v != "false" && v != "0")
        .unwrap_or(true);
    let cache_ttl_secs = env::var("VARSEL_CACHE_TTL_SECS")
        .unwrap_or_else(|_| "300".to_string())
        .parse::<u64>()?;
    let rules_dir = env::var("VARSEL_RULES_DIR").ok().filter(|v| !v.is_empty());
    let default_project =
        env::var("VARSEL_DEFAULT_PROJECT").unwrap_or_else(|_| "default".to_string());

    let settings = Settings {
        http_port,
        max_batch_size,
        eval_concurrency,
        cache_enabled,
        cache_ttl_secs,
        rules_dir,
        default_project,
    };

    // Validate settings before returning
    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_settings() -> Settings {
        Settings {
            http_port: 8600,
            max_batch_size: 1000,
            eval_concurrency: 8,
            cache_enabled: true,
            cache_ttl_secs: 300,
            rules_dir: None,
            default_project: "default".into(),
        }
    }

    #[test]
    fn test_validate_port_valid() {
        assert!(validate_port(80).is_ok());
        assert!(validate_port(8600).is_ok());
        assert!(validate_port(65535).is_ok());
        assert!(validate_port(1).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let result = validate_port(0);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Port cannot be 0"));
    }

    #[test]
    fn test_settings_validate_success() {
        assert!(valid_settings().validate().is_ok());
    }

    #[test]
    fn test_settings_validate_zero_port_fails() {
        let mut settings = valid_settings();
        settings.http_port = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_settings_validate_zero_batch_size_fails() {
        let mut settings = valid_settings();
        settings.max_batch_size = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_settings_validate_zero_concurrency_fails() {
        let mut settings = valid_settings();
        settings.eval_concurrency = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_settings_validate_zero_ttl_fails() {
        let mut settings = valid_settings();
        settings.cache_ttl_secs = 0;
        assert!(settings.validate().is_err());
    }
}
