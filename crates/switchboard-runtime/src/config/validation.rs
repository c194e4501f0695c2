//! Configuration validation.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogLevel, LogOutput, SwitchboardConfig};

/// Largest accepted user-wide cooldown.
const MAX_USER_COOLDOWN_SECS: u64 = 3600;

/// Accepted duplicate-notification suppression windows.
const DEDUPE_WINDOW_RANGE_SECS: std::ops::RangeInclusive<u64> = 5..=10;

/// Validates the entire configuration.
pub fn validate_config(config: &SwitchboardConfig) -> ConfigResult<()> {
    validate_logging(config)?;
    validate_dispatch(config)?;
    validate_resolver(config)?;
    validate_errors(config)?;
    Ok(())
}

fn validate_logging(config: &SwitchboardConfig) -> ConfigResult<()> {
    let logging = &config.logging;
    logging
        .level
        .parse::<LogLevel>()
        .map_err(|e| ConfigError::validation("logging.level", e))?;

    for (target, level) in &logging.filters {
        level
            .parse::<LogLevel>()
            .map_err(|e| ConfigError::validation(format!("logging.filters.{target}"), e))?;
    }

    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path",
            "required when output is 'file'",
        ));
    }
    Ok(())
}

fn validate_dispatch(config: &SwitchboardConfig) -> ConfigResult<()> {
    if config.cooldown.sweep_interval_secs == 0 {
        return Err(ConfigError::validation(
            "cooldown.sweep_interval_secs",
            "must be greater than 0",
        ));
    }
    if config.dispatch.staleness_secs == 0 {
        return Err(ConfigError::validation(
            "dispatch.staleness_secs",
            "must be greater than 0",
        ));
    }
    if config.dispatch.ingress_capacity == 0 {
        return Err(ConfigError::validation(
            "dispatch.ingress_capacity",
            "must be greater than 0",
        ));
    }
    if config.dispatch.user_cooldown_secs > MAX_USER_COOLDOWN_SECS {
        return Err(ConfigError::validation(
            "dispatch.user_cooldown_secs",
            format!("must be at most {MAX_USER_COOLDOWN_SECS}"),
        ));
    }
    Ok(())
}

fn validate_resolver(config: &SwitchboardConfig) -> ConfigResult<()> {
    if config.resolver.cache_capacity == 0 {
        return Err(ConfigError::validation(
            "resolver.cache_capacity",
            "must be greater than 0",
        ));
    }
    let fraction = config.resolver.eviction_fraction;
    if !(fraction > 0.0 && fraction <= 1.0) {
        return Err(ConfigError::validation(
            "resolver.eviction_fraction",
            format!("must be in (0, 1], got {fraction}"),
        ));
    }
    Ok(())
}

fn validate_errors(config: &SwitchboardConfig) -> ConfigResult<()> {
    let errors = &config.errors;
    if errors.ring_capacity == 0 {
        return Err(ConfigError::validation(
            "errors.ring_capacity",
            "must be greater than 0",
        ));
    }
    if !DEDUPE_WINDOW_RANGE_SECS.contains(&errors.dedupe_window_secs) {
        return Err(ConfigError::validation(
            "errors.dedupe_window_secs",
            "must be between 5 and 10",
        ));
    }
    if errors.notification_budget == 0 {
        return Err(ConfigError::validation(
            "errors.notification_budget",
            "must be greater than 0",
        ));
    }
    if errors.budget_window_secs == 0 {
        return Err(ConfigError::validation(
            "errors.budget_window_secs",
            "must be greater than 0",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: ConfigResult<()>) -> String {
        match result {
            Err(ConfigError::ValidationError { field, .. }) => field,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&SwitchboardConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = SwitchboardConfig::default();
        config.logging.level = "invalid".to_string();
        assert_eq!(field_of(validate_config(&config)), "logging.level");

        let mut config = SwitchboardConfig::default();
        config
            .logging
            .filters
            .insert("switchboard_framework".into(), "chatty".into());
        assert_eq!(
            field_of(validate_config(&config)),
            "logging.filters.switchboard_framework"
        );
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = SwitchboardConfig::default();
        config.logging.output = LogOutput::File;
        assert_eq!(field_of(validate_config(&config)), "logging.file_path");
    }

    #[test]
    fn test_numeric_bounds() {
        let cases: Vec<(fn(&mut SwitchboardConfig), &str)> = vec![
            (|c| c.cooldown.sweep_interval_secs = 0, "cooldown.sweep_interval_secs"),
            (|c| c.dispatch.user_cooldown_secs = 3601, "dispatch.user_cooldown_secs"),
            (|c| c.resolver.cache_capacity = 0, "resolver.cache_capacity"),
            (|c| c.resolver.eviction_fraction = 0.0, "resolver.eviction_fraction"),
            (|c| c.resolver.eviction_fraction = 1.5, "resolver.eviction_fraction"),
            (|c| c.errors.ring_capacity = 0, "errors.ring_capacity"),
            (|c| c.errors.dedupe_window_secs = 4, "errors.dedupe_window_secs"),
            (|c| c.errors.dedupe_window_secs = 11, "errors.dedupe_window_secs"),
            (|c| c.errors.notification_budget = 0, "errors.notification_budget"),
        ];
        for (mutate, field) in cases {
            let mut config = SwitchboardConfig::default();
            mutate(&mut config);
            assert_eq!(field_of(validate_config(&config)), field);
        }

        let mut config = SwitchboardConfig::default();
        config.dispatch.user_cooldown_secs = 3600;
        config.resolver.eviction_fraction = 1.0;
        config.errors.dedupe_window_secs = 10;
        assert!(validate_config(&config).is_ok());
    }
}
