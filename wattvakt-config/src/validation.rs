//! Custom validation functions for configuration.

use chrono::NaiveTime;
use lazy_static::lazy_static;
use regex::Regex;
use validator::ValidationError;

use wattvakt_core::model::STALENESS_METRIC;

lazy_static! {
    static ref IDENTIFIER: Regex =
        Regex::new("^[A-Za-z0-9][A-Za-z0-9_.-]{0,63}$").expect("identifier pattern compiles");
}

/// Site ids, source names, kinds, metric names and rule ids share one shape.
pub fn validate_identifier(value: &str) -> Result<(), ValidationError> {
    if IDENTIFIER.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_identifier"))
    }
}

/// Rule ids must not collide with the per-site offline rule.
pub fn validate_rule_id(value: &str) -> Result<(), ValidationError> {
    validate_identifier(value)?;
    if value == STALENESS_METRIC {
        return Err(ValidationError::new("reserved_rule_id"));
    }
    Ok(())
}

/// Rules target real metrics; staleness is configured in its own section.
pub fn validate_rule_metric(value: &str) -> Result<(), ValidationError> {
    validate_identifier(value)?;
    if value == STALENESS_METRIC {
        return Err(ValidationError::new("reserved_metric"));
    }
    Ok(())
}

/// `HH:MM`, 24 hour clock.
pub fn validate_clock_time(value: &str) -> Result<(), ValidationError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map(|_| ())
        .map_err(|_| ValidationError::new("invalid_clock_time"))
}

pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"].contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(validate_identifier("high-country").is_ok());
        assert!(validate_identifier("eg4.cloud").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("-leading").is_err());
        assert!(validate_identifier("has space").is_err());
    }

    #[test]
    fn staleness_is_reserved() {
        assert!(validate_rule_id("staleness").is_err());
        assert!(validate_rule_metric("staleness").is_err());
        assert!(validate_rule_id("low-soc").is_ok());
    }

    #[test]
    fn clock_times() {
        assert!(validate_clock_time("08:00").is_ok());
        assert!(validate_clock_time("24:00").is_err());
        assert!(validate_clock_time("8am").is_err());
    }
}
