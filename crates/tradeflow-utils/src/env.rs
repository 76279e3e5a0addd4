//! Typed environment overrides

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// An environment variable was set but could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid value '{value}' for {key}: {reason}")]
pub struct EnvError {
    pub key: String,
    pub value: String,
    pub reason: String,
}

/// Read and parse `key`
///
/// Unset or blank variables are `Ok(None)`; a value that does not parse is
/// an error rather than being ignored.
pub fn env_var<T>(key: &str) -> Result<Option<T>, EnvError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Ok(raw) = std::env::var(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    trimmed.parse::<T>().map(Some).map_err(|e| EnvError {
        key: key.to_string(),
        value: raw.clone(),
        reason: e.to_string(),
    })
}

/// Read a duration given in (possibly fractional) seconds
pub fn env_duration_secs(key: &str) -> Result<Option<Duration>, EnvError> {
    match env_var::<f64>(key)? {
        Some(secs) if secs.is_finite() && secs >= 0.0 => Ok(Some(Duration::from_secs_f64(secs))),
        Some(secs) => Err(EnvError {
            key: key.to_string(),
            value: secs.to_string(),
            reason: "expected a non-negative number of seconds".to_string(),
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_is_none() {
        let value: Option<u32> = env_var("TRADEFLOW_TEST_DEFINITELY_UNSET").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_parse_and_reject() {
        // SAFETY: the keys are unique to this test
        unsafe {
            std::env::set_var("TRADEFLOW_TEST_ENV_ROUNDS", " 3 ");
            std::env::set_var("TRADEFLOW_TEST_ENV_BAD", "three");
            std::env::set_var("TRADEFLOW_TEST_ENV_TIMEOUT", "1.5");
        }

        assert_eq!(env_var::<u32>("TRADEFLOW_TEST_ENV_ROUNDS").unwrap(), Some(3));
        let err = env_var::<u32>("TRADEFLOW_TEST_ENV_BAD").unwrap_err();
        assert_eq!(err.key, "TRADEFLOW_TEST_ENV_BAD");
        assert_eq!(
            env_duration_secs("TRADEFLOW_TEST_ENV_TIMEOUT").unwrap(),
            Some(Duration::from_millis(1500))
        );
    }
}
