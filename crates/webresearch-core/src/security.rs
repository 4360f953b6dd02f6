use std::env;

use crate::WebResearchError;

/// Wrapper around sensitive values to reduce accidental logging.
#[derive(Clone)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "***redacted***")
    }
}

/// Require that a given environment variable is set and non-empty.
pub fn require_env(var: &str) -> Result<SecretValue, WebResearchError> {
    optional_env(var).ok_or_else(|| WebResearchError::MissingSecret(var.to_string()))
}

/// Read an environment variable that may legitimately be absent (e.g. the
/// search key, whose absence switches the client to fallback data).
pub fn optional_env(var: &str) -> Option<SecretValue> {
    if var.trim().is_empty() {
        return None;
    }
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Some(SecretValue(value.trim().to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_env_success() {
        unsafe {
            std::env::set_var("WEBRESEARCH_TEST_SECRET", "value");
        }
        let secret = require_env("WEBRESEARCH_TEST_SECRET").expect("secret should load");
        assert_eq!(secret.expose(), "value");
    }

    #[test]
    fn require_env_missing() {
        unsafe {
            std::env::remove_var("WEBRESEARCH_TEST_SECRET_MISSING");
        }
        let err = require_env("WEBRESEARCH_TEST_SECRET_MISSING").unwrap_err();
        assert!(matches!(err, WebResearchError::MissingSecret(_)));
    }

    #[test]
    fn blank_values_count_as_missing() {
        unsafe {
            std::env::set_var("WEBRESEARCH_TEST_SECRET_BLANK", "   ");
        }
        assert!(optional_env("WEBRESEARCH_TEST_SECRET_BLANK").is_none());
        assert!(optional_env("").is_none());
    }

    #[test]
    fn debug_output_is_redacted() {
        let secret = SecretValue::new("sk-live-123");
        assert_eq!(format!("{secret:?}"), "***redacted***");
    }
}
