//! Environment variable utilities
//!
//! Generic `env_get<T>` for parsing environment variables with defaults,
//! used by the runtime configuration layer.

use std::str::FromStr;

/// Get an environment variable parsed as `T`, or return the default
///
/// Works with any type that implements `FromStr`; parse failures fall back
/// to the default rather than erroring.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Get an environment variable as a boolean
///
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true. Anything
/// else counts as false; unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__STRAND_TEST_UNSET__", 11);
        assert_eq!(val, 11);
    }

    #[test]
    fn test_env_get_set() {
        std::env::set_var("__STRAND_TEST_NUM__", "123");
        let val: usize = env_get("__STRAND_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__STRAND_TEST_NUM__");
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__STRAND_TEST_BAD__", "not_a_number");
        let val: usize = env_get("__STRAND_TEST_BAD__", 7);
        assert_eq!(val, 7);
        std::env::remove_var("__STRAND_TEST_BAD__");
    }

    #[test]
    fn test_env_get_bool() {
        assert!(env_get_bool("__STRAND_TEST_UNSET__", true));
        assert!(!env_get_bool("__STRAND_TEST_UNSET__", false));

        std::env::set_var("__STRAND_TEST_BOOL__", "yes");
        assert!(env_get_bool("__STRAND_TEST_BOOL__", false));

        std::env::set_var("__STRAND_TEST_BOOL__", "0");
        assert!(!env_get_bool("__STRAND_TEST_BOOL__", true));

        std::env::remove_var("__STRAND_TEST_BOOL__");
    }
}
