//! Common helper functions.

/// Reads a boolean flag from the environment. Unset variables give `default`.
pub fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => parse_bool(&value),
        Err(_) => default,
    }
}

pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_truthy() {
        for value in ["1", "true", "TRUE", " yes ", "On"] {
            assert!(parse_bool(value), "{value}");
        }
    }

    #[test]
    fn test_parse_bool_falsy() {
        for value in ["", "0", "false", "no", "off", "maybe"] {
            assert!(!parse_bool(value), "{value}");
        }
    }

    #[test]
    fn test_env_bool_unset_uses_default() {
        assert!(env_bool("HMD_TEST_FLAG_THAT_IS_NEVER_SET", true));
        assert!(!env_bool("HMD_TEST_FLAG_THAT_IS_NEVER_SET", false));
    }
}
