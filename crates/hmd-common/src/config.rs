//! JSON configuration files.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{Error, Result};

/// Reads and parses a JSON config file. Missing fields fall back to the
/// target type's serde defaults.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::not_found(path.display()));
        }
        Err(err) => return Err(err.into()),
    };
    debug!("loaded config from {}", path.display());
    parse_json(&raw).map_err(|err| Error::config(format!("{}: {}", path.display(), err)))
}

pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        backend: String,
        mirror: bool,
        ticks: u32,
    }

    #[test]
    fn test_parse_partial_uses_defaults() {
        let sample: Sample = parse_json(r#"{"backend": "oculus_legacy"}"#).unwrap();
        assert_eq!(sample.backend, "oculus_legacy");
        assert!(!sample.mirror);
        assert_eq!(sample.ticks, 0);
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        let result: Result<Sample> = parse_json(r#"{"mirror": "yes"}"#);
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let path = std::env::temp_dir().join("hmd-common-missing-config.json");
        let result: Result<Sample> = load_json(&path);
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_load_from_disk() {
        let path = std::env::temp_dir().join(format!("hmd-common-{}.json", std::process::id()));
        fs::write(&path, r#"{"mirror": true, "ticks": 90}"#).unwrap();
        let sample: Sample = load_json(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(
            sample,
            Sample {
                backend: String::new(),
                mirror: true,
                ticks: 90,
            }
        );
    }

    #[test]
    fn test_load_malformed_names_the_file() {
        let path = std::env::temp_dir().join(format!("hmd-common-bad-{}.json", std::process::id()));
        fs::write(&path, "{ not json").unwrap();
        let result: Result<Sample> = load_json(&path);
        fs::remove_file(&path).unwrap();
        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("hmd-common-bad")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
