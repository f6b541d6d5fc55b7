// src/core/waf/keywords.rs

//! Loads the literal-substring keyword lists the firewall scans for.

use crate::core::errors::RampartError;
use serde::Deserialize;

/// The two named sequences of the keyword file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Keywords {
    #[serde(default)]
    pub command_injection: Vec<String>,
    #[serde(default)]
    pub path_traversal: Vec<String>,
}

impl Keywords {
    /// Reads and parses the keyword file. A missing or malformed file is a
    /// configuration error, fatal at startup.
    pub fn load(path: &str) -> Result<Self, RampartError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RampartError::Config(format!("cannot read keywords file '{path}': {e}")))?;
        serde_yaml::from_str(&raw)
            .map_err(|e| RampartError::Config(format!("malformed keywords file '{path}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn keyword_file_parses_both_sequences() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "command_injection:\n  - \"; ls\"\n  - \"| cat\"\npath_traversal:\n  - \"../\""
        )
        .unwrap();
        let keywords = Keywords::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(keywords.command_injection.len(), 2);
        assert_eq!(keywords.path_traversal, vec!["../"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Keywords::load("/nonexistent/keywords.yml").is_err());
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "command_injection: {{not valid").unwrap();
        assert!(Keywords::load(file.path().to_str().unwrap()).is_err());
    }
}
