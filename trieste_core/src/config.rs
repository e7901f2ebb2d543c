//! Store configuration.

use crate::error::{Error, Result};
use std::fmt;

/// When deletion cleanup runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CleanupPolicy {
    /// Cleanup runs inside `delete` under the store's write lock.
    #[default]
    Inline,
    /// Cleanup is handed to a worker thread; callers may wait on a signal.
    Background,
}

impl CleanupPolicy {
    /// Returns the string representation used in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupPolicy::Inline => "inline",
            CleanupPolicy::Background => "background",
        }
    }

    /// Parse a policy from its config-file name.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "inline" => Ok(CleanupPolicy::Inline),
            "background" => Ok(CleanupPolicy::Background),
            _ => Err(Error::invalid_config(format!(
                "Unknown cleanup policy: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for CleanupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for a [`crate::Store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// When deletion cleanup runs.
    pub cleanup: CleanupPolicy,
    /// Check each reconstructed file against its recorded digest.
    pub verify_digests: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cleanup: CleanupPolicy::Inline,
            verify_digests: true,
        }
    }
}

impl StoreConfig {
    /// Parse `key=value` config text.
    ///
    /// Recognized keys:
    /// - `version` (must be `1`)
    /// - `cleanup` (`inline` or `background`)
    /// - `verify` (`true` or `false`)
    ///
    /// Blank lines and lines starting with `#` are ignored; missing keys keep
    /// their defaults.
    pub fn parse(content: &str) -> Result<Self> {
        let mut config = StoreConfig::default();
        let mut version = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::invalid_config(format!("Expected key=value, got: {}", line)));
            };

            let value = value.trim();
            match key.trim() {
                "version" => version = Some(value),
                "cleanup" => config.cleanup = CleanupPolicy::parse(value)?,
                "verify" => {
                    config.verify_digests = value.parse::<bool>().map_err(|_| {
                        Error::invalid_config(format!("verify must be true or false, got: {}", value))
                    })?
                }
                other => {
                    return Err(Error::invalid_config(format!("Unknown key: {}", other)));
                }
            }
        }

        // Validate version
        if let Some(version) = version
            && version != "1"
        {
            return Err(Error::invalid_config(format!(
                "Unsupported config version: {}",
                version
            )));
        }

        Ok(config)
    }

    /// Render as config text accepted by [`StoreConfig::parse`].
    pub fn to_text(&self) -> String {
        format!(
            "version=1\ncleanup={}\nverify={}\n",
            self.cleanup, self.verify_digests
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let config = StoreConfig::parse("version=1\ncleanup=background\nverify=false\n").unwrap();
        assert_eq!(config.cleanup, CleanupPolicy::Background);
        assert!(!config.verify_digests);
    }

    #[test]
    fn test_parse_config_with_comments() {
        let content = "# store settings\n\nversion = 1\n  cleanup = inline  \n";
        let config = StoreConfig::parse(content).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn test_parse_config_empty_uses_defaults() {
        assert_eq!(StoreConfig::parse("").unwrap(), StoreConfig::default());
    }

    #[test]
    fn test_parse_config_invalid_version() {
        assert!(StoreConfig::parse("version=2\n").is_err());
    }

    #[test]
    fn test_parse_config_rejects_bad_lines() {
        assert!(StoreConfig::parse("cleanup=sometimes\n").is_err());
        assert!(StoreConfig::parse("verify=yes\n").is_err());
        assert!(StoreConfig::parse("colour=blue\n").is_err());
        assert!(StoreConfig::parse("just text\n").is_err());
    }

    #[test]
    fn test_to_text_roundtrip() {
        let config = StoreConfig {
            cleanup: CleanupPolicy::Background,
            verify_digests: false,
        };
        assert_eq!(StoreConfig::parse(&config.to_text()).unwrap(), config);
    }
}
