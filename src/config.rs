//! TOML configuration
//!
//! ```toml
//! [sink]
//! width = 256
//! height = 256
//! start_pattern = "10101010"
//! end_pattern = ""
//! drop_pattern = ""
//! skip_zero_bytes = false
//! flush_on_close = false
//!
//! [runtime]
//! buffer_size = 1000
//! watchdog_threshold_ms = 5000
//!
//! [viewer]
//! zoom = 4
//! fps = 60
//! ```
//!
//! Every key is optional; missing keys take the defaults shown above.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::viz::BitPattern;
use crate::{BinvizError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BinvizConfig {
    pub sink: VizConfig,
    pub runtime: RuntimeConfig,
    pub viewer: ViewerConfig,
}

/// Parameters of the visualization sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VizConfig {
    pub width: usize,
    pub height: usize,
    pub start_pattern: String,
    pub end_pattern: String,
    pub drop_pattern: String,
    pub skip_zero_bytes: bool,
    /// Paint bits still held for pattern matching when the stream ends
    pub flush_on_close: bool,
}

impl Default for VizConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            start_pattern: String::new(),
            end_pattern: String::new(),
            drop_pattern: String::new(),
            skip_zero_bytes: false,
            flush_on_close: false,
        }
    }
}

impl VizConfig {
    /// Reject zero geometry and any pattern with characters other than 0/1
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(BinvizError::InvalidGeometry {
                width: self.width,
                height: self.height,
            });
        }
        BitPattern::parse(&self.start_pattern)?;
        BitPattern::parse(&self.end_pattern)?;
        BitPattern::parse(&self.drop_pattern)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Channel capacity per connection, in items
    pub buffer_size: usize,
    pub watchdog_threshold_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            buffer_size: crate::runtime::pipeline::DEFAULT_BUFFER_SIZE,
            watchdog_threshold_ms: 5000,
        }
    }
}

impl RuntimeConfig {
    pub fn watchdog_threshold(&self) -> Duration {
        Duration::from_millis(self.watchdog_threshold_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    pub zoom: usize,
    pub fps: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self { zoom: 4, fps: 60 }
    }
}

impl BinvizConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.sink.validate()?;
        if self.runtime.buffer_size == 0 {
            return Err(BinvizError::Config("runtime.buffer_size must be at least 1".to_string()));
        }
        if self.runtime.watchdog_threshold_ms == 0 {
            return Err(BinvizError::Config(
                "runtime.watchdog_threshold_ms must be at least 1".to_string(),
            ));
        }
        if self.viewer.zoom == 0 {
            return Err(BinvizError::Config("viewer.zoom must be at least 1".to_string()));
        }
        if self.viewer.fps == 0 {
            return Err(BinvizError::Config("viewer.fps must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = BinvizConfig::from_toml_str("").unwrap();
        assert_eq!(config, BinvizConfig::default());
        assert_eq!(config.viewer.zoom, 4);
        assert_eq!(config.runtime.buffer_size, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections() {
        let config = BinvizConfig::from_toml_str(
            r#"
            [sink]
            width = 64
            end_pattern = "0110"
            skip_zero_bytes = true
            "#,
        )
        .unwrap();
        assert_eq!(config.sink.width, 64);
        assert_eq!(config.sink.height, 256);
        assert_eq!(config.sink.end_pattern, "0110");
        assert!(config.sink.skip_zero_bytes);
        assert!(!config.sink.flush_on_close);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = BinvizConfig::from_toml_str("[sink]\ncolour = 3\n").unwrap_err();
        assert!(matches!(err, BinvizError::ConfigParse(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = BinvizConfig::default();
        config.sink.drop_pattern = "01a".to_string();
        assert!(matches!(config.validate(), Err(BinvizError::InvalidPattern { ch: 'a', .. })));

        let mut config = BinvizConfig::default();
        config.sink.height = 0;
        assert!(matches!(config.validate(), Err(BinvizError::InvalidGeometry { .. })));

        let mut config = BinvizConfig::default();
        config.viewer.zoom = 0;
        assert!(matches!(config.validate(), Err(BinvizError::Config(_))));
    }

    #[test]
    fn test_serialized_defaults_parse_back() {
        let config = BinvizConfig::default();
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("[sink]"));
        assert_eq!(BinvizConfig::from_toml_str(&text).unwrap(), config);
    }
}
