//! Global CLI configuration, loaded from `~/.pcmd.cfg`.
//!
//! The file is plain `key=value` lines; `#` starts a comment and values may
//! be wrapped in single or double quotes. Recognized keys: `endpoint`
//! (the PMS base URL), `ak`, `sk`.

use std::path::PathBuf;

use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub endpoint: String,
    pub ak: String,
    pub sk: String,
}

impl Config {
    /// Loads `~/.pcmd.cfg`; a missing file is not an error, the flags can
    /// still provide everything.
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not read config file");
                Self::default()
            }
        }
    }

    fn parse(content: &str) -> Self {
        let mut config = Self::default();
        for (line_number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!(line = line_number + 1, "invalid config line, expected key=value");
                continue;
            };
            let key = key.trim();
            let value = unquote(value.trim());
            match key {
                "endpoint" => config.endpoint = value.to_string(),
                "ak" => config.ak = value.to_string(),
                "sk" => config.sk = value.to_string(),
                other => {
                    warn!(line = line_number + 1, key = other, "unknown config key");
                }
            }
        }
        config
    }
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        let (first, last) = (bytes[0], bytes[value.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".pcmd.cfg"))
}
