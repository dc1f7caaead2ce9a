//! Emulator configuration loading.
//!
//! INI is the sole config source; no environment variable overrides.
//! Default config path: `config.ini` in the working directory.
//!
//! # Layout
//! - `[general]`: `fragment_size` (default 4), `frame_time` seconds
//!   (default 0.1), optional `seed` for reproducible SNR/TDRIFT draws.
//! - One `[interface_*]` section per emulated station, each requiring
//!   `port`, `callsign`, `frequency` (Hz), `offset` (Hz), `maidenhead`.
//!
//! String values may be quoted; quotes are stripped.  Unknown keys are
//! ignored.  `port = 0` asks the OS for an ephemeral port and is exempt
//! from the duplicate-port check.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

const DEFAULT_FRAGMENT_SIZE: usize = 4;
const DEFAULT_FRAME_TIME_SECS: f64 = 0.1;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Validated emulator configuration.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    pub fragment_size: usize,
    pub frame_time: Duration,
    pub seed: Option<u64>,
    pub interfaces: Vec<InterfaceConfig>,
}

/// One `[interface_*]` section.
#[derive(Debug, Clone)]
pub struct InterfaceConfig {
    /// Section name, kept for diagnostics.
    pub section: String,
    pub port: u16,
    pub callsign: String,
    pub dial_hz: u64,
    pub offset_hz: u64,
    pub grid: String,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(String),
    #[error("missing section [{0}]")]
    MissingSection(String),
    #[error("missing required key '{key}' in section [{section}]")]
    MissingKey { section: String, key: String },
    #[error("invalid value for '{key}' in section [{section}]: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        reason: String,
    },
    #[error("duplicate port {port} in sections [{first}] and [{second}]")]
    DuplicatePort {
        port: u16,
        first: String,
        second: String,
    },
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load the emulator config from a file path.
pub fn load_config_from_path(path: &Path) -> Result<EmulatorConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_config_from_str(&text)
}

/// Load the emulator config from INI text.
pub fn load_config_from_str(text: &str) -> Result<EmulatorConfig, ConfigError> {
    let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let general = ini
        .section(Some("general"))
        .ok_or_else(|| ConfigError::MissingSection("general".to_owned()))?;
    let fragment_size: usize =
        parse_optional(general, "general", "fragment_size")?.unwrap_or(DEFAULT_FRAGMENT_SIZE);
    if fragment_size == 0 {
        return Err(invalid("general", "fragment_size", "must be positive"));
    }
    let frame_time_secs: f64 =
        parse_optional(general, "general", "frame_time")?.unwrap_or(DEFAULT_FRAME_TIME_SECS);
    if !frame_time_secs.is_finite() || frame_time_secs <= 0.0 {
        return Err(invalid("general", "frame_time", "must be a positive number"));
    }
    let seed: Option<u64> = parse_optional(general, "general", "seed")?;

    let mut interfaces = Vec::new();
    let mut ports_seen: HashMap<u16, String> = HashMap::new();
    for (section, props) in ini.iter() {
        let Some(section) = section else { continue };
        if !section.starts_with("interface") {
            continue;
        }
        let iface = parse_interface(section, props)?;
        if iface.port != 0 {
            if let Some(first) = ports_seen.insert(iface.port, section.to_owned()) {
                return Err(ConfigError::DuplicatePort {
                    port: iface.port,
                    first,
                    second: section.to_owned(),
                });
            }
        }
        interfaces.push(iface);
    }
    if interfaces.is_empty() {
        return Err(ConfigError::MissingSection("interface_*".to_owned()));
    }

    Ok(EmulatorConfig {
        fragment_size,
        frame_time: Duration::from_secs_f64(frame_time_secs),
        seed,
        interfaces,
    })
}

// ---------------------------------------------------------------------------
// Section parsing
// ---------------------------------------------------------------------------

fn parse_interface(section: &str, props: &Properties) -> Result<InterfaceConfig, ConfigError> {
    let port: u16 = parse_required(props, section, "port")?;
    let callsign = unquote(require(props, section, "callsign")?).to_owned();
    if callsign.is_empty() {
        return Err(invalid(section, "callsign", "must not be empty"));
    }
    let dial_hz: u64 = parse_required(props, section, "frequency")?;
    if dial_hz == 0 {
        return Err(invalid(section, "frequency", "must be positive"));
    }
    let offset_hz: u64 = parse_required(props, section, "offset")?;
    if offset_hz == 0 {
        return Err(invalid(section, "offset", "must be positive"));
    }
    let grid = unquote(require(props, section, "maidenhead")?).to_owned();

    Ok(InterfaceConfig {
        section: section.to_owned(),
        port,
        callsign,
        dial_hz,
        offset_hz,
        grid,
    })
}

fn require<'a>(props: &'a Properties, section: &str, key: &str) -> Result<&'a str, ConfigError> {
    props.get(key).ok_or_else(|| ConfigError::MissingKey {
        section: section.to_owned(),
        key: key.to_owned(),
    })
}

fn parse_required<T: FromStr>(
    props: &Properties,
    section: &str,
    key: &str,
) -> Result<T, ConfigError> {
    let raw = require(props, section, key)?;
    unquote(raw)
        .parse()
        .map_err(|_| invalid(section, key, &format!("'{raw}' is not a valid number")))
}

fn parse_optional<T: FromStr>(
    props: &Properties,
    section: &str,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match props.get(key) {
        None => Ok(None),
        Some(raw) => unquote(raw)
            .parse()
            .map(Some)
            .map_err(|_| invalid(section, key, &format!("'{raw}' is not a valid number"))),
    }
}

fn invalid(section: &str, key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_owned(),
        key: key.to_owned(),
        reason: reason.to_owned(),
    }
}

/// Strip one matching pair of surrounding quotes, if present.
fn unquote(raw: &str) -> &str {
    let trimmed = raw.trim();
    for quote in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}
