// Persistent configuration: machine variant, clock, audio, trace options.
// Stored as JSON in <config_dir>/bns/config.json

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::emu::cpu::DEFAULT_CLOCK_HZ;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Machine variant: "bsplus" or "bl40".
    pub variant: String,
    /// CPU clock in Hz.
    pub clock_hz: u32,
    /// Enable SSI-263 audio output.
    pub audio: bool,
    /// Path to an extracted phoneme bank; `None` uses the built-in
    /// placeholder.
    pub phoneme_bank: Option<String>,
    /// Flush the I/O trace ring every chunk.
    pub trace_io: bool,
    /// Log interrupt-line edges.
    pub trace_irq: bool,
    /// Decode ITC register writes.
    pub trace_itc: bool,
    /// Last directory a ROM was loaded from.
    pub last_rom_dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            variant: "bsplus".to_string(),
            clock_hz: DEFAULT_CLOCK_HZ,
            audio: false,
            phoneme_bank: None,
            trace_io: false,
            trace_irq: false,
            trace_itc: false,
            last_rom_dir: None,
        }
    }
}

impl Config {
    /// Path to the config file.
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|d| d.join("config.json"))
    }

    /// Load config from disk, or return defaults if not found / invalid.
    pub fn load() -> Self {
        let path = match Self::config_path() {
            Some(p) => p,
            None => return Self::default(),
        };
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                eprintln!("[bns] Invalid config ({e}), using defaults");
                Self::default()
            }),
            Err(e) => {
                eprintln!("[bns] Cannot read config: {e}");
                Self::default()
            }
        }
    }

    /// Save config to disk.
    pub fn save(&self) {
        let path = match Self::config_path() {
            Some(p) => p,
            None => return,
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    eprintln!("[bns] Cannot save config: {e}");
                }
            }
            Err(e) => eprintln!("[bns] Cannot serialize config: {e}"),
        }
    }

    /// Remember the directory a ROM was loaded from.
    pub fn remember_rom_dir(&mut self, path: &std::path::Path) {
        if let Some(parent) = path.parent() {
            self.last_rom_dir = Some(parent.to_string_lossy().into_owned());
            self.save();
        }
    }
}

fn config_dir() -> Option<PathBuf> {
    // macOS:   ~/Library/Application Support/bns/
    // Linux:   ~/.config/bns/
    // Windows: %APPDATA%/bns/

    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME").ok()?;
        Some(
            PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("bns"),
        )
    }

    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").ok()?;
        Some(PathBuf::from(appdata).join("bns"))
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return Some(PathBuf::from(xdg).join("bns"));
        }
        let home = std::env::var("HOME").ok()?;
        Some(PathBuf::from(home).join(".config").join("bns"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.variant, "bsplus");
        assert_eq!(back.clock_hz, DEFAULT_CLOCK_HZ);
        assert!(!back.audio);
    }

    #[test]
    fn test_unknown_and_missing_fields_are_tolerated() {
        let config: Config =
            serde_json::from_str(r#"{"audio": true, "not_a_field": 1}"#).unwrap();
        assert!(config.audio);
        assert_eq!(config.variant, "bsplus");
    }
}
