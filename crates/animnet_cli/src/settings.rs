// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host settings, stored as RON.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// Default settings file name
pub const SETTINGS_FILE_NAME: &str = "animnet.ron";

/// Audio and frame settings used when running networks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    /// Settings format version
    pub version: u32,
    /// Sample rate of the synthesised audio
    pub sample_rate: u32,
    /// FFT size; the spectrum has half as many bins
    pub fft_size: u32,
    /// Frames per second
    pub fps: f64,
    /// Tracing filter used when `RUST_LOG` is unset
    pub log_directive: String,
    /// Frames to run when none are given
    pub default_frames: u32,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            sample_rate: 44_100,
            fft_size: 2048,
            fps: 60.0,
            log_directive: "animnet=info,animnet_graph=info".to_string(),
            default_frames: 120,
        }
    }
}

impl HostSettings {
    /// Load settings, falling back to defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron(&content)
    }

    /// Parse settings and check their version
    pub fn from_ron(content: &str) -> Result<Self, SettingsError> {
        let settings: HostSettings = ron::from_str(content)?;

        if settings.version > SETTINGS_FORMAT_VERSION {
            return Err(SettingsError::UnsupportedVersion {
                found: settings.version,
                supported: SETTINGS_FORMAT_VERSION,
            });
        }
        if settings.fft_size < 2 || settings.fft_size % 2 != 0 {
            return Err(SettingsError::InvalidFftSize(settings.fft_size));
        }

        Ok(settings)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        let content = ron::ser::to_string_pretty(self, config)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Seconds between frames
    pub fn frame_interval(&self) -> f64 {
        if self.fps > 0.0 {
            1.0 / self.fps
        } else {
            0.0
        }
    }
}

/// Error loading or saving settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Settings file could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file is not valid RON
    #[error("Settings parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Settings could not be serialized
    #[error("Settings serialization error: {0}")]
    Serialize(#[from] ron::Error),

    /// Written by a newer version
    #[error("Settings version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Newest version understood
        supported: u32,
    },

    /// FFT size must be even and at least 2
    #[error("Invalid FFT size: {0}")]
    InvalidFftSize(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = HostSettings::default();
        assert_eq!(settings.version, SETTINGS_FORMAT_VERSION);
        assert_eq!(settings.fft_size, 2048);
        assert!((settings.frame_interval() - 1.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_settings_serialization() {
        let settings = HostSettings {
            fps: 30.0,
            ..Default::default()
        };
        let ron_str = ron::ser::to_string_pretty(&settings, ron::ser::PrettyConfig::default()).unwrap();
        let loaded = HostSettings::from_ron(&ron_str).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_settings_use_defaults() {
        let loaded = HostSettings::from_ron("(fps: 24.0)").unwrap();
        assert_eq!(loaded.fps, 24.0);
        assert_eq!(loaded.sample_rate, 44_100);
    }

    #[test]
    fn test_newer_version_rejected() {
        let result = HostSettings::from_ron("(version: 99)");
        assert!(matches!(
            result,
            Err(SettingsError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_odd_fft_size_rejected() {
        let result = HostSettings::from_ron("(fft_size: 1023)");
        assert!(matches!(result, Err(SettingsError::InvalidFftSize(1023))));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("animnet-settings-that-does-not-exist.ron");
        let settings = HostSettings::load_or_default(&path).unwrap();
        assert_eq!(settings, HostSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("animnet-settings-{}.ron", std::process::id()));
        let settings = HostSettings {
            default_frames: 10,
            ..Default::default()
        };
        settings.save(&path).unwrap();
        let loaded = HostSettings::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, settings);
    }
}
