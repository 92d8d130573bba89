use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::core::conductor::RenderSettings;
use crate::core::note::NoteLengths;
use crate::core::tone::MAX_AMPLITUDE;

/// Player settings, read from JSON; missing fields take their defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    /// Samples per second of the 8-bit mono output
    pub sample_rate: u32,
    /// Length of a whole note in milliseconds
    pub measure_length_ms: u32,
    /// Silence after every note
    pub gap_ms: u32,
    /// Peak sample value, at most 127
    pub amplitude: u8,
    /// How far device writes may run ahead of playback
    pub device_buffer_ms: u32,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48 * 1024, // ~48KHz
            measure_length_ms: 1000,
            gap_ms: 50,
            amplitude: MAX_AMPLITUDE,
            device_buffer_ms: 250,
        }
    }
}

impl PlayerSettings {
    /// Load settings from `path`, or from the default location if it exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let default_path = Self::default_path()?;
                if default_path.exists() {
                    Self::load_from_file(&default_path)?
                } else {
                    debug!("No settings at {}, using defaults", default_path.display());
                    Self::default()
                }
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open settings file {}", path.display()))?;
        let settings = serde_json::from_reader(file)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create settings directory")?;
        }
        let file = File::create(path).context("Failed to create settings file")?;
        serde_json::to_writer_pretty(file, self).context("Failed to write settings")?;
        Ok(())
    }

    /// `<config dir>/bellchoir/settings.json`
    pub fn default_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        path.push("bellchoir");
        path.push("settings.json");
        Ok(path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            bail!("sample_rate must be positive");
        }
        if self.measure_length_ms == 0 {
            bail!("measure_length_ms must be positive");
        }
        if self.gap_ms > self.measure_length_ms {
            bail!(
                "gap_ms ({}) cannot exceed measure_length_ms ({})",
                self.gap_ms,
                self.measure_length_ms
            );
        }
        if self.amplitude > MAX_AMPLITUDE {
            bail!("amplitude must be at most {}", MAX_AMPLITUDE);
        }
        Ok(())
    }

    pub fn note_lengths(&self) -> NoteLengths {
        NoteLengths::new(self.measure_length_ms)
    }

    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            sample_rate: self.sample_rate,
            lengths: self.note_lengths(),
            gap_ms: self.gap_ms,
        }
    }
}
