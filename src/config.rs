// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::Deserialize;

use crate::{
    arena::{DEFAULT_ARENA_BLOCK_SIZE, DEFAULT_ARENA_SIZE},
    events::bridge::{PARAMETER_QUEUE_CAPACITY, UI_QUEUE_CAPACITY},
};

mod error;

pub use error::ConfigError;

const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// A YAML representation of the engine configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct EngineConfig {
    /// The audio output device. The host's default device is used when unset.
    audio_device: Option<String>,

    /// Output sample rate in Hz (default: 44100).
    sample_rate: Option<u32>,

    /// The directory holding audio files, MIDI loops and scenes.
    storage_path: String,

    /// Bytes reserved for tracks and buffers (default: 524288).
    arena_size: Option<usize>,

    /// The MIDI input port to record from and pass through.
    midi_input: Option<String>,

    /// The MIDI output port that receives loops and passthrough.
    midi_output: Option<String>,

    /// Capacity of the control to engine queue (default: 1000).
    parameter_queue_size: Option<usize>,

    /// Capacity of the engine to control queue (default: 64).
    ui_queue_size: Option<usize>,

    /// A scene to load at startup, as `NAME.SCN`.
    startup_scene: Option<String>,
}

impl EngineConfig {
    /// Creates a configuration with every optional value unset.
    pub fn new(storage_path: &str) -> EngineConfig {
        EngineConfig {
            audio_device: None,
            sample_rate: None,
            storage_path: storage_path.to_string(),
            arena_size: None,
            midi_input: None,
            midi_output: None,
            parameter_queue_size: None,
            ui_queue_size: None,
            startup_scene: None,
        }
    }

    /// Parse the engine configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<EngineConfig, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<EngineConfig>()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_path.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "storage_path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.sample_rate() == 0 {
            return Err(ConfigError::Invalid {
                key: "sample_rate",
                reason: "must be positive".to_string(),
            });
        }
        if self.arena_size() < DEFAULT_ARENA_BLOCK_SIZE {
            return Err(ConfigError::Invalid {
                key: "arena_size",
                reason: format!("must be at least {} bytes", DEFAULT_ARENA_BLOCK_SIZE),
            });
        }
        for (key, size) in [
            ("parameter_queue_size", self.parameter_queue_size()),
            ("ui_queue_size", self.ui_queue_size()),
        ] {
            if size == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be positive".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn audio_device(&self) -> Option<&str> {
        self.audio_device.as_deref()
    }

    /// Returns the output sample rate (default: 44100)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    pub fn storage_path(&self) -> PathBuf {
        PathBuf::from(&self.storage_path)
    }

    /// Returns the arena size in bytes (default: 524288)
    pub fn arena_size(&self) -> usize {
        self.arena_size.unwrap_or(DEFAULT_ARENA_SIZE)
    }

    pub fn midi_input(&self) -> Option<&str> {
        self.midi_input.as_deref()
    }

    pub fn midi_output(&self) -> Option<&str> {
        self.midi_output.as_deref()
    }

    pub fn parameter_queue_size(&self) -> usize {
        self.parameter_queue_size
            .unwrap_or(PARAMETER_QUEUE_CAPACITY)
    }

    pub fn ui_queue_size(&self) -> usize {
        self.ui_queue_size.unwrap_or(UI_QUEUE_CAPACITY)
    }

    pub fn startup_scene(&self) -> Option<&str> {
        self.startup_scene.as_deref()
    }
}
