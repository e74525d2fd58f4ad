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
use std::{fmt, sync::Arc};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{error, info};

use super::HostError;
use crate::{grid::BLOCK_SIZE, sequencer::Sequencer};

/// Output channels the engine renders.
const OUTPUT_CHANNELS: u16 = 2;

/// Full scale of the mixed output.
const OUTPUT_SCALE: f32 = 2048.0;

/// An output device found on one of the audio hosts.
pub struct OutputDevice {
    pub name: String,
    pub host: String,
    pub max_channels: u16,
}

impl fmt::Display for OutputDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

/// Adapts callbacks of any length to the engine's fixed blocks.
///
/// Blocks are produced on demand and consumed frame by frame, so a callback may end
/// in the middle of a block.
pub struct BlockRenderer {
    left: Vec<i16>,
    right: Vec<i16>,
    position: usize,
}

impl BlockRenderer {
    pub fn new() -> BlockRenderer {
        BlockRenderer {
            left: vec![0; BLOCK_SIZE],
            right: vec![0; BLOCK_SIZE],
            position: BLOCK_SIZE,
        }
    }

    /// Fills interleaved `data` with `channels` channels. `produce` renders the next
    /// block and returns false if it could not, in which case that block is silent.
    pub fn render<F>(&mut self, data: &mut [f32], channels: usize, mut produce: F)
    where
        F: FnMut(&mut [i16], &mut [i16]) -> bool,
    {
        let channels = channels.max(1);
        for frame in data.chunks_mut(channels) {
            if self.position == BLOCK_SIZE {
                if !produce(&mut self.left, &mut self.right) {
                    self.left.fill(0);
                    self.right.fill(0);
                }
                self.position = 0;
            }

            let left = f32::from(self.left[self.position]) / OUTPUT_SCALE;
            let right = f32::from(self.right[self.position]) / OUTPUT_SCALE;
            self.position += 1;

            match frame {
                [mono] => *mono = (left + right) / 2.0,
                [l, r, rest @ ..] => {
                    *l = left;
                    *r = right;
                    rest.fill(0.0);
                }
                [] => {}
            }
        }
    }
}

impl Default for BlockRenderer {
    fn default() -> Self {
        BlockRenderer::new()
    }
}

/// Lists output devices on every available host.
pub fn list_devices() -> Result<Vec<OutputDevice>, HostError> {
    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host_devices = match cpal::host_from_id(host_id)?.devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let Ok(output_configs) = device.supported_output_configs() else {
                continue;
            };
            let max_channels = output_configs
                .map(|config| config.channels())
                .max()
                .unwrap_or(0);
            if max_channels > 0 {
                devices.push(OutputDevice {
                    name: device.name()?,
                    host: host_id.name().to_string(),
                    max_channels,
                });
            }
        }
    }

    devices.sort_by_key(|device| device.name.to_string());
    Ok(devices)
}

/// Finds an output device by name, or the default device when no name is given.
pub fn find_device(name: Option<&str>) -> Result<cpal::Device, HostError> {
    let Some(name) = name else {
        return cpal::default_host()
            .default_output_device()
            .ok_or(HostError::NoDefaultAudioDevice);
    };

    for host_id in cpal::available_hosts() {
        let Ok(devices) = cpal::host_from_id(host_id)?.devices() else {
            continue;
        };
        for device in devices {
            if device.name().is_ok_and(|device_name| device_name.trim() == name) {
                return Ok(device);
            }
        }
    }
    Err(HostError::AudioDeviceNotFound(name.to_string()))
}

/// Starts a stereo stream that pulls blocks from the sequencer.
///
/// The callback never waits for the sequencer. When the control path holds it the
/// block is rendered as silence.
pub fn start_output(
    device: &cpal::Device,
    sample_rate: u32,
    sequencer: Arc<Mutex<Sequencer>>,
) -> Result<cpal::Stream, HostError> {
    let config = cpal::StreamConfig {
        channels: OUTPUT_CHANNELS,
        sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let mut renderer = BlockRenderer::new();
    let channels = usize::from(OUTPUT_CHANNELS);
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            renderer.render(data, channels, |left, right| match sequencer.try_lock() {
                Some(mut sequencer) => {
                    sequencer.call(left, right);
                    true
                }
                None => false,
            });
        },
        |err| error!("CPAL output stream error: {}", err),
        None,
    )?;
    stream.play()?;

    info!(
        device = device.name().unwrap_or_default(),
        sample_rate, "Audio output started"
    );
    Ok(stream)
}
