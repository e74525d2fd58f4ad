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
use std::{error::Error, fs::File, path::Path, sync::Arc};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::{
    arena::Arena,
    codec::{Codec, B12},
    events::{
        bridge::{bridge, ControlSide},
        ParameterEvent, UiEvent,
    },
    grid::BLOCK_SIZE,
    midi::MidiEvent,
    sequencer::Sequencer,
    storage::MemoryStorage,
    tracks::MidiTrackEvent,
};

/// A constant signal `blocks` blocks long.
pub fn tone_blocks(blocks: usize, level: i16) -> Vec<i16> {
    vec![level; blocks * BLOCK_SIZE]
}

/// Encodes signed samples the way the encoder writes them to storage.
pub fn encoded_audio(samples: &[i16]) -> Vec<u8> {
    let stored: Vec<u16> = samples.iter().map(|sample| B12::encode_sample(*sample)).collect();
    let mut out = vec![0u8; B12::compressed_len(stored.len())];
    assert!(B12.compress(&stored, &mut out), "compression failed");
    out
}

/// A note on at the given time code.
pub fn note_at(time_code: u32, key: u8) -> MidiTrackEvent {
    MidiTrackEvent {
        time_code,
        event: MidiEvent::parse(&[0x90, key, 100]).expect("valid note on"),
    }
}

/// Writes interleaved 16-bit samples to a WAV file.
pub fn write_wav(path: &Path, channels: &[Vec<i16>], sample_rate: u32) -> Result<(), Box<dyn Error>> {
    let mut writer = WavWriter::new(
        File::create(path)?,
        WavSpec {
            channels: channels.len() as u16,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )?;

    let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
    for frame in 0..frames {
        for channel in channels {
            writer.write_sample(channel.get(frame).copied().unwrap_or(0))?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// A sequencer wired to in-memory storage and its control queues.
pub struct Rig {
    pub sequencer: Sequencer,
    pub control: ControlSide,
    pub left: Vec<i16>,
    pub right: Vec<i16>,
}

impl Rig {
    pub fn new(storage: MemoryStorage) -> Rig {
        Rig::with_arena(storage, Arena::default())
    }

    pub fn with_arena(storage: MemoryStorage, arena: Arena) -> Rig {
        let (control, engine) = bridge(16, 256);
        let sequencer = Sequencer::new(Box::new(storage), Arc::new(B12), arena, engine.ui_events)
            .expect("decode buffer allocation failed");
        Rig {
            sequencer,
            control,
            left: vec![0; BLOCK_SIZE],
            right: vec![0; BLOCK_SIZE],
        }
    }

    pub fn send(&mut self, event: ParameterEvent) {
        self.sequencer.on_parameter_event(event);
    }

    /// Runs `blocks` audio periods. The output of the last one is kept.
    pub fn run(&mut self, blocks: usize) {
        for _ in 0..blocks {
            self.sequencer.call(&mut self.left, &mut self.right);
        }
    }

    /// Publishes and collects pending UI events.
    pub fn ui_events(&mut self) -> Vec<UiEvent> {
        self.sequencer.publish_ui_events();
        self.control.ui_events.try_iter().collect()
    }

    /// Collects UI events, ignoring transport moves.
    pub fn status_events(&mut self) -> Vec<UiEvent> {
        self.ui_events()
            .into_iter()
            .filter(|event| !matches!(event, UiEvent::TransportMove(_)))
            .collect()
    }

    /// Runs until the master clock reads `clock`.
    pub fn run_until_clock(&mut self, clock: u32) {
        let max = self.sequencer.max_loop_length() as usize;
        for _ in 0..=max {
            if self.sequencer.master_clock() == clock {
                return;
            }
            self.run(1);
        }
        panic!("clock never reached {}", clock);
    }
}
