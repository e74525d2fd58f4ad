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
use tracing::{debug, warn};

use crate::{
    grid::Cell,
    midi::MidiEvent,
    tracks::{MidiTrackEvent, MAX_MIDI_TRACK_EVENTS},
};

/// Where the recorder is in a take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordingState {
    NotRecording,
    /// Armed, capture begins when the master clock next wraps.
    WaitingToRecord,
    Recording,
    /// Captured and waiting to be turned into a track.
    JustFinishedRecording,
}

/// A finished take.
#[derive(Debug)]
pub struct Take<'a> {
    pub cell: Cell,
    pub events: &'a [MidiTrackEvent],
    pub loop_length: u32,
}

/// Snaps a recorded length to an even subdivision of the shared loop.
///
/// The shared loop is split into the largest even number of parts that still leaves
/// each part at least `elapsed` blocks long. A take longer than the shared loop keeps
/// its own length.
pub fn quantized_loop_length(elapsed: u32, max_loop_length: u32) -> u32 {
    let max_loop_length = max_loop_length.max(1);
    if elapsed > max_loop_length {
        return elapsed;
    }

    let mut fits = max_loop_length / elapsed.max(1);
    if fits > 1 {
        fits = fits / 2 * 2;
    }
    max_loop_length / fits.max(1)
}

/// Captures one take at a time into a fixed scratch array.
pub struct MidiRecorder {
    state: RecordingState,
    cell: Option<Cell>,
    events: Vec<MidiTrackEvent>,
    elapsed: u32,
    dropped: usize,
}

impl MidiRecorder {
    pub fn new() -> MidiRecorder {
        MidiRecorder {
            state: RecordingState::NotRecording,
            cell: None,
            events: Vec::with_capacity(MAX_MIDI_TRACK_EVENTS),
            elapsed: 0,
            dropped: 0,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// The cell being recorded onto.
    pub fn cell(&self) -> Option<Cell> {
        self.cell
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    /// True while captured time codes are measured against the current shared loop.
    pub fn holds_loop_length(&self) -> bool {
        matches!(
            self.state,
            RecordingState::Recording | RecordingState::JustFinishedRecording
        )
    }

    /// Arms a take onto `cell`. Ignored while another take is in progress.
    pub fn start(&mut self, cell: Cell) -> bool {
        if self.state != RecordingState::NotRecording {
            warn!(cell = %cell, state = ?self.state, "Already recording, ignoring start");
            return false;
        }
        self.state = RecordingState::WaitingToRecord;
        self.cell = Some(cell);
        self.events.clear();
        self.elapsed = 0;
        self.dropped = 0;
        true
    }

    /// Ends the take at `master_clock`. An armed take that never started is dropped.
    ///
    /// A clock of zero means the shared loop has wrapped since capture began and the
    /// take covers the whole loop.
    pub fn end(&mut self, master_clock: u32, max_loop_length: u32) {
        match self.state {
            RecordingState::Recording => {
                self.elapsed = if master_clock == 0 {
                    max_loop_length
                } else {
                    master_clock
                };
                self.state = RecordingState::JustFinishedRecording;
            }
            RecordingState::WaitingToRecord => {
                debug!("Recording ended before it started");
                self.state = RecordingState::NotRecording;
                self.cell = None;
            }
            _ => {}
        }
    }

    /// Advances the state machine when the master clock wraps to zero. Returns true
    /// when capture starts.
    pub fn on_loop_start(&mut self, max_loop_length: u32) -> bool {
        match self.state {
            RecordingState::WaitingToRecord => {
                self.state = RecordingState::Recording;
                true
            }
            RecordingState::Recording => {
                self.elapsed = max_loop_length;
                self.state = RecordingState::JustFinishedRecording;
                false
            }
            _ => false,
        }
    }

    /// Captures an event at `time_code`. Events beyond the scratch capacity are dropped.
    pub fn record(&mut self, event: MidiEvent, time_code: u32) {
        if self.state != RecordingState::Recording {
            return;
        }
        if self.events.len() >= MAX_MIDI_TRACK_EVENTS {
            self.dropped += 1;
            return;
        }
        self.events.push(MidiTrackEvent { time_code, event });
    }

    /// Hands out a finished take and returns to [`RecordingState::NotRecording`].
    pub fn take_finished(&mut self, max_loop_length: u32) -> Option<Take<'_>> {
        if self.state != RecordingState::JustFinishedRecording {
            return None;
        }
        self.state = RecordingState::NotRecording;
        let cell = self.cell.take()?;
        if self.dropped > 0 {
            warn!(dropped = self.dropped, "Take exceeded the event limit");
        }

        Some(Take {
            cell,
            events: &self.events,
            loop_length: quantized_loop_length(self.elapsed, max_loop_length),
        })
    }
}

impl Default for MidiRecorder {
    fn default() -> Self {
        MidiRecorder::new()
    }
}
