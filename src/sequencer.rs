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
//! The transport: every track, the master clock and the MIDI recorder.
//!
//! The sequencer has two kinds of entry point. [`Sequencer::call`] runs once per
//! audio period and must never allocate or wait on anything but a bounded number of
//! sector reads. Everything else (parameter events, MIDI input, UI publishing) runs
//! on the control path and may do unbounded storage I/O.

use std::{fmt, sync::Arc};

use crossbeam_channel::Receiver;
use tracing::{debug, error, info, warn};

use crate::{
    arena::{Allocated, Arena, ArenaError, SharedBuffer},
    codec::Codec,
    events::{bridge::UiPublisher, ParameterEvent, UiEvent},
    grid::{Cell, BLOCK_SIZE, GRID_COLS},
    midi::{MidiEvent, MidiQueue, OUTBOUND_QUEUE_CAPACITY},
    storage::{Entry, Storage},
    tracks::{AudioTrack, MidiTrack},
};

mod control;
mod recorder;
#[cfg(test)]
mod tests;

pub use control::ControlError;
pub use recorder::{quantized_loop_length, MidiRecorder, RecordingState};

/// Audio tracks the grid can hold: three audio rows, each cell possibly a stereo pair.
const AUDIO_TRACK_CAPACITY: usize = GRID_COLS as usize * 3 * 2;

/// MIDI tracks the grid can hold.
const MIDI_TRACK_CAPACITY: usize = GRID_COLS as usize * 4;

/// Highest MIDI channel number.
const MAX_MIDI_CHANNEL: u8 = 15;

pub struct Sequencer {
    arena: Arena,
    storage: Box<dyn Storage>,
    codec: Arc<dyn Codec>,
    /// Decoder output shared by every audio track.
    decode_buffer: SharedBuffer<u16>,
    audio_tracks: Vec<Allocated<AudioTrack>>,
    midi_tracks: Vec<Allocated<MidiTrack>>,
    /// Blocks since the shared loop started.
    master_clock: u32,
    /// Length of the shared loop in blocks. Never below the column count.
    max_loop_length: u32,
    /// The transport column for the current clock.
    transport_progress: u32,
    published_progress: Option<u32>,
    recorder: MidiRecorder,
    recording_started: bool,
    active_midi_channel: u8,
    outbound_midi: MidiQueue,
    /// The most recent explorer listing.
    explorer: Vec<Entry>,
    ui: UiPublisher,
}

impl Sequencer {
    /// Creates an empty sequencer. Only the decode buffer is allocated up front.
    pub fn new(
        storage: Box<dyn Storage>,
        codec: Arc<dyn Codec>,
        arena: Arena,
        ui: UiPublisher,
    ) -> Result<Sequencer, ArenaError> {
        let decode_buffer = SharedBuffer::make(BLOCK_SIZE, &arena)?;
        Ok(Sequencer {
            arena,
            storage,
            codec,
            decode_buffer,
            audio_tracks: Vec::with_capacity(AUDIO_TRACK_CAPACITY),
            midi_tracks: Vec::with_capacity(MIDI_TRACK_CAPACITY),
            master_clock: 0,
            max_loop_length: GRID_COLS,
            transport_progress: 0,
            published_progress: None,
            recorder: MidiRecorder::new(),
            recording_started: false,
            active_midi_channel: 0,
            outbound_midi: MidiQueue::with_capacity(OUTBOUND_QUEUE_CAPACITY),
            explorer: Vec::new(),
            ui,
        })
    }

    pub fn master_clock(&self) -> u32 {
        self.master_clock
    }

    pub fn max_loop_length(&self) -> u32 {
        self.max_loop_length
    }

    pub fn transport_progress(&self) -> u32 {
        self.transport_progress
    }

    pub fn active_midi_channel(&self) -> u8 {
        self.active_midi_channel
    }

    pub fn recording_state(&self) -> RecordingState {
        self.recorder.state()
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn storage(&mut self) -> &mut dyn Storage {
        self.storage.as_mut()
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &AudioTrack> {
        self.audio_tracks.iter().map(|track| &**track)
    }

    /// The tracks on a cell. A stereo pair yields left then right.
    pub fn audio_tracks_at(&self, cell: Cell) -> impl Iterator<Item = &AudioTrack> {
        self.audio_tracks().filter(move |track| track.cell() == cell)
    }

    pub fn midi_tracks(&self) -> impl Iterator<Item = &MidiTrack> {
        self.midi_tracks.iter().map(|track| &**track)
    }

    pub fn midi_track_at(&self, cell: Cell) -> Option<&MidiTrack> {
        self.midi_tracks().find(|track| track.cell() == cell)
    }

    /// Reports an unusable file system to the control surface.
    pub fn verify_file_system(&mut self) -> bool {
        if self.storage.is_valid() {
            return true;
        }
        error!("File system is not valid");
        self.ui.publish(UiEvent::InvalidFilesystem);
        false
    }

    /// Runs one audio period, mixing every playing track into `left` and `right`.
    pub fn call(&mut self, left: &mut [i16], right: &mut [i16]) {
        self.transport_progress = self.master_clock * GRID_COLS / self.max_loop_length;

        if self.master_clock == 0 && self.recorder.on_loop_start(self.max_loop_length) {
            self.recording_started = true;
        }

        self.master_clock = (self.master_clock + 1) % self.max_loop_length;
        let clock = self.master_clock;

        left.fill(0);
        right.fill(0);

        let mut changed = false;
        for track in self.audio_tracks.iter_mut() {
            if !track.is_playing() {
                continue;
            }

            track.call(self.storage.as_mut(), left, right);
            if !track.is_playing() {
                changed = true;
                continue;
            }

            if track.should_loop(clock) {
                if let Err(e) = track.play(self.storage.as_mut()) {
                    error!(err = e.to_string(), cell = %track.cell(), "Unable to restart loop");
                    track.reset();
                    changed = true;
                }
            }
        }

        for track in self.midi_tracks.iter_mut() {
            let was_playing = track.is_playing();
            track.wait_for_loop_start_or_end(clock);
            changed |= was_playing != track.is_playing();
            track.add_midi_events_at_time_code(clock, &mut self.outbound_midi);
        }

        if changed {
            self.renegotiate_loop_length();
        }
    }

    /// Handles one raw message from the MIDI input.
    ///
    /// The message is moved to the active channel and echoed to the output. While
    /// recording it is captured on the recording lane's channel.
    pub fn on_midi_event(&mut self, raw: &[u8]) {
        let event = match MidiEvent::parse(raw) {
            Ok(event) => event,
            Err(e) => {
                debug!(err = e.to_string(), "Ignoring MIDI input");
                return;
            }
        };

        let thru = event.with_channel(self.active_midi_channel);
        self.outbound_midi.push(thru);

        if self.recorder.is_recording() {
            let channel = self
                .recorder
                .cell()
                .and_then(|cell| cell.row())
                .and_then(|row| row.midi_channel())
                .unwrap_or(self.active_midi_channel);
            self.recorder
                .record(event.with_channel(channel), self.master_clock);
        }
    }

    /// Hands queued outbound MIDI to the transport layer.
    pub fn drain_outbound_midi(&mut self) -> impl Iterator<Item = MidiEvent> + '_ {
        let dropped = self.outbound_midi.take_dropped();
        if dropped > 0 {
            warn!(dropped, "Outbound MIDI queue overflowed");
        }
        self.outbound_midi.drain()
    }

    /// Applies every queued parameter event.
    pub fn process_parameter_events(&mut self, parameters: &Receiver<ParameterEvent>) {
        for event in parameters.try_iter() {
            self.on_parameter_event(event);
        }
    }

    /// Publishes what changed since the last call and turns a finished recording into
    /// a track.
    pub fn publish_ui_events(&mut self) {
        if self.published_progress != Some(self.transport_progress) {
            self.published_progress = Some(self.transport_progress);
            self.ui.publish(UiEvent::TransportMove(self.transport_progress));
        }

        if std::mem::take(&mut self.recording_started) {
            if let Some(cell) = self.recorder.cell() {
                self.ui.publish(UiEvent::MidiRecordingStarted(cell));
            }
        }

        let mut last_finished = None;
        for track in self.audio_tracks.iter_mut() {
            if track.just_finished() && last_finished != Some(track.cell()) {
                last_finished = Some(track.cell());
                self.ui.publish(UiEvent::AudioTrackFinished(track.cell()));
            }
        }

        for track in self.midi_tracks.iter_mut() {
            if track.just_finished() {
                self.ui.publish(UiEvent::MidiTrackFinished(track.cell()));
            }
        }

        self.finalize_recording();
    }

    fn finalize_recording(&mut self) {
        let Some(take) = self.recorder.take_finished(self.max_loop_length) else {
            return;
        };
        let cell = take.cell;

        if take.events.len() < 2 {
            info!(cell = %cell, events = take.events.len(), "Discarding empty recording");
            self.ui.publish(UiEvent::MidiRecordingFinished(cell));
            self.renegotiate_loop_length();
            return;
        }

        let events = take.events.len();
        let loop_length = take.loop_length;
        let track = MidiTrack::new(cell, take.events, loop_length, &self.arena)
            .and_then(|track| self.arena.allocate(track));
        match track {
            Ok(mut track) => {
                info!(cell = %cell, events, loop_length, "Recorded MIDI loop");
                self.unload_cell(cell);
                let other_active = self.midi_tracks.iter().any(|other| other.is_active());
                track.play(false, other_active);
                self.midi_tracks.push(track);
            }
            Err(e) => error!(err = e.to_string(), cell = %cell, "Unable to store recording"),
        }
        self.ui.publish(UiEvent::MidiRecordingFinished(cell));
        self.renegotiate_loop_length();
    }

    /// Recomputes the shared loop from what is playing and refits every audio track.
    fn renegotiate_loop_length(&mut self) {
        let mut max = GRID_COLS;
        for track in self.audio_tracks.iter() {
            if track.is_playing() && track.is_loopable() {
                max = max.max(track.file_length());
            }
        }
        for track in self.midi_tracks.iter() {
            if track.is_active() {
                max = max.max(track.loop_length());
            }
        }

        // A take in progress keeps the loop its time codes were captured against.
        if self.recorder.holds_loop_length() {
            max = max.max(self.max_loop_length);
        }

        for track in self.audio_tracks.iter_mut() {
            track.set_loop_length(max);
        }

        if max != self.max_loop_length {
            debug!(
                from = self.max_loop_length,
                to = max,
                "Renegotiated loop length"
            );
        }
        self.max_loop_length = max;
        self.master_clock %= max;
    }
}

impl fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequencer")
            .field("master_clock", &self.master_clock)
            .field("max_loop_length", &self.max_loop_length)
            .field("audio_tracks", &self.audio_tracks.len())
            .field("midi_tracks", &self.midi_tracks.len())
            .field("recording", &self.recorder.state())
            .finish()
    }
}
