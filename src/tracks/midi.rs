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
use std::fmt;

use crate::{
    arena::{Arena, ArenaError, SharedBuffer},
    grid::Cell,
    midi::{MidiError, MidiEvent, MidiQueue, MAX_MIDI_EVENT_LEN},
};

/// Most events a single loop can hold.
pub const MAX_MIDI_TRACK_EVENTS: usize = 1000;

const HEADER_LEN: usize = 8;
const RECORD_LEN: usize = 4 + 1 + MAX_MIDI_EVENT_LEN;

#[derive(Debug, thiserror::Error)]
pub enum MidiTrackError {
    #[error("MIDI loop file is truncated")]
    Truncated,

    #[error("MIDI loop file holds {0} events, more than a loop can hold")]
    TooManyEvents(usize),

    #[error("MIDI loop file has a zero loop length")]
    ZeroLoopLength,

    #[error("invalid event in record {index}: {source}")]
    InvalidEvent {
        index: usize,
        #[source]
        source: MidiError,
    },

    #[error(transparent)]
    Arena(#[from] ArenaError),
}

/// A message and the block within the loop it is played on.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MidiTrackEvent {
    pub time_code: u32,
    pub event: MidiEvent,
}

/// Serializes a loop: an event count and loop length header followed by fixed
/// size records, all little endian.
pub fn encode_midi_loop(events: &[MidiTrackEvent], loop_length: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + events.len() * RECORD_LEN);
    bytes.extend_from_slice(&(events.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&loop_length.to_le_bytes());
    for event in events {
        let mut data = [0u8; MAX_MIDI_EVENT_LEN];
        data[..event.event.len()].copy_from_slice(event.event.as_bytes());
        bytes.extend_from_slice(&event.time_code.to_le_bytes());
        bytes.push(event.event.len() as u8);
        bytes.extend_from_slice(&data);
    }
    bytes
}

/// Parses a loop written by [`encode_midi_loop`]. Events come back sorted by time code.
pub fn decode_midi_loop(bytes: &[u8]) -> Result<(Vec<MidiTrackEvent>, u32), MidiTrackError> {
    let word = |offset: usize| -> Result<u32, MidiTrackError> {
        bytes
            .get(offset..offset + 4)
            .and_then(|word| word.try_into().ok())
            .map(u32::from_le_bytes)
            .ok_or(MidiTrackError::Truncated)
    };

    let count = word(0)? as usize;
    let loop_length = word(4)?;
    if count > MAX_MIDI_TRACK_EVENTS {
        return Err(MidiTrackError::TooManyEvents(count));
    }
    if loop_length == 0 {
        return Err(MidiTrackError::ZeroLoopLength);
    }
    if bytes.len() < HEADER_LEN + count * RECORD_LEN {
        return Err(MidiTrackError::Truncated);
    }

    let mut events = Vec::with_capacity(count);
    for index in 0..count {
        let offset = HEADER_LEN + index * RECORD_LEN;
        let len = usize::from(bytes[offset + 4]).min(MAX_MIDI_EVENT_LEN);
        let event = MidiEvent::parse(&bytes[offset + 5..offset + 5 + len])
            .map_err(|source| MidiTrackError::InvalidEvent { index, source })?;
        events.push(MidiTrackEvent {
            time_code: word(offset)?,
            event,
        });
    }
    events.sort_by_key(|event| event.time_code);

    Ok((events, loop_length))
}

/// A recorded MIDI loop on one cell.
///
/// Starts and stops normally wait for the track's next loop boundary so that tracks
/// in the same lane stay in phase.
pub struct MidiTrack {
    cell: Cell,
    /// Sorted by time code. Never written after creation.
    events: SharedBuffer<MidiTrackEvent>,
    loop_length: u32,
    cursor: usize,
    last_time_code: Option<u32>,
    saved_as: Option<String>,
    playing: bool,
    wait_to_play: bool,
    wait_to_stop: bool,
    just_finished: bool,
}

impl MidiTrack {
    /// Creates a stopped track holding a copy of `events`.
    pub fn new(
        cell: Cell,
        events: &[MidiTrackEvent],
        loop_length: u32,
        arena: &Arena,
    ) -> Result<MidiTrack, ArenaError> {
        let buffer = SharedBuffer::make(events.len(), arena)?;
        buffer.copy_from(0, events)?;
        Ok(MidiTrack {
            cell,
            events: buffer,
            loop_length: loop_length.max(1),
            cursor: 0,
            last_time_code: None,
            saved_as: None,
            playing: false,
            wait_to_play: false,
            wait_to_stop: false,
            just_finished: false,
        })
    }

    pub fn cell(&self) -> Cell {
        self.cell
    }

    pub fn loop_length(&self) -> u32 {
        self.loop_length
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_waiting_to_play(&self) -> bool {
        self.wait_to_play
    }

    pub fn is_waiting_to_stop(&self) -> bool {
        self.wait_to_stop
    }

    /// True while the track sounds or is about to.
    pub fn is_active(&self) -> bool {
        (self.playing && !self.wait_to_stop) || self.wait_to_play
    }

    pub fn is_saved(&self) -> bool {
        self.saved_as.is_some()
    }

    /// The `NAME.EXT` the loop was saved under or loaded from.
    pub fn saved_as(&self) -> Option<&str> {
        self.saved_as.as_deref()
    }

    pub fn mark_saved(&mut self, display_name: String) {
        self.saved_as = Some(display_name);
    }

    /// Starts playback. Waits for the next loop boundary unless `immediate` is set or
    /// no other track is playing.
    pub fn play(&mut self, immediate: bool, other_track_playing: bool) {
        self.just_finished = false;
        self.wait_to_stop = false;
        if immediate || !other_track_playing {
            self.wait_to_play = false;
            self.playing = true;
            self.rewind();
        } else {
            self.wait_to_play = true;
        }
    }

    /// Stops playback. Waits for the next loop boundary unless `immediate` is set.
    pub fn stop(&mut self, immediate: bool) {
        self.wait_to_play = false;
        if immediate {
            self.wait_to_stop = false;
            self.playing = false;
            self.just_finished = true;
        } else {
            self.wait_to_stop = true;
        }
    }

    /// Resolves pending starts and stops on a loop boundary. Returns true when playback
    /// starts on this call.
    pub fn wait_for_loop_start_or_end(&mut self, master_clock: u32) -> bool {
        if master_clock % self.loop_length != 0 {
            return false;
        }

        if self.wait_to_stop {
            self.wait_to_stop = false;
            self.playing = false;
            self.just_finished = true;
            return false;
        }

        if self.wait_to_play {
            self.wait_to_play = false;
            self.playing = true;
            self.rewind();
            return true;
        }

        false
    }

    /// Returns and clears the finished flag.
    pub fn just_finished(&mut self) -> bool {
        std::mem::take(&mut self.just_finished)
    }

    /// Queues every event due at `time_code`. Must be called once per block with an
    /// advancing clock.
    pub fn add_midi_events_at_time_code(&mut self, time_code: u32, out: &mut MidiQueue) {
        if !self.playing || self.events.len() <= 1 {
            return;
        }

        let time_code = time_code % self.loop_length;
        if self.last_time_code.is_some_and(|last| time_code < last) {
            self.cursor = 0;
        }
        self.last_time_code = Some(time_code);

        let cursor = &mut self.cursor;
        self.events.with(|events| {
            while *cursor < events.len() && events[*cursor].time_code < time_code {
                *cursor += 1;
            }
            while *cursor < events.len() && events[*cursor].time_code == time_code {
                out.push(events[*cursor].event);
                *cursor += 1;
            }
        });
    }

    /// The loop in its file form.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.events
            .with(|events| encode_midi_loop(events, self.loop_length))
    }

    fn rewind(&mut self) {
        self.cursor = 0;
        self.last_time_code = None;
    }
}

impl fmt::Debug for MidiTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidiTrack")
            .field("cell", &self.cell)
            .field("events", &self.events.len())
            .field("loop_length", &self.loop_length)
            .field("playing", &self.playing)
            .field("saved_as", &self.saved_as)
            .finish()
    }
}
