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
//! MIDI channel messages and the outbound MIDI queue.

use std::{fmt, vec};

use midly::live::LiveEvent;

/// Longest channel message, in bytes.
pub const MAX_MIDI_EVENT_LEN: usize = 3;

/// Default capacity of the outbound queue.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum MidiError {
    #[error("invalid MIDI message: {0}")]
    Parse(String),

    #[error("only channel messages are supported")]
    NotChannelMessage,

    #[error("message of {0} bytes is too long")]
    TooLong(usize),
}

/// A single channel voice message of at most three bytes.
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MidiEvent {
    bytes: [u8; MAX_MIDI_EVENT_LEN],
    len: u8,
}

impl MidiEvent {
    /// Validates and copies a raw message.
    pub fn parse(raw: &[u8]) -> Result<MidiEvent, MidiError> {
        if raw.len() > MAX_MIDI_EVENT_LEN {
            return Err(MidiError::TooLong(raw.len()));
        }

        match LiveEvent::parse(raw) {
            Ok(LiveEvent::Midi { .. }) => {}
            Ok(_) => return Err(MidiError::NotChannelMessage),
            Err(e) => return Err(MidiError::Parse(e.to_string())),
        }

        let mut bytes = [0u8; MAX_MIDI_EVENT_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(MidiEvent {
            bytes,
            len: raw.len() as u8,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn channel(&self) -> u8 {
        self.bytes[0] & 0x0F
    }

    /// The same message on another channel.
    pub fn with_channel(&self, channel: u8) -> MidiEvent {
        let mut event = *self;
        event.bytes[0] = (self.bytes[0] & 0xF0) | (channel & 0x0F);
        event
    }

    /// The parsed form of the message.
    pub fn live_event(&self) -> Option<LiveEvent<'_>> {
        LiveEvent::parse(self.as_bytes()).ok()
    }
}

impl fmt::Debug for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.live_event() {
            Some(event) => write!(f, "{:?}", event),
            None => write!(f, "MidiEvent({:02x?})", self.as_bytes()),
        }
    }
}

/// A bounded queue of messages waiting to be sent. Never grows past its capacity.
pub struct MidiQueue {
    events: Vec<MidiEvent>,
    capacity: usize,
    dropped: usize,
}

impl MidiQueue {
    pub fn with_capacity(capacity: usize) -> MidiQueue {
        MidiQueue {
            events: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Queues a message. Returns false and counts a drop when the queue is full.
    pub fn push(&mut self, event: MidiEvent) -> bool {
        if self.events.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        self.events.push(event);
        true
    }

    /// Removes every queued message in arrival order.
    pub fn drain(&mut self) -> vec::Drain<'_, MidiEvent> {
        self.events.drain(..)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns and resets the number of messages dropped since the last call.
    pub fn take_dropped(&mut self) -> usize {
        std::mem::take(&mut self.dropped)
    }
}
