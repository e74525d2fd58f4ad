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

use tracing::warn;

use crate::{
    arena::{Arena, ArenaError, SharedBuffer},
    codec::{Codec, SAMPLE_CENTER},
    grid::{Cell, BLOCK_SIZE, COMPRESSED_BLOCK_SIZE, SECTOR_SIZE},
    storage::{Entry, Storage, StorageError, Transfer, TransferState},
};

/// Size of the compressed audio ring: three sectors.
pub const RING_SIZE: usize = SECTOR_SIZE * 3;

/// Length of an audio file in blocks. Never zero.
pub fn file_length_blocks(size_bytes: u64) -> u32 {
    let blocks = size_bytes * 2 / 3 / BLOCK_SIZE as u64;
    blocks.clamp(1, u64::from(u32::MAX)) as u32
}

/// A compressed audio file streaming from storage on one cell.
///
/// Compressed bytes are pulled one sector at a time into a ring that sits ahead of
/// the decoder. Each call decodes at most one block and mixes it into the output.
pub struct AudioTrack {
    /// The cell the track is loaded on.
    cell: Cell,
    /// The storage entry being streamed.
    entry: Entry,
    /// Natural length in blocks.
    file_length: u32,
    /// Current loop length in blocks.
    loop_length: u32,
    /// Compressed bytes waiting to be decoded.
    ring: SharedBuffer<u8>,
    read_pos: usize,
    write_pos: usize,
    /// Bytes between the read and write positions.
    buffered: usize,
    /// A contiguous copy of the block being decoded.
    staging: [u8; COMPRESSED_BLOCK_SIZE],
    /// Decoder output, shared with the other tracks.
    decode_buffer: SharedBuffer<u16>,
    codec: Arc<dyn Codec>,
    transfer: Transfer,
    amplitude_left: f32,
    amplitude_right: f32,
    loopable: bool,
    playing: bool,
    just_finished: bool,
}

impl AudioTrack {
    /// Creates a stopped track. The ring is allocated from the arena.
    pub fn new(
        cell: Cell,
        entry: Entry,
        loopable: bool,
        decode_buffer: SharedBuffer<u16>,
        codec: Arc<dyn Codec>,
        arena: &Arena,
    ) -> Result<AudioTrack, ArenaError> {
        let file_length = file_length_blocks(entry.size_bytes);
        Ok(AudioTrack {
            cell,
            entry,
            file_length,
            loop_length: file_length,
            ring: SharedBuffer::make(RING_SIZE, arena)?,
            read_pos: 0,
            write_pos: 0,
            buffered: 0,
            staging: [0; COMPRESSED_BLOCK_SIZE],
            decode_buffer,
            codec,
            transfer: Transfer::default(),
            amplitude_left: 1.0,
            amplitude_right: 1.0,
            loopable,
            playing: false,
            just_finished: false,
        })
    }

    pub fn cell(&self) -> Cell {
        self.cell
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn file_length(&self) -> u32 {
        self.file_length
    }

    pub fn loop_length(&self) -> u32 {
        self.loop_length
    }

    pub fn is_loopable(&self) -> bool {
        self.loopable
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    pub fn write_position(&self) -> usize {
        self.write_pos
    }

    /// Compressed bytes waiting to be decoded.
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    pub fn transfer_state(&self) -> TransferState {
        self.transfer.state()
    }

    /// Sets the per-channel gain. A stereo pair uses (1, 0) and (0, 1).
    pub fn set_amplitudes(&mut self, left: f32, right: f32) {
        self.amplitude_left = left;
        self.amplitude_right = right;
    }

    pub fn amplitudes(&self) -> (f32, f32) {
        (self.amplitude_left, self.amplitude_right)
    }

    /// Restarts the file from its first byte.
    pub fn play(&mut self, storage: &mut dyn Storage) -> Result<(), StorageError> {
        self.reset();
        self.transfer = storage.read_entry(self.entry.index)?;
        self.playing = true;
        self.just_finished = false;
        Ok(())
    }

    /// Stops immediately and clears the ring.
    pub fn reset(&mut self) {
        self.transfer.cancel();
        self.read_pos = 0;
        self.write_pos = 0;
        self.buffered = 0;
        self.ring.fill(0);
        self.staging = [0; COMPRESSED_BLOCK_SIZE];
        self.playing = false;
    }

    /// Stops at the user's request. Reported like a natural finish.
    pub fn stop(&mut self) {
        if self.playing {
            self.just_finished = true;
        }
        self.reset();
    }

    /// Returns and clears the finished flag.
    pub fn just_finished(&mut self) -> bool {
        std::mem::take(&mut self.just_finished)
    }

    /// True when a whole sector fits in the ring.
    pub fn should_fill_next_buffer(&self) -> bool {
        RING_SIZE - self.buffered >= SECTOR_SIZE
    }

    /// Appends compressed bytes at the write position. Returns false, writing nothing,
    /// if they do not fit.
    pub fn fill_next_buffer(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > RING_SIZE - self.buffered {
            return false;
        }

        let start = self.write_pos;
        let first = (RING_SIZE - start).min(bytes.len());
        self.ring.with_mut(|ring| {
            ring[start..start + first].copy_from_slice(&bytes[..first]);
            ring[..bytes.len() - first].copy_from_slice(&bytes[first..]);
        });

        self.write_pos = (start + bytes.len()) % RING_SIZE;
        self.buffered += bytes.len();
        true
    }

    /// True when a whole compressed block is buffered.
    pub fn should_decompress(&self) -> bool {
        self.buffered >= COMPRESSED_BLOCK_SIZE
    }

    /// Streams, decodes and mixes one block into `left` and `right`.
    pub fn call(&mut self, storage: &mut dyn Storage, left: &mut [i16], right: &mut [i16]) {
        if !self.playing {
            return;
        }

        let mut sector = [0u8; SECTOR_SIZE];
        while self.transfer.is_streaming() && self.should_fill_next_buffer() {
            let before = self.transfer.position();
            if storage.next_sector(&mut self.transfer, &mut sector) != TransferState::Streaming {
                break;
            }
            let read = (self.transfer.position() - before) as usize;
            self.fill_next_buffer(&sector[..read]);
        }

        if self.should_decompress() {
            self.decompress_block(left, right);
        } else if !self.transfer.is_streaming() && !self.loopable {
            // Anything left over is shorter than a block and is never played.
            self.reset();
            self.just_finished = true;
        }
    }

    fn decompress_block(&mut self, left: &mut [i16], right: &mut [i16]) {
        let start = self.read_pos;
        let first = (RING_SIZE - start).min(COMPRESSED_BLOCK_SIZE);
        let staging = &mut self.staging;
        self.ring.with(|ring| {
            staging[..first].copy_from_slice(&ring[start..start + first]);
            staging[first..].copy_from_slice(&ring[..COMPRESSED_BLOCK_SIZE - first]);
        });
        self.read_pos = (start + COMPRESSED_BLOCK_SIZE) % RING_SIZE;
        self.buffered -= COMPRESSED_BLOCK_SIZE;

        let codec = &self.codec;
        let staging = &self.staging;
        let (amplitude_left, amplitude_right) = (self.amplitude_left, self.amplitude_right);
        let cell = self.cell;
        self.decode_buffer.with_mut(|decoded| {
            if !codec.decompress(staging, decoded) {
                warn!(cell = %cell, "Unable to decompress audio block");
                return;
            }

            for ((sample, l), r) in decoded
                .iter()
                .zip(left.iter_mut())
                .zip(right.iter_mut())
            {
                let value = ((i32::from(*sample) - i32::from(SAMPLE_CENTER)) / 2) as f32;
                *l = l.saturating_add((value * amplitude_left) as i16);
                *r = r.saturating_add((value * amplitude_right) as i16);
            }
        });
    }

    /// Fits this track into the shared loop and returns the new shared maximum.
    ///
    /// A file longer than the current maximum raises it and loops at its own length.
    /// Otherwise the track repeats a whole number of times per shared loop.
    pub fn set_loop_length(&mut self, current_max: u32) -> u32 {
        if self.file_length > current_max {
            self.loop_length = self.file_length;
            return self.file_length;
        }

        self.loop_length = current_max / (current_max / self.file_length);
        current_max
    }

    /// True when the track must be restarted at this clock value.
    pub fn should_loop(&self, master_clock: u32) -> bool {
        self.loopable && master_clock % self.loop_length == 0
    }
}

impl fmt::Debug for AudioTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioTrack")
            .field("cell", &self.cell)
            .field("file", &self.entry.display_name())
            .field("file_length", &self.file_length)
            .field("loop_length", &self.loop_length)
            .field("playing", &self.playing)
            .field("loopable", &self.loopable)
            .finish()
    }
}
