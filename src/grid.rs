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
//! Grid geometry and the block constants shared by every engine component.

use std::fmt;

/// Number of columns on the grid. Also the floor of the master loop length.
pub const GRID_COLS: u32 = 8;

/// Number of rows on the grid.
pub const GRID_ROWS: u32 = 8;

/// Samples per channel processed in one audio period.
pub const BLOCK_SIZE: usize = 256;

/// Bytes of one compressed block (12 bits per sample).
pub const COMPRESSED_BLOCK_SIZE: usize = (BLOCK_SIZE as f32 * 2.0 * 0.75) as usize;

/// Bytes delivered by one storage sector read.
pub const SECTOR_SIZE: usize = 512;

/// Number of MIDI lanes, one per MIDI loop row.
pub const MIDI_LANES: u8 = 4;

/// The meaning of a grid row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Row {
    /// Transport row, shows the clock position.
    Transport,
    /// First row of looping audio.
    AudioLoops1,
    /// Second row of looping audio. Exclusive with the one-shot row.
    AudioLoops2,
    /// Audio that plays once and stops.
    AudioOneShots,
    /// A MIDI loop lane sending on the given channel (0-3).
    MidiLoops(u8),
}

impl Row {
    /// Maps a row index to its meaning.
    pub fn from_index(y: u32) -> Option<Row> {
        match y {
            0 => Some(Row::Transport),
            1 => Some(Row::AudioLoops1),
            2 => Some(Row::AudioLoops2),
            3 => Some(Row::AudioOneShots),
            4..=7 => Some(Row::MidiLoops((y - 4) as u8)),
            _ => None,
        }
    }

    /// Returns the row index.
    pub fn index(&self) -> u32 {
        match self {
            Row::Transport => 0,
            Row::AudioLoops1 => 1,
            Row::AudioLoops2 => 2,
            Row::AudioOneShots => 3,
            Row::MidiLoops(lane) => 4 + u32::from(*lane),
        }
    }

    /// True for rows that hold audio files.
    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            Row::AudioLoops1 | Row::AudioLoops2 | Row::AudioOneShots
        )
    }

    /// True for rows whose tracks restart at their loop boundary.
    pub fn is_loopable(&self) -> bool {
        matches!(self, Row::AudioLoops1 | Row::AudioLoops2 | Row::MidiLoops(_))
    }

    /// The MIDI channel of a MIDI lane.
    pub fn midi_channel(&self) -> Option<u8> {
        match self {
            Row::MidiLoops(lane) => Some(*lane),
            _ => None,
        }
    }

    /// The row that is silenced whenever this row starts a track.
    pub fn exclusive_partner(&self) -> Option<Row> {
        match self {
            Row::AudioLoops2 => Some(Row::AudioOneShots),
            Row::AudioOneShots => Some(Row::AudioLoops2),
            _ => None,
        }
    }
}

/// One pad on the grid. `x` is the column, `y` the row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub x: u32,
    pub y: u32,
}

impl Cell {
    pub fn new(x: u32, y: u32) -> Cell {
        Cell { x, y }
    }

    /// The semantic row of this cell, if it is on the grid.
    pub fn row(&self) -> Option<Row> {
        if self.x >= GRID_COLS {
            return None;
        }
        Row::from_index(self.y)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}
