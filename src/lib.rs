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
//! An 8x8 grid loop sampler engine.
//!
//! Audio loops and one-shots stream from sector storage and MIDI loops replay from
//! memory, all locked to one master clock counted in audio blocks.

pub mod arena;
pub mod codec;
pub mod config;
pub mod console;
pub mod encode;
pub mod events;
pub mod grid;
pub mod host;
pub mod midi;
pub mod scene;
pub mod sequencer;
pub mod storage;
pub mod tracks;

#[cfg(test)]
mod testutil;
