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
//! Block codecs for streamed audio.
//!
//! Samples are stored as unsigned 12-bit values centred on [`SAMPLE_CENTER`].

/// The decoded value of silence.
pub const SAMPLE_CENTER: u16 = 2048;

/// The largest 12-bit sample value.
pub const SAMPLE_MAX: u16 = 4095;

/// Compresses and decompresses one block of samples.
pub trait Codec: Send + Sync {
    /// Decodes `compressed` into `out`. Returns false if the input is not a valid
    /// block for an output of this length. `out` is untouched on failure.
    fn decompress(&self, compressed: &[u8], out: &mut [u16]) -> bool;

    /// Encodes `samples` into `out`. Returns false if `out` is too small.
    fn compress(&self, samples: &[u16], out: &mut [u8]) -> bool;
}

/// Packs two 12-bit samples into three bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct B12;

impl B12 {
    /// Bytes needed to hold `samples` samples.
    pub fn compressed_len(samples: usize) -> usize {
        (samples * 3).div_ceil(2)
    }

    /// Converts a signed 16-bit sample into the stored representation.
    pub fn encode_sample(sample: i16) -> u16 {
        ((i32::from(sample) >> 4) + i32::from(SAMPLE_CENTER)) as u16
    }
}

impl Codec for B12 {
    fn decompress(&self, compressed: &[u8], out: &mut [u16]) -> bool {
        if compressed.len() < B12::compressed_len(out.len()) {
            return false;
        }

        for (pair, bytes) in out.chunks_mut(2).zip(compressed.chunks(3)) {
            let first = u16::from(bytes[0]) | (u16::from(bytes[1] & 0x0F) << 8);
            pair[0] = first;
            if pair.len() == 2 {
                pair[1] = (u16::from(bytes[1]) >> 4) | (u16::from(bytes[2]) << 4);
            }
        }
        true
    }

    fn compress(&self, samples: &[u16], out: &mut [u8]) -> bool {
        if out.len() < B12::compressed_len(samples.len()) {
            return false;
        }

        for (pair, bytes) in samples.chunks(2).zip(out.chunks_mut(3)) {
            let first = pair[0].min(SAMPLE_MAX);
            let second = pair.get(1).copied().unwrap_or(SAMPLE_CENTER).min(SAMPLE_MAX);
            bytes[0] = (first & 0xFF) as u8;
            bytes[1] = ((first >> 8) as u8 & 0x0F) | (((second & 0x0F) as u8) << 4);
            if bytes.len() == 3 {
                bytes[2] = (second >> 4) as u8;
            }
        }
        true
    }
}
