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
//! Converts WAV files into the packed format tracks stream from storage.

use std::{io::Read, path::Path};

use hound::{SampleFormat, WavReader};
use tracing::info;

use crate::{
    codec::{Codec, B12},
    grid::{BLOCK_SIZE, COMPRESSED_BLOCK_SIZE},
    storage::{Entry, Storage, StorageError, AUDIO_EXTENSION},
};

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("{0} channels are not supported, expected mono or stereo")]
    UnsupportedChannels(u16),

    #[error("WAV file has no samples")]
    Empty,

    #[error("unable to compress audio block")]
    Codec,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Reads every sample of a WAV file as signed 16-bit values, one vector per channel.
pub fn read_wav<R: Read>(reader: WavReader<R>) -> Result<Vec<Vec<i16>>, EncodeError> {
    let spec = reader.spec();
    let channels = usize::from(spec.channels);
    if !(1..=2).contains(&channels) {
        return Err(EncodeError::UnsupportedChannels(spec.channels));
    }

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale_factor = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|sample| sample as f32 * scale_factor))
                .collect::<Result<_, _>>()?
        }
    };
    if samples.is_empty() {
        return Err(EncodeError::Empty);
    }

    let mut split = vec![Vec::with_capacity(samples.len() / channels); channels];
    for frame in samples.chunks(channels) {
        for (channel, sample) in split.iter_mut().zip(frame) {
            channel.push((sample * 32768.0).clamp(-32768.0, 32767.0) as i16);
        }
    }
    Ok(split)
}

/// Encodes one channel block by block. The last block is padded with silence.
pub fn encode_channel(samples: &[i16]) -> Result<Vec<u8>, EncodeError> {
    let blocks = samples.len().div_ceil(BLOCK_SIZE);
    let mut out = vec![0u8; blocks * COMPRESSED_BLOCK_SIZE];
    let mut block = [0u16; BLOCK_SIZE];

    for (chunk, compressed) in samples
        .chunks(BLOCK_SIZE)
        .zip(out.chunks_mut(COMPRESSED_BLOCK_SIZE))
    {
        block.fill(B12::encode_sample(0));
        for (stored, sample) in block.iter_mut().zip(chunk) {
            *stored = B12::encode_sample(*sample);
        }
        if !B12.compress(&block, compressed) {
            return Err(EncodeError::Codec);
        }
    }
    Ok(out)
}

/// Encodes a WAV file into storage. Mono becomes `NAME.B12`, stereo becomes the pair
/// `NAMEL.B12` and `NAMER.B12`.
pub fn encode_wav(
    path: &Path,
    storage: &mut dyn Storage,
    name: &str,
) -> Result<Vec<Entry>, EncodeError> {
    let reader = WavReader::open(path)?;
    let sample_rate = reader.spec().sample_rate;
    let channels = read_wav(reader)?;

    let names: Vec<String> = match channels.len() {
        1 => vec![name.to_string()],
        _ => vec![format!("{}L", name), format!("{}R", name)],
    };

    let mut entries = Vec::with_capacity(names.len());
    for (name, samples) in names.iter().zip(channels.iter()) {
        let entry = storage.write_file(name, AUDIO_EXTENSION, &encode_channel(samples)?)?;
        info!(
            file = entry.display_name(),
            samples = samples.len(),
            sample_rate,
            "Encoded audio"
        );
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        storage::{DirectoryStorage, MemoryStorage},
        testutil::{encoded_audio, tone_blocks, write_wav},
        tracks::file_length_blocks,
    };

    #[test]
    fn test_encode_channel_pads_last_block() {
        let encoded = encode_channel(&vec![1000i16; BLOCK_SIZE + 10]).expect("encode failed");
        assert_eq!(2 * COMPRESSED_BLOCK_SIZE, encoded.len());

        let mut decoded = [0u16; BLOCK_SIZE];
        assert!(B12.decompress(&encoded[COMPRESSED_BLOCK_SIZE..], &mut decoded));
        assert_eq!(B12::encode_sample(1000), decoded[9]);
        assert_eq!(B12::encode_sample(0), decoded[10]);
        assert_eq!(B12::encode_sample(0), decoded[BLOCK_SIZE - 1]);
    }

    #[test]
    fn test_encode_mono() {
        let dir = tempfile::tempdir().expect("temp dir");
        let wav = dir.path().join("tone.wav");
        let tone = tone_blocks(4, 1000);
        write_wav(&wav, &[tone.clone()], 44100).expect("write wav");

        let mut storage = MemoryStorage::new();
        let entries = encode_wav(&wav, &mut storage, "tone").expect("encode failed");
        assert_eq!(1, entries.len());
        assert_eq!("TONE.B12", entries[0].display_name());
        assert_eq!(4, file_length_blocks(entries[0].size_bytes));
        assert_eq!(
            Some(encoded_audio(&tone).as_slice()),
            storage.contents(entries[0].index)
        );
    }

    #[test]
    fn test_encode_stereo_into_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let wav = dir.path().join("drums.wav");
        write_wav(
            &wav,
            &[tone_blocks(2, 1000), tone_blocks(2, -1000)],
            48000,
        )
        .expect("write wav");

        let out = dir.path().join("out");
        std::fs::create_dir(&out).expect("out dir");
        let mut storage = DirectoryStorage::open(&out).expect("open storage");
        let entries = encode_wav(&wav, &mut storage, "drums").expect("encode failed");

        let names: Vec<_> = entries.iter().map(|entry| entry.display_name()).collect();
        assert_eq!(vec!["DRUMSL.B12", "DRUMSR.B12"], names);
        assert_eq!(
            encoded_audio(&tone_blocks(2, -1000)),
            std::fs::read(out.join("DRUMSR.B12")).expect("read encoded file")
        );
    }

    #[test]
    fn test_stereo_name_too_long() {
        let dir = tempfile::tempdir().expect("temp dir");
        let wav = dir.path().join("pad.wav");
        write_wav(&wav, &[vec![0; 10], vec![0; 10]], 44100).expect("write wav");

        let mut storage = MemoryStorage::new();
        assert!(matches!(
            encode_wav(&wav, &mut storage, "longpads"),
            Err(EncodeError::Storage(StorageError::InvalidName(_)))
        ));
    }

    #[test]
    fn test_empty_wav() {
        let dir = tempfile::tempdir().expect("temp dir");
        let wav = dir.path().join("empty.wav");
        write_wav(&wav, &[vec![]], 44100).expect("write wav");

        let mut storage = MemoryStorage::new();
        assert!(matches!(
            encode_wav(&wav, &mut storage, "empty"),
            Err(EncodeError::Empty)
        ));
    }
}
