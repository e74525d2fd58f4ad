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
//! The file store that audio, MIDI loops and scenes are streamed from.
//!
//! Storage is a flat directory of 8.3 named entries read and written one sector at
//! a time. Streaming reads are driven by a [`Transfer`] that the caller owns and polls
//! through [`Storage::next_sector`]; a read never blocks for more than one sector.

use std::fmt;

use crate::grid::SECTOR_SIZE;

mod directory;
mod memory;

pub use directory::DirectoryStorage;
pub use memory::MemoryStorage;

/// Extension of compressed audio files.
pub const AUDIO_EXTENSION: &str = "B12";

/// Extension of recorded MIDI loops.
pub const MIDI_EXTENSION: &str = "MLP";

/// Extension of scene files.
pub const SCENE_EXTENSION: &str = "SCN";

const MAX_STEM_LEN: usize = 8;
const MAX_EXTENSION_LEN: usize = 3;

/// Position of an entry in the storage directory.
pub type EntryIndex = usize;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("the file system is not valid")]
    InvalidFilesystem,

    #[error("no entry at index {0}")]
    NotFound(EntryIndex),

    #[error("entry {0} has been deleted")]
    Deleted(EntryIndex),

    #[error("invalid file name {0}")]
    InvalidName(String),

    #[error("entry {0} is not open for writing")]
    NotWritable(EntryIndex),

    #[error("storage write failed: {0}")]
    WriteFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The kinds of file the engine knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileKind {
    Audio,
    Midi,
    Scene,
}

impl FileKind {
    pub fn extension(&self) -> &'static str {
        match self {
            FileKind::Audio => AUDIO_EXTENSION,
            FileKind::Midi => MIDI_EXTENSION,
            FileKind::Scene => SCENE_EXTENSION,
        }
    }

    pub fn from_extension(extension: &str) -> Option<FileKind> {
        [FileKind::Audio, FileKind::Midi, FileKind::Scene]
            .into_iter()
            .find(|kind| kind.extension().eq_ignore_ascii_case(extension))
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileKind::Audio => "audio",
            FileKind::Midi => "midi",
            FileKind::Scene => "scene",
        };
        write!(f, "{}", name)
    }
}

/// A directory entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub index: EntryIndex,
    pub filename: String,
    pub extension: String,
    pub size_bytes: u64,
    pub deleted: bool,
}

impl Entry {
    /// The `NAME.EXT` form of the entry name.
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.filename, self.extension)
    }

    pub fn kind(&self) -> Option<FileKind> {
        FileKind::from_extension(&self.extension)
    }
}

/// Progress of a streaming read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransferState {
    /// No read is in progress.
    #[default]
    Idle,
    /// Sectors are still being delivered.
    Streaming,
    /// Every byte of the entry has been delivered.
    Done,
}

/// A streaming read of one entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transfer {
    entry: EntryIndex,
    position: u64,
    state: TransferState,
}

impl Transfer {
    /// Starts a read of `entry` at its first byte.
    pub fn start(entry: EntryIndex) -> Transfer {
        Transfer {
            entry,
            position: 0,
            state: TransferState::Streaming,
        }
    }

    pub fn entry(&self) -> EntryIndex {
        self.entry
    }

    /// Bytes delivered so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == TransferState::Streaming
    }

    /// Records that `bytes` more bytes were delivered.
    pub fn advance(&mut self, bytes: usize) {
        self.position += bytes as u64;
    }

    pub fn finish(&mut self) {
        self.state = TransferState::Done;
    }

    /// Drops the read without finishing it.
    pub fn cancel(&mut self) {
        self.state = TransferState::Idle;
    }
}

/// Normalizes a name to the 8.3 form used by storage.
pub fn short_name(name: &str, extension: &str) -> Result<(String, String), StorageError> {
    let valid = |part: &str, max: usize| {
        !part.is_empty()
            && part.len() <= max
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    };

    if !valid(name, MAX_STEM_LEN) || !valid(extension, MAX_EXTENSION_LEN) {
        return Err(StorageError::InvalidName(format!("{}.{}", name, extension)));
    }

    Ok((name.to_ascii_uppercase(), extension.to_ascii_uppercase()))
}

/// A sector-addressed file store.
pub trait Storage: Send {
    /// False if the medium is missing or unreadable.
    fn is_valid(&self) -> bool;

    /// Lists every entry, including deleted ones.
    fn list_current_directory(&mut self) -> Result<Vec<Entry>, StorageError>;

    /// Begins a streaming read.
    fn read_entry(&mut self, entry: EntryIndex) -> Result<Transfer, StorageError>;

    /// Delivers the next sector of a streaming read into `out`, zero padding a short
    /// final sector. Returns [`TransferState::Streaming`] while a sector was delivered.
    fn next_sector(&mut self, transfer: &mut Transfer, out: &mut [u8]) -> TransferState;

    /// Creates an empty entry, truncating an existing entry of the same name.
    fn create_entry(&mut self, name: &str, extension: &str) -> Result<Entry, StorageError>;

    /// Appends bytes to an entry created with [`Storage::create_entry`].
    fn write_to_entry(&mut self, entry: EntryIndex, bytes: &[u8]) -> Result<(), StorageError>;

    /// Completes a write.
    fn finalize_entry(&mut self, entry: EntryIndex) -> Result<(), StorageError>;

    fn delete_entry(&mut self, entry: EntryIndex) -> Result<(), StorageError>;

    /// Reads a whole entry. Not for use on the audio path.
    fn read_to_end(&mut self, entry: EntryIndex) -> Result<Vec<u8>, StorageError> {
        let mut transfer = self.read_entry(entry)?;
        let mut sector = [0u8; SECTOR_SIZE];
        let mut data = Vec::new();
        loop {
            let before = transfer.position();
            match self.next_sector(&mut transfer, &mut sector) {
                TransferState::Streaming => {
                    let read = (transfer.position() - before) as usize;
                    data.extend_from_slice(&sector[..read]);
                }
                TransferState::Done => return Ok(data),
                TransferState::Idle => {
                    return Err(StorageError::Io(std::io::Error::other(format!(
                        "read of entry {} was interrupted",
                        entry
                    ))))
                }
            }
        }
    }

    /// Writes a whole file one sector at a time.
    fn write_file(
        &mut self,
        name: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<Entry, StorageError> {
        let mut entry = self.create_entry(name, extension)?;
        for sector in bytes.chunks(SECTOR_SIZE) {
            self.write_to_entry(entry.index, sector)?;
        }
        self.finalize_entry(entry.index)?;
        entry.size_bytes = bytes.len() as u64;
        Ok(entry)
    }

    /// Finds a live entry by its `NAME.EXT` form.
    fn find_by_display_name(&mut self, display_name: &str) -> Result<Option<Entry>, StorageError> {
        Ok(self
            .list_current_directory()?
            .into_iter()
            .find(|entry| !entry.deleted && entry.display_name().eq_ignore_ascii_case(display_name)))
    }
}
