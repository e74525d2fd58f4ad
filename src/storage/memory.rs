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
use tracing::debug;

use super::{
    short_name, Entry, EntryIndex, Storage, StorageError, Transfer, TransferState,
};

struct StoredFile {
    entry: Entry,
    data: Vec<u8>,
    writable: bool,
}

/// Storage held entirely in memory. Used by tests and as a scratch store.
pub struct MemoryStorage {
    files: Vec<StoredFile>,
    valid: bool,
    fail_writes: bool,
}

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        MemoryStorage {
            files: Vec::new(),
            valid: true,
            fail_writes: false,
        }
    }

    /// A store whose medium reports itself as unusable.
    pub fn invalid() -> MemoryStorage {
        MemoryStorage {
            valid: false,
            ..MemoryStorage::new()
        }
    }

    /// Adds a finished file directly, bypassing the sector interface.
    pub fn insert(
        &mut self,
        name: &str,
        extension: &str,
        data: Vec<u8>,
    ) -> Result<EntryIndex, StorageError> {
        let entry = self.create_entry(name, extension)?;
        let file = &mut self.files[entry.index];
        file.entry.size_bytes = data.len() as u64;
        file.data = data;
        file.writable = false;
        Ok(entry.index)
    }

    /// Makes every subsequent write fail.
    pub fn set_fail_writes(&mut self, fail_writes: bool) {
        self.fail_writes = fail_writes;
    }

    /// The contents of a live entry.
    pub fn contents(&self, entry: EntryIndex) -> Option<&[u8]> {
        self.files
            .get(entry)
            .filter(|file| !file.entry.deleted)
            .map(|file| file.data.as_slice())
    }

    fn live_file(&mut self, entry: EntryIndex) -> Result<&mut StoredFile, StorageError> {
        let file = self
            .files
            .get_mut(entry)
            .ok_or(StorageError::NotFound(entry))?;
        if file.entry.deleted {
            return Err(StorageError::Deleted(entry));
        }
        Ok(file)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        MemoryStorage::new()
    }
}

impl Storage for MemoryStorage {
    fn is_valid(&self) -> bool {
        self.valid
    }

    fn list_current_directory(&mut self) -> Result<Vec<Entry>, StorageError> {
        if !self.valid {
            return Err(StorageError::InvalidFilesystem);
        }
        Ok(self.files.iter().map(|file| file.entry.clone()).collect())
    }

    fn read_entry(&mut self, entry: EntryIndex) -> Result<Transfer, StorageError> {
        self.live_file(entry)?;
        Ok(Transfer::start(entry))
    }

    fn next_sector(&mut self, transfer: &mut Transfer, out: &mut [u8]) -> TransferState {
        if !transfer.is_streaming() {
            return transfer.state();
        }

        let file = match self.files.get(transfer.entry()) {
            Some(file) if !file.entry.deleted => file,
            _ => {
                transfer.cancel();
                return transfer.state();
            }
        };

        let start = transfer.position() as usize;
        if start >= file.data.len() {
            transfer.finish();
            return transfer.state();
        }

        let end = (start + out.len()).min(file.data.len());
        let read = end - start;
        out[..read].copy_from_slice(&file.data[start..end]);
        out[read..].fill(0);
        transfer.advance(read);
        TransferState::Streaming
    }

    fn create_entry(&mut self, name: &str, extension: &str) -> Result<Entry, StorageError> {
        if !self.valid {
            return Err(StorageError::InvalidFilesystem);
        }
        if self.fail_writes {
            return Err(StorageError::WriteFailed(format!("{}.{}", name, extension)));
        }

        let (filename, extension) = short_name(name, extension)?;
        let existing = self.files.iter().position(|file| {
            !file.entry.deleted
                && file.entry.filename == filename
                && file.entry.extension == extension
        });

        let index = match existing {
            Some(index) => {
                debug!(index, filename, extension, "Truncating existing entry");
                let file = &mut self.files[index];
                file.data.clear();
                file.entry.size_bytes = 0;
                file.writable = true;
                index
            }
            None => {
                let index = self.files.len();
                self.files.push(StoredFile {
                    entry: Entry {
                        index,
                        filename,
                        extension,
                        size_bytes: 0,
                        deleted: false,
                    },
                    data: Vec::new(),
                    writable: true,
                });
                index
            }
        };

        Ok(self.files[index].entry.clone())
    }

    fn write_to_entry(&mut self, entry: EntryIndex, bytes: &[u8]) -> Result<(), StorageError> {
        let fail_writes = self.fail_writes;
        let file = self.live_file(entry)?;
        if !file.writable {
            return Err(StorageError::NotWritable(entry));
        }
        if fail_writes {
            return Err(StorageError::WriteFailed(file.entry.display_name()));
        }
        file.data.extend_from_slice(bytes);
        file.entry.size_bytes = file.data.len() as u64;
        Ok(())
    }

    fn finalize_entry(&mut self, entry: EntryIndex) -> Result<(), StorageError> {
        let file = self.live_file(entry)?;
        if !file.writable {
            return Err(StorageError::NotWritable(entry));
        }
        file.writable = false;
        Ok(())
    }

    fn delete_entry(&mut self, entry: EntryIndex) -> Result<(), StorageError> {
        let file = self.live_file(entry)?;
        file.entry.deleted = true;
        file.data = Vec::new();
        Ok(())
    }
}
