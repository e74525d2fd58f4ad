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
use std::{
    collections::{hash_map, HashMap},
    fs::{self, File},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, error, info};

use super::{
    short_name, Entry, EntryIndex, Storage, StorageError, Transfer, TransferState,
};

struct HostEntry {
    entry: Entry,
    path: PathBuf,
}

/// Storage backed by a directory on the host file system.
///
/// Entry indices are stable for the lifetime of the store: files that disappear are
/// reported as deleted rather than removed from the listing.
pub struct DirectoryStorage {
    root: PathBuf,
    entries: Vec<HostEntry>,
    readers: HashMap<EntryIndex, File>,
    writers: HashMap<EntryIndex, File>,
}

impl DirectoryStorage {
    /// Opens the store and scans the directory once.
    pub fn open(root: &Path) -> Result<DirectoryStorage, StorageError> {
        let mut storage = DirectoryStorage {
            root: root.to_path_buf(),
            entries: Vec::new(),
            readers: HashMap::new(),
            writers: HashMap::new(),
        };
        if storage.is_valid() {
            storage.scan()?;
            info!(
                root = root.display().to_string(),
                entries = storage.entries.len(),
                "Opened storage directory"
            );
        } else {
            error!(
                root = root.display().to_string(),
                "Storage directory is not usable"
            );
        }
        Ok(storage)
    }

    fn scan(&mut self) -> Result<(), StorageError> {
        let mut found: Vec<(String, String, PathBuf, u64)> = Vec::new();
        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            if !path.is_file() {
                continue;
            }

            let (Some(stem), Some(extension)) = (
                path.file_stem().and_then(|stem| stem.to_str()),
                path.extension().and_then(|ext| ext.to_str()),
            ) else {
                continue;
            };

            match short_name(stem, extension) {
                Ok((filename, extension)) => {
                    found.push((filename, extension, path.clone(), dir_entry.metadata()?.len()))
                }
                Err(_) => debug!(
                    path = path.display().to_string(),
                    "Skipping file without an 8.3 name"
                ),
            }
        }
        found.sort();

        for entry in self.entries.iter_mut() {
            entry.entry.deleted = true;
        }

        for (filename, extension, path, size_bytes) in found {
            match self.entries.iter_mut().find(|known| known.path == path) {
                Some(known) => {
                    known.entry.deleted = false;
                    known.entry.size_bytes = size_bytes;
                }
                None => {
                    let index = self.entries.len();
                    self.entries.push(HostEntry {
                        entry: Entry {
                            index,
                            filename,
                            extension,
                            size_bytes,
                            deleted: false,
                        },
                        path,
                    });
                }
            }
        }

        Ok(())
    }

    fn live_entry(&self, entry: EntryIndex) -> Result<&HostEntry, StorageError> {
        let host_entry = self.entries.get(entry).ok_or(StorageError::NotFound(entry))?;
        if host_entry.entry.deleted {
            return Err(StorageError::Deleted(entry));
        }
        Ok(host_entry)
    }

    fn read_sector(
        &mut self,
        transfer: &Transfer,
        out: &mut [u8],
    ) -> Result<usize, StorageError> {
        let index = transfer.entry();
        let host_entry = self
            .entries
            .get(index)
            .ok_or(StorageError::NotFound(index))?;
        if host_entry.entry.deleted {
            return Err(StorageError::Deleted(index));
        }

        // The reader is opened on the first sector and reused after that.
        let file = match self.readers.entry(index) {
            hash_map::Entry::Occupied(file) => file.into_mut(),
            hash_map::Entry::Vacant(slot) => slot.insert(File::open(&host_entry.path)?),
        };

        file.seek(SeekFrom::Start(transfer.position()))?;
        let mut read = 0;
        while read < out.len() {
            match file.read(&mut out[read..])? {
                0 => break,
                n => read += n,
            }
        }
        Ok(read)
    }
}

impl Storage for DirectoryStorage {
    fn is_valid(&self) -> bool {
        self.root.is_dir()
    }

    fn list_current_directory(&mut self) -> Result<Vec<Entry>, StorageError> {
        if !self.is_valid() {
            return Err(StorageError::InvalidFilesystem);
        }
        self.scan()?;
        Ok(self.entries.iter().map(|entry| entry.entry.clone()).collect())
    }

    fn read_entry(&mut self, entry: EntryIndex) -> Result<Transfer, StorageError> {
        self.live_entry(entry)?;
        Ok(Transfer::start(entry))
    }

    fn next_sector(&mut self, transfer: &mut Transfer, out: &mut [u8]) -> TransferState {
        if !transfer.is_streaming() {
            return transfer.state();
        }

        match self.read_sector(transfer, out) {
            Ok(0) => transfer.finish(),
            Ok(read) => {
                out[read..].fill(0);
                transfer.advance(read);
            }
            Err(e) => {
                error!(
                    err = e.to_string(),
                    entry = transfer.entry(),
                    "Sector read failed"
                );
                transfer.cancel();
            }
        }
        transfer.state()
    }

    fn create_entry(&mut self, name: &str, extension: &str) -> Result<Entry, StorageError> {
        if !self.is_valid() {
            return Err(StorageError::InvalidFilesystem);
        }

        let (filename, extension) = short_name(name, extension)?;
        // Deleted entries are revived so a path never maps to two indices.
        let existing = self.entries.iter().position(|known| {
            known.entry.filename == filename && known.entry.extension == extension
        });

        let path = match existing {
            Some(index) => self.entries[index].path.clone(),
            None => self.root.join(format!("{}.{}", filename, extension)),
        };
        let file = File::create(&path)?;

        let index = match existing {
            Some(index) => {
                self.readers.remove(&index);
                self.entries[index].entry.size_bytes = 0;
                self.entries[index].entry.deleted = false;
                index
            }
            None => {
                let index = self.entries.len();
                self.entries.push(HostEntry {
                    entry: Entry {
                        index,
                        filename,
                        extension,
                        size_bytes: 0,
                        deleted: false,
                    },
                    path,
                });
                index
            }
        };

        self.writers.insert(index, file);
        Ok(self.entries[index].entry.clone())
    }

    fn write_to_entry(&mut self, entry: EntryIndex, bytes: &[u8]) -> Result<(), StorageError> {
        self.live_entry(entry)?;
        let file = self
            .writers
            .get_mut(&entry)
            .ok_or(StorageError::NotWritable(entry))?;
        file.write_all(bytes)?;
        self.entries[entry].entry.size_bytes += bytes.len() as u64;
        Ok(())
    }

    fn finalize_entry(&mut self, entry: EntryIndex) -> Result<(), StorageError> {
        let mut file = self
            .writers
            .remove(&entry)
            .ok_or(StorageError::NotWritable(entry))?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    fn delete_entry(&mut self, entry: EntryIndex) -> Result<(), StorageError> {
        let path = self.live_entry(entry)?.path.clone();
        self.readers.remove(&entry);
        self.writers.remove(&entry);
        fs::remove_file(&path)?;
        self.entries[entry].entry.deleted = true;
        Ok(())
    }
}
