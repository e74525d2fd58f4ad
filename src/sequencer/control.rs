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
//! Parameter event handling. Everything here runs on the control path.

use tracing::{debug, error, info, warn};

use super::{Sequencer, MAX_MIDI_CHANNEL};
use crate::{
    arena::ArenaError,
    events::{ExplorerEntry, ParameterEvent, UiEvent},
    grid::{Cell, Row},
    scene::{write_scene, SceneBinding, SceneError, SceneFileKind, SceneReader},
    storage::{Entry, FileKind, StorageError, MIDI_EXTENSION, SCENE_EXTENSION},
    tracks::{decode_midi_loop, AudioTrack, MidiTrack, MidiTrackError},
};

/// Why a control operation failed. Reported to the control surface as a status event.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("cell {0} is not on the grid")]
    InvalidCell(Cell),

    #[error("{file} cannot be loaded onto cell {cell}")]
    WrongRow { file: String, cell: Cell },

    #[error("no file at explorer position {0}")]
    NotListed(usize),

    #[error("file {0} was not found")]
    FileNotFound(String),

    #[error("no MIDI loop on cell {0}")]
    NoMidiTrack(Cell),

    #[error("MIDI loop on cell {0} has not been saved")]
    UnsavedMidiTrack(Cell),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Arena(#[from] ArenaError),

    #[error(transparent)]
    MidiTrack(#[from] MidiTrackError),

    #[error(transparent)]
    Scene(#[from] SceneError),
}

impl Sequencer {
    /// Dispatches one request from the control surface.
    pub fn on_parameter_event(&mut self, event: ParameterEvent) {
        debug!(event = ?event, "Parameter event");
        match event {
            ParameterEvent::EnterFileExplorer { kind } => self.enter_file_explorer(Some(kind)),
            ParameterEvent::LoadFile { cell, index } => self.load_listed_file(cell, index, None),
            ParameterEvent::UnloadFile { cell } => self.unload_cell(cell),
            ParameterEvent::PlayOrStopTrack { cell } => self.play_or_stop_track(cell),
            ParameterEvent::StartMidiRecording { cell } => self.start_midi_recording(cell),
            ParameterEvent::EndMidiRecording => {
                self.recorder.end(self.master_clock, self.max_loop_length)
            }
            ParameterEvent::SaveMidiRecording { cell, name } => {
                let ok = match self.save_midi_recording(cell, &name) {
                    Ok(()) => true,
                    Err(e) => {
                        error!(err = e.to_string(), cell = %cell, "Unable to save MIDI loop");
                        false
                    }
                };
                self.ui.publish(UiEvent::MidiSavingStatus { cell, ok });
            }
            ParameterEvent::LoadMidiRecording { cell, index } => {
                self.load_listed_file(cell, index, Some(FileKind::Midi))
            }
            ParameterEvent::SaveScene { name } => {
                let ok = match self.save_scene(&name) {
                    Ok(()) => true,
                    Err(e) => {
                        error!(err = e.to_string(), name = name.as_str(), "Unable to save scene");
                        false
                    }
                };
                self.ui.publish(UiEvent::SceneSavingStatus(ok));
            }
            ParameterEvent::LoadScene { index } => {
                let result = self
                    .listed(index)
                    .and_then(|entry| self.load_scene(&entry));
                if let Err(e) = &result {
                    error!(err = e.to_string(), "Unable to load scene");
                }
                self.ui.publish(UiEvent::SceneLoadingStatus(result.is_ok()));
            }
            ParameterEvent::ActiveMidiChannel { channel } => {
                if channel > MAX_MIDI_CHANNEL {
                    warn!(channel, "Ignoring invalid MIDI channel");
                } else {
                    self.active_midi_channel = channel;
                }
            }
            ParameterEvent::DeleteFile => self.enter_file_explorer(None),
            ParameterEvent::ConfirmDeleteFile { index } => {
                let result = self
                    .listed(index)
                    .and_then(|entry| self.delete_file(&entry));
                if let Err(e) = &result {
                    error!(err = e.to_string(), "Unable to delete file");
                }
                self.ui.publish(UiEvent::FileDeleted(result.is_ok()));
            }
        }
    }

    /// Lists live files of `kind`, or every known file when no kind is given.
    fn enter_file_explorer(&mut self, kind: Option<FileKind>) {
        let entries = match self.storage.list_current_directory() {
            Ok(entries) => entries,
            Err(e) => {
                error!(err = e.to_string(), "Unable to list files");
                self.explorer.clear();
                self.ui.publish(UiEvent::InvalidFilesystem);
                return;
            }
        };

        self.explorer = entries
            .into_iter()
            .filter(|entry| !entry.deleted)
            .filter(|entry| match kind {
                Some(kind) => entry.kind() == Some(kind),
                None => entry.kind().is_some(),
            })
            .collect();

        let listing = self
            .explorer
            .iter()
            .map(|entry| ExplorerEntry {
                display_name: entry.display_name(),
                storage_index: entry.index,
            })
            .collect();
        self.ui.publish(UiEvent::EnterFileExplorer(listing));
    }

    fn listed(&self, index: usize) -> Result<Entry, ControlError> {
        self.explorer
            .get(index)
            .cloned()
            .ok_or(ControlError::NotListed(index))
    }

    fn load_listed_file(&mut self, cell: Cell, index: usize, kind: Option<FileKind>) {
        let result = self.listed(index).and_then(|entry| {
            match kind {
                Some(kind) if entry.kind() != Some(kind) => Err(ControlError::WrongRow {
                    file: entry.display_name(),
                    cell,
                }),
                _ => self.load_entry(cell, &entry),
            }
        });

        if let Err(e) = &result {
            error!(err = e.to_string(), cell = %cell, "Unable to load file");
        }
        self.ui.publish(UiEvent::FileLoaded {
            cell,
            ok: result.is_ok(),
        });
    }

    /// Loads a file onto a cell, replacing whatever the cell held.
    pub fn load_entry(&mut self, cell: Cell, entry: &Entry) -> Result<(), ControlError> {
        let row = cell.row().ok_or(ControlError::InvalidCell(cell))?;
        match entry.kind() {
            Some(FileKind::Audio) if row.is_audio() => self.load_audio(cell, row, entry),
            Some(FileKind::Midi) if row.midi_channel().is_some() => self.load_midi(cell, entry),
            _ => Err(ControlError::WrongRow {
                file: entry.display_name(),
                cell,
            }),
        }
    }

    fn load_audio(&mut self, cell: Cell, row: Row, entry: &Entry) -> Result<(), ControlError> {
        let files = match self.stereo_pair(entry)? {
            Some((left, right)) => vec![(left, 1.0, 0.0), (right, 0.0, 1.0)],
            None => vec![(entry.clone(), 1.0, 1.0)],
        };

        // Both halves of a pair are built before the cell is touched.
        let mut tracks = Vec::with_capacity(files.len());
        for (file, amplitude_left, amplitude_right) in files {
            let track = AudioTrack::new(
                cell,
                file,
                row.is_loopable(),
                self.decode_buffer.clone(),
                self.codec.clone(),
                &self.arena,
            )
            .and_then(|mut track| {
                track.set_amplitudes(amplitude_left, amplitude_right);
                self.arena.allocate(track)
            });

            match track {
                Ok(track) => tracks.push(track),
                Err(e) => {
                    for track in tracks {
                        self.arena.free_value(track);
                    }
                    return Err(e.into());
                }
            }
        }

        self.unload_cell(cell);
        for mut track in tracks {
            let max_loop_length = track.set_loop_length(self.max_loop_length);
            // One-shots never stretch the shared loop.
            if track.is_loopable() {
                self.max_loop_length = max_loop_length;
            }
            info!(
                cell = %cell,
                file = track.entry().display_name(),
                file_length = track.file_length(),
                loop_length = track.loop_length(),
                "Loaded audio file"
            );
            self.audio_tracks.push(track);
        }
        self.master_clock %= self.max_loop_length;
        Ok(())
    }

    /// Finds the other half of a `<stem>L` / `<stem>R` pair.
    fn stereo_pair(&mut self, entry: &Entry) -> Result<Option<(Entry, Entry)>, ControlError> {
        let (base, other_side) = match entry.filename.strip_suffix('L') {
            Some(base) => (base, 'R'),
            None => match entry.filename.strip_suffix('R') {
                Some(base) => (base, 'L'),
                None => return Ok(None),
            },
        };
        if base.is_empty() {
            return Ok(None);
        }

        let sibling_name = format!("{}{}.{}", base, other_side, entry.extension);
        let Some(sibling) = self.storage.find_by_display_name(&sibling_name)? else {
            return Ok(None);
        };

        debug!(file = entry.display_name(), sibling = sibling_name, "Found stereo pair");
        Ok(Some(if other_side == 'R' {
            (entry.clone(), sibling)
        } else {
            (sibling, entry.clone())
        }))
    }

    fn load_midi(&mut self, cell: Cell, entry: &Entry) -> Result<(), ControlError> {
        let bytes = self.storage.read_to_end(entry.index)?;
        let (events, loop_length) = decode_midi_loop(&bytes)?;
        let mut track = MidiTrack::new(cell, &events, loop_length, &self.arena)?;
        track.mark_saved(entry.display_name());
        let track = self.arena.allocate(track)?;

        self.unload_cell(cell);
        info!(
            cell = %cell,
            file = entry.display_name(),
            events = events.len(),
            loop_length,
            "Loaded MIDI loop"
        );
        self.midi_tracks.push(track);
        Ok(())
    }

    /// Removes every track on a cell and returns their memory to the arena.
    pub fn unload_cell(&mut self, cell: Cell) {
        let mut removed = false;

        let mut index = 0;
        while index < self.audio_tracks.len() {
            if self.audio_tracks[index].cell() == cell {
                let track = self.audio_tracks.remove(index);
                self.arena.free_value(track);
                removed = true;
            } else {
                index += 1;
            }
        }

        let mut index = 0;
        while index < self.midi_tracks.len() {
            if self.midi_tracks[index].cell() == cell {
                let track = self.midi_tracks.remove(index);
                self.arena.free_value(track);
                removed = true;
            } else {
                index += 1;
            }
        }

        if removed {
            debug!(cell = %cell, "Unloaded cell");
            self.renegotiate_loop_length();
        }
    }

    fn unload_all(&mut self) {
        for track in self.audio_tracks.drain(..) {
            self.arena.free_value(track);
        }
        for track in self.midi_tracks.drain(..) {
            self.arena.free_value(track);
        }
        self.renegotiate_loop_length();
    }

    /// Toggles the track on a cell. Starting a track stops the others on its row.
    fn play_or_stop_track(&mut self, cell: Cell) {
        let Some(row) = cell.row() else {
            warn!(cell = %cell, "Cell is not on the grid");
            return;
        };

        if row.is_audio() {
            self.play_or_stop_audio(cell, row);
        } else if row.midi_channel().is_some() {
            self.play_or_stop_midi(cell);
        } else {
            debug!(cell = %cell, "Nothing to play on the transport row");
            return;
        }

        self.renegotiate_loop_length();
    }

    fn play_or_stop_audio(&mut self, cell: Cell, row: Row) {
        let mut loaded = false;
        let mut playing = false;
        for track in self.audio_tracks.iter().filter(|track| track.cell() == cell) {
            loaded = true;
            playing |= track.is_playing();
        }

        if !loaded {
            warn!(cell = %cell, "No audio loaded on cell");
            return;
        }

        if playing {
            for track in self.audio_tracks.iter_mut().filter(|track| track.cell() == cell) {
                track.stop();
            }
            return;
        }

        let partner = row.exclusive_partner();
        for track in self.audio_tracks.iter_mut() {
            let other_row = track.cell().row();
            if track.cell() != cell && (other_row == Some(row) || other_row == partner) {
                track.stop();
            }
        }

        for track in self.audio_tracks.iter_mut().filter(|track| track.cell() == cell) {
            if let Err(e) = track.play(self.storage.as_mut()) {
                error!(err = e.to_string(), cell = %cell, "Unable to start audio");
            }
        }
    }

    fn play_or_stop_midi(&mut self, cell: Cell) {
        let Some(index) = self.midi_tracks.iter().position(|track| track.cell() == cell) else {
            warn!(cell = %cell, "No MIDI loop on cell");
            return;
        };

        if self.midi_tracks[index].is_active() {
            let other_active = self
                .midi_tracks
                .iter()
                .any(|track| track.cell() != cell && track.is_active());
            // The last sounding loop stops at once.
            self.midi_tracks[index].stop(!other_active);
            return;
        }

        for track in self.midi_tracks.iter_mut() {
            if track.cell() != cell && track.cell().y == cell.y {
                track.stop(false);
            }
        }

        let other_active = self.midi_tracks.iter().any(|track| track.is_active());
        self.midi_tracks[index].play(false, other_active);
    }

    fn start_midi_recording(&mut self, cell: Cell) {
        if cell.row().and_then(|row| row.midi_channel()).is_none() {
            warn!(cell = %cell, "Recording is only possible on MIDI rows");
            return;
        }
        if self.recorder.start(cell) {
            info!(cell = %cell, "Armed MIDI recording");
        }
    }

    fn save_midi_recording(&mut self, cell: Cell, name: &str) -> Result<(), ControlError> {
        let bytes = self
            .midi_track_at(cell)
            .ok_or(ControlError::NoMidiTrack(cell))?
            .to_bytes();
        let entry = self.storage.write_file(name, MIDI_EXTENSION, &bytes)?;

        if let Some(track) = self.midi_tracks.iter_mut().find(|track| track.cell() == cell) {
            track.mark_saved(entry.display_name());
        }
        info!(cell = %cell, file = entry.display_name(), "Saved MIDI loop");
        Ok(())
    }

    fn scene_bindings(&self) -> Result<Vec<SceneBinding>, ControlError> {
        let mut bindings: Vec<SceneBinding> = Vec::new();
        for track in self.audio_tracks() {
            // The left half stands for a stereo pair.
            if bindings.iter().any(|binding| binding.cell == track.cell()) {
                continue;
            }
            bindings.push(SceneBinding {
                cell: track.cell(),
                kind: SceneFileKind::Audio,
                filename: track.entry().display_name(),
            });
        }

        for track in self.midi_tracks() {
            let filename = track
                .saved_as()
                .ok_or(ControlError::UnsavedMidiTrack(track.cell()))?;
            bindings.push(SceneBinding {
                cell: track.cell(),
                kind: SceneFileKind::Midi,
                filename: filename.to_string(),
            });
        }

        Ok(bindings)
    }

    fn save_scene(&mut self, name: &str) -> Result<(), ControlError> {
        let bindings = match self.scene_bindings() {
            Ok(bindings) => bindings,
            Err(ControlError::UnsavedMidiTrack(cell)) => {
                self.ui.publish(UiEvent::MidiTrackNotSaved(cell));
                return Err(ControlError::UnsavedMidiTrack(cell));
            }
            Err(e) => return Err(e),
        };

        let entry = self
            .storage
            .write_file(name, SCENE_EXTENSION, write_scene(&bindings).as_bytes())?;
        info!(
            file = entry.display_name(),
            bindings = bindings.len(),
            "Saved scene"
        );
        Ok(())
    }

    /// Loads a scene by its `NAME.EXT`.
    pub fn load_scene_by_name(&mut self, display_name: &str) -> Result<(), ControlError> {
        let entry = self
            .storage
            .find_by_display_name(display_name)?
            .ok_or_else(|| ControlError::FileNotFound(display_name.to_string()))?;
        self.load_scene(&entry)
    }

    /// Replaces every track with the scene's. Lines are applied in order and the first
    /// failing line stops the load, leaving earlier lines applied.
    fn load_scene(&mut self, entry: &Entry) -> Result<(), ControlError> {
        let bytes = self.storage.read_to_end(entry.index)?;
        let text = String::from_utf8_lossy(&bytes);
        let reader = SceneReader::new(&text)?;

        self.unload_all();
        for binding in reader {
            let binding = binding?;
            let file = self
                .storage
                .find_by_display_name(&binding.filename)?
                .filter(|file| file.kind() == Some(FileKind::from(binding.kind)))
                .ok_or_else(|| ControlError::FileNotFound(binding.filename.clone()))?;
            self.load_entry(binding.cell, &file)?;
            self.ui.publish(UiEvent::SceneTrackFileLoaded(binding.cell));
        }

        info!(file = entry.display_name(), "Loaded scene");
        Ok(())
    }

    fn delete_file(&mut self, entry: &Entry) -> Result<(), ControlError> {
        let display_name = entry.display_name();
        let mut cells: Vec<Cell> = self
            .audio_tracks()
            .filter(|track| track.entry().index == entry.index)
            .map(|track| track.cell())
            .collect();
        cells.extend(
            self.midi_tracks()
                .filter(|track| track.saved_as() == Some(display_name.as_str()))
                .map(|track| track.cell()),
        );
        for cell in cells {
            self.unload_cell(cell);
        }

        self.storage.delete_entry(entry.index)?;
        info!(file = display_name, "Deleted file");
        Ok(())
    }
}
