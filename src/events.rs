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
//! Events exchanged between the control surface and the engine.

use crate::{
    grid::Cell,
    storage::{EntryIndex, FileKind},
};

pub mod bridge;

/// A request from the control surface.
///
/// `index` fields refer to positions in the most recent explorer listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParameterEvent {
    /// List the files of a kind.
    EnterFileExplorer { kind: FileKind },
    /// Load a listed file onto a cell.
    LoadFile { cell: Cell, index: usize },
    UnloadFile { cell: Cell },
    PlayOrStopTrack { cell: Cell },
    /// Arm recording onto a MIDI cell. Capture begins when the loop next starts.
    StartMidiRecording { cell: Cell },
    EndMidiRecording,
    SaveMidiRecording { cell: Cell, name: String },
    /// Load a listed MIDI loop onto a cell.
    LoadMidiRecording { cell: Cell, index: usize },
    SaveScene { name: String },
    /// Load a listed scene.
    LoadScene { index: usize },
    /// Select the channel incoming MIDI is moved to.
    ActiveMidiChannel { channel: u8 },
    /// List every file for deletion.
    DeleteFile,
    /// Delete a listed file.
    ConfirmDeleteFile { index: usize },
}

/// One row of an explorer listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExplorerEntry {
    pub display_name: String,
    pub storage_index: EntryIndex,
}

/// A notification for the control surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UiEvent {
    InvalidFilesystem,
    EnterFileExplorer(Vec<ExplorerEntry>),
    /// The transport column that should be lit.
    TransportMove(u32),
    AudioTrackFinished(Cell),
    MidiRecordingStarted(Cell),
    MidiRecordingFinished(Cell),
    MidiTrackFinished(Cell),
    /// The cell's loop must be saved before the scene can be.
    MidiTrackNotSaved(Cell),
    SceneSavingStatus(bool),
    SceneLoadingStatus(bool),
    SceneTrackFileLoaded(Cell),
    FileLoaded { cell: Cell, ok: bool },
    MidiSavingStatus { cell: Cell, ok: bool },
    FileDeleted(bool),
}
