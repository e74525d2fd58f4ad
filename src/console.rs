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
//! A line-oriented stand-in for the grid controller.
//!
//! Each line read from the console becomes one [`Command`]. Most commands map
//! directly onto a [`ParameterEvent`].

use std::str::FromStr;

use crate::{
    events::{ParameterEvent, UiEvent},
    grid::Cell,
    storage::FileKind,
};

pub const HELP: &str = "\
commands:
  explore audio|midi|scene   list files of a kind
  load X,Y N                 load listed file N onto a cell
  load-midi X,Y N            load listed MIDI loop N onto a cell
  unload X,Y                 clear a cell
  play X,Y                   start or stop the track on a cell
  record X,Y                 arm MIDI recording onto a cell
  end                        end MIDI recording
  save-midi X,Y NAME         save a cell's MIDI loop
  save-scene NAME            save every loaded file as a scene
  load-scene N               load listed scene N
  channel N                  move MIDI input to channel N (0-15)
  delete [N]                 list files for deletion, or delete listed file N
  status                     show the transport
  quit";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command {0}")]
    Unknown(String),

    #[error("{command} expects {expected}")]
    Usage {
        command: String,
        expected: &'static str,
    },

    #[error("invalid cell {0}, expected X,Y")]
    InvalidCell(String),

    #[error("invalid number {0}")]
    InvalidNumber(String),
}

/// One console line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Parameter(ParameterEvent),
    Status,
    Help,
    Quit,
}

fn parse_cell(text: &str) -> Result<Cell, CommandError> {
    let invalid = || CommandError::InvalidCell(text.to_string());
    let (x, y) = text.split_once(',').ok_or_else(invalid)?;
    Ok(Cell::new(
        x.trim().parse().map_err(|_| invalid())?,
        y.trim().parse().map_err(|_| invalid())?,
    ))
}

fn parse_number<T: FromStr>(text: &str) -> Result<T, CommandError> {
    text.parse()
        .map_err(|_| CommandError::InvalidNumber(text.to_string()))
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Command, CommandError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, args)) = words.split_first() else {
            return Err(CommandError::Empty);
        };

        let usage = |expected: &'static str| CommandError::Usage {
            command: name.to_string(),
            expected,
        };

        let event = match (name, args) {
            ("explore", [kind]) => {
                let kind = match kind.to_ascii_lowercase().as_str() {
                    "audio" => FileKind::Audio,
                    "midi" => FileKind::Midi,
                    "scene" => FileKind::Scene,
                    _ => return Err(usage("audio, midi or scene")),
                };
                ParameterEvent::EnterFileExplorer { kind }
            }
            ("explore", _) => return Err(usage("a file kind")),
            ("load", [cell, index]) => ParameterEvent::LoadFile {
                cell: parse_cell(cell)?,
                index: parse_number(index)?,
            },
            ("load", _) => return Err(usage("a cell and a listing position")),
            ("load-midi", [cell, index]) => ParameterEvent::LoadMidiRecording {
                cell: parse_cell(cell)?,
                index: parse_number(index)?,
            },
            ("load-midi", _) => return Err(usage("a cell and a listing position")),
            ("unload", [cell]) => ParameterEvent::UnloadFile {
                cell: parse_cell(cell)?,
            },
            ("play", [cell]) => ParameterEvent::PlayOrStopTrack {
                cell: parse_cell(cell)?,
            },
            ("record", [cell]) => ParameterEvent::StartMidiRecording {
                cell: parse_cell(cell)?,
            },
            ("unload" | "play" | "record", _) => return Err(usage("a cell")),
            ("end", []) => ParameterEvent::EndMidiRecording,
            ("save-midi", [cell, name]) => ParameterEvent::SaveMidiRecording {
                cell: parse_cell(cell)?,
                name: name.to_string(),
            },
            ("save-midi", _) => return Err(usage("a cell and a name")),
            ("save-scene", [name]) => ParameterEvent::SaveScene {
                name: name.to_string(),
            },
            ("save-scene", _) => return Err(usage("a name")),
            ("load-scene", [index]) => ParameterEvent::LoadScene {
                index: parse_number(index)?,
            },
            ("load-scene", _) => return Err(usage("a listing position")),
            ("channel", [channel]) => ParameterEvent::ActiveMidiChannel {
                channel: parse_number(channel)?,
            },
            ("channel", _) => return Err(usage("a channel number")),
            ("delete", []) => ParameterEvent::DeleteFile,
            ("delete", [index]) => ParameterEvent::ConfirmDeleteFile {
                index: parse_number(index)?,
            },
            ("status", []) => return Ok(Command::Status),
            ("help", _) => return Ok(Command::Help),
            ("quit" | "exit", []) => return Ok(Command::Quit),
            _ => return Err(CommandError::Unknown(line.trim().to_string())),
        };

        Ok(Command::Parameter(event))
    }
}

/// Renders a UI event for the console.
pub fn describe(event: &UiEvent) -> String {
    match event {
        UiEvent::InvalidFilesystem => "storage is not usable".to_string(),
        UiEvent::EnterFileExplorer(listing) => {
            if listing.is_empty() {
                return "no files".to_string();
            }
            listing
                .iter()
                .enumerate()
                .map(|(position, entry)| format!("{:>3}  {}", position, entry.display_name))
                .collect::<Vec<_>>()
                .join("\n")
        }
        UiEvent::TransportMove(column) => {
            let mut row = String::with_capacity(8);
            for x in 0..crate::grid::GRID_COLS {
                row.push(if x == *column { '#' } else { '.' });
            }
            row
        }
        UiEvent::AudioTrackFinished(cell) => format!("audio on {} finished", cell),
        UiEvent::MidiRecordingStarted(cell) => format!("recording onto {}", cell),
        UiEvent::MidiRecordingFinished(cell) => format!("recording onto {} finished", cell),
        UiEvent::MidiTrackFinished(cell) => format!("MIDI loop on {} stopped", cell),
        UiEvent::MidiTrackNotSaved(cell) => format!("MIDI loop on {} must be saved first", cell),
        UiEvent::SceneSavingStatus(ok) => status("scene save", *ok),
        UiEvent::SceneLoadingStatus(ok) => status("scene load", *ok),
        UiEvent::SceneTrackFileLoaded(cell) => format!("scene loaded {}", cell),
        UiEvent::FileLoaded { cell, ok } => status(&format!("load onto {}", cell), *ok),
        UiEvent::MidiSavingStatus { cell, ok } => status(&format!("save of {}", cell), *ok),
        UiEvent::FileDeleted(ok) => status("delete", *ok),
    }
}

fn status(what: &str, ok: bool) -> String {
    format!("{} {}", what, if ok { "succeeded" } else { "failed" })
}
