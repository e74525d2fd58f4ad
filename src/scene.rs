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
//! Scene files: the set of files loaded on each cell.
//!
//! ```text
//! VER: 1.0.0
//! AUDIO: 0,1 DRUMSL.B12
//! MIDI: 2,4 TAKE1.MLP
//! ```

use std::{iter::Enumerate, str::Lines};

use crate::{grid::Cell, storage::FileKind};

/// The version written into new scenes.
pub const SCENE_VERSION: &str = "1.0.0";

const SUPPORTED_MAJOR_VERSION: u32 = 1;
const VERSION_TAG: &str = "VER";
const AUDIO_TAG: &str = "AUDIO";
const MIDI_TAG: &str = "MIDI";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    #[error("scene has no version line")]
    MissingVersion,

    #[error("scene version {0} is not supported")]
    UnsupportedVersion(String),

    #[error("malformed scene line {line}: {text}")]
    Malformed { line: usize, text: String },
}

/// A file bound to a cell.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneBinding {
    pub cell: Cell,
    pub kind: SceneFileKind,
    pub filename: String,
}

/// The kinds of file a scene can refer to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SceneFileKind {
    Audio,
    Midi,
}

impl From<SceneFileKind> for FileKind {
    fn from(kind: SceneFileKind) -> FileKind {
        match kind {
            SceneFileKind::Audio => FileKind::Audio,
            SceneFileKind::Midi => FileKind::Midi,
        }
    }
}

/// Renders a scene. Audio bindings are written before MIDI bindings.
pub fn write_scene(bindings: &[SceneBinding]) -> String {
    let mut text = format!("{}: {}\n", VERSION_TAG, SCENE_VERSION);
    for kind in [SceneFileKind::Audio, SceneFileKind::Midi] {
        let tag = match kind {
            SceneFileKind::Audio => AUDIO_TAG,
            SceneFileKind::Midi => MIDI_TAG,
        };
        for binding in bindings.iter().filter(|binding| binding.kind == kind) {
            text.push_str(&format!(
                "{}: {},{} {}\n",
                tag, binding.cell.x, binding.cell.y, binding.filename
            ));
        }
    }
    text
}

/// Reads bindings one line at a time so they can be applied as they are read.
pub struct SceneReader<'a> {
    lines: Enumerate<Lines<'a>>,
}

impl<'a> SceneReader<'a> {
    /// Checks the version line.
    pub fn new(text: &'a str) -> Result<SceneReader<'a>, SceneError> {
        let mut lines = text.lines().enumerate();
        let version = lines
            .by_ref()
            .map(|(_, line)| line.trim())
            .find(|line| !line.is_empty())
            .and_then(|line| line.strip_prefix(VERSION_TAG))
            .and_then(|rest| rest.strip_prefix(':'))
            .map(str::trim)
            .ok_or(SceneError::MissingVersion)?;

        let major = version
            .split('.')
            .next()
            .and_then(|major| major.parse::<u32>().ok());
        if major != Some(SUPPORTED_MAJOR_VERSION) || version.split('.').count() != 3 {
            return Err(SceneError::UnsupportedVersion(version.to_string()));
        }

        Ok(SceneReader { lines })
    }

    fn parse_line(line_number: usize, line: &str) -> Result<SceneBinding, SceneError> {
        let malformed = || SceneError::Malformed {
            line: line_number + 1,
            text: line.to_string(),
        };

        let (tag, rest) = line.split_once(':').ok_or_else(malformed)?;
        let kind = match tag.trim() {
            AUDIO_TAG => SceneFileKind::Audio,
            MIDI_TAG => SceneFileKind::Midi,
            _ => return Err(malformed()),
        };

        let (coordinates, filename) = rest.trim().split_once(' ').ok_or_else(malformed)?;
        let (x, y) = coordinates.split_once(',').ok_or_else(malformed)?;
        let cell = Cell::new(
            x.trim().parse().map_err(|_| malformed())?,
            y.trim().parse().map_err(|_| malformed())?,
        );
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(malformed());
        }

        Ok(SceneBinding {
            cell,
            kind,
            filename: filename.to_string(),
        })
    }
}

impl Iterator for SceneReader<'_> {
    type Item = Result<SceneBinding, SceneError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (line_number, line) = self.lines.find(|(_, line)| !line.trim().is_empty())?;
        Some(SceneReader::parse_line(line_number, line.trim()))
    }
}

/// Reads every binding of a scene.
pub fn read_scene(text: &str) -> Result<Vec<SceneBinding>, SceneError> {
    SceneReader::new(text)?.collect()
}
