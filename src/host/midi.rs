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
use std::{collections::BTreeMap, fmt};

use crossbeam_channel::{Sender, TrySendError};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use tracing::{debug, error, info, warn};

use super::HostError;
use crate::midi::MidiEvent;

/// A MIDI port name and the directions it supports.
#[derive(Debug, PartialEq, Eq)]
pub struct MidiPort {
    pub name: String,
    pub input: bool,
    pub output: bool,
}

impl fmt::Display for MidiPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut capabilities: Vec<&str> = Vec::new();
        if self.input {
            capabilities.push("Input");
        }
        if self.output {
            capabilities.push("Output");
        }

        write!(f, "{} ({})", self.name, capabilities.join("/"))
    }
}

/// Lists every MIDI port, merging inputs and outputs that share a name.
pub fn list_ports() -> Result<Vec<MidiPort>, HostError> {
    let input = MidiInput::new("gridloop input listing")?;
    let output = MidiOutput::new("gridloop output listing")?;

    let mut ports: BTreeMap<String, MidiPort> = BTreeMap::new();
    for port in input.ports() {
        let name = input.port_name(&port)?;
        ports
            .entry(name.clone())
            .or_insert(MidiPort {
                name,
                input: false,
                output: false,
            })
            .input = true;
    }
    for port in output.ports() {
        let name = output.port_name(&port)?;
        ports
            .entry(name.clone())
            .or_insert(MidiPort {
                name,
                input: false,
                output: false,
            })
            .output = true;
    }

    Ok(ports.into_values().collect())
}

/// Picks the single port whose name contains `query`.
fn select_port<P>(ports: Vec<(String, P)>, query: &str) -> Result<(String, P), HostError> {
    let mut matches: Vec<(String, P)> = ports
        .into_iter()
        .filter(|(name, _)| name.contains(query))
        .collect();

    match matches.len() {
        0 => Err(HostError::MidiPortNotFound(query.to_string())),
        1 => Ok(matches.swap_remove(0)),
        _ => Err(HostError::AmbiguousMidiPort(
            matches
                .iter()
                .map(|(name, _)| name.clone())
                .collect::<Vec<String>>()
                .join(", "),
        )),
    }
}

/// Forwards raw input messages to `sender` until the returned connection is dropped.
pub fn connect_input(
    query: &str,
    sender: Sender<Vec<u8>>,
) -> Result<MidiInputConnection<()>, HostError> {
    let input = MidiInput::new("gridloop input")?;
    let mut ports = Vec::new();
    for port in input.ports() {
        ports.push((input.port_name(&port)?, port));
    }
    let (name, port) = select_port(ports, query)?;

    let connection = input
        .connect(
            &port,
            "gridloop input watcher",
            move |_, raw_event, _| match sender.try_send(raw_event.to_vec()) {
                Ok(()) => debug!(event = format!("{:02X?}", raw_event), "Received MIDI event"),
                Err(TrySendError::Full(_)) => warn!("MIDI input queue is full, dropping event"),
                Err(TrySendError::Disconnected(_)) => {
                    error!("MIDI input receiver is gone")
                }
            },
            (),
        )
        .map_err(|e| HostError::Midi(e.to_string()))?;

    info!(port = name, "Watching MIDI input");
    Ok(connection)
}

/// An open MIDI output.
pub struct MidiSink {
    name: String,
    connection: MidiOutputConnection,
}

impl MidiSink {
    pub fn send(&mut self, event: &MidiEvent) -> Result<(), HostError> {
        debug!(port = self.name, event = ?event, "Emitting MIDI event");
        self.connection.send(event.as_bytes())?;
        Ok(())
    }
}

pub fn connect_output(query: &str) -> Result<MidiSink, HostError> {
    let output = MidiOutput::new("gridloop output")?;
    let mut ports = Vec::new();
    for port in output.ports() {
        ports.push((output.port_name(&port)?, port));
    }
    let (name, port) = select_port(ports, query)?;

    let connection = output
        .connect(&port, "gridloop output")
        .map_err(|e| HostError::Midi(e.to_string()))?;

    info!(port = name, "Opened MIDI output");
    Ok(MidiSink { name, connection })
}
