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
//! Runs the engine against real audio and MIDI hardware.

use std::{
    error::Error,
    io::{self, BufRead},
    sync::Arc,
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::{
    arena::{Arena, DEFAULT_ARENA_BLOCK_SIZE},
    codec::B12,
    config::EngineConfig,
    console::{describe, Command, HELP},
    events::{bridge::bridge, ParameterEvent, UiEvent},
    sequencer::Sequencer,
    storage::DirectoryStorage,
};

pub mod audio;
pub mod midi;

/// How long the control loop waits for console input before servicing the engine.
const CONTROL_INTERVAL: Duration = Duration::from_millis(2);

/// Raw MIDI input messages buffered between the driver and the control loop.
const MIDI_INPUT_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("no audio device found with name {0}")]
    AudioDeviceNotFound(String),

    #[error("no default audio output device")]
    NoDefaultAudioDevice,

    #[error("audio host error: {0}")]
    Audio(String),

    #[error("no MIDI port found with name {0}")]
    MidiPortNotFound(String),

    #[error("found too many MIDI ports that match ({0}), use a less ambiguous name")]
    AmbiguousMidiPort(String),

    #[error("MIDI error: {0}")]
    Midi(String),
}

impl From<cpal::BuildStreamError> for HostError {
    fn from(e: cpal::BuildStreamError) -> Self {
        HostError::Audio(e.to_string())
    }
}

impl From<cpal::PlayStreamError> for HostError {
    fn from(e: cpal::PlayStreamError) -> Self {
        HostError::Audio(e.to_string())
    }
}

impl From<cpal::DevicesError> for HostError {
    fn from(e: cpal::DevicesError) -> Self {
        HostError::Audio(e.to_string())
    }
}

impl From<cpal::DeviceNameError> for HostError {
    fn from(e: cpal::DeviceNameError) -> Self {
        HostError::Audio(e.to_string())
    }
}

impl From<cpal::HostUnavailable> for HostError {
    fn from(e: cpal::HostUnavailable) -> Self {
        HostError::Audio(e.to_string())
    }
}

impl From<midir::InitError> for HostError {
    fn from(e: midir::InitError) -> Self {
        HostError::Midi(e.to_string())
    }
}

impl From<midir::PortInfoError> for HostError {
    fn from(e: midir::PortInfoError) -> Self {
        HostError::Midi(e.to_string())
    }
}

impl From<midir::SendError> for HostError {
    fn from(e: midir::SendError) -> Self {
        HostError::Midi(e.to_string())
    }
}

/// Reads console commands until stdin closes.
fn spawn_console(commands: Sender<Command>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!(err = e.to_string(), "Unable to read console");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match line.parse::<Command>() {
                Ok(command) => {
                    let quit = command == Command::Quit;
                    if commands.send(command).is_err() || quit {
                        return;
                    }
                }
                Err(e) => println!("{}", e),
            }
        }
        let _ = commands.send(Command::Quit);
    })
}

/// Builds the engine from its configuration and runs it until the console quits.
pub fn run(config: &EngineConfig) -> Result<(), Box<dyn Error>> {
    let storage = DirectoryStorage::open(&config.storage_path())?;
    let arena = Arena::new(config.arena_size(), DEFAULT_ARENA_BLOCK_SIZE);
    let (control, engine) = bridge(config.parameter_queue_size(), config.ui_queue_size());

    let mut sequencer = Sequencer::new(Box::new(storage), Arc::new(B12), arena, engine.ui_events)?;
    if sequencer.verify_file_system() {
        if let Some(scene) = config.startup_scene() {
            match sequencer.load_scene_by_name(scene) {
                Ok(()) => info!(scene, "Loaded startup scene"),
                Err(e) => error!(err = e.to_string(), scene, "Unable to load startup scene"),
            }
        }
    }
    let sequencer = Arc::new(Mutex::new(sequencer));

    let device = audio::find_device(config.audio_device())?;
    let _stream = audio::start_output(&device, config.sample_rate(), sequencer.clone())?;

    let (midi_sender, midi_receiver) = crossbeam_channel::bounded(MIDI_INPUT_CAPACITY);
    let _midi_input = config
        .midi_input()
        .map(|name| midi::connect_input(name, midi_sender))
        .transpose()?;
    let mut midi_output = config.midi_output().map(midi::connect_output).transpose()?;

    let (command_sender, commands) = crossbeam_channel::unbounded();
    let _console = spawn_console(command_sender);
    println!("{}", HELP);

    let mut transport = 0;
    loop {
        match commands.recv_timeout(CONTROL_INTERVAL) {
            Ok(Command::Parameter(event)) => {
                if control.parameters.try_send(event).is_err() {
                    warn!("Parameter queue is full, dropping command");
                }
            }
            Ok(Command::Status) => {
                let sequencer = sequencer.lock();
                println!(
                    "{}  clock {}/{}  {:?}",
                    describe(&UiEvent::TransportMove(transport)),
                    sequencer.master_clock(),
                    sequencer.max_loop_length(),
                    sequencer.recording_state()
                );
            }
            Ok(Command::Help) => println!("{}", HELP),
            Ok(Command::Quit) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        service(
            &sequencer,
            &engine.parameters,
            &midi_receiver,
            midi_output.as_mut(),
        );

        for event in control.ui_events.try_iter() {
            match event {
                UiEvent::TransportMove(column) => transport = column,
                event => println!("{}", describe(&event)),
            }
        }
    }

    info!("Shutting down");
    Ok(())
}

/// One pass of the control path: parameters, MIDI input, UI events and MIDI output.
fn service(
    sequencer: &Mutex<Sequencer>,
    parameters: &Receiver<ParameterEvent>,
    midi_input: &Receiver<Vec<u8>>,
    midi_output: Option<&mut midi::MidiSink>,
) {
    let outbound: Vec<_> = {
        let mut sequencer = sequencer.lock();
        sequencer.process_parameter_events(parameters);
        for raw in midi_input.try_iter() {
            sequencer.on_midi_event(&raw);
        }
        sequencer.publish_ui_events();
        sequencer.drain_outbound_midi().collect()
    };

    if let Some(output) = midi_output {
        for event in outbound.iter() {
            if let Err(e) = output.send(event) {
                warn!(err = e.to_string(), "Unable to send MIDI");
            }
        }
    }
}
