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
//! Bounded queues between the control surface and the engine. One carries
//! parameter events in, the other UI events out. Each preserves FIFO order.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::warn;

use super::{ParameterEvent, UiEvent};

/// Capacity of the parameter queue.
pub const PARAMETER_QUEUE_CAPACITY: usize = 1000;

/// Capacity of the UI queue.
pub const UI_QUEUE_CAPACITY: usize = 64;

/// The control surface's ends of both queues.
pub struct ControlSide {
    pub parameters: Sender<ParameterEvent>,
    pub ui_events: Receiver<UiEvent>,
}

/// The engine's ends of both queues.
pub struct EngineSide {
    pub parameters: Receiver<ParameterEvent>,
    pub ui_events: UiPublisher,
}

/// Creates both queues.
pub fn bridge(parameter_capacity: usize, ui_capacity: usize) -> (ControlSide, EngineSide) {
    let (parameter_tx, parameter_rx) = crossbeam_channel::bounded(parameter_capacity);
    let (ui_tx, ui_rx) = crossbeam_channel::bounded(ui_capacity);
    (
        ControlSide {
            parameters: parameter_tx,
            ui_events: ui_rx,
        },
        EngineSide {
            parameters: parameter_rx,
            ui_events: UiPublisher { sender: ui_tx },
        },
    )
}

/// Publishes UI events without ever blocking.
#[derive(Clone)]
pub struct UiPublisher {
    sender: Sender<UiEvent>,
}

impl UiPublisher {
    /// Queues an event. A full or closed queue drops it.
    pub fn publish(&self, event: UiEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(event = format!("{:?}", event), "UI queue is full, dropping event");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}
