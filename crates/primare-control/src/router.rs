//! Reply router and state store
//!
//! Every decoded frame passes through [`ReplyRouter::dispatch`]. A frame
//! that answers the command currently in flight releases its waiter; any
//! other frame is an unsolicited update. Both kinds update the amplifier
//! state.
//!
//! Only one command is ever in flight, so the rendezvous with the waiting
//! caller is a single pending slot holding a oneshot sender.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use primare_protocol::{Command, Frame, Variable};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::ControlError;
use crate::events::AmpEvent;
use crate::state::{AmplifierState, PowerState};
use crate::volume::step_to_percent;

/// Commands that timed out and may still be answered late
const LATE_REPLY_HISTORY: usize = 8;

/// What a waiting caller receives
pub type ReplyResult = Result<Frame, ControlError>;

struct Pending {
    command: Command,
    operand: Option<u8>,
    reply_variable: u8,
    reply_tx: oneshot::Sender<ReplyResult>,
}

impl Pending {
    /// Exact variable, or the same variable with the high bit flipped.
    /// A remote code is echoed back as-is and only matches exactly.
    fn matches(&self, variable: u8) -> bool {
        if variable == self.reply_variable {
            return true;
        }
        if self.acknowledges_only() {
            return false;
        }
        match (
            Variable::from_reply(self.reply_variable),
            Variable::from_reply(variable),
        ) {
            (Some(expected), Some(got)) => expected == got,
            _ => false,
        }
    }

    /// The reply carries no status, only the echoed remote code
    fn acknowledges_only(&self) -> bool {
        self.command == Command::RemoteCmd
    }
}

#[derive(Debug, Default)]
struct IdentificationSeen {
    manufacturer: bool,
    model: bool,
    software_version: bool,
    input_name: bool,
}

impl IdentificationSeen {
    fn all(&self) -> bool {
        self.manufacturer && self.model && self.software_version && self.input_name
    }
}

#[derive(Default)]
struct RouterInner {
    state: AmplifierState,
    pending: Option<Pending>,
    seen: IdentificationSeen,
    connected_sent: bool,
    late: VecDeque<Command>,
    closed: bool,
}

/// Correlates replies with the command in flight and owns the state
pub struct ReplyRouter {
    inner: Mutex<RouterInner>,
    volume_levels: u8,
    events: broadcast::Sender<AmpEvent>,
    follow_up: Option<mpsc::Sender<Command>>,
}

impl ReplyRouter {
    /// Create a router for a device with `volume_levels` steps
    pub fn new(volume_levels: u8, events: broadcast::Sender<AmpEvent>) -> Self {
        Self {
            inner: Mutex::new(RouterInner::default()),
            volume_levels,
            events,
            follow_up: None,
        }
    }

    /// Queue commands the router wants issued in response to unsolicited
    /// frames (the current input name after an input change)
    pub fn with_follow_up(mut self, follow_up: mpsc::Sender<Command>) -> Self {
        self.follow_up = Some(follow_up);
        self
    }

    fn lock(&self) -> MutexGuard<'_, RouterInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `command` as in flight and get the receiver its reply will
    /// arrive on. Must be called before the command is written.
    pub fn begin(
        &self,
        command: Command,
        operand: Option<u8>,
    ) -> Result<oneshot::Receiver<ReplyResult>, ControlError> {
        let Some(reply_variable) = command.descriptor().reply_variable(operand) else {
            return Err(ControlError::InvalidInput(format!(
                "{} has no reply to wait for",
                command
            )));
        };

        let mut inner = self.lock();
        if inner.closed {
            return Err(ControlError::Disconnected);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let previous = inner.pending.replace(Pending {
            command,
            operand,
            reply_variable,
            reply_tx,
        });
        if let Some(previous) = previous {
            warn!("{} still pending when {} was issued", previous.command, command);
        }
        Ok(reply_rx)
    }

    /// Give up on `command` after a timeout
    ///
    /// The command is remembered so a late reply can be attributed to it.
    pub fn abandon(&self, command: Command) {
        let mut inner = self.lock();
        if inner
            .pending
            .as_ref()
            .is_some_and(|pending| pending.command == command)
        {
            inner.pending = None;
        }
        inner.late.push_back(command);
        if inner.late.len() > LATE_REPLY_HISTORY {
            inner.late.pop_front();
        }
    }

    /// Route one decoded frame
    pub fn dispatch(&self, frame: &Frame) {
        let mut events = Vec::new();
        let mut inner = self.lock();

        let pending = match inner.pending.take() {
            Some(pending) if pending.matches(frame.variable) => Some(pending),
            other => {
                inner.pending = other;
                None
            }
        };

        let variable = Variable::from_reply(frame.variable);
        let previous_input = inner.state.input_source;

        let acknowledgement = pending.as_ref().is_some_and(Pending::acknowledges_only);

        let outcome = match variable {
            Some(variable) if !acknowledgement => {
                let index = pending
                    .as_ref()
                    .filter(|p| p.command == Command::InputnameSpecificGet)
                    .and_then(|p| p.operand);
                self.apply(&mut inner, variable, frame, index, &mut events)
            }
            _ => Ok(()),
        };

        if let Err(reason) = &outcome {
            warn!(
                "Protocol anomaly on variable {:02X}: {}",
                frame.variable, reason
            );
            events.push(AmpEvent::ProtocolAnomaly {
                variable: frame.variable,
                reason: reason.clone(),
            });
        }

        match pending {
            Some(pending) => {
                let result = match outcome {
                    Ok(()) => {
                        debug!("Reply to {}: {:02X?}", pending.command, frame.payload);
                        Ok(frame.clone())
                    }
                    Err(reason) => Err(ControlError::Mismatch {
                        command: pending.command,
                        reason,
                    }),
                };
                // The waiter may have just timed out
                let _ = pending.reply_tx.send(result);
            }
            None if variable.is_none() => {
                warn!(
                    "Unrecognized frame: variable {:02X}, data {:02X?}",
                    frame.variable, frame.payload
                );
                events.push(AmpEvent::UnrecognizedFrame {
                    variable: frame.variable,
                    payload: frame.payload.clone(),
                });
            }
            None => {
                match Self::attribute_late(&mut inner, frame.variable) {
                    Some(command) => info!(
                        "Frame {:02X} attributed to earlier {} (heuristic)",
                        frame.variable, command
                    ),
                    None => debug!(
                        "Unsolicited frame {:02X}: {:02X?}",
                        frame.variable, frame.payload
                    ),
                }

                if variable == Some(Variable::Input)
                    && outcome.is_ok()
                    && inner.state.input_source != previous_input
                {
                    self.request_follow_up(Command::InputnameCurrentGet);
                }
            }
        }

        drop(inner);
        for event in events {
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }

    /// Update state from a frame for a known variable
    fn apply(
        &self,
        inner: &mut RouterInner,
        variable: Variable,
        frame: &Frame,
        index: Option<u8>,
        events: &mut Vec<AmpEvent>,
    ) -> Result<(), String> {
        let state = &mut inner.state;
        let value = || frame.value().ok_or_else(|| "missing value".to_string());

        match variable {
            Variable::Power => {
                let power = PowerState::from_value(value()?);
                if state.power != power {
                    state.power = power;
                    events.push(AmpEvent::PowerChanged {
                        on: power == PowerState::On,
                    });
                }
            }
            Variable::Volume => {
                let step = value()?;
                if step > self.volume_levels {
                    return Err(format!(
                        "volume {} outside 0..={}",
                        step, self.volume_levels
                    ));
                }
                if state.volume != Some(step) {
                    state.volume = Some(step);
                    events.push(AmpEvent::VolumeChanged {
                        step,
                        percent: step_to_percent(step, self.volume_levels),
                    });
                }
            }
            Variable::Mute => {
                let muted = value()? != 0;
                if state.mute != Some(muted) {
                    state.mute = Some(muted);
                    events.push(AmpEvent::MuteChanged { muted });
                }
            }
            Variable::Input => {
                let input = value()?;
                if state.input_source != Some(input) {
                    state.input_source = Some(input);
                    events.push(AmpEvent::InputChanged { input });
                }
            }
            Variable::Balance => state.balance = Some(value()?),
            Variable::Dim => state.dim = Some(value()?),
            Variable::Verbose => state.verbose = Some(value()? != 0),
            Variable::Menu => state.menu = Some(value()? != 0),
            Variable::IrInput => state.ir_input_back = Some(value()? != 0),
            Variable::RemoteCommand | Variable::FactorySettings => {}
            Variable::SpecificInputName => match index {
                Some(index) => {
                    state.input_names.insert(index, frame.text());
                }
                None => debug!("Name for unrequested input ignored"),
            },
            Variable::InputName => {
                let name = frame.text();
                if state.identification.input_name != name {
                    state.identification.input_name = name.clone();
                    events.push(AmpEvent::InputNameChanged { name });
                }
                inner.seen.input_name = true;
            }
            Variable::Manufacturer => {
                state.identification.manufacturer = frame.text();
                inner.seen.manufacturer = true;
            }
            Variable::ModelName => {
                state.identification.model = frame.text();
                inner.seen.model = true;
            }
            Variable::SoftwareVersion => {
                state.identification.software_version = frame.text();
                inner.seen.software_version = true;
            }
        }

        if variable.is_identification() && inner.seen.all() && !inner.connected_sent {
            inner.connected_sent = true;
            let identification = inner.state.identification.clone();
            info!(
                "Connected to: {} {} (software {}), current input {}",
                identification.manufacturer,
                identification.model,
                identification.software_version,
                identification.input_name
            );
            events.push(AmpEvent::Connected { identification });
        }
        Ok(())
    }

    /// Pick the timed-out command a frame most likely answers, preferring
    /// the most recent set over a query
    fn attribute_late(inner: &mut RouterInner, variable: u8) -> Option<Command> {
        let candidates: Vec<Command> = Command::candidates_for_reply(variable).collect();
        let position = inner
            .late
            .iter()
            .rposition(|c| candidates.contains(c) && c.is_set())
            .or_else(|| inner.late.iter().rposition(|c| candidates.contains(c)))?;
        inner.late.remove(position)
    }

    fn request_follow_up(&self, command: Command) {
        if let Some(follow_up) = &self.follow_up {
            if let Err(e) = follow_up.try_send(command) {
                warn!("Could not queue {}: {}", command, e);
            }
        }
    }

    /// Stop routing and fail the waiting caller, if any
    ///
    /// Returns false if the router was already closed.
    pub fn close(&self) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }
        inner.closed = true;
        if let Some(pending) = inner.pending.take() {
            warn!("Connection closed while {} was waiting", pending.command);
            let _ = pending.reply_tx.send(Err(ControlError::Disconnected));
        }
        drop(inner);
        let _ = self.events.send(AmpEvent::Disconnected);
        true
    }

    /// Returns true once the router has been closed
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> AmplifierState {
        self.lock().state.clone()
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<AmpEvent> {
        self.events.subscribe()
    }

    #[cfg(test)]
    fn late_commands(&self) -> Vec<Command> {
        self.lock().late.iter().copied().collect()
    }
}
