//! Command client
//!
//! All operations go through [`AmplifierClient::execute`], which holds the
//! writer lock from the write until the reply (or timeout) so only one
//! command is ever in flight. Concurrent callers queue on the lock.

use std::sync::Arc;

use primare_protocol::{Command, Frame};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::ControlError;
use crate::events::AmpEvent;
use crate::profile::DeviceProfile;
use crate::router::ReplyRouter;
use crate::state::{AmplifierState, Identification};
use crate::volume::{echo_confirms, percent_to_step, step_to_percent, MAX_PERCENT};

/// Write half of the serial stream
pub(crate) struct Writer {
    io: Box<dyn AsyncWrite + Send + Unpin>,
    last_write: Option<Instant>,
}

impl Writer {
    pub(crate) fn new(io: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            io,
            last_write: None,
        }
    }

    async fn send(&mut self, wire: &[u8]) -> std::io::Result<()> {
        self.io.write_all(wire).await?;
        self.io.flush().await?;
        self.last_write = Some(Instant::now());
        Ok(())
    }

    pub(crate) async fn shutdown(&mut self) {
        if let Err(e) = self.io.shutdown().await {
            debug!("Closing serial writer: {}", e);
        }
    }
}

struct ClientInner {
    writer: Mutex<Option<Writer>>,
    router: Arc<ReplyRouter>,
    profile: DeviceProfile,
}

/// Issues commands to one amplifier
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct AmplifierClient {
    inner: Arc<ClientInner>,
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

/// Wire operand for a balance setting
///
/// `0` is centred, `1..=9` moves right and `11..=19` moves left.
pub fn balance_operand(balance: u8) -> Result<u8, ControlError> {
    match balance {
        0..=9 => Ok(balance),
        11..=19 => Ok(0xFF - (balance - 11)),
        other => Err(ControlError::InvalidInput(format!(
            "balance {} outside 0-9 and 11-19",
            other
        ))),
    }
}

impl AmplifierClient {
    pub(crate) fn new(
        writer: Writer,
        router: Arc<ReplyRouter>,
        profile: DeviceProfile,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                writer: Mutex::new(Some(writer)),
                router,
                profile,
            }),
        }
    }

    /// Device profile in use
    pub fn profile(&self) -> &DeviceProfile {
        &self.inner.profile
    }

    /// Copy of the current amplifier state
    pub fn state(&self) -> AmplifierState {
        self.inner.router.snapshot()
    }

    /// Subscribe to amplifier events
    pub fn subscribe(&self) -> broadcast::Receiver<AmpEvent> {
        self.inner.router.subscribe()
    }

    /// Take the writer out so nothing more can be sent
    pub(crate) async fn take_writer(&self) -> Option<Writer> {
        self.inner.writer.lock().await.take()
    }

    /// Send one command and, if the table says so, wait for its reply
    ///
    /// Returns the acknowledging frame, or `None` for commands that are not
    /// acknowledged.
    pub async fn execute(
        &self,
        command: Command,
        operand: Option<u8>,
    ) -> Result<Option<Frame>, ControlError> {
        let descriptor = command.descriptor();
        let wire = descriptor.encode(operand)?;

        let mut guard = self.inner.writer.lock().await;
        let writer = guard.as_mut().ok_or(ControlError::Disconnected)?;

        if let Some(last) = writer.last_write {
            let spacing = self.inner.profile.command_spacing();
            let elapsed = last.elapsed();
            if elapsed < spacing {
                tokio::time::sleep(spacing - elapsed).await;
            }
        }

        // Register before writing so a fast reply cannot be missed
        let reply_rx = if descriptor.awaits_reply {
            Some(self.inner.router.begin(command, operand)?)
        } else {
            None
        };

        debug!("TX {} {:02X?}", command, wire);
        if let Err(e) = writer.send(&wire).await {
            error!("Failed to write {}: {}", command, e);
            if reply_rx.is_some() {
                self.inner.router.abandon(command);
            }
            return Err(e.into());
        }

        let Some(reply_rx) = reply_rx else {
            return Ok(None);
        };

        let timeout = self.inner.profile.reply_timeout();
        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(Ok(frame))) => Ok(Some(frame)),
            Ok(Ok(Err(e))) => {
                warn!("{} failed: {}", command, e);
                Err(e)
            }
            Ok(Err(_)) => Err(ControlError::Disconnected),
            Err(_) => {
                self.inner.router.abandon(command);
                let ms = self.inner.profile.reply_timeout_ms;
                warn!("No reply to {} within {}ms", command, ms);
                Err(ControlError::Timeout { command, ms })
            }
        }
    }

    /// Execute a command that is always acknowledged
    async fn request(&self, command: Command, operand: Option<u8>) -> Result<Frame, ControlError> {
        self.execute(command, operand)
            .await?
            .ok_or_else(|| ControlError::Mismatch {
                command,
                reason: "no acknowledgement".into(),
            })
    }

    /// Execute and return the first data byte of the reply
    async fn request_value(
        &self,
        command: Command,
        operand: Option<u8>,
    ) -> Result<Option<u8>, ControlError> {
        Ok(self.request(command, operand).await?.value())
    }

    /// Execute and require the reply to echo `expected`
    async fn request_confirmed(&self, command: Command, expected: u8) -> Result<(), ControlError> {
        let frame = self.request(command, Some(expected)).await?;
        match frame.value() {
            Some(value) if value == expected => Ok(()),
            other => {
                let reason = format!("expected {:02X}, got {:02X?}", expected, other);
                warn!("{} not confirmed: {}", command, reason);
                Err(ControlError::Mismatch { command, reason })
            }
        }
    }

    async fn request_text(&self, command: Command, operand: Option<u8>) -> Result<String, ControlError> {
        Ok(self.request(command, operand).await?.text())
    }

    // -------------------------------------------------------------------------
    // Power
    // -------------------------------------------------------------------------

    /// Leave standby
    pub async fn power_on(&self) -> Result<(), ControlError> {
        self.execute(Command::PowerSet, Some(1)).await.map(drop)
    }

    /// Enter standby
    pub async fn power_off(&self) -> Result<(), ControlError> {
        self.execute(Command::PowerSet, Some(0)).await.map(drop)
    }

    /// Toggle power; returns whether the amplifier is now on, if the reply
    /// says
    pub async fn power_toggle(&self) -> Result<Option<bool>, ControlError> {
        Ok(self
            .request_value(Command::PowerToggle, None)
            .await?
            .map(|v| v != 0))
    }

    // -------------------------------------------------------------------------
    // Inputs
    // -------------------------------------------------------------------------

    /// Select input `index` and return its name
    ///
    /// The name is empty if it could not be read.
    pub async fn input_set(&self, index: u8) -> Result<String, ControlError> {
        let count = self.inner.profile.input_count;
        if !(1..=count).contains(&index) {
            return Err(ControlError::InvalidInput(format!(
                "input {} outside 1-{}",
                index, count
            )));
        }
        self.request_confirmed(Command::InputSet, index).await?;
        Ok(self.current_input_name().await)
    }

    /// Select the next input and return its name
    pub async fn input_next(&self) -> Result<String, ControlError> {
        self.request(Command::InputNext, None).await?;
        Ok(self.current_input_name().await)
    }

    /// Select the previous input and return its name
    pub async fn input_prev(&self) -> Result<String, ControlError> {
        self.request(Command::InputPrev, None).await?;
        Ok(self.current_input_name().await)
    }

    async fn current_input_name(&self) -> String {
        match self.inputname_current_get().await {
            Ok(name) => name,
            Err(e) => {
                warn!("Could not read input name: {}", e);
                String::new()
            }
        }
    }

    // -------------------------------------------------------------------------
    // Volume
    // -------------------------------------------------------------------------

    /// Last known volume, 0-100
    pub fn volume_get(&self) -> Option<u8> {
        self.state()
            .volume_percent(self.inner.profile.volume_levels)
    }

    /// Ask the amplifier for its volume; returns 0-100
    pub async fn volume_query(&self) -> Result<u8, ControlError> {
        let step = self
            .request_value(Command::VolumeGet, None)
            .await?
            .ok_or_else(|| ControlError::Mismatch {
                command: Command::VolumeGet,
                reason: "no volume in reply".into(),
            })?;
        Ok(step_to_percent(step, self.inner.profile.volume_levels))
    }

    /// Set the volume to `percent` (0-100) and wait for the amplifier to
    /// confirm it
    pub async fn volume_set(&self, percent: u8) -> Result<(), ControlError> {
        if percent > MAX_PERCENT {
            return Err(ControlError::InvalidInput(format!(
                "volume {}% above {}%",
                percent, MAX_PERCENT
            )));
        }
        let profile = &self.inner.profile;
        let step = percent_to_step(percent, profile.volume_levels);
        debug!("Volume {}% is step {}/{}", percent, step, profile.volume_levels);

        let frame = self.request(Command::VolumeSet, Some(step)).await?;
        match frame.value() {
            Some(echoed) if echo_confirms(step, echoed, profile.volume_tolerance_steps) => {
                if echoed != step {
                    debug!("Volume echo {} accepted for requested {}", echoed, step);
                }
                Ok(())
            }
            other => {
                let reason = format!("requested step {}, amplifier reported {:?}", step, other);
                warn!("Volume not confirmed: {}", reason);
                Err(ControlError::Mismatch {
                    command: Command::VolumeSet,
                    reason,
                })
            }
        }
    }

    /// One step up; returns the new step
    pub async fn volume_up(&self) -> Result<Option<u8>, ControlError> {
        self.request_value(Command::VolumeUp, None).await
    }

    /// One step down; returns the new step
    pub async fn volume_down(&self) -> Result<Option<u8>, ControlError> {
        self.request_value(Command::VolumeDown, None).await
    }

    /// Find the current step without prior state by stepping down and back up
    pub async fn calibrate_volume(&self) -> Result<Option<u8>, ControlError> {
        self.volume_down().await?;
        self.volume_up().await
    }

    // -------------------------------------------------------------------------
    // Mute
    // -------------------------------------------------------------------------

    /// Last known mute state
    pub fn mute_get(&self) -> Option<bool> {
        self.state().mute
    }

    /// Mute or unmute and wait for confirmation
    pub async fn mute_set(&self, mute: bool) -> Result<(), ControlError> {
        self.request_confirmed(Command::MuteSet, flag(mute)).await
    }

    /// Toggle mute; returns the new state if reported
    pub async fn mute_toggle(&self) -> Result<Option<bool>, ControlError> {
        Ok(self
            .request_value(Command::MuteToggle, None)
            .await?
            .map(|v| v != 0))
    }

    // -------------------------------------------------------------------------
    // Balance, display, menu, IR
    // -------------------------------------------------------------------------

    /// Move the balance one step left
    pub async fn balance_adjust_left(&self) -> Result<(), ControlError> {
        self.request(Command::BalanceAdjust, Some(0x01)).await.map(drop)
    }

    /// Move the balance one step right
    pub async fn balance_adjust_right(&self) -> Result<(), ControlError> {
        self.request(Command::BalanceAdjust, Some(0xFF)).await.map(drop)
    }

    /// Set the balance, see [`balance_operand`]
    pub async fn balance_set(&self, balance: u8) -> Result<(), ControlError> {
        let operand = balance_operand(balance)?;
        self.request(Command::BalanceSet, Some(operand)).await.map(drop)
    }

    /// Step through the display dim levels
    pub async fn dim_cycle(&self) -> Result<Option<u8>, ControlError> {
        self.request_value(Command::DimCycle, None).await
    }

    /// Set a dim level; levels wrap at 4
    pub async fn dim_set(&self, level: u8) -> Result<(), ControlError> {
        self.request_confirmed(Command::DimSet, level % 4).await
    }

    /// Toggle verbose mode
    pub async fn verbose_toggle(&self) -> Result<Option<bool>, ControlError> {
        Ok(self
            .request_value(Command::VerboseToggle, None)
            .await?
            .map(|v| v != 0))
    }

    /// Enable or disable verbose mode
    ///
    /// In verbose mode the amplifier reports every change, including those
    /// made with the front panel or the remote.
    pub async fn verbose_set(&self, verbose: bool) -> Result<(), ControlError> {
        self.request_confirmed(Command::VerboseSet, flag(verbose)).await
    }

    /// Open or close the menu
    pub async fn menu_toggle(&self) -> Result<Option<bool>, ControlError> {
        Ok(self
            .request_value(Command::MenuToggle, None)
            .await?
            .map(|v| v != 0))
    }

    /// Navigate the menu
    pub async fn menu_set(&self, value: u8) -> Result<(), ControlError> {
        self.request(Command::MenuSet, Some(value)).await.map(drop)
    }

    /// Send an IR remote code as if the remote had been used
    pub async fn remote_cmd(&self, code: u8) -> Result<(), ControlError> {
        self.request(Command::RemoteCmd, Some(code)).await.map(drop)
    }

    /// Switch between the front and back IR receivers
    pub async fn ir_input_toggle(&self) -> Result<Option<bool>, ControlError> {
        Ok(self
            .request_value(Command::IrInputToggle, None)
            .await?
            .map(|v| v != 0))
    }

    /// Select the IR receiver: `true` for back, `false` for front
    pub async fn ir_input_set(&self, back: bool) -> Result<(), ControlError> {
        self.request_confirmed(Command::IrInputSet, flag(back)).await
    }

    /// Restore factory defaults; the amplifier restarts without replying
    pub async fn recall_factory_settings(&self) -> Result<(), ControlError> {
        warn!("Recalling factory settings");
        self.execute(Command::RecallFactorySettings, None).await.map(drop)
    }

    // -------------------------------------------------------------------------
    // Identification
    // -------------------------------------------------------------------------

    /// Read the manufacturer name
    pub async fn manufacturer_get(&self) -> Result<String, ControlError> {
        self.request_text(Command::ManufacturerGet, None).await
    }

    /// Read the model name
    pub async fn modelname_get(&self) -> Result<String, ControlError> {
        self.request_text(Command::ModelnameGet, None).await
    }

    /// Read the software version
    pub async fn swversion_get(&self) -> Result<String, ControlError> {
        self.request_text(Command::SwversionGet, None).await
    }

    /// Read the name of the current input
    pub async fn inputname_current_get(&self) -> Result<String, ControlError> {
        self.request_text(Command::InputnameCurrentGet, None).await
    }

    /// Read the name of input `index`; empty if the index is out of range
    pub async fn inputname_specific_get(&self, index: u8) -> Result<String, ControlError> {
        let count = self.inner.profile.input_count;
        if !(1..=count).contains(&index) {
            warn!("Input {} outside 1-{}, not asking", index, count);
            return Ok(String::new());
        }
        self.request_text(Command::InputnameSpecificGet, Some(index))
            .await
    }

    /// Read all identification strings, input name last
    pub async fn device_info(&self) -> Result<Identification, ControlError> {
        Ok(Identification {
            manufacturer: self.manufacturer_get().await?,
            model: self.modelname_get().await?,
            software_version: self.swversion_get().await?,
            input_name: self.inputname_current_get().await?,
        })
    }

    // -------------------------------------------------------------------------
    // Sequences
    // -------------------------------------------------------------------------

    /// Bring the amplifier to a known state
    ///
    /// Powers on, enables verbose mode, selects `input` if given, unmutes and
    /// reads the current volume step.
    pub async fn initialize(&self, input: Option<u8>) -> Result<(), ControlError> {
        info!("Initializing {}", self.inner.profile.model.name());
        self.power_on().await?;
        self.verbose_set(true).await?;
        if let Some(input) = input {
            self.input_set(input).await?;
        }
        self.mute_set(false).await?;
        match self.calibrate_volume().await {
            Ok(Some(step)) => debug!("Volume is at step {}", step),
            Ok(None) => debug!("Volume step not reported"),
            Err(e) => warn!("Volume calibration failed: {}", e),
        }
        Ok(())
    }

    /// [`initialize`](Self::initialize) followed by
    /// [`device_info`](Self::device_info)
    pub async fn setup(&self, input: Option<u8>) -> Result<Identification, ControlError> {
        self.initialize(input).await?;
        self.device_info().await
    }
}
