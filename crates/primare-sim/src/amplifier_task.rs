//! Virtual amplifier actor task
//!
//! This module provides a pure async task that owns a VirtualAmplifier and
//! speaks the wire protocol over an async stream. The task uses a select!
//! loop to:
//! - Read request frames from the stream and write the replies back
//! - Apply front-panel changes and quirk switches from a command channel
//! - Emit state change events via a broadcast channel

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::VirtualAmplifier;

/// Commands that can be sent to a virtual amplifier actor
#[derive(Debug, Clone)]
pub enum VirtualAmpCommand {
    /// Turn the volume knob
    FrontPanelVolume(u8),
    /// Press mute
    FrontPanelMute(bool),
    /// Select an input on the front panel
    FrontPanelInput(u8),
    /// Stop or resume replying
    SetSilent(bool),
    /// Echo volume sets one step low from this step upwards
    SetVolumeEchoQuirk(Option<u8>),
    /// Write raw bytes to the line (noise, unknown variables)
    Inject(Vec<u8>),
    /// Shutdown the virtual amplifier actor
    Shutdown,
}

/// State event emitted when virtual amplifier state changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualAmpStateEvent {
    /// Power
    pub power: bool,
    /// Volume step
    pub volume: u8,
    /// Mute
    pub mute: bool,
    /// Selected input
    pub input: u8,
}

impl VirtualAmpStateEvent {
    fn from_amp(amp: &VirtualAmplifier) -> Self {
        Self {
            power: amp.power(),
            volume: amp.volume(),
            mute: amp.mute(),
            input: amp.input(),
        }
    }
}

async fn write_out<S>(stream: &mut S, id: &str, bytes: &[u8]) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    if bytes.is_empty() {
        return Ok(());
    }
    debug!("Virtual amplifier {} sending {:02X?}", id, bytes);
    stream.write_all(bytes).await?;
    stream.flush().await
}

/// Run the virtual amplifier actor task
///
/// This task owns the VirtualAmplifier and processes:
/// 1. Requests read from the stream (sent by the control client)
/// 2. Front-panel and control commands from the command channel
///
/// State changes are emitted via the broadcast channel.
pub async fn run_virtual_amp_task<S>(
    mut stream: S,
    mut amp: VirtualAmplifier,
    mut cmd_rx: mpsc::Receiver<VirtualAmpCommand>,
    state_tx: broadcast::Sender<VirtualAmpStateEvent>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 256];
    let mut last_state = VirtualAmpStateEvent::from_amp(&amp);

    info!("Starting virtual amplifier task for {}", amp.id());

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual amplifier stream closed for {}", amp.id());
                        break;
                    }
                    Ok(n) => {
                        let reply = amp.process_bytes(&buf[..n]);
                        write_out(&mut stream, amp.id(), &reply).await?;
                    }
                    Err(e) => {
                        warn!("Virtual amplifier {} stream error: {}", amp.id(), e);
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                let output = match cmd {
                    Some(VirtualAmpCommand::FrontPanelVolume(step)) => amp.front_panel_volume(step),
                    Some(VirtualAmpCommand::FrontPanelMute(mute)) => amp.front_panel_mute(mute),
                    Some(VirtualAmpCommand::FrontPanelInput(input)) => amp.front_panel_input(input),
                    Some(VirtualAmpCommand::SetSilent(silent)) => {
                        amp.set_silent(silent);
                        Vec::new()
                    }
                    Some(VirtualAmpCommand::SetVolumeEchoQuirk(from)) => {
                        amp.set_volume_echo_quirk(from);
                        Vec::new()
                    }
                    Some(VirtualAmpCommand::Inject(bytes)) => bytes,
                    Some(VirtualAmpCommand::Shutdown) => {
                        info!("Shutdown requested for virtual amplifier {}", amp.id());
                        break;
                    }
                    None => {
                        debug!("Command channel closed for virtual amplifier {}", amp.id());
                        break;
                    }
                };
                write_out(&mut stream, amp.id(), &output).await?;
            }
        }

        let state = VirtualAmpStateEvent::from_amp(&amp);
        if state != last_state {
            debug!("Virtual amplifier {} state changed: {:?}", amp.id(), state);
            let _ = state_tx.send(state.clone());
            last_state = state;
        }
    }

    info!("Virtual amplifier task ended for {}", amp.id());
    Ok(())
}
