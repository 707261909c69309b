//! Host mixer adapter
//!
//! Presents the amplifier as a volume/mute control on the 0-100 scale. Set
//! operations report success as a bool; failures are logged by the client.

use tokio::sync::broadcast;

use crate::client::AmplifierClient;
use crate::events::AmpEvent;

/// A volume or mute change, wherever it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixerChange {
    /// Volume, 0-100
    Volume(u8),
    /// Mute state
    Mute(bool),
}

/// Volume and mute control for a host mixer
#[derive(Clone)]
pub struct AmpMixer {
    client: AmplifierClient,
}

impl AmpMixer {
    /// Wrap a client
    pub fn new(client: AmplifierClient) -> Self {
        Self { client }
    }

    /// Current volume, `None` until the amplifier has reported one
    pub fn get_volume(&self) -> Option<u8> {
        self.client.volume_get()
    }

    /// Set the volume; true once the amplifier has confirmed it
    pub async fn set_volume(&self, percent: u8) -> bool {
        self.client.volume_set(percent).await.is_ok()
    }

    /// Current mute state, `None` until reported
    pub fn get_mute(&self) -> Option<bool> {
        self.client.mute_get()
    }

    /// Mute or unmute; true once confirmed
    pub async fn set_mute(&self, mute: bool) -> bool {
        self.client.mute_set(mute).await.is_ok()
    }

    /// Changes to volume or mute, including those made on the amplifier
    pub fn subscribe(&self) -> MixerSubscription {
        MixerSubscription {
            events: self.client.subscribe(),
        }
    }
}

/// Stream of [`MixerChange`]s
pub struct MixerSubscription {
    events: broadcast::Receiver<AmpEvent>,
}

impl MixerSubscription {
    /// Wait for the next change; `None` once the connection has closed
    pub async fn recv(&mut self) -> Option<MixerChange> {
        loop {
            match self.events.recv().await {
                Ok(AmpEvent::VolumeChanged { percent, .. }) => {
                    return Some(MixerChange::Volume(percent))
                }
                Ok(AmpEvent::MuteChanged { muted }) => return Some(MixerChange::Mute(muted)),
                Ok(AmpEvent::Disconnected) => return None,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Mixer subscriber missed {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
