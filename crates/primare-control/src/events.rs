//! Event stream for amplifier activity
//!
//! State changes reported by the amplifier, whether they answer a command or
//! arrive unprompted in verbose mode, are published on one broadcast channel.

use crate::state::Identification;

/// Something the amplifier reported or the connection went through
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmpEvent {
    // -------------------------------------------------------------------------
    // State changes
    // -------------------------------------------------------------------------
    /// Power state reported
    PowerChanged {
        /// True when operating
        on: bool,
    },

    /// Volume reported
    VolumeChanged {
        /// Device step
        step: u8,
        /// Same value on the 0-100 scale
        percent: u8,
    },

    /// Mute reported
    MuteChanged {
        /// True when muted
        muted: bool,
    },

    /// Selected input reported
    InputChanged {
        /// Input index
        input: u8,
    },

    /// Name of the current input reported
    InputNameChanged {
        /// Name as sent by the amplifier
        name: String,
    },

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------
    /// All identification strings have been read; sent once per connection
    Connected {
        /// Manufacturer, model, version and input name
        identification: Identification,
    },

    /// The reader stopped; no more events follow
    Disconnected,

    // -------------------------------------------------------------------------
    // Anomalies
    // -------------------------------------------------------------------------
    /// A frame for a variable the router does not know
    UnrecognizedFrame {
        /// Variable byte
        variable: u8,
        /// Data bytes
        payload: Vec<u8>,
    },

    /// A frame for a known variable with an unusable value
    ProtocolAnomaly {
        /// Variable byte
        variable: u8,
        /// What was wrong
        reason: String,
    },
}

impl AmpEvent {
    /// Check if a host mixer needs to hear about this event
    pub fn is_mixer_change(&self) -> bool {
        matches!(
            self,
            AmpEvent::VolumeChanged { .. } | AmpEvent::MuteChanged { .. }
        )
    }

    /// Check if this is a connection lifecycle event
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, AmpEvent::Connected { .. } | AmpEvent::Disconnected)
    }

    /// Check if this event reports bad data from the amplifier
    pub fn is_anomaly(&self) -> bool {
        matches!(
            self,
            AmpEvent::UnrecognizedFrame { .. } | AmpEvent::ProtocolAnomaly { .. }
        )
    }
}
