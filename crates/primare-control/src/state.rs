//! Amplifier state tracking
//!
//! State is owned by the reply router and only changes when a frame from the
//! amplifier says so. Callers get snapshots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::volume::step_to_percent;

/// Power state as last reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PowerState {
    /// Not yet observed
    #[default]
    Unknown,
    /// Standby
    Off,
    /// Operating
    On,
}

impl PowerState {
    /// Interpret a power reply byte
    pub fn from_value(value: u8) -> Self {
        if value == 0 {
            PowerState::Off
        } else {
            PowerState::On
        }
    }

    /// `Some(true)` when on, `Some(false)` when in standby
    pub fn is_on(&self) -> Option<bool> {
        match self {
            PowerState::Unknown => None,
            PowerState::Off => Some(false),
            PowerState::On => Some(true),
        }
    }
}

/// Identification strings, empty until read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identification {
    pub manufacturer: String,
    pub model: String,
    pub software_version: String,
    pub input_name: String,
}

/// Everything known about the connected amplifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmplifierState {
    /// Power state
    pub power: PowerState,
    /// Volume in device steps, `0..=volume_levels`
    pub volume: Option<u8>,
    /// Mute
    pub mute: Option<bool>,
    /// Selected input index
    pub input_source: Option<u8>,
    /// Balance as reported by the device
    pub balance: Option<u8>,
    /// Display dim level
    pub dim: Option<u8>,
    /// Verbose mode
    pub verbose: Option<bool>,
    /// Menu open
    pub menu: Option<bool>,
    /// IR receiver: `false` front, `true` back
    pub ir_input_back: Option<bool>,
    /// Identification strings
    pub identification: Identification,
    /// Names read with `inputname_specific_get`, by input index
    pub input_names: BTreeMap<u8, String>,
}

impl AmplifierState {
    /// Volume on the 0-100 scale
    pub fn volume_percent(&self, volume_levels: u8) -> Option<u8> {
        self.volume.map(|step| step_to_percent(step, volume_levels))
    }

    /// Format volume for display
    pub fn volume_display(&self, volume_levels: u8) -> String {
        match self.volume {
            Some(step) => format!("{}/{}", step, volume_levels),
            None => "---".to_string(),
        }
    }
}
