//! Device profiles and connection settings
//!
//! Everything that differs between amplifier models lives here rather than in
//! the protocol code: the number of volume steps, the number of inputs, the
//! serial line settings and the reply timing the device needs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// Known amplifier models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceModel {
    /// Primare I22: 7 inputs
    #[default]
    I22,
    /// Primare I32: 12 inputs
    I32,
}

impl DeviceModel {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::I22 => "Primare I22",
            Self::I32 => "Primare I32",
        }
    }

    /// Built-in profile for this model
    pub fn profile(&self) -> DeviceProfile {
        match self {
            Self::I22 => DeviceProfile::i22(),
            Self::I32 => DeviceProfile::i32(),
        }
    }
}

/// Serial parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// Serial line settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Parity
    pub parity: Parity,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 4800,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
        }
    }
}

impl SerialSettings {
    pub(crate) fn tokio_data_bits(&self) -> Result<tokio_serial::DataBits, ControlError> {
        match self.data_bits {
            5 => Ok(tokio_serial::DataBits::Five),
            6 => Ok(tokio_serial::DataBits::Six),
            7 => Ok(tokio_serial::DataBits::Seven),
            8 => Ok(tokio_serial::DataBits::Eight),
            other => Err(ControlError::Config(format!("unsupported data bits: {}", other))),
        }
    }

    pub(crate) fn tokio_parity(&self) -> tokio_serial::Parity {
        match self.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }

    pub(crate) fn tokio_stop_bits(&self) -> Result<tokio_serial::StopBits, ControlError> {
        match self.stop_bits {
            1 => Ok(tokio_serial::StopBits::One),
            2 => Ok(tokio_serial::StopBits::Two),
            other => Err(ControlError::Config(format!("unsupported stop bits: {}", other))),
        }
    }
}

/// Device-specific constants
///
/// When deserialized, fields left out fall back to the preset of the named
/// model, so `{"model": "i32"}` is a complete I32 profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ProfileFields")]
pub struct DeviceProfile {
    /// Model this profile describes
    pub model: DeviceModel,
    /// Number of discrete volume steps; device volume is `0..=volume_levels`
    pub volume_levels: u8,
    /// Highest valid input index; inputs are `1..=input_count`
    pub input_count: u8,
    /// Serial line settings
    pub serial: SerialSettings,
    /// How long to wait for an acknowledgement
    pub reply_timeout_ms: u64,
    /// Minimum gap between two writes
    pub command_spacing_ms: u64,
    /// How many steps below the requested volume an echo may be and still
    /// confirm a volume change
    pub volume_tolerance_steps: u8,
}

/// Serialized form of [`DeviceProfile`] with every field optional
#[derive(Deserialize)]
struct ProfileFields {
    #[serde(default)]
    model: DeviceModel,
    volume_levels: Option<u8>,
    input_count: Option<u8>,
    serial: Option<SerialSettings>,
    reply_timeout_ms: Option<u64>,
    command_spacing_ms: Option<u64>,
    volume_tolerance_steps: Option<u8>,
}

impl From<ProfileFields> for DeviceProfile {
    fn from(fields: ProfileFields) -> Self {
        let preset = fields.model.profile();
        Self {
            model: fields.model,
            volume_levels: fields.volume_levels.unwrap_or(preset.volume_levels),
            input_count: fields.input_count.unwrap_or(preset.input_count),
            serial: fields.serial.unwrap_or(preset.serial),
            reply_timeout_ms: fields.reply_timeout_ms.unwrap_or(preset.reply_timeout_ms),
            command_spacing_ms: fields
                .command_spacing_ms
                .unwrap_or(preset.command_spacing_ms),
            volume_tolerance_steps: fields
                .volume_tolerance_steps
                .unwrap_or(preset.volume_tolerance_steps),
        }
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::i22()
    }
}

impl DeviceProfile {
    /// Profile for the Primare I22
    pub fn i22() -> Self {
        Self {
            model: DeviceModel::I22,
            volume_levels: 79,
            input_count: 7,
            serial: SerialSettings::default(),
            // Lower than this and calibration never sees complete replies
            reply_timeout_ms: 800,
            command_spacing_ms: 50,
            volume_tolerance_steps: 1,
        }
    }

    /// Profile for the Primare I32
    pub fn i32() -> Self {
        Self {
            model: DeviceModel::I32,
            input_count: 12,
            ..Self::i22()
        }
    }

    /// Switch to another model's device constants, keeping the serial
    /// line and timing settings
    pub fn with_model(self, model: DeviceModel) -> Self {
        let preset = model.profile();
        Self {
            model,
            volume_levels: preset.volume_levels,
            input_count: preset.input_count,
            ..self
        }
    }

    /// Reply timeout as a duration
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// Write spacing as a duration
    pub fn command_spacing(&self) -> Duration {
        Duration::from_millis(self.command_spacing_ms)
    }

    /// Reject profiles the client cannot work with
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.volume_levels == 0 {
            return Err(ControlError::Config("volume_levels must be at least 1".into()));
        }
        if self.input_count == 0 {
            return Err(ControlError::Config("input_count must be at least 1".into()));
        }
        if self.serial.baud_rate == 0 {
            return Err(ControlError::Config("baud_rate must be non-zero".into()));
        }
        if self.reply_timeout_ms == 0 {
            return Err(ControlError::Config("reply_timeout_ms must be non-zero".into()));
        }
        self.serial.tokio_data_bits()?;
        self.serial.tokio_stop_bits()?;
        Ok(())
    }
}

/// Everything needed to open one connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Serial port path
    pub port: String,
    /// Device constants
    #[serde(default)]
    pub profile: DeviceProfile,
    /// Input to select during initialization
    #[serde(default)]
    pub input_source: Option<u8>,
}

impl ConnectionConfig {
    /// Connection to `port` using the given model's profile
    pub fn new(port: impl Into<String>, model: DeviceModel) -> Self {
        Self {
            port: port.into(),
            profile: model.profile(),
            input_source: None,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("/dev/ttyUSB0", DeviceModel::I22)
    }
}
