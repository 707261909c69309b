//! Amplifier variables
//!
//! A variable is the one-byte identifier of the attribute a command changes
//! or a reply reports. Write commands that set an absolute value use the
//! variable with the high bit set (`0x83` sets volume, `0x03` steps it);
//! replies normally report the plain variable, but some firmware echoes the
//! high-bit form.

use std::fmt;

/// Flag distinguishing absolute writes from relative ones
pub const ABSOLUTE_FLAG: u8 = 0x80;

/// Known amplifier variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Variable {
    /// Standby / operate
    Power,
    /// Selected input index
    Input,
    /// Volume in device steps
    Volume,
    /// Balance offset
    Balance,
    /// Mute on/off
    Mute,
    /// Display dim level
    Dim,
    /// Verbose (push) mode
    Verbose,
    /// On-screen menu
    Menu,
    /// IR remote command passthrough
    RemoteCommand,
    /// Front/back IR receiver
    IrInput,
    /// Factory reset
    FactorySettings,
    /// Name of the current input
    InputName,
    /// Manufacturer string
    Manufacturer,
    /// Model name string
    ModelName,
    /// Software version string
    SoftwareVersion,
    /// Name of a specific input, read by index
    SpecificInputName,
}

impl Variable {
    /// All known variables
    pub const ALL: [Variable; 16] = [
        Variable::Power,
        Variable::Input,
        Variable::Volume,
        Variable::Balance,
        Variable::Mute,
        Variable::Dim,
        Variable::Verbose,
        Variable::Menu,
        Variable::RemoteCommand,
        Variable::IrInput,
        Variable::FactorySettings,
        Variable::InputName,
        Variable::Manufacturer,
        Variable::ModelName,
        Variable::SoftwareVersion,
        Variable::SpecificInputName,
    ];

    /// Wire id of the variable as reported in replies
    pub fn id(self) -> u8 {
        match self {
            Variable::Power => 0x01,
            Variable::Input => 0x02,
            Variable::Volume => 0x03,
            Variable::Balance => 0x04,
            Variable::Mute => 0x09,
            Variable::Dim => 0x0A,
            Variable::Verbose => 0x0D,
            Variable::Menu => 0x0E,
            Variable::RemoteCommand => 0x0F,
            Variable::IrInput => 0x12,
            Variable::FactorySettings => 0x13,
            Variable::InputName => 0x14,
            Variable::Manufacturer => 0x15,
            Variable::ModelName => 0x16,
            Variable::SoftwareVersion => 0x17,
            Variable::SpecificInputName => 0x94,
        }
    }

    /// Exact lookup by wire id
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.id() == id)
    }

    /// Lookup for reply frames, accepting the high-bit echo some devices send
    pub fn from_reply(id: u8) -> Option<Self> {
        Self::from_id(id).or_else(|| {
            if id & ABSOLUTE_FLAG != 0 {
                Self::from_id(id ^ ABSOLUTE_FLAG)
            } else {
                None
            }
        })
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Variable::Power => "power",
            Variable::Input => "input",
            Variable::Volume => "volume",
            Variable::Balance => "balance",
            Variable::Mute => "mute",
            Variable::Dim => "dim",
            Variable::Verbose => "verbose",
            Variable::Menu => "menu",
            Variable::RemoteCommand => "remote_cmd",
            Variable::IrInput => "ir_input",
            Variable::FactorySettings => "recall_factory_settings",
            Variable::InputName => "inputname",
            Variable::Manufacturer => "manufacturer",
            Variable::ModelName => "modelname",
            Variable::SoftwareVersion => "swversion",
            Variable::SpecificInputName => "inputname_specific",
        }
    }

    /// Returns true for the four identification strings
    pub fn is_identification(self) -> bool {
        matches!(
            self,
            Variable::Manufacturer
                | Variable::ModelName
                | Variable::SoftwareVersion
                | Variable::InputName
        )
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
