//! Static command table
//!
//! Every command the amplifier understands is described once, at compile
//! time, by a [`CommandDescriptor`]: the request template, the template of the
//! acknowledgement the amplifier sends back, and whether a caller should wait
//! for that acknowledgement. A [`Slot::Operand`] (`YY`) in a template is
//! replaced by the caller's operand byte when the command is built.

use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;
use crate::frame::{encode_request, CommandType};
use crate::variable::ABSOLUTE_FLAG;

/// One byte position in a command or reply template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// A fixed byte
    Byte(u8),
    /// The operand supplied at send time
    Operand,
}

/// Shorthand for the operand slot
pub const YY: Slot = Slot::Operand;

const fn b(byte: u8) -> Slot {
    Slot::Byte(byte)
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Byte(byte) => write!(f, "{:02X}", byte),
            Slot::Operand => f.write_str("YY"),
        }
    }
}

/// Every command in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    PowerToggle,
    PowerSet,
    InputSet,
    InputNext,
    InputPrev,
    VolumeGet,
    VolumeSet,
    VolumeUp,
    VolumeDown,
    BalanceAdjust,
    BalanceSet,
    MuteToggle,
    MuteSet,
    DimCycle,
    DimSet,
    VerboseToggle,
    VerboseSet,
    MenuToggle,
    MenuSet,
    RemoteCmd,
    IrInputToggle,
    IrInputSet,
    RecallFactorySettings,
    InputnameCurrentGet,
    InputnameSpecificGet,
    ManufacturerGet,
    ModelnameGet,
    SwversionGet,
}

/// Static description of one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// The command this entry describes
    pub command: Command,
    /// Table key
    pub name: &'static str,
    /// `W` or `R`
    pub command_type: CommandType,
    /// Request bytes after the command type
    pub wire_template: &'static [Slot],
    /// Expected acknowledgement: variable followed by data
    pub reply_template: &'static [Slot],
    /// Whether the amplifier echoes a reply callers can wait for
    pub awaits_reply: bool,
}

macro_rules! command_table {
    ($( $cmd:ident => $name:literal, $ty:ident, [$($wire:expr),*], [$($reply:expr),*], $wait:literal; )*) => {
        /// The command table, indexed by `Command as usize`
        pub static COMMAND_TABLE: [CommandDescriptor; Command::COUNT] = [
            $(CommandDescriptor {
                command: Command::$cmd,
                name: $name,
                command_type: CommandType::$ty,
                wire_template: &[$($wire),*],
                reply_template: &[$($reply),*],
                awaits_reply: $wait,
            },)*
        ];

        impl Command {
            /// All commands in table order
            pub const ALL: [Command; Command::COUNT] = [$(Command::$cmd),*];
        }
    };
}

command_table! {
    PowerToggle => "power_toggle", Write, [b(0x01), b(0x00)], [b(0x01)], true;
    PowerSet => "power_set", Write, [b(0x81), YY], [b(0x01), YY], false;
    InputSet => "input_set", Write, [b(0x82), YY], [b(0x02), YY], true;
    InputNext => "input_next", Write, [b(0x02), b(0x01)], [b(0x02)], true;
    InputPrev => "input_prev", Write, [b(0x02), b(0xFF)], [b(0x02)], true;
    VolumeGet => "volume_get", Write, [b(0x03), b(0x00)], [b(0x03)], true;
    VolumeSet => "volume_set", Write, [b(0x83), YY], [b(0x03), YY], true;
    VolumeUp => "volume_up", Write, [b(0x03), b(0x01)], [b(0x03)], true;
    VolumeDown => "volume_down", Write, [b(0x03), b(0xFF)], [b(0x03)], true;
    BalanceAdjust => "balance_adjust", Write, [b(0x04), YY], [b(0x04)], true;
    BalanceSet => "balance_set", Write, [b(0x84), YY], [b(0x04), YY], true;
    MuteToggle => "mute_toggle", Write, [b(0x09), b(0x00)], [b(0x09)], true;
    MuteSet => "mute_set", Write, [b(0x89), YY], [b(0x09), YY], true;
    DimCycle => "dim_cycle", Write, [b(0x0A), b(0x00)], [b(0x0A)], true;
    DimSet => "dim_set", Write, [b(0x8A), YY], [b(0x0A), YY], true;
    VerboseToggle => "verbose_toggle", Write, [b(0x0D), b(0x00)], [b(0x0D)], true;
    VerboseSet => "verbose_set", Write, [b(0x8D), YY], [b(0x0D), YY], true;
    MenuToggle => "menu_toggle", Write, [b(0x0E), b(0x01)], [b(0x0E)], true;
    MenuSet => "menu_set", Write, [b(0x8E), YY], [b(0x0E), YY], true;
    RemoteCmd => "remote_cmd", Write, [b(0x0F), YY], [YY], true;
    IrInputToggle => "ir_input_toggle", Write, [b(0x12), b(0x00)], [b(0x12)], true;
    IrInputSet => "ir_input_set", Write, [b(0x92), YY], [b(0x12), YY], true;
    RecallFactorySettings => "recall_factory_settings", Read, [b(0x13), b(0x00)], [], false;
    InputnameCurrentGet => "inputname_current_get", Read, [b(0x14), b(0x00)], [b(0x14), YY], true;
    InputnameSpecificGet => "inputname_specific_get", Read, [b(0x94), YY], [b(0x94), YY], true;
    ManufacturerGet => "manufacturer_get", Read, [b(0x15), b(0x00)], [b(0x15)], true;
    ModelnameGet => "modelname_get", Read, [b(0x16), b(0x00)], [b(0x16)], true;
    SwversionGet => "swversion_get", Read, [b(0x17), b(0x00)], [b(0x17)], true;
}

impl Command {
    /// Number of commands in the table
    pub const COUNT: usize = 28;

    /// Static descriptor for this command
    pub fn descriptor(self) -> &'static CommandDescriptor {
        &COMMAND_TABLE[self as usize]
    }

    /// Table key of this command
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    /// Look up a command by its table key
    pub fn from_name(name: &str) -> Option<Self> {
        COMMAND_TABLE
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.command)
    }

    /// Returns true if this command only reads state
    pub fn is_query(self) -> bool {
        matches!(
            self,
            Self::VolumeGet
                | Self::InputnameCurrentGet
                | Self::InputnameSpecificGet
                | Self::ManufacturerGet
                | Self::ModelnameGet
                | Self::SwversionGet
        )
    }

    /// Returns true if this command changes amplifier state
    pub fn is_set(self) -> bool {
        !self.is_query()
    }

    /// Commands whose acknowledgement may carry the given reply variable
    ///
    /// The match accepts the high-bit echo, so more than one command can be a
    /// candidate for the same frame.
    pub fn candidates_for_reply(variable: u8) -> impl Iterator<Item = Command> {
        COMMAND_TABLE
            .iter()
            .filter(move |d| match d.reply_template.first() {
                Some(Slot::Byte(v)) => *v == variable || (*v ^ ABSOLUTE_FLAG) == variable,
                _ => false,
            })
            .map(|d| d.command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| ProtocolError::UnknownCommand(s.to_string()))
    }
}

fn fill(template: &[Slot], operand: u8) -> Vec<u8> {
    template
        .iter()
        .map(|slot| match slot {
            Slot::Byte(byte) => *byte,
            Slot::Operand => operand,
        })
        .collect()
}

impl CommandDescriptor {
    /// Returns true if the request template has a `YY` slot
    pub fn takes_operand(&self) -> bool {
        self.wire_template.contains(&Slot::Operand)
    }

    /// Variable byte addressed by the request
    pub fn command_variable(&self) -> u8 {
        match self.wire_template.first() {
            Some(Slot::Byte(v)) => *v,
            _ => 0,
        }
    }

    /// Variable the acknowledgement is expected to carry
    ///
    /// `None` for commands without a reply. A reply template that starts
    /// with `YY` (remote commands) replies with the operand itself.
    pub fn reply_variable(&self, operand: Option<u8>) -> Option<u8> {
        match self.reply_template.first()? {
            Slot::Byte(v) => Some(*v),
            Slot::Operand => operand,
        }
    }

    /// Request body with the operand substituted
    pub fn build(&self, operand: Option<u8>) -> Result<Vec<u8>, ProtocolError> {
        match (self.takes_operand(), operand) {
            (true, Some(value)) => Ok(fill(self.wire_template, value)),
            (false, None) => Ok(fill(self.wire_template, 0)),
            (true, None) => Err(ProtocolError::MissingOperand(self.command)),
            (false, Some(_)) => Err(ProtocolError::UnexpectedOperand(self.command)),
        }
    }

    /// Complete wire frame for this command
    pub fn encode(&self, operand: Option<u8>) -> Result<Vec<u8>, ProtocolError> {
        Ok(encode_request(self.command_type, &self.build(operand)?))
    }

    /// Request template rendered as hex with `YY` placeholders
    pub fn wire_pattern(&self) -> String {
        self.wire_template.iter().map(Slot::to_string).collect()
    }
}
