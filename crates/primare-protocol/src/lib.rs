//! Primare RS232 Protocol Library
//!
//! This crate provides framing and the command table for the binary RS232
//! protocol spoken by Primare integrated amplifiers (I22, I32):
//!
//! - **Framing**: `STX [CMD] VARIABLE [DATA...] DLE ETX` with `DLE` doubling
//! - **Command table**: every request template, its expected acknowledgement
//!   and whether the amplifier echoes one
//! - **Variables**: the one-byte ids replies are keyed by
//!
//! The crate does no I/O. Bytes read from the serial line are pushed into a
//! [`FrameCodec`] and frames are pulled out as they complete; commands are
//! turned into wire bytes with [`CommandDescriptor::encode`].
//!
//! # Example
//!
//! ```rust
//! use primare_protocol::{Command, FrameCodec, Variable};
//!
//! let wire = Command::VolumeSet.descriptor().encode(Some(40)).unwrap();
//! assert_eq!(wire, vec![0x02, 0x57, 0x83, 0x28, 0x10, 0x03]);
//!
//! // Reply from the amplifier: volume is now 40
//! let mut codec = FrameCodec::new();
//! codec.push_bytes(&[0x02, 0x03, 0x28, 0x10, 0x03]);
//!
//! let frame = codec.next_frame().unwrap();
//! assert_eq!(Variable::from_reply(frame.variable), Some(Variable::Volume));
//! assert_eq!(frame.value(), Some(40));
//! ```

pub mod command;
pub mod error;
pub mod frame;
pub mod variable;

pub use command::{Command, CommandDescriptor, Slot, COMMAND_TABLE, YY};
pub use error::{FrameError, ProtocolError};
pub use frame::{
    encode_reply, encode_request, CommandType, Decoded, Frame, FrameCodec, Request, DLE, ETX,
    MAX_FRAME_LEN, MIN_FRAME_LEN, STX,
};
pub use variable::{Variable, ABSOLUTE_FLAG};
