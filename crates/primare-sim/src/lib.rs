//! Primare Amplifier Simulation Library
//!
//! This crate provides a virtual Primare amplifier for testing the control
//! client without hardware. It speaks the RS232 wire protocol over any async
//! byte stream and can reproduce the behaviour clients have to cope with:
//!
//! - **Silence**: requests are processed but never acknowledged
//! - **Volume echo quirk**: volume sets are echoed one step low
//! - **Front-panel changes**: reported unprompted while in verbose mode
//! - **Line noise**: arbitrary bytes injected into the stream
//!
//! # Example
//!
//! ```rust
//! use primare_protocol::{encode_request, CommandType, FrameCodec};
//! use primare_sim::{VirtualAmplifier, VirtualAmplifierConfig};
//!
//! let mut amp = VirtualAmplifier::new("I32", VirtualAmplifierConfig::i32());
//!
//! // Set volume to step 40
//! let reply = amp.process_bytes(&encode_request(CommandType::Write, &[0x83, 40]));
//!
//! let mut codec = FrameCodec::new();
//! codec.push_bytes(&reply);
//! assert_eq!(codec.next_frame().unwrap().value(), Some(40));
//! ```

pub mod amplifier;
pub mod amplifier_task;

pub use amplifier::{VirtualAmplifier, VirtualAmplifierConfig};
pub use amplifier_task::{run_virtual_amp_task, VirtualAmpCommand, VirtualAmpStateEvent};
