//! Primare Amplifier Control
//!
//! This crate drives a Primare amplifier over its RS232 port. It is built
//! from four parts:
//!
//! - **Transport reader**: a task that reads the serial stream, reassembles
//!   frames and hands them on
//! - **Reply router**: matches frames to the command in flight, keeps the
//!   [`AmplifierState`] and publishes [`AmpEvent`]s
//! - **Command client**: one method per amplifier operation; at most one
//!   command is in flight and set operations wait for the amplifier to
//!   confirm them
//! - **Connection**: opens the port, owns the tasks and shuts them down
//!
//! Device-specific constants (volume steps, input count, serial settings,
//! timing) come from a [`DeviceProfile`].
//!
//! # Example
//!
//! ```rust,no_run
//! use primare_control::{Amplifier, ConnectionConfig, DeviceModel};
//!
//! # async fn run() -> Result<(), primare_control::ControlError> {
//! let config = ConnectionConfig::new("/dev/ttyUSB0", DeviceModel::I32);
//! let amp = Amplifier::connect(&config).await?;
//!
//! amp.client().volume_set(40).await?;
//! let name = amp.client().input_set(2).await?;
//! println!("Listening to {}", name);
//!
//! amp.close().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod error;
pub mod events;
pub mod mixer;
pub mod profile;
pub mod reader;
pub mod router;
pub mod state;
pub mod volume;

pub use client::{balance_operand, AmplifierClient};
pub use connection::Amplifier;
pub use error::ControlError;
pub use events::AmpEvent;
pub use mixer::{AmpMixer, MixerChange, MixerSubscription};
pub use profile::{ConnectionConfig, DeviceModel, DeviceProfile, Parity, SerialSettings};
pub use reader::TransportReader;
pub use router::{ReplyResult, ReplyRouter};
pub use state::{AmplifierState, Identification, PowerState};
pub use volume::{echo_confirms, percent_to_step, step_to_percent};
