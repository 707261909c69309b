//! Virtual amplifier for testing
//!
//! This module provides a simulated Primare amplifier that decodes request
//! frames, tracks the variables they change and produces the reply frames a
//! real amplifier would send. Firmware quirks can be switched on to exercise
//! the client's tolerance for them.

use primare_protocol::{encode_reply, CommandType, FrameCodec, Request};
use tracing::{debug, warn};

/// Input names reported by default, in input order
const DEFAULT_INPUT_NAMES: [&str; 12] = [
    "IN1", "IN2", "IN3", "IN4", "IN5", "MEDIA", "DIG1", "DIG2", "DIG3", "DIG4", "PC", "BT",
];

/// Settings that survive a factory reset
#[derive(Debug, Clone)]
pub struct VirtualAmplifierConfig {
    /// Model name reported by `modelname_get`
    pub model: String,
    /// Software version reported by `swversion_get`
    pub software_version: String,
    /// Number of volume steps
    pub volume_levels: u8,
    /// Number of inputs
    pub input_count: u8,
}

impl Default for VirtualAmplifierConfig {
    fn default() -> Self {
        Self {
            model: "I22".to_string(),
            software_version: "V1.00".to_string(),
            volume_levels: 79,
            input_count: 7,
        }
    }
}

impl VirtualAmplifierConfig {
    /// An I32 with twelve inputs
    pub fn i32() -> Self {
        Self {
            model: "I32".to_string(),
            software_version: "V1.04".to_string(),
            input_count: 12,
            ..Self::default()
        }
    }
}

/// Simulated amplifier
pub struct VirtualAmplifier {
    id: String,
    config: VirtualAmplifierConfig,
    codec: FrameCodec,
    power: bool,
    volume: u8,
    mute: bool,
    input: u8,
    balance: u8,
    dim: u8,
    verbose: bool,
    menu: bool,
    ir_input_back: bool,
    input_names: Vec<String>,
    /// Echo volume sets one step low from this step upwards
    volume_echo_quirk: Option<u8>,
    /// Process requests but never reply
    silent: bool,
    /// Requests received (for test verification)
    received: Vec<Request>,
}

impl VirtualAmplifier {
    /// Create a new virtual amplifier in standby
    pub fn new(id: impl Into<String>, config: VirtualAmplifierConfig) -> Self {
        let input_names = DEFAULT_INPUT_NAMES
            .iter()
            .take(config.input_count as usize)
            .map(|name| name.to_string())
            .collect();
        Self {
            id: id.into(),
            config,
            codec: FrameCodec::new(),
            power: false,
            volume: 20,
            mute: true,
            input: 1,
            balance: 0,
            dim: 0,
            verbose: false,
            menu: false,
            ir_input_back: false,
            input_names,
            volume_echo_quirk: None,
            silent: false,
            received: Vec::new(),
        }
    }

    /// Get the identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get current power state
    pub fn power(&self) -> bool {
        self.power
    }

    /// Get current volume step
    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Get current mute state
    pub fn mute(&self) -> bool {
        self.mute
    }

    /// Get current input
    pub fn input(&self) -> u8 {
        self.input
    }

    /// Get verbose mode
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Requests received so far
    pub fn received(&self) -> &[Request] {
        &self.received
    }

    /// Echo volume sets one step below the request for steps `>= from`
    pub fn set_volume_echo_quirk(&mut self, from: Option<u8>) {
        self.volume_echo_quirk = from;
    }

    /// Stop replying to requests
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Rename an input (1-based)
    pub fn set_input_name(&mut self, input: u8, name: impl Into<String>) {
        if let Some(slot) = input
            .checked_sub(1)
            .and_then(|i| self.input_names.get_mut(i as usize))
        {
            *slot = name.into();
        }
    }

    fn input_name(&self, input: u8) -> &str {
        input
            .checked_sub(1)
            .and_then(|i| self.input_names.get(i as usize))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Feed bytes from the serial line
    ///
    /// Returns the bytes the amplifier sends back, possibly none.
    pub fn process_bytes(&mut self, data: &[u8]) -> Vec<u8> {
        self.codec.push_bytes(data);
        let mut output = Vec::new();
        while let Some(frame) = self.codec.next_frame() {
            let Some(request) = frame.as_request() else {
                warn!("Virtual amplifier {} ignoring non-request frame {:?}", self.id, frame);
                continue;
            };
            debug!("Virtual amplifier {} received {:?}", self.id, request);
            let reply = self.handle_request(&request);
            self.received.push(request);
            if let Some(reply) = reply {
                if !self.silent {
                    output.extend(reply);
                }
            }
        }
        output
    }

    fn reply_value(&self, variable: u8, value: u8) -> Option<Vec<u8>> {
        Some(encode_reply(variable, &[value]))
    }

    fn reply_text(&self, variable: u8, text: &str) -> Option<Vec<u8>> {
        Some(encode_reply(variable, text.as_bytes()))
    }

    fn handle_request(&mut self, request: &Request) -> Option<Vec<u8>> {
        let operand = request.operand.first().copied().unwrap_or(0);
        match (request.command_type, request.variable) {
            (CommandType::Write, 0x01) => {
                self.power = !self.power;
                self.reply_value(0x01, u8::from(self.power))
            }
            (CommandType::Write, 0x81) => {
                self.power = operand != 0;
                self.reply_value(0x01, u8::from(self.power))
            }
            (CommandType::Write, 0x02) => {
                let count = self.config.input_count.max(1);
                self.input = match operand {
                    0x01 => self.input % count + 1,
                    0xFF => (self.input + count - 2) % count + 1,
                    _ => self.input,
                };
                self.reply_value(0x02, self.input)
            }
            (CommandType::Write, 0x82) => {
                if (1..=self.config.input_count).contains(&operand) {
                    self.input = operand;
                }
                self.reply_value(0x02, self.input)
            }
            (CommandType::Write, 0x03) => {
                match operand {
                    0x01 => self.volume = self.volume.saturating_add(1).min(self.config.volume_levels),
                    0xFF => self.volume = self.volume.saturating_sub(1),
                    _ => {}
                }
                self.reply_value(0x03, self.volume)
            }
            (CommandType::Write, 0x83) => {
                self.volume = operand.min(self.config.volume_levels);
                let echoed = match self.volume_echo_quirk {
                    Some(from) if self.volume >= from => self.volume.saturating_sub(1),
                    _ => self.volume,
                };
                self.reply_value(0x03, echoed)
            }
            (CommandType::Write, 0x04) => {
                self.balance = self.balance.wrapping_add(operand);
                self.reply_value(0x04, self.balance)
            }
            (CommandType::Write, 0x84) => {
                self.balance = operand;
                self.reply_value(0x04, self.balance)
            }
            (CommandType::Write, 0x09) => {
                self.mute = !self.mute;
                self.reply_value(0x09, u8::from(self.mute))
            }
            (CommandType::Write, 0x89) => {
                self.mute = operand != 0;
                self.reply_value(0x09, u8::from(self.mute))
            }
            (CommandType::Write, 0x0A) => {
                self.dim = (self.dim + 1) % 4;
                self.reply_value(0x0A, self.dim)
            }
            (CommandType::Write, 0x8A) => {
                self.dim = operand % 4;
                self.reply_value(0x0A, self.dim)
            }
            (CommandType::Write, 0x0D) => {
                self.verbose = !self.verbose;
                self.reply_value(0x0D, u8::from(self.verbose))
            }
            (CommandType::Write, 0x8D) => {
                self.verbose = operand != 0;
                self.reply_value(0x0D, u8::from(self.verbose))
            }
            (CommandType::Write, 0x0E) => {
                self.menu = !self.menu;
                self.reply_value(0x0E, u8::from(self.menu))
            }
            (CommandType::Write, 0x8E) => {
                self.menu = operand != 0;
                self.reply_value(0x0E, operand)
            }
            // Remote codes are acknowledged with the code itself
            (CommandType::Write, 0x0F) => Some(encode_reply(operand, &[])),
            (CommandType::Write, 0x12) => {
                self.ir_input_back = !self.ir_input_back;
                self.reply_value(0x12, u8::from(self.ir_input_back))
            }
            (CommandType::Write, 0x92) => {
                self.ir_input_back = operand != 0;
                self.reply_value(0x12, u8::from(self.ir_input_back))
            }
            (CommandType::Read, 0x13) => {
                self.factory_reset();
                None
            }
            (CommandType::Read, 0x14) => self.reply_text(0x14, self.input_name(self.input)),
            (CommandType::Read, 0x94) => self.reply_text(0x94, self.input_name(operand)),
            (CommandType::Read, 0x15) => self.reply_text(0x15, "Primare"),
            (CommandType::Read, 0x16) => self.reply_text(0x16, &self.config.model),
            (CommandType::Read, 0x17) => self.reply_text(0x17, &self.config.software_version),
            (command_type, variable) => {
                warn!(
                    "Virtual amplifier {} does not understand {:?} {:02X}",
                    self.id, command_type, variable
                );
                None
            }
        }
    }

    fn factory_reset(&mut self) {
        debug!("Virtual amplifier {} restoring factory settings", self.id);
        let fresh = Self::new(self.id.clone(), self.config.clone());
        let received = std::mem::take(&mut self.received);
        *self = Self { received, ..fresh };
    }

    // -------------------------------------------------------------------------
    // Front panel: changes made on the amplifier itself
    // -------------------------------------------------------------------------

    fn push(&self, variable: u8, value: u8) -> Vec<u8> {
        if self.verbose {
            encode_reply(variable, &[value])
        } else {
            Vec::new()
        }
    }

    /// Turn the volume knob; returns the verbose-mode report, if any
    pub fn front_panel_volume(&mut self, step: u8) -> Vec<u8> {
        self.volume = step.min(self.config.volume_levels);
        self.push(0x03, self.volume)
    }

    /// Press the mute button
    pub fn front_panel_mute(&mut self, mute: bool) -> Vec<u8> {
        self.mute = mute;
        self.push(0x09, u8::from(mute))
    }

    /// Select an input on the front panel
    pub fn front_panel_input(&mut self, input: u8) -> Vec<u8> {
        if (1..=self.config.input_count).contains(&input) {
            self.input = input;
        }
        self.push(0x02, self.input)
    }
}
