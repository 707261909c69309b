//! Integration tests for Primare amplifier control
//!
//! These tests drive the full stack (client, reader, router) over an
//! in-memory stream against either the virtual amplifier or a hand-scripted
//! device:
//! - Initialization order and resulting state
//! - Volume conversion and the off-by-one echo
//! - Timeouts, disconnects and shutdown
//! - One command in flight at a time
//! - Unsolicited verbose-mode updates and the mixer adapter

use std::time::Duration;

use primare_control::{
    AmpEvent, Amplifier, ControlError, DeviceProfile, MixerChange, PowerState,
};
use primare_protocol::{encode_reply, Command, FrameCodec, Request};
use primare_sim::{run_virtual_amp_task, VirtualAmpCommand, VirtualAmplifier, VirtualAmplifierConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    /// I22 profile with short timeouts and no write spacing
    pub fn fast_profile() -> DeviceProfile {
        DeviceProfile {
            reply_timeout_ms: 200,
            command_spacing_ms: 0,
            ..DeviceProfile::i22()
        }
    }

    /// Connection to a virtual amplifier
    pub struct SimRig {
        pub amp: Amplifier,
        pub sim_tx: mpsc::Sender<VirtualAmpCommand>,
        pub sim_task: JoinHandle<std::io::Result<()>>,
    }

    pub fn sim_rig_with(sim: VirtualAmplifier, profile: DeviceProfile) -> SimRig {
        let (host, device) = tokio::io::duplex(1024);
        let (sim_tx, sim_rx) = mpsc::channel(16);
        let (state_tx, _) = broadcast::channel(16);
        let sim_task = tokio::spawn(run_virtual_amp_task(device, sim, sim_rx, state_tx));
        SimRig {
            amp: Amplifier::with_io(host, profile),
            sim_tx,
            sim_task,
        }
    }

    pub fn sim_rig() -> SimRig {
        sim_rig_with(
            VirtualAmplifier::new("sim", VirtualAmplifierConfig::default()),
            fast_profile(),
        )
    }

    /// Device that answers each request with whatever `respond` returns and
    /// reports every request it saw
    pub fn scripted<F>(
        profile: DeviceProfile,
        respond: F,
    ) -> (Amplifier, mpsc::UnboundedReceiver<Request>)
    where
        F: Fn(&Request) -> Option<Vec<u8>> + Send + 'static,
    {
        let (host, device) = tokio::io::duplex(1024);
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_script(device, respond, seen_tx));
        (Amplifier::with_io(host, profile), seen_rx)
    }

    async fn run_script<F>(
        mut device: DuplexStream,
        respond: F,
        seen_tx: mpsc::UnboundedSender<Request>,
    ) where
        F: Fn(&Request) -> Option<Vec<u8>>,
    {
        let mut codec = FrameCodec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = match device.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            codec.push_bytes(&buf[..n]);
            while let Some(frame) = codec.next_frame() {
                let request = frame.as_request().unwrap();
                let reply = respond(&request);
                let _ = seen_tx.send(request);
                if let Some(reply) = reply {
                    device.write_all(&reply).await.unwrap();
                }
            }
        }
    }

    /// Acknowledge set commands the way the amplifier does
    pub fn echo(request: &Request) -> Option<Vec<u8>> {
        let variable = request.variable & 0x7F;
        Some(encode_reply(variable, &request.operand))
    }

    /// Wait for the first event matching `pred`
    pub async fn wait_for<P>(events: &mut broadcast::Receiver<AmpEvent>, pred: P) -> AmpEvent
    where
        P: Fn(&AmpEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let event = events.recv().await.unwrap();
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("event not received")
    }
}

use helpers::*;

// ============================================================================
// Initialization
// ============================================================================

#[tokio::test]
async fn test_initialize_sends_known_state_sequence() {
    let (amp, mut seen) = scripted(fast_profile(), |request| match request.variable {
        // Volume steps report the resulting step
        0x03 => Some(encode_reply(0x03, &[30])),
        _ => echo(request),
    });

    amp.client().initialize(None).await.unwrap();

    let mut requests = Vec::new();
    while let Ok(request) = seen.try_recv() {
        requests.push((request.variable, request.operand));
    }
    assert_eq!(
        &requests[..3],
        &[
            (0x81, vec![0x01]),
            (0x8D, vec![0x01]),
            (0x89, vec![0x00]),
        ]
    );
    // Calibration: down then up
    assert_eq!(
        &requests[3..],
        &[(0x03, vec![0xFF]), (0x03, vec![0x01])]
    );

    let state = amp.state();
    assert_eq!(state.power, PowerState::On);
    assert_eq!(state.mute, Some(false));
    assert_eq!(state.verbose, Some(true));
    assert_eq!(state.volume, Some(30));
    amp.close().await;
}

#[tokio::test]
async fn test_initialize_against_virtual_amplifier() {
    let rig = sim_rig();
    let client = rig.amp.client();

    client.initialize(Some(3)).await.unwrap();

    let state = rig.amp.state();
    assert_eq!(state.power, PowerState::On);
    assert_eq!(state.mute, Some(false));
    assert_eq!(state.input_source, Some(3));
    assert_eq!(state.identification.input_name, "IN3");
    // Virtual amplifier starts at step 20
    assert_eq!(state.volume, Some(20));
    rig.amp.close().await;
}

#[tokio::test]
async fn test_setup_reads_identification_once() {
    let rig = sim_rig_with(
        VirtualAmplifier::new("sim", VirtualAmplifierConfig::i32()),
        DeviceProfile {
            input_count: 12,
            ..fast_profile()
        },
    );
    let mut events = rig.amp.subscribe();

    let identification = rig.amp.client().setup(None).await.unwrap();
    assert_eq!(identification.manufacturer, "Primare");
    assert_eq!(identification.model, "I32");
    assert_eq!(identification.software_version, "V1.04");
    assert_eq!(identification.input_name, "IN1");

    let connected = wait_for(&mut events, |e| matches!(e, AmpEvent::Connected { .. })).await;
    assert_eq!(connected, AmpEvent::Connected { identification });

    // A second read does not announce the connection again
    rig.amp.client().device_info().await.unwrap();
    rig.amp.close().await;
    let mut remaining = Vec::new();
    while let Ok(event) = events.try_recv() {
        remaining.push(event);
    }
    assert!(!remaining
        .iter()
        .any(|e| matches!(e, AmpEvent::Connected { .. })));
}

// ============================================================================
// Volume
// ============================================================================

#[tokio::test]
async fn test_volume_set_half_is_step_40() {
    let (amp, mut seen) = scripted(fast_profile(), echo);

    amp.client().volume_set(50).await.unwrap();

    let request = seen.recv().await.unwrap();
    assert_eq!(request.variable, 0x83);
    assert_eq!(request.operand, vec![0x28]);
    assert_eq!(amp.state().volume, Some(40));
    assert_eq!(amp.state().volume_display(79), "40/79");
    assert_eq!(amp.client().volume_get(), Some(51));
    amp.close().await;
}

#[tokio::test]
async fn test_volume_echo_one_step_low_is_accepted() {
    let mut sim = VirtualAmplifier::new("sim", VirtualAmplifierConfig::default());
    sim.set_volume_echo_quirk(Some(0));
    let rig = sim_rig_with(sim, fast_profile());

    rig.amp.client().volume_set(50).await.unwrap();
    assert_eq!(rig.amp.state().volume, Some(39));
    rig.amp.close().await;
}

#[tokio::test]
async fn test_volume_echo_two_steps_low_is_mismatch() {
    let (amp, _seen) = scripted(fast_profile(), |request| {
        let step = request.operand[0];
        Some(encode_reply(0x03, &[step - 2]))
    });

    let result = amp.client().volume_set(50).await;
    assert!(matches!(
        result,
        Err(ControlError::Mismatch {
            command: Command::VolumeSet,
            ..
        })
    ));
    amp.close().await;
}

#[tokio::test]
async fn test_volume_above_100_rejected_before_write() {
    let (amp, mut seen) = scripted(fast_profile(), echo);
    assert!(matches!(
        amp.client().volume_set(101).await,
        Err(ControlError::InvalidInput(_))
    ));
    amp.close().await;
    assert!(seen.recv().await.is_none());
}

#[tokio::test]
async fn test_out_of_range_volume_keeps_previous_state() {
    let (amp, _seen) = scripted(fast_profile(), |request| match request.variable {
        0x83 => Some(encode_reply(0x03, &request.operand)),
        // volume_get answered with a step the device cannot have
        0x03 => Some(encode_reply(0x03, &[200])),
        _ => None,
    });

    amp.client().volume_set(25).await.unwrap();
    let before = amp.state().volume;
    assert!(matches!(
        amp.client().volume_query().await,
        Err(ControlError::Mismatch { .. })
    ));
    assert_eq!(amp.state().volume, before);
    amp.close().await;
}

// ============================================================================
// Failures and shutdown
// ============================================================================

#[tokio::test]
async fn test_silent_amplifier_times_out() {
    let mut sim = VirtualAmplifier::new("sim", VirtualAmplifierConfig::default());
    sim.set_silent(true);
    let rig = sim_rig_with(sim, fast_profile());

    let result = rig.amp.client().volume_set(50).await;
    assert!(matches!(
        result,
        Err(ControlError::Timeout {
            command: Command::VolumeSet,
            ms: 200
        })
    ));
    assert_eq!(rig.amp.state().volume, None);

    // The connection is still usable afterwards
    rig.sim_tx.send(VirtualAmpCommand::SetSilent(false)).await.unwrap();
    // Let the virtual amplifier pick up the switch before the next request
    tokio::time::sleep(Duration::from_millis(20)).await;
    rig.amp.client().mute_set(true).await.unwrap();
    assert_eq!(rig.amp.state().mute, Some(true));
    rig.amp.close().await;
}

#[tokio::test]
async fn test_disconnect_releases_waiter() {
    let (host, device) = tokio::io::duplex(256);
    let profile = DeviceProfile {
        reply_timeout_ms: 10_000,
        ..fast_profile()
    };
    let amp = Amplifier::with_io(host, profile);
    let client = amp.client().clone();

    let pending = tokio::spawn(async move { client.mute_set(true).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(device);

    let result = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("waiter not released")
        .unwrap();
    assert!(matches!(result, Err(ControlError::Disconnected)));
    assert!(!amp.is_connected());
    amp.close().await;
}

#[tokio::test]
async fn test_close_stops_everything() {
    let rig = sim_rig();
    let client = rig.amp.client().clone();
    let mut events = rig.amp.subscribe();
    client.mute_set(false).await.unwrap();

    rig.amp.close().await;

    assert_eq!(
        wait_for(&mut events, |e| matches!(e, AmpEvent::Disconnected)).await,
        AmpEvent::Disconnected
    );
    assert!(matches!(
        client.volume_set(10).await,
        Err(ControlError::Disconnected)
    ));
    // The writer was closed, so the virtual amplifier sees end of stream
    tokio::time::timeout(Duration::from_secs(1), rig.sim_task)
        .await
        .expect("virtual amplifier still running")
        .unwrap()
        .unwrap();
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_one_command_in_flight() {
    let (host, mut device) = tokio::io::duplex(1024);
    let amp = Amplifier::with_io(host, fast_profile());

    let device_task = tokio::spawn(async move {
        let mut codec = FrameCodec::new();
        let mut buf = [0u8; 64];
        let mut log = Vec::new();
        let mut replies = 0;
        while replies < 2 {
            let frame = loop {
                if let Some(frame) = codec.next_frame() {
                    break frame;
                }
                let n = device.read(&mut buf).await.unwrap();
                codec.push_bytes(&buf[..n]);
            };
            let request = frame.as_request().unwrap();
            log.push(format!("request {:02X}", request.operand[0]));

            // Anything arriving before the reply is an interleaved write
            if let Ok(Ok(n)) =
                tokio::time::timeout(Duration::from_millis(40), device.read(&mut buf)).await
            {
                if n > 0 {
                    log.push("early write".to_string());
                    codec.push_bytes(&buf[..n]);
                }
            }

            device
                .write_all(&encode_reply(0x03, &request.operand))
                .await
                .unwrap();
            log.push(format!("reply {:02X}", request.operand[0]));
            replies += 1;
        }
        log
    });

    let client = amp.client();
    let (a, b) = tokio::join!(client.volume_set(0), client.volume_set(100));
    a.unwrap();
    b.unwrap();

    let log = device_task.await.unwrap();
    assert_eq!(log.len(), 4, "{:?}", log);
    assert!(log[0].starts_with("request") && log[1].starts_with("reply"));
    assert!(log[2].starts_with("request") && log[3].starts_with("reply"));
    amp.close().await;
}

// ============================================================================
// Unsolicited updates
// ============================================================================

#[tokio::test]
async fn test_unknown_variable_changes_nothing() {
    let rig = sim_rig();
    let mut events = rig.amp.subscribe();
    rig.amp.client().mute_set(false).await.unwrap();
    let before = rig.amp.state();

    rig.sim_tx
        .send(VirtualAmpCommand::Inject(encode_reply(0x42, &[0x07])))
        .await
        .unwrap();

    let event = wait_for(&mut events, |e| e.is_anomaly()).await;
    assert_eq!(
        event,
        AmpEvent::UnrecognizedFrame {
            variable: 0x42,
            payload: vec![0x07]
        }
    );
    assert_eq!(rig.amp.state(), before);
    rig.amp.close().await;
}

#[tokio::test]
async fn test_line_noise_is_skipped() {
    let rig = sim_rig();
    rig.sim_tx
        .send(VirtualAmpCommand::Inject(vec![0xFF, 0x10, 0x55, 0x03]))
        .await
        .unwrap();

    rig.amp.client().volume_set(20).await.unwrap();
    assert_eq!(rig.amp.state().volume, Some(16));
    rig.amp.close().await;
}

#[tokio::test]
async fn test_front_panel_volume_reaches_mixer() {
    let rig = sim_rig();
    let mixer = rig.amp.mixer();
    let mut changes = mixer.subscribe();
    rig.amp.client().verbose_set(true).await.unwrap();

    rig.sim_tx
        .send(VirtualAmpCommand::FrontPanelVolume(60))
        .await
        .unwrap();
    let change = tokio::time::timeout(Duration::from_secs(1), changes.recv())
        .await
        .unwrap();
    assert_eq!(change, Some(MixerChange::Volume(76)));
    assert_eq!(mixer.get_volume(), Some(76));
    assert_eq!(rig.amp.state().volume, Some(60));

    assert!(mixer.set_mute(true).await);
    let change = tokio::time::timeout(Duration::from_secs(1), changes.recv())
        .await
        .unwrap();
    assert_eq!(change, Some(MixerChange::Mute(true)));
    assert_eq!(mixer.get_mute(), Some(true));
    rig.amp.close().await;
}

#[tokio::test]
async fn test_front_panel_input_fetches_name() {
    let rig = sim_rig();
    let mut events = rig.amp.subscribe();
    rig.amp.client().verbose_set(true).await.unwrap();

    rig.sim_tx
        .send(VirtualAmpCommand::FrontPanelInput(6))
        .await
        .unwrap();

    wait_for(&mut events, |e| *e == AmpEvent::InputChanged { input: 6 }).await;
    let name = wait_for(&mut events, |e| matches!(e, AmpEvent::InputNameChanged { .. })).await;
    assert_eq!(
        name,
        AmpEvent::InputNameChanged {
            name: "MEDIA".to_string()
        }
    );
    rig.amp.close().await;
}

// ============================================================================
// Remaining operations
// ============================================================================

#[tokio::test]
async fn test_input_bounds_follow_profile() {
    let rig = sim_rig();
    let client = rig.amp.client();

    assert!(matches!(
        client.input_set(8).await,
        Err(ControlError::InvalidInput(_))
    ));
    assert!(matches!(
        client.input_set(0).await,
        Err(ControlError::InvalidInput(_))
    ));
    assert_eq!(client.inputname_specific_get(9).await.unwrap(), "");

    assert_eq!(client.input_set(7).await.unwrap(), "DIG1");
    assert_eq!(client.input_next().await.unwrap(), "IN1");
    assert_eq!(client.input_prev().await.unwrap(), "DIG1");
    assert_eq!(client.inputname_specific_get(2).await.unwrap(), "IN2");
    assert_eq!(
        rig.amp.state().input_names.get(&2).map(String::as_str),
        Some("IN2")
    );
    rig.amp.close().await;
}

#[tokio::test]
async fn test_settings_operations() {
    let rig = sim_rig();
    let client = rig.amp.client();

    assert_eq!(client.power_toggle().await.unwrap(), Some(true));
    assert_eq!(client.mute_toggle().await.unwrap(), Some(false));
    client.dim_set(5).await.unwrap();
    assert_eq!(rig.amp.state().dim, Some(1));
    assert_eq!(client.dim_cycle().await.unwrap(), Some(2));
    client.ir_input_set(true).await.unwrap();
    assert_eq!(rig.amp.state().ir_input_back, Some(true));
    assert_eq!(client.ir_input_toggle().await.unwrap(), Some(false));
    assert_eq!(client.verbose_toggle().await.unwrap(), Some(true));
    assert_eq!(client.menu_toggle().await.unwrap(), Some(true));
    client.menu_set(0).await.unwrap();
    client.balance_set(12).await.unwrap();
    assert_eq!(rig.amp.state().balance, Some(0xFE));
    client.balance_adjust_right().await.unwrap();
    client.balance_adjust_left().await.unwrap();
    assert_eq!(rig.amp.state().balance, Some(0xFE));
    assert_eq!(client.volume_up().await.unwrap(), Some(21));
    assert_eq!(client.volume_down().await.unwrap(), Some(20));
    assert_eq!(client.volume_query().await.unwrap(), 25);
    client.remote_cmd(0x41).await.unwrap();
    client.power_off().await.unwrap();
    client.recall_factory_settings().await.unwrap();
    rig.amp.close().await;
}

#[tokio::test]
async fn test_remote_codes_sharing_variable_ids() {
    let rig = sim_rig();
    let client = rig.amp.client();
    client.volume_set(25).await.unwrap();
    client.power_on().await.unwrap();
    client.mute_set(false).await.unwrap();
    let before = rig.amp.state();
    let mut events = rig.amp.subscribe();

    // Volume, power and a high-bit code that normalises to volume
    for code in [0x03, 0x01, 0x83] {
        client.remote_cmd(code).await.unwrap();
    }

    assert_eq!(rig.amp.state(), before);
    assert!(std::iter::from_fn(|| events.try_recv().ok())
        .all(|e| !e.is_anomaly()));
    rig.amp.close().await;
}
