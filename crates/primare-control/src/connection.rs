//! Connection lifecycle
//!
//! An [`Amplifier`] owns the reader task, the follow-up task and the write
//! half of the stream. [`Amplifier::close`] stops the reader, fails any
//! caller still waiting, closes the stream and waits for the reader to
//! finish.

use std::sync::Arc;
use std::time::Duration;

use primare_protocol::Command;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::client::{AmplifierClient, Writer};
use crate::error::ControlError;
use crate::events::AmpEvent;
use crate::mixer::AmpMixer;
use crate::profile::{ConnectionConfig, DeviceProfile};
use crate::reader::TransportReader;
use crate::router::ReplyRouter;
use crate::state::AmplifierState;

/// Serial read timeout; an idle line wakes the reader this often
const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(100);

const EVENT_CAPACITY: usize = 64;
const FOLLOW_UP_CAPACITY: usize = 8;

/// A live connection to one amplifier
pub struct Amplifier {
    client: AmplifierClient,
    router: Arc<ReplyRouter>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    reader: Option<JoinHandle<()>>,
    follow_up: Option<JoinHandle<()>>,
}

impl Amplifier {
    /// Open the serial port described by `config`
    pub fn open(config: &ConnectionConfig) -> Result<Self, ControlError> {
        let profile = &config.profile;
        profile.validate()?;

        let serial = &profile.serial;
        info!(
            "Opening {} on {} at {} baud",
            profile.model.name(),
            config.port,
            serial.baud_rate
        );
        let stream = tokio_serial::new(&config.port, serial.baud_rate)
            .data_bits(serial.tokio_data_bits()?)
            .parity(serial.tokio_parity())
            .stop_bits(serial.tokio_stop_bits()?)
            .timeout(SERIAL_READ_TIMEOUT)
            .open_native_async()?;

        Ok(Self::with_io(stream, profile.clone()))
    }

    /// Open the port and bring the amplifier to a known state
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, ControlError> {
        let amp = Self::open(config)?;
        amp.client.initialize(config.input_source).await?;
        Ok(amp)
    }

    /// Run the protocol over any byte stream
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_io<T>(io: T, profile: DeviceProfile) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);

        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (follow_up_tx, mut follow_up_rx) = mpsc::channel::<Command>(FOLLOW_UP_CAPACITY);
        let router = Arc::new(
            ReplyRouter::new(profile.volume_levels, event_tx).with_follow_up(follow_up_tx),
        );

        let client = AmplifierClient::new(
            Writer::new(Box::new(write_half)),
            router.clone(),
            profile,
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let reader = tokio::spawn(TransportReader::new(read_half, router.clone()).run(shutdown_rx));

        let follow_up_client = client.clone();
        let follow_up = tokio::spawn(async move {
            while let Some(command) = follow_up_rx.recv().await {
                if let Err(e) = follow_up_client.execute(command, None).await {
                    debug!("Follow-up {} failed: {}", command, e);
                }
            }
        });

        Self {
            client,
            router,
            shutdown_tx: Some(shutdown_tx),
            reader: Some(reader),
            follow_up: Some(follow_up),
        }
    }

    /// Command client for this connection
    pub fn client(&self) -> &AmplifierClient {
        &self.client
    }

    /// Volume and mute adapter for host mixers
    pub fn mixer(&self) -> AmpMixer {
        AmpMixer::new(self.client.clone())
    }

    /// Copy of the current amplifier state
    pub fn state(&self) -> AmplifierState {
        self.router.snapshot()
    }

    /// Subscribe to amplifier events
    pub fn subscribe(&self) -> broadcast::Receiver<AmpEvent> {
        self.router.subscribe()
    }

    /// Returns false once the reader has stopped
    pub fn is_connected(&self) -> bool {
        !self.router.is_closed()
    }

    /// Close the connection and wait for the reader to stop
    pub async fn close(mut self) {
        info!("Closing amplifier connection");

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            // The reader may already be gone
            let _ = shutdown_tx.send(());
        }
        self.router.close();

        if let Some(mut writer) = self.client.take_writer().await {
            writer.shutdown().await;
        }

        if let Some(reader) = self.reader.take() {
            if let Err(e) = reader.await {
                warn!("Reader task ended abnormally: {}", e);
            }
        }
        if let Some(follow_up) = self.follow_up.take() {
            follow_up.abort();
        }
        info!("Amplifier connection closed");
    }
}

impl Drop for Amplifier {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(follow_up) = self.follow_up.take() {
            follow_up.abort();
        }
    }
}
