//! Transport reader
//!
//! Runs in its own task and owns the read half of the serial stream and the
//! frame accumulation buffer. Decoded frames are handed to the router; the
//! reader never writes.

use std::sync::Arc;

use primare_protocol::FrameCodec;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::router::ReplyRouter;

/// Reads frames from the amplifier until told to stop or the stream ends
pub struct TransportReader<R> {
    io: R,
    codec: FrameCodec,
    router: Arc<ReplyRouter>,
}

impl<R> TransportReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Create a reader feeding `router`
    pub fn new(io: R, router: Arc<ReplyRouter>) -> Self {
        Self {
            io,
            codec: FrameCodec::new(),
            router,
        }
    }

    /// Run the read loop
    ///
    /// Returns when `shutdown_rx` fires, the stream reaches end of file, or a
    /// read fails. The router is closed on the way out so no caller is left
    /// waiting for a reply that cannot arrive.
    pub async fn run(mut self, mut shutdown_rx: oneshot::Receiver<()>) {
        info!("Primare reader starting");

        let mut buffer = [0u8; 64];

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("Primare reader stopping on request");
                    break;
                }

                result = self.io.read(&mut buffer) => {
                    match result {
                        Ok(0) => {
                            info!("Primare serial stream closed");
                            break;
                        }
                        Ok(n) => self.handle_bytes(&buffer[..n]),
                        Err(e) => {
                            // Serial ports report an idle line as a timeout
                            if e.kind() == std::io::ErrorKind::TimedOut
                                || e.kind() == std::io::ErrorKind::WouldBlock
                            {
                                continue;
                            }
                            error!("Primare read error: {}", e);
                            break;
                        }
                    }
                }
            }
        }

        self.router.close();
        info!("Primare reader stopped");
    }

    fn handle_bytes(&mut self, data: &[u8]) {
        debug!("RX {:02X?}", data);
        self.codec.push_bytes(data);
        while let Some((frame, raw)) = self.codec.next_frame_with_bytes() {
            debug!("Frame {:02X?}", raw);
            self.router.dispatch(&frame);
        }
    }
}
