use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use super::{LineGeometry, RawPacketizer};
use crate::error::{MediaxError, Result};
use crate::media::{Payloader, RtpConfig, RtpStream};
use crate::stream::{StreamCore, StreamState};
use crate::transport::UdpTransport;

/// Everything needed to put a frame on the wire, shared with the sender thread.
struct Link {
    transport: UdpTransport,
    destination: SocketAddr,
    geometry: LineGeometry,
    packetizer: Mutex<RawPacketizer>,
}

impl Link {
    /// Packetize and send one frame. Send failures are logged, never raised.
    fn send_frame(&self, frame: &[u8]) -> usize {
        let packets = self.packetizer.lock().packetize(frame, &self.geometry);
        let mut failures = 0usize;
        let mut last_error = None;
        for packet in &packets {
            if let Err(e) = self.transport.send_to(packet, self.destination) {
                failures += 1;
                last_error = Some(e);
            }
        }
        if let Some(e) = last_error {
            tracing::warn!(
                destination = %self.destination,
                failures,
                packets = packets.len(),
                error = %e,
                "RTP send failures"
            );
        }
        packets.len() - failures
    }
}

/// Background sender for non-blocking transmits.
struct SenderThread {
    frames: SyncSender<Vec<u8>>,
    handle: JoinHandle<()>,
}

/// Uncompressed video payloader.
///
/// Sends each frame as scanline packets to the configured unicast or
/// multicast destination, without acknowledgment or pacing. Frame-rate
/// pacing belongs to [`crate::session::RtpSapTransmit`].
pub struct RawPayloader {
    core: StreamCore,
    config: RtpConfig,
    link: Option<Arc<Link>>,
    sender: Option<SenderThread>,
}

impl RawPayloader {
    pub fn new() -> Self {
        Self::with_config(RtpConfig::default())
    }

    pub fn with_config(config: RtpConfig) -> Self {
        Self {
            core: StreamCore::new(),
            config,
            link: None,
            sender: None,
        }
    }

    /// Local address of the sending socket, once open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.link.as_ref().and_then(|l| l.transport.local_addr().ok())
    }

    fn spawn_sender(link: Arc<Link>) -> SenderThread {
        let (frames, queue) = mpsc::sync_channel::<Vec<u8>>(1);
        let handle = thread::spawn(move || {
            for frame in queue {
                link.send_frame(&frame);
            }
            tracing::debug!("RTP sender thread exited");
        });
        SenderThread { frames, handle }
    }
}

impl Default for RawPayloader {
    fn default() -> Self {
        Self::new()
    }
}

impl RtpStream for RawPayloader {
    fn core(&self) -> &StreamCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StreamCore {
        &mut self.core
    }

    fn open(&mut self) -> Result<()> {
        self.core.begin_open()?;
        let info = self.core.settings.info();
        let ip = info.validate()?;
        let geometry = LineGeometry::new(info.resolution(), info.encoding)?;

        let transport = UdpTransport::sender(self.config.multicast_ttl, None)?;
        let destination = SocketAddr::from((ip, info.port));

        tracing::info!(
            session = %info.session_name,
            %destination,
            multicast = ip.is_multicast(),
            width = info.width,
            height = info.height,
            encoding = %info.encoding,
            "raw payloader open"
        );

        self.link = Some(Arc::new(Link {
            transport,
            destination,
            geometry,
            packetizer: Mutex::new(RawPacketizer::with_random_ssrc(
                self.config.payload_type,
                self.config.mtu,
            )),
        }));
        self.core.set_state(StreamState::Open);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if !self.core.begin_start()? {
            return Ok(());
        }
        if let Some(link) = &self.link {
            self.sender = Some(Self::spawn_sender(link.clone()));
        }
        self.core.set_state(StreamState::Started);
        Ok(())
    }

    fn stop(&mut self) {
        if !self.core.begin_stop() {
            return;
        }
        if let Some(sender) = self.sender.take() {
            // Closing the channel ends the thread after the frame in flight.
            drop(sender.frames);
            if sender.handle.join().is_err() {
                tracing::warn!("RTP sender thread panicked");
            }
        }
        self.core.set_state(StreamState::Stopped);
    }

    fn close(&mut self) {
        if self.core.state() == StreamState::Closed {
            return;
        }
        self.stop();
        self.link = None;
        self.core.set_state(StreamState::Closed);
    }
}

impl Payloader for RawPayloader {
    fn transmit(&mut self, frame: &[u8], blocking: bool) -> Result<bool> {
        let state = self.core.state();
        let link = match (&self.link, state) {
            (Some(link), StreamState::Started) => link,
            _ => {
                return Err(MediaxError::InvalidState {
                    operation: "transmit",
                    state,
                });
            }
        };

        let expected = link.geometry.frame_size();
        if frame.len() != expected {
            return Err(MediaxError::FrameSize {
                expected,
                actual: frame.len(),
            });
        }

        if blocking {
            link.send_frame(frame);
            return Ok(true);
        }

        let Some(sender) = &self.sender else {
            return Ok(false);
        };
        match sender.frames.try_send(frame.to_vec()) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                tracing::trace!("sender busy, frame dropped");
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => Ok(false),
        }
    }
}

impl Drop for RawPayloader {
    fn drop(&mut self) {
        self.close();
    }
}
