use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use super::{FrameAssembler, LineGeometry};
use crate::error::Result;
use crate::media::{Depayloader, RtpConfig, RtpStream};
use crate::stream::{FrameCallback, RtpFrameData, StreamCore, StreamState};
use crate::transport::{ReceiveOptions, UdpTransport};

/// Largest datagram the receive loop accepts.
const MAX_DATAGRAM: usize = 65_536;

#[derive(Debug, Default)]
struct SlotState {
    frame: RtpFrameData,
    ready: bool,
}

/// Single-frame hand-off between the receive thread and `receive` callers.
#[derive(Debug, Default)]
struct FrameSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl FrameSlot {
    fn publish(&self, frame: &RtpFrameData) {
        let mut state = self.state.lock();
        state.frame.clone_from(frame);
        state.ready = true;
        self.ready.notify_all();
    }

    fn take(&self, out: &mut RtpFrameData, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.ready {
            if timeout.is_zero() || self.ready.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        if !state.ready {
            return false;
        }
        out.clone_from(&state.frame);
        state.ready = false;
        true
    }

    fn clear(&self) {
        self.state.lock().ready = false;
    }
}

/// Uncompressed video depayloader.
///
/// `open` binds the port (joining the group for multicast destinations);
/// `start` spawns the receive thread. Each completed frame is published to
/// a single slot read by [`receive`](Depayloader::receive) and, if one is
/// registered, handed to the frame callback on the receive thread.
pub struct RawDepayloader {
    core: StreamCore,
    config: RtpConfig,
    transport: Option<UdpTransport>,
    geometry: Option<LineGeometry>,
    slot: Arc<FrameSlot>,
    callback: Arc<RwLock<Option<FrameCallback>>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl RawDepayloader {
    pub fn new() -> Self {
        Self::with_config(RtpConfig::default())
    }

    pub fn with_config(config: RtpConfig) -> Self {
        Self {
            core: StreamCore::new(),
            config,
            transport: None,
            geometry: None,
            slot: Arc::new(FrameSlot::default()),
            callback: Arc::new(RwLock::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Port actually bound, once open. Differs from the configured port
    /// only when that was zero.
    pub fn local_port(&self) -> Option<u16> {
        self.transport
            .as_ref()
            .and_then(|t| t.local_addr().ok())
            .map(|a| a.port())
    }

    fn receive_loop(
        transport: UdpTransport,
        mut assembler: FrameAssembler,
        mut frame: RtpFrameData,
        slot: Arc<FrameSlot>,
        callback: Arc<RwLock<Option<FrameCallback>>>,
        running: Arc<AtomicBool>,
    ) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        while running.load(Ordering::Relaxed) {
            let len = match transport.recv_from(&mut buf) {
                Ok(Some((len, _))) => len,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "RTP receive error");
                    continue;
                }
            };

            let done = match assembler.push(&buf[..len]) {
                Ok(Some(done)) => done,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!(error = %e, len, "malformed RTP packet dropped");
                    continue;
                }
            };

            frame.timestamp = done.timestamp;
            frame.complete = done.complete;
            frame.data.copy_from_slice(assembler.frame());
            slot.publish(&frame);

            // Cloned out so the callback may re-register without deadlocking.
            let cb = callback.read().clone();
            if let Some(cb) = cb {
                cb(&frame);
            }
        }
        tracing::debug!("RTP receive thread exited");
    }
}

impl Default for RawDepayloader {
    fn default() -> Self {
        Self::new()
    }
}

impl RtpStream for RawDepayloader {
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

        let options = ReceiveOptions {
            read_timeout: self.config.poll_interval,
            buffer_size: Some(self.config.receive_buffer_size),
        };
        let transport = UdpTransport::receiver(ip, info.port, &options)?;

        tracing::info!(
            session = %info.session_name,
            address = %ip,
            port = info.port,
            width = info.width,
            height = info.height,
            encoding = %info.encoding,
            "raw depayloader open"
        );

        self.transport = Some(transport);
        self.geometry = Some(geometry);
        self.core.set_state(StreamState::Open);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if !self.core.begin_start()? {
            return Ok(());
        }
        if let (Some(transport), Some(geometry)) = (&self.transport, self.geometry) {
            let info = self.core.settings.info();
            let frame = RtpFrameData::new(info.resolution(), info.encoding);
            let transport = transport.clone();
            let slot = self.slot.clone();
            let callback = self.callback.clone();
            let running = self.running.clone();
            running.store(true, Ordering::Relaxed);

            self.thread = Some(thread::spawn(move || {
                Self::receive_loop(
                    transport,
                    FrameAssembler::new(geometry),
                    frame,
                    slot,
                    callback,
                    running,
                )
            }));
        }
        self.core.set_state(StreamState::Started);
        Ok(())
    }

    fn stop(&mut self) {
        if !self.core.begin_stop() {
            return;
        }
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::warn!("RTP receive thread panicked");
            }
        }
        self.core.set_state(StreamState::Stopped);
    }

    fn close(&mut self) {
        if self.core.state() == StreamState::Closed {
            return;
        }
        self.stop();
        self.transport = None;
        self.geometry = None;
        self.slot.clear();
        self.core.set_state(StreamState::Closed);
    }
}

impl Depayloader for RawDepayloader {
    fn receive(&self, frame: &mut RtpFrameData, timeout: Duration) -> bool {
        self.slot.take(frame, timeout)
    }

    fn register_callback(&mut self, callback: FrameCallback) {
        *self.callback.write() = Some(callback);
    }

    fn unregister_callback(&mut self) {
        *self.callback.write() = None;
    }

    fn callback_registered(&self) -> bool {
        self.callback.read().is_some()
    }
}

impl Drop for RawDepayloader {
    fn drop(&mut self) {
        self.close();
    }
}
