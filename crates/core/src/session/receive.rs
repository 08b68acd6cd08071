use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::media::Depayloader;
use crate::sap::{SapListener, SdpMessage};
use crate::stream::{RtpFrameData, StreamInformation};

/// How often `receive` rechecks for discovery while unconfigured.
const DISCOVERY_POLL: Duration = Duration::from_millis(10);

struct Shared {
    /// Write-locked only to configure or tear down; waiting receivers share
    /// a read lock.
    depayloader: RwLock<Box<dyn Depayloader>>,
    info: Mutex<Option<StreamInformation>>,
    configured: AtomicBool,
}

impl Shared {
    /// Configure the depayloader from the first live announcement.
    fn on_announcement(&self, msg: &SdpMessage) {
        if msg.deleted {
            return;
        }
        if self
            .configured
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let info = msg.to_stream_information();
        let mut depayloader = self.depayloader.write();
        depayloader.set_stream_info(&info);
        let opened = depayloader.open().and_then(|()| depayloader.start());
        match opened {
            Ok(()) => {
                tracing::info!(
                    session = %info.session_name,
                    address = %info.hostname,
                    port = info.port,
                    width = info.width,
                    height = info.height,
                    encoding = %info.encoding,
                    "receive session configured"
                );
                *self.info.lock() = Some(info);
            }
            Err(e) => {
                tracing::warn!(session = %info.session_name, error = %e, "could not open depayloader");
                depayloader.close();
                // Retry on the next announcement.
                self.configured.store(false, Ordering::SeqCst);
            }
        }
    }
}

/// Receive side of a session.
///
/// Registers a discovery callback for `session_name` and starts the
/// listener. The first announcement for that name configures, opens and
/// starts the depayloader; later ones are ignored. Only one session per
/// name may be registered on a listener at a time.
pub struct RtpSapReceive {
    listener: Arc<SapListener>,
    session_name: String,
    shared: Arc<Shared>,
}

impl RtpSapReceive {
    pub fn new(listener: Arc<SapListener>, depayloader: Box<dyn Depayloader>, session_name: &str) -> Self {
        let shared = Arc::new(Shared {
            depayloader: RwLock::new(depayloader),
            info: Mutex::new(None),
            configured: AtomicBool::new(false),
        });

        let callback_state = shared.clone();
        listener.register_sap_listener(
            session_name,
            Arc::new(move |msg: &SdpMessage| callback_state.on_announcement(msg)),
        );
        listener.start();
        tracing::debug!(session = %session_name, "waiting for announcement");

        Self {
            listener,
            session_name: session_name.to_string(),
            shared,
        }
    }

    /// Whether an announcement has been seen and the depayloader started.
    pub fn is_configured(&self) -> bool {
        self.shared.info.lock().is_some()
    }

    /// Stream parameters taken from the announcement, once discovered.
    pub fn stream_info(&self) -> Option<StreamInformation> {
        self.shared.info.lock().clone()
    }

    /// Wait up to `timeout` for the next frame. Before the stream is
    /// discovered this polls for discovery and then waits for a frame with
    /// whatever remains of the timeout.
    pub fn receive(&self, frame: &mut RtpFrameData, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_configured() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            thread::sleep(remaining.min(DISCOVERY_POLL));
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.shared.depayloader.read().receive(frame, remaining)
    }
}

impl Drop for RtpSapReceive {
    fn drop(&mut self) {
        self.listener.unregister_sap_listener(&self.session_name);
        let mut depayloader = self.shared.depayloader.write();
        depayloader.stop();
        depayloader.close();
        tracing::info!(session = %self.session_name, "receive session closed");
    }
}
