use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};

use super::SapConfig;
use super::message::{SdpMessage, decode};
use crate::error::Result;
use crate::transport::{ReceiveOptions, UdpTransport};

/// Registration key that receives every announcement.
pub const ALL_SESSIONS: &str = "*";

/// Invoked on the listener thread for each matching announcement.
pub type SapCallback = Arc<dyn Fn(&SdpMessage) + Send + Sync>;

const MAX_DATAGRAM: usize = 4096;

/// Callbacks by session name. Messages are handed to callbacks and never
/// kept here.
#[derive(Default)]
struct Registry {
    callbacks: RwLock<HashMap<String, SapCallback>>,
}

impl Registry {
    fn dispatch(&self, msg: &SdpMessage) {
        let targets: Vec<SapCallback> = {
            let callbacks = self.callbacks.read();
            [msg.session_name.as_str(), ALL_SESSIONS]
                .iter()
                .filter_map(|key| callbacks.get(*key).cloned())
                .collect()
        };
        for callback in targets {
            callback(msg);
        }
    }
}

/// SAP listener dispatching announcements by session name.
///
/// The socket is bound at construction so a port conflict surfaces
/// immediately. `start`/`stop` only control the receive thread;
/// registrations survive them.
pub struct SapListener {
    transport: UdpTransport,
    registry: Arc<Registry>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SapListener {
    pub fn new(config: SapConfig) -> Result<Self> {
        let options = ReceiveOptions {
            read_timeout: config.poll_interval,
            buffer_size: None,
        };
        let transport = UdpTransport::receiver(config.address, config.port, &options)?;
        tracing::info!(address = %config.address, port = config.port, "SAP listener bound");

        Ok(Self {
            transport,
            registry: Arc::new(Registry::default()),
            running: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        })
    }

    /// Register `callback` for `session_name` (or [`ALL_SESSIONS`]),
    /// replacing any previous registration under that name.
    pub fn register_sap_listener(&self, session_name: &str, callback: SapCallback) {
        self.registry
            .callbacks
            .write()
            .insert(session_name.to_string(), callback);
        tracing::debug!(session = %session_name, "SAP listener registered");
    }

    /// Remove the registration for `session_name`. Unknown names are ignored.
    pub fn unregister_sap_listener(&self, session_name: &str) {
        if self.registry.callbacks.write().remove(session_name).is_some() {
            tracing::debug!(session = %session_name, "SAP listener unregistered");
        }
    }

    pub fn start(&self) {
        let mut handle = self.thread.lock();
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let transport = self.transport.clone();
        let registry = self.registry.clone();
        let running = self.running.clone();
        *handle = Some(thread::spawn(move || {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            while running.load(Ordering::Relaxed) {
                let (len, from) = match transport.recv_from(&mut buf) {
                    Ok(Some(received)) => received,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "SAP receive error");
                        continue;
                    }
                };
                match decode(&buf[..len]) {
                    Ok(msg) => {
                        tracing::trace!(session = %msg.session_name, %from, deleted = msg.deleted, "SAP announcement");
                        registry.dispatch(&msg);
                    }
                    Err(e) => tracing::debug!(%from, error = %e, "malformed SAP datagram dropped"),
                }
            }
            tracing::debug!("SAP listener thread exited");
        }));
        tracing::info!("SAP listener started");
    }

    pub fn stop(&self) {
        let handle = {
            let mut handle = self.thread.lock();
            self.running.store(false, Ordering::SeqCst);
            handle.take()
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!("SAP listener thread panicked");
            }
            tracing::info!("SAP listener stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

impl Drop for SapListener {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sap::message::encode_announcement;
    use crate::stream::{ColourspaceType, StreamInformation};
    use std::net::{Ipv4Addr, UdpSocket};
    use std::sync::mpsc;
    use std::time::Duration;

    fn config(port: u16) -> SapConfig {
        SapConfig {
            address: Ipv4Addr::LOCALHOST,
            port,
            ..SapConfig::default()
        }
    }

    fn info(name: &str) -> StreamInformation {
        StreamInformation {
            session_name: name.into(),
            hostname: "239.192.1.1".into(),
            port: 5004,
            height: 480,
            width: 640,
            framerate: 30,
            encoding: ColourspaceType::Yuv422,
            deleted: false,
        }
    }

    fn send(port: u16, info: &StreamInformation, deletion: bool) {
        let tx = UdpSocket::bind("127.0.0.1:0").unwrap();
        tx.send_to(
            &encode_announcement(info, Ipv4Addr::LOCALHOST, deletion),
            ("127.0.0.1", port),
        )
        .unwrap();
    }

    #[test]
    fn dispatches_by_session_name() {
        let listener = SapListener::new(config(19890)).unwrap();
        let (tx, rx) = mpsc::channel();
        listener.register_sap_listener(
            "wanted",
            Arc::new(move |msg: &SdpMessage| {
                let _ = tx.send(msg.clone());
            }),
        );
        listener.start();

        send(19890, &info("other"), false);
        send(19890, &info("wanted"), false);

        let msg = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(msg.session_name, "wanted");
        assert_eq!(msg.framerate, 30);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        listener.stop();
    }

    #[test]
    fn wildcard_sees_everything_including_deletions() {
        let listener = SapListener::new(config(19891)).unwrap();
        let (tx, rx) = mpsc::channel();
        listener.register_sap_listener(
            ALL_SESSIONS,
            Arc::new(move |msg: &SdpMessage| {
                let _ = tx.send((msg.session_name.clone(), msg.deleted));
            }),
        );
        listener.start();

        send(19891, &info("a"), false);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), ("a".into(), false));

        send(19891, &info("a"), true);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), ("a".into(), true));
    }

    #[test]
    fn malformed_datagrams_are_ignored() {
        let listener = SapListener::new(config(19892)).unwrap();
        let (tx, rx) = mpsc::channel();
        listener.register_sap_listener(
            ALL_SESSIONS,
            Arc::new(move |msg: &SdpMessage| {
                let _ = tx.send(msg.session_name.clone());
            }),
        );
        listener.start();

        let raw = UdpSocket::bind("127.0.0.1:0").unwrap();
        raw.send_to(&[0xff; 3], "127.0.0.1:19892").unwrap();
        send(19892, &info("after"), false);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "after");
    }

    #[test]
    fn dispatch_keeps_nothing_but_registrations() {
        let registry = Registry::default();
        let (tx, rx) = mpsc::channel();
        registry.callbacks.write().insert(
            "named".into(),
            Arc::new(move |msg: &SdpMessage| {
                let _ = tx.send(msg.session_name.clone());
            }),
        );

        for n in 0..500 {
            registry.dispatch(&SdpMessage::describe(&info(&format!("flood{n}")), Ipv4Addr::LOCALHOST));
        }
        registry.dispatch(&SdpMessage::describe(&info("named"), Ipv4Addr::LOCALHOST));

        assert_eq!(rx.try_recv().unwrap(), "named");
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.callbacks.read().len(), 1);
    }

    #[test]
    fn registration_independent_of_running() {
        let listener = SapListener::new(config(19893)).unwrap();
        listener.unregister_sap_listener("never registered");
        listener.register_sap_listener("x", Arc::new(|_| {}));
        listener.start();
        listener.start();
        assert!(listener.is_running());
        listener.stop();
        listener.stop();
        assert!(!listener.is_running());
        assert_eq!(listener.registry.callbacks.read().len(), 1);
        listener.unregister_sap_listener("x");
        assert!(listener.registry.callbacks.read().is_empty());
    }
}
