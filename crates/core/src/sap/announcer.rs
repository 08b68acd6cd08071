use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use super::SapConfig;
use super::message::encode_announcement;
use crate::error::{MediaxError, Result};
use crate::stream::StreamInformation;
use crate::transport::UdpTransport;

/// A non-loopback IPv4 interface of this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub address: Ipv4Addr,
}

struct Inner {
    config: SapConfig,
    destination: SocketAddr,
    transport: RwLock<UdpTransport>,
    source: RwLock<Ipv4Addr>,
    streams: Mutex<Vec<StreamInformation>>,
    running: AtomicBool,
}

impl Inner {
    fn send(&self, info: &StreamInformation, deletion: bool) {
        let source = *self.source.read();
        let datagram = encode_announcement(info, source, deletion);
        let transport = self.transport.read().clone();
        match transport.send_to(&datagram, self.destination) {
            Ok(_) => tracing::trace!(
                session = %info.session_name,
                deletion,
                destination = %self.destination,
                "SAP datagram sent"
            ),
            Err(e) => tracing::warn!(
                session = %info.session_name,
                deletion,
                error = %e,
                "SAP send failed"
            ),
        }
    }

    /// Mark every active entry deleted and send one deletion for each.
    fn withdraw_all(&self) {
        let withdrawn: Vec<StreamInformation> = {
            let mut streams = self.streams.lock();
            streams
                .iter_mut()
                .filter(|s| !s.deleted)
                .map(|s| {
                    s.deleted = true;
                    s.clone()
                })
                .collect()
        };
        for stream in &withdrawn {
            self.send(stream, true);
        }
    }

    fn announce_loop(&self) {
        while self.running.load(Ordering::Relaxed) {
            let active: Vec<StreamInformation> = self
                .streams
                .lock()
                .iter()
                .filter(|s| !s.deleted)
                .cloned()
                .collect();
            for stream in &active {
                self.send(stream, false);
            }

            let next = Instant::now() + self.config.interval;
            while self.running.load(Ordering::Relaxed) {
                let now = Instant::now();
                if now >= next {
                    break;
                }
                thread::sleep(self.config.poll_interval.min(next - now));
            }
        }
        tracing::debug!("SAP announcer thread exited");
    }
}

/// Periodic SAP announcer.
///
/// Holds the session table and, while started, re-announces every
/// non-deleted entry once per [`SapConfig::interval`]. Entries are keyed by
/// `(session_name, hostname)`; lookups that omit the hostname match the
/// first entry with that name.
///
/// Create one per process and share it through an `Arc`; all methods take
/// `&self`.
pub struct SapAnnouncer {
    inner: Arc<Inner>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SapAnnouncer {
    /// Create the announcer and select the first non-loopback interface as
    /// the originating source. Fails only when the socket cannot be created.
    pub fn new(config: SapConfig) -> Result<Self> {
        let source = match Self::list_interfaces() {
            Ok(interfaces) => interfaces.first().map(|i| i.address),
            Err(e) => {
                tracing::warn!(error = %e, "could not enumerate interfaces");
                None
            }
        }
        .unwrap_or(Ipv4Addr::UNSPECIFIED);

        let transport = UdpTransport::sender(config.multicast_ttl, Some(source))?;
        let destination = SocketAddr::from((config.address, config.port));
        tracing::info!(%destination, %source, "SAP announcer created");

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                destination,
                transport: RwLock::new(transport),
                source: RwLock::new(source),
                streams: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
            }),
            thread: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SapConfig {
        &self.inner.config
    }

    /// Un-delete every entry and begin periodic announcements. No-op when
    /// already running.
    pub fn start(&self) {
        let mut handle = self.thread.lock();
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        for stream in self.inner.streams.lock().iter_mut() {
            stream.deleted = false;
        }
        let inner = self.inner.clone();
        *handle = Some(thread::spawn(move || inner.announce_loop()));
        tracing::info!(destination = %self.inner.destination, "SAP announcer started");
    }

    /// Stop announcing and send a deletion for every advertised entry.
    /// Entries stay in the table for a later [`start`](Self::start).
    pub fn stop(&self) {
        let handle = {
            let mut handle = self.thread.lock();
            self.inner.running.store(false, Ordering::SeqCst);
            handle.take()
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!("SAP announcer thread panicked");
            }
            tracing::info!("SAP announcer stopped");
        }
        self.inner.withdraw_all();
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Relaxed)
    }

    /// Add a session, or un-delete and update the entry with the same
    /// `(session_name, hostname)`.
    pub fn add_sap_announcement(&self, info: &StreamInformation) {
        let entry = StreamInformation {
            deleted: false,
            ..info.clone()
        };
        let mut streams = self.inner.streams.lock();
        match streams
            .iter_mut()
            .find(|s| s.matches(&info.session_name, Some(&info.hostname)))
        {
            Some(existing) => {
                *existing = entry;
                tracing::debug!(session = %info.session_name, hostname = %info.hostname, "SAP announcement updated");
            }
            None => {
                streams.push(entry);
                tracing::info!(session = %info.session_name, hostname = %info.hostname, "SAP announcement added");
            }
        }
    }

    /// Mark the first matching entry deleted and send one deletion for it.
    /// Returns false when no entry matches.
    pub fn delete_sap_announcement(&self, session_name: &str, hostname: Option<&str>) -> bool {
        let withdrawn = {
            let mut streams = self.inner.streams.lock();
            let Some(entry) = streams
                .iter_mut()
                .find(|s| s.matches(session_name, hostname))
            else {
                return false;
            };
            let was_active = !entry.deleted;
            entry.deleted = true;
            was_active.then(|| entry.clone())
        };
        if let Some(stream) = withdrawn {
            tracing::info!(session = %session_name, hostname = %stream.hostname, "SAP announcement deleted");
            self.inner.send(&stream, true);
        }
        true
    }

    /// Resume advertising the first matching entry. Returns false when no
    /// entry matches.
    pub fn undelete_sap_announcement(&self, session_name: &str, hostname: Option<&str>) -> bool {
        let mut streams = self.inner.streams.lock();
        match streams
            .iter_mut()
            .find(|s| s.matches(session_name, hostname))
        {
            Some(entry) => {
                entry.deleted = false;
                true
            }
            None => false,
        }
    }

    /// Withdraw every advertised entry and empty the table.
    pub fn delete_all_sap_announcements(&self) {
        self.inner.withdraw_all();
        self.inner.streams.lock().clear();
    }

    pub fn get_sap_announcement(
        &self,
        session_name: &str,
        hostname: Option<&str>,
    ) -> Option<StreamInformation> {
        self.inner
            .streams
            .lock()
            .iter()
            .find(|s| s.matches(session_name, hostname))
            .cloned()
    }

    /// Number of entries not marked deleted.
    pub fn get_active_stream_count(&self) -> usize {
        self.inner.streams.lock().iter().filter(|s| !s.deleted).count()
    }

    /// Snapshot of the session table, deleted entries included.
    pub fn streams(&self) -> Vec<StreamInformation> {
        self.inner.streams.lock().clone()
    }

    /// Non-loopback IPv4 interfaces, in enumeration order.
    pub fn list_interfaces() -> Result<Vec<NetworkInterface>> {
        let interfaces = local_ip_address::list_afinet_netifas()
            .map_err(|e| MediaxError::Interfaces(e.to_string()))?;
        Ok(interfaces
            .into_iter()
            .filter_map(|(name, ip)| match ip {
                IpAddr::V4(address) if !address.is_loopback() => {
                    Some(NetworkInterface { name, address })
                }
                _ => None,
            })
            .collect())
    }

    /// Select the interface at `index` of [`list_interfaces`](Self::list_interfaces)
    /// as the originating source. An out-of-range index keeps the current
    /// selection and returns false.
    pub fn set_source_interface(&self, index: usize) -> bool {
        let interfaces = match Self::list_interfaces() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                tracing::warn!(error = %e, "could not enumerate interfaces");
                return false;
            }
        };
        let Some(selected) = interfaces.get(index) else {
            tracing::warn!(index, available = interfaces.len(), "no such interface");
            return false;
        };

        match UdpTransport::sender(self.inner.config.multicast_ttl, Some(selected.address)) {
            Ok(transport) => *self.inner.transport.write() = transport,
            Err(e) => {
                tracing::warn!(interface = %selected.name, error = %e, "could not rebind SAP sender");
                return false;
            }
        }
        *self.inner.source.write() = selected.address;
        tracing::info!(interface = %selected.name, address = %selected.address, "SAP source interface selected");
        true
    }

    /// Address written as the originating source of every datagram.
    pub fn source_address(&self) -> Ipv4Addr {
        *self.inner.source.read()
    }
}

impl Drop for SapAnnouncer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sap::message::decode;
    use crate::stream::ColourspaceType;
    use std::net::UdpSocket;
    use std::time::Duration;

    fn config(port: u16) -> SapConfig {
        SapConfig {
            address: Ipv4Addr::LOCALHOST,
            port,
            interval: Duration::from_millis(100),
            ..SapConfig::default()
        }
    }

    fn info(name: &str, hostname: &str) -> StreamInformation {
        StreamInformation {
            session_name: name.into(),
            hostname: hostname.into(),
            port: 5004,
            height: 480,
            width: 640,
            framerate: 25,
            encoding: ColourspaceType::Rgb24,
            deleted: false,
        }
    }

    #[test]
    fn add_twice_keeps_one_entry() {
        let sap = SapAnnouncer::new(config(19875)).unwrap();
        sap.add_sap_announcement(&info("a", "239.0.0.1"));
        let mut updated = info("a", "239.0.0.1");
        updated.width = 1280;
        sap.add_sap_announcement(&updated);
        assert_eq!(sap.get_active_stream_count(), 1);
        assert_eq!(sap.get_sap_announcement("a", None).unwrap().width, 1280);
    }

    #[test]
    fn delete_then_undelete() {
        let sap = SapAnnouncer::new(config(19876)).unwrap();
        sap.add_sap_announcement(&info("a", "239.0.0.1"));
        assert!(sap.delete_sap_announcement("a", None));
        assert_eq!(sap.get_active_stream_count(), 0);
        assert_eq!(sap.streams().len(), 1);
        assert!(sap.undelete_sap_announcement("a", Some("239.0.0.1")));
        assert_eq!(sap.get_active_stream_count(), 1);
        assert!(!sap.delete_sap_announcement("missing", None));
        assert!(!sap.undelete_sap_announcement("missing", None));
    }

    #[test]
    fn address_qualified_lookup() {
        let sap = SapAnnouncer::new(config(19877)).unwrap();
        sap.add_sap_announcement(&info("cam", "239.0.0.1"));
        sap.add_sap_announcement(&info("cam", "239.0.0.2"));
        assert_eq!(sap.get_active_stream_count(), 2);

        assert_eq!(
            sap.get_sap_announcement("cam", Some("239.0.0.2")).unwrap().hostname,
            "239.0.0.2"
        );
        assert_eq!(sap.get_sap_announcement("cam", None).unwrap().hostname, "239.0.0.1");

        assert!(sap.delete_sap_announcement("cam", Some("239.0.0.2")));
        assert!(!sap.get_sap_announcement("cam", Some("239.0.0.1")).unwrap().deleted);
        assert!(sap.get_sap_announcement("cam", Some("239.0.0.2")).unwrap().deleted);
    }

    #[test]
    fn delete_all_empties_table() {
        let sap = SapAnnouncer::new(config(19878)).unwrap();
        sap.add_sap_announcement(&info("a", "239.0.0.1"));
        sap.add_sap_announcement(&info("b", "239.0.0.1"));
        sap.delete_all_sap_announcements();
        assert!(sap.streams().is_empty());
    }

    #[test]
    fn invalid_interface_keeps_selection() {
        let sap = SapAnnouncer::new(config(19879)).unwrap();
        let before = sap.source_address();
        assert!(!sap.set_source_interface(usize::MAX));
        assert_eq!(sap.source_address(), before);
    }

    #[test]
    fn announces_periodically_and_deletes_on_stop() {
        let rx = UdpSocket::bind("127.0.0.1:19880").unwrap();
        rx.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        let sap = SapAnnouncer::new(config(19880)).unwrap();
        sap.add_sap_announcement(&info("periodic", "239.0.0.9"));
        sap.start();
        sap.start();
        assert!(sap.is_running());

        let mut buf = [0u8; 2048];
        for _ in 0..2 {
            let n = rx.recv(&mut buf).unwrap();
            let msg = decode(&buf[..n]).unwrap();
            assert_eq!(msg.session_name, "periodic");
            assert!(!msg.deleted);
        }

        sap.stop();
        assert!(!sap.is_running());
        // Drain announcements sent before the deletion.
        loop {
            let n = rx.recv(&mut buf).unwrap();
            if decode(&buf[..n]).unwrap().deleted {
                break;
            }
        }
        assert_eq!(sap.get_active_stream_count(), 0);

        sap.start();
        assert_eq!(sap.get_active_stream_count(), 1, "start un-deletes entries");
    }
}
