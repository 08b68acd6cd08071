//! Session discovery with SAP (RFC 2974) carrying SDP (RFC 4566) bodies.
//!
//! A sender advertises each stream it produces by multicasting a small
//! announcement datagram once per second. Receivers listen on the same
//! group, parse the SDP body and configure their depayloader from it.
//!
//! ```text
//!  announcer ──(224.2.127.254:9875, 1 s)──> listener ──> callback(SdpMessage)
//! ```
//!
//! - [`message`] holds the wire format (SAP header plus SDP text).
//! - [`SapAnnouncer`] owns the session table and the periodic send loop.
//! - [`SapListener`] receives announcements and dispatches them by session
//!   name.
//!
//! Both sides are plain values meant to be created once per process and
//! shared through an `Arc`.

pub mod announcer;
pub mod listener;
pub mod message;

use std::net::Ipv4Addr;
use std::time::Duration;

pub use announcer::{NetworkInterface, SapAnnouncer};
pub use listener::{ALL_SESSIONS, SapCallback, SapListener};
pub use message::{SapHeader, SdpMessage};

/// Well-known SAP group for global-scope IPv4 sessions.
pub const DEFAULT_SAP_ADDRESS: Ipv4Addr = Ipv4Addr::new(224, 2, 127, 254);

pub const DEFAULT_SAP_PORT: u16 = 9875;

/// Settings shared by the announcer and the listener.
///
/// A unicast `address` turns the SAP channel into a point-to-point one.
#[derive(Debug, Clone)]
pub struct SapConfig {
    pub address: Ipv4Addr,
    pub port: u16,
    /// Delay between two announcements of the same session.
    pub interval: Duration,
    pub multicast_ttl: u32,
    /// How often background loops check their stop flag.
    pub poll_interval: Duration,
}

impl Default for SapConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_SAP_ADDRESS,
            port: DEFAULT_SAP_PORT,
            interval: Duration::from_secs(1),
            multicast_ttl: 15,
            poll_interval: Duration::from_millis(50),
        }
    }
}
