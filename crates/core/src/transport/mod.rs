//! Network transport for RTP media and SAP announcements.
//!
//! Everything in this crate is fire-and-forget UDP, unicast or multicast.
//! A single [`UdpTransport`] type covers both directions:
//!
//! - **Senders** bind an ephemeral socket and address every datagram
//!   explicitly.
//! - **Receivers** bind a fixed port with a read timeout so background
//!   loops can observe their stop flag between datagrams.

pub mod udp;

pub use udp::{ReceiveOptions, UdpTransport};
