//! Stream sessions: a codec composed with SAP discovery.
//!
//! [`RtpSapTransmit`] announces a stream and sends frames paced to its
//! frame rate. [`RtpSapReceive`] waits for the announcement of a named
//! session and configures its depayloader from the first one it sees.
//!
//! ```text
//! transmit:  frame --pace--> Payloader --RTP--> network
//!                 \--------> SapAnnouncer --SAP--> network
//!
//! receive:   network --SAP--> SapListener --first match--> Depayloader.open/start
//!            network --RTP--> Depayloader --frame--> receive()
//! ```
//!
//! The announcer and listener are shared process-wide through an `Arc`; a
//! session only adds and removes its own entry or registration.

pub mod receive;
pub mod transmit;

pub use receive::RtpSapReceive;
pub use transmit::RtpSapTransmit;
