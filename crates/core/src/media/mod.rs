//! Video codecs and RTP payloading.
//!
//! This module defines the contract every payloader and depayloader meets
//! ([`RtpStream`], [`Payloader`], [`Depayloader`]) and the uncompressed
//! scanline codec in [`raw`].
//!
//! ## RTP overview (RFC 3550)
//!
//! Each video frame is split into one or more RTP packets. Every RTP packet
//! carries a 12-byte fixed header (written by [`rtp::RtpSequencer`]) containing:
//!
//! - **Sequence number** (16-bit, wrapping): used for reordering and loss detection.
//! - **Timestamp** (32-bit): 90 kHz media clock, one value per frame.
//! - **SSRC** (32-bit): randomly chosen to identify the sender.
//! - **Marker bit**: set on the last packet of a frame.
//!
//! ## Codecs
//!
//! | Encoding | Module | Format |
//! |----------|--------|--------|
//! | RGB24, RGBA, UYVY, Mono8/16, 4:2:0 | [`raw`] | DEF-STAN 00-82 / RFC 4175-style scanlines |
//!
//! Compressed encodings (H.264, H.265, JPEG) are provided by external
//! pipeline integrations implementing the same traits.

pub mod raw;
pub mod rtp;

use std::time::Duration;

use crate::error::Result;
use crate::stream::{
    FrameCallback, RtpFrameData, StreamCore, StreamInformation, StreamSettings, StreamState,
};

pub const DEFAULT_MTU: usize = 1400;

/// Dynamic payload type used for every video stream.
pub const DEFAULT_PAYLOAD_TYPE: u8 = 96;

/// Tunables for RTP payloaders and depayloaders.
#[derive(Debug, Clone)]
pub struct RtpConfig {
    /// Largest RTP payload in bytes, excluding the 12-byte fixed header.
    pub mtu: usize,
    /// RTP payload type (dynamic range 96-127).
    pub payload_type: u8,
    /// TTL for multicast transmission.
    pub multicast_ttl: u32,
    /// Read timeout of the background receive loop. Bounds how long
    /// `stop` waits for the receive thread to exit.
    pub poll_interval: Duration,
    /// Requested kernel receive buffer. The kernel may clamp it.
    pub receive_buffer_size: usize,
}

impl Default for RtpConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            payload_type: DEFAULT_PAYLOAD_TYPE,
            multicast_ttl: 15,
            poll_interval: Duration::from_millis(50),
            receive_buffer_size: 4 * 1024 * 1024,
        }
    }
}

/// Lifecycle and settings shared by all payloaders and depayloaders.
///
/// Implementors embed a [`StreamCore`] and provide the resource handling
/// for `open`/`start`/`stop`/`close`. See [`crate::stream`] for the state
/// machine.
pub trait RtpStream: Send {
    fn core(&self) -> &StreamCore;

    fn core_mut(&mut self) -> &mut StreamCore;

    /// Configure every setting at once. Takes effect on the next `open`.
    fn set_stream_info(&mut self, info: &StreamInformation) {
        self.core_mut().settings.set_stream_info(info);
    }

    fn settings(&self) -> &StreamSettings {
        &self.core().settings
    }

    /// Individual setters for callers that configure field by field.
    fn settings_mut(&mut self) -> &mut StreamSettings {
        &mut self.core_mut().settings
    }

    fn state(&self) -> StreamState {
        self.core().state()
    }

    /// Acquire transport resources. Fails unless closed with valid settings.
    fn open(&mut self) -> Result<()>;

    /// Begin traffic. No-op when already started; fails when closed.
    fn start(&mut self) -> Result<()>;

    /// Suspend traffic, keeping resources. No-op unless started.
    fn stop(&mut self);

    /// Release all resources. Stops first if needed.
    fn close(&mut self);
}

/// Sending side of the codec contract.
pub trait Payloader: RtpStream {
    /// Send one frame.
    ///
    /// With `blocking` the frame is packetized and sent before returning.
    /// Without it the frame is handed to a background sender and
    /// `Ok(false)` reports that it was dropped because the previous frame
    /// is still in flight.
    fn transmit(&mut self, frame: &[u8], blocking: bool) -> Result<bool>;
}

/// Receiving side of the codec contract.
///
/// `receive` takes `&self` so several threads can wait on one instance,
/// each bounded by its own timeout.
pub trait Depayloader: RtpStream + Sync {
    /// Wait up to `timeout` for a new frame and copy it into `frame`.
    ///
    /// Returns `false` on timeout, leaving `frame` untouched. A zero timeout
    /// only checks whether a frame is already waiting.
    fn receive(&self, frame: &mut RtpFrameData, timeout: Duration) -> bool;

    /// Install the frame callback, replacing any previous one.
    fn register_callback(&mut self, callback: FrameCallback);

    fn unregister_callback(&mut self);

    fn callback_registered(&self) -> bool;
}
