use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::media::Payloader;
use crate::sap::SapAnnouncer;
use crate::stream::StreamInformation;
use crate::video::TestPattern;

/// Transmit side of a session.
///
/// Construction advertises the stream and opens and starts the payloader.
/// Dropping it withdraws the announcement, then stops and closes the
/// payloader.
pub struct RtpSapTransmit {
    announcer: Arc<SapAnnouncer>,
    payloader: Box<dyn Payloader>,
    info: StreamInformation,
    buffer: Vec<u8>,
    frame_interval: Duration,
    last_transmit: Option<Instant>,
    /// Frames rendered by `test_pattern`, driving animated cards.
    pattern_frame: u64,
}

impl RtpSapTransmit {
    pub fn new(
        announcer: Arc<SapAnnouncer>,
        mut payloader: Box<dyn Payloader>,
        info: StreamInformation,
    ) -> Result<Self> {
        info.validate()?;

        payloader.set_stream_info(&info);
        payloader.open()?;
        if let Err(e) = payloader.start() {
            payloader.close();
            return Err(e);
        }

        announcer.add_sap_announcement(&info);
        announcer.start();

        tracing::info!(
            session = %info.session_name,
            destination = %info.hostname,
            port = info.port,
            framerate = info.framerate,
            "transmit session started"
        );

        Ok(Self {
            announcer,
            payloader,
            buffer: vec![0; info.frame_size()],
            frame_interval: Duration::from_secs(1) / info.framerate,
            info,
            last_transmit: None,
            pattern_frame: 0,
        })
    }

    pub fn stream_info(&self) -> &StreamInformation {
        &self.info
    }

    /// Frame buffer sized for the stream, for callers that render in place
    /// before [`transmit_buffer`](Self::transmit_buffer).
    pub fn buffer(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Fill the frame buffer with a test card in the stream encoding.
    /// Animated cards advance one frame per call.
    pub fn test_pattern(&mut self, pattern: TestPattern) -> Result<&mut [u8]> {
        pattern.fill_frame(
            self.info.resolution(),
            self.info.encoding,
            &mut self.buffer,
            self.pattern_frame,
        )?;
        self.pattern_frame += 1;
        Ok(&mut self.buffer)
    }

    /// Send one frame, first sleeping out whatever remains of the frame
    /// interval since the previous transmit.
    pub fn transmit(&mut self, frame: &[u8], blocking: bool) -> Result<bool> {
        if let Some(last) = self.last_transmit {
            let elapsed = last.elapsed();
            if elapsed < self.frame_interval {
                thread::sleep(self.frame_interval - elapsed);
            }
        }
        let sent = self.payloader.transmit(frame, blocking);
        self.last_transmit = Some(Instant::now());
        sent
    }

    /// [`transmit`](Self::transmit) the internal frame buffer.
    pub fn transmit_buffer(&mut self, blocking: bool) -> Result<bool> {
        let frame = std::mem::take(&mut self.buffer);
        let sent = self.transmit(&frame, blocking);
        self.buffer = frame;
        sent
    }
}

impl Drop for RtpSapTransmit {
    fn drop(&mut self) {
        self.announcer
            .delete_sap_announcement(&self.info.session_name, Some(&self.info.hostname));
        self.payloader.stop();
        self.payloader.close();
        tracing::info!(session = %self.info.session_name, "transmit session closed");
    }
}
