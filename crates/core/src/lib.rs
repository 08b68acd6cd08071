pub mod error;
pub mod media;
pub mod sap;
pub mod session;
pub mod stream;
pub mod transport;
pub mod video;

pub use error::{MediaxError, Result};
pub use media::raw::{RawDepayloader, RawPayloader};
pub use media::{Depayloader, Payloader, RtpConfig, RtpStream};
pub use sap::{SapAnnouncer, SapConfig, SapListener, SdpMessage};
pub use session::{RtpSapReceive, RtpSapTransmit};
pub use stream::{
    ColourspaceType, FrameCallback, Resolution, RtpFrameData, StreamInformation, StreamState,
};
pub use video::TestPattern;
