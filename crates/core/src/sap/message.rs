//! SAP header and SDP body encoding.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | V=1 |A|R|T|E|C|   auth len    |         msg id hash           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |              originating source (32 bits for IPv4)            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    optional authentication data, optional payload type ...    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Announcements are sent with `0x20` in the first byte, deletions with
//! `0x24` (T set). The SDP body follows the header directly.
//!
//! The SDP body produced for a stream:
//!
//! ```text
//! v=0
//! o=- <sess-id> <sess-ver> IN IP4 <announcer address>
//! s=<session name>
//! c=IN IP4 <stream address>[/15]
//! t=0 0
//! m=video <port> RTP/AVP 96
//! a=rtpmap:96 raw/90000
//! a=fmtp:96 sampling=YCbCr-4:2:2; width=640; height=480; depth=8; colorimetry=BT601-5; progressive
//! a=framerate:25
//! ```

use std::net::Ipv4Addr;

use crate::error::{MediaxError, Result, SapErrorKind};
use crate::media::DEFAULT_PAYLOAD_TYPE;
use crate::media::rtp::VIDEO_CLOCK_RATE;
use crate::stream::{ColourspaceType, StreamInformation, parse_ipv4};

pub const SAP_HEADER_LEN: usize = 8;

/// MIME type optionally carried between the header and the SDP body.
pub const SDP_MIME_TYPE: &str = "application/sdp";

const SAP_VERSION: u8 = 1;
const FLAG_IPV6: u8 = 0x10;
const FLAG_DELETION: u8 = 0x04;
const FLAG_ENCRYPTED: u8 = 0x02;
const FLAG_COMPRESSED: u8 = 0x01;

/// Multicast TTL written into the `c=` line of multicast sessions.
const SDP_TTL: u32 = 15;

fn sap_error(kind: SapErrorKind) -> MediaxError {
    MediaxError::Sap { kind }
}

/// Fixed 8-byte SAP header (IPv4 origin only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SapHeader {
    pub deletion: bool,
    /// Length of the authentication data in 32-bit words.
    pub auth_len: u8,
    pub msg_id_hash: u16,
    pub origin: Ipv4Addr,
}

impl SapHeader {
    pub fn write(&self) -> [u8; SAP_HEADER_LEN] {
        let mut flags = SAP_VERSION << 5;
        if self.deletion {
            flags |= FLAG_DELETION;
        }
        let mut out = [0u8; SAP_HEADER_LEN];
        out[0] = flags;
        out[1] = self.auth_len;
        out[2..4].copy_from_slice(&self.msg_id_hash.to_be_bytes());
        out[4..8].copy_from_slice(&self.origin.octets());
        out
    }

    /// Decode the header and return it with the SDP body that follows,
    /// skipping authentication data and the optional payload type.
    pub fn parse(datagram: &[u8]) -> Result<(Self, &[u8])> {
        if datagram.len() < SAP_HEADER_LEN {
            return Err(sap_error(SapErrorKind::Truncated));
        }
        let flags = datagram[0];
        let version = flags >> 5;
        if version != SAP_VERSION {
            return Err(sap_error(SapErrorKind::UnsupportedVersion(version)));
        }
        if flags & FLAG_IPV6 != 0 {
            return Err(sap_error(SapErrorKind::Ipv6Origin));
        }
        if flags & FLAG_ENCRYPTED != 0 {
            return Err(sap_error(SapErrorKind::Encrypted));
        }
        if flags & FLAG_COMPRESSED != 0 {
            return Err(sap_error(SapErrorKind::Compressed));
        }

        let header = Self {
            deletion: flags & FLAG_DELETION != 0,
            auth_len: datagram[1],
            msg_id_hash: u16::from_be_bytes([datagram[2], datagram[3]]),
            origin: Ipv4Addr::new(datagram[4], datagram[5], datagram[6], datagram[7]),
        };

        let body_start = SAP_HEADER_LEN + header.auth_len as usize * 4;
        let mut body = datagram
            .get(body_start..)
            .ok_or(sap_error(SapErrorKind::Truncated))?;

        // A payload type string is present unless the body starts with "v=0".
        if !body.starts_with(b"v=0") {
            if let Some(nul) = body.iter().position(|&b| b == 0) {
                body = &body[nul + 1..];
            }
        }
        Ok((header, body))
    }
}

/// FNV-1a over the session key; stable for the life of a session so the
/// deletion carries the same message id as the announcements.
fn session_hash(info: &StreamInformation) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    let key = info
        .session_name
        .bytes()
        .chain([0])
        .chain(info.hostname.bytes())
        .chain(info.port.to_be_bytes());
    for byte in key {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Parsed announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpMessage {
    /// `v=`
    pub protocol_version: u32,
    /// `o=` fields.
    pub username: String,
    pub session_id: u64,
    pub session_version: u64,
    /// Address of the announcing host, from the `o=` line.
    pub sender: String,
    /// `s=`
    pub session_name: String,
    /// `i=`, empty when absent.
    pub text: String,
    /// Stream destination from the `c=` line, without TTL.
    pub ip_address: String,
    /// Media port from the `m=` line.
    pub port: u16,
    /// `rtpmap` encoding name (`raw`, `H264`, `H265`, `JPEG`).
    pub encoding_name: String,
    /// `fmtp` sampling label, e.g. `YCbCr-4:2:2`.
    pub sampling: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub framerate: u32,
    /// Set when the SAP header carried the deletion flag.
    pub deleted: bool,
    /// Originating source from the SAP header.
    pub source_address: Ipv4Addr,
}

impl Default for SdpMessage {
    fn default() -> Self {
        Self {
            protocol_version: 0,
            username: String::new(),
            session_id: 0,
            session_version: 0,
            sender: String::new(),
            session_name: String::new(),
            text: String::new(),
            ip_address: String::new(),
            port: 0,
            encoding_name: String::new(),
            sampling: String::new(),
            width: 0,
            height: 0,
            depth: 0,
            framerate: 0,
            deleted: false,
            source_address: Ipv4Addr::UNSPECIFIED,
        }
    }
}

impl SdpMessage {
    /// Describe a stream announced from `source`.
    pub fn describe(info: &StreamInformation, source: Ipv4Addr) -> Self {
        let session_id = session_hash(info) as u64;
        Self {
            protocol_version: 0,
            username: "-".into(),
            session_id,
            session_version: session_id,
            sender: source.to_string(),
            session_name: info.session_name.clone(),
            text: String::new(),
            ip_address: info.hostname.clone(),
            port: info.port,
            encoding_name: info.encoding.rtpmap_encoding().into(),
            sampling: info.encoding.sdp_sampling().into(),
            width: info.width,
            height: info.height,
            depth: info.encoding.sdp_depth(),
            framerate: info.framerate,
            deleted: info.deleted,
            source_address: source,
        }
    }

    /// Colourspace announced by this message.
    pub fn encoding(&self) -> ColourspaceType {
        match self.encoding_name.as_str() {
            "raw" => ColourspaceType::from_sdp(&self.sampling, self.depth),
            other => other.parse().unwrap_or_default(),
        }
    }

    pub fn to_stream_information(&self) -> StreamInformation {
        StreamInformation {
            session_name: self.session_name.clone(),
            hostname: self.ip_address.clone(),
            port: self.port,
            height: self.height,
            width: self.width,
            framerate: self.framerate,
            encoding: self.encoding(),
            deleted: self.deleted,
        }
    }

    /// Render the SDP text with CRLF line endings.
    pub fn to_sdp(&self) -> String {
        let mut sdp: Vec<String> = Vec::new();

        sdp.push(format!("v={}", self.protocol_version));
        sdp.push(format!(
            "o={} {} {} IN IP4 {}",
            self.username, self.session_id, self.session_version, self.sender
        ));
        sdp.push(format!("s={}", self.session_name));
        if !self.text.is_empty() {
            sdp.push(format!("i={}", self.text));
        }
        let multicast = parse_ipv4(&self.ip_address).is_ok_and(|ip| ip.is_multicast());
        if multicast {
            sdp.push(format!("c=IN IP4 {}/{}", self.ip_address, SDP_TTL));
        } else {
            sdp.push(format!("c=IN IP4 {}", self.ip_address));
        }
        sdp.push("t=0 0".to_string());
        sdp.push(format!(
            "m=video {} RTP/AVP {}",
            self.port, DEFAULT_PAYLOAD_TYPE
        ));
        sdp.push(format!(
            "a=rtpmap:{} {}/{}",
            DEFAULT_PAYLOAD_TYPE, self.encoding_name, VIDEO_CLOCK_RATE
        ));
        if self.encoding_name == "raw" {
            sdp.push(format!(
                "a=fmtp:{} sampling={}; width={}; height={}; depth={}; colorimetry=BT601-5; progressive",
                DEFAULT_PAYLOAD_TYPE, self.sampling, self.width, self.height, self.depth
            ));
        } else {
            sdp.push(format!(
                "a=fmtp:{} width={}; height={}",
                DEFAULT_PAYLOAD_TYPE, self.width, self.height
            ));
        }
        sdp.push(format!("a=framerate:{}", self.framerate));

        format!("{}\r\n", sdp.join("\r\n"))
    }

    /// Parse an SDP body. Unknown lines and unparseable values are skipped.
    pub fn parse_sdp(body: &str) -> Result<Self> {
        let mut msg = Self::default();
        let mut has_name = false;

        for line in body.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key {
                "v" => msg.protocol_version = value.trim().parse().unwrap_or(0),
                "o" => msg.parse_origin(value),
                "s" => {
                    msg.session_name = value.to_string();
                    has_name = true;
                }
                "i" => msg.text = value.to_string(),
                "c" => {
                    if let Some(addr) = value.split_whitespace().nth(2) {
                        let addr = addr.split('/').next().unwrap_or(addr);
                        msg.ip_address = addr.to_string();
                    }
                }
                "m" => {
                    let mut fields = value.split_whitespace();
                    if fields.next() == Some("video") {
                        msg.port = fields.next().and_then(|p| p.parse().ok()).unwrap_or(0);
                    }
                }
                "a" => msg.parse_attribute(value),
                _ => tracing::trace!(line, "SDP line ignored"),
            }
        }

        if !has_name {
            return Err(sap_error(SapErrorKind::MissingSessionName));
        }
        Ok(msg)
    }

    fn parse_origin(&mut self, value: &str) {
        let fields: Vec<&str> = value.split_whitespace().collect();
        if let [username, id, version, _net, _addr_type, address, ..] = fields.as_slice() {
            self.username = username.to_string();
            self.session_id = id.parse().unwrap_or(0);
            self.session_version = version.parse().unwrap_or(0);
            self.sender = address.to_string();
        } else {
            tracing::trace!(origin = value, "malformed o= line");
        }
    }

    fn parse_attribute(&mut self, value: &str) {
        let Some((name, rest)) = value.split_once(':') else {
            return;
        };
        match name {
            "rtpmap" => {
                if let Some(encoding) = rest.split_whitespace().nth(1) {
                    self.encoding_name = encoding.split('/').next().unwrap_or(encoding).to_string();
                }
            }
            "fmtp" => {
                let params = rest.split_once(' ').map_or("", |(_, p)| p);
                for param in params.split(';') {
                    let Some((k, v)) = param.trim().split_once('=') else {
                        continue;
                    };
                    let v = v.trim();
                    match k {
                        "sampling" => self.sampling = v.to_string(),
                        "width" => self.width = v.parse().unwrap_or(0),
                        "height" => self.height = v.parse().unwrap_or(0),
                        "depth" => self.depth = v.parse().unwrap_or(0),
                        _ => {}
                    }
                }
            }
            "framerate" => {
                let rest = rest.trim();
                self.framerate = rest
                    .parse::<u32>()
                    .ok()
                    .or_else(|| rest.parse::<f64>().ok().map(|f| f.round() as u32))
                    .unwrap_or(0);
            }
            _ => {}
        }
    }
}

/// Build one announcement (or deletion) datagram for a stream.
pub fn encode_announcement(info: &StreamInformation, source: Ipv4Addr, deletion: bool) -> Vec<u8> {
    let header = SapHeader {
        deletion,
        auth_len: 0,
        msg_id_hash: session_hash(info) as u16,
        origin: source,
    };
    let sdp = SdpMessage::describe(info, source).to_sdp();

    let mut datagram = Vec::with_capacity(SAP_HEADER_LEN + sdp.len());
    datagram.extend_from_slice(&header.write());
    datagram.extend_from_slice(sdp.as_bytes());
    datagram
}

/// Decode one SAP datagram into an [`SdpMessage`].
pub fn decode(datagram: &[u8]) -> Result<SdpMessage> {
    let (header, body) = SapHeader::parse(datagram)?;
    let text = std::str::from_utf8(body).map_err(|_| sap_error(SapErrorKind::InvalidUtf8))?;
    let mut msg = SdpMessage::parse_sdp(text.trim_end_matches('\0'))?;
    msg.deleted = header.deletion;
    msg.source_address = header.origin;
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> StreamInformation {
        StreamInformation {
            session_name: "test_session_name".into(),
            hostname: "239.192.1.1".into(),
            port: 5004,
            height: 480,
            width: 640,
            framerate: 25,
            encoding: ColourspaceType::Yuv422,
            deleted: false,
        }
    }

    #[test]
    fn header_flags() {
        let source = Ipv4Addr::new(192, 168, 1, 10);
        let announce = encode_announcement(&info(), source, false);
        assert_eq!(announce[0], 0x20);
        assert_eq!(announce[1], 0);
        assert_eq!(&announce[4..8], &[192, 168, 1, 10]);

        let delete = encode_announcement(&info(), source, true);
        assert_eq!(delete[0], 0x24);
        assert_eq!(delete[2..4], announce[2..4], "deletion reuses the message id");
    }

    #[test]
    fn sdp_template() {
        let sdp = SdpMessage::describe(&info(), Ipv4Addr::new(10, 0, 0, 1)).to_sdp();
        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains(" IN IP4 10.0.0.1\r\n"));
        assert!(sdp.contains("s=test_session_name\r\n"));
        assert!(sdp.contains("c=IN IP4 239.192.1.1/15\r\n"));
        assert!(sdp.contains("t=0 0\r\n"));
        assert!(sdp.contains("m=video 5004 RTP/AVP 96\r\n"));
        assert!(sdp.contains("a=rtpmap:96 raw/90000\r\n"));
        assert!(sdp.contains(
            "a=fmtp:96 sampling=YCbCr-4:2:2; width=640; height=480; depth=8; colorimetry=BT601-5; progressive\r\n"
        ));
        assert!(sdp.ends_with("a=framerate:25\r\n"));

        let rtpmap = sdp.find("a=rtpmap").unwrap();
        let fmtp = sdp.find("a=fmtp").unwrap();
        assert!(sdp.find("m=video").unwrap() < rtpmap && rtpmap < fmtp);
    }

    #[test]
    fn unicast_connection_has_no_ttl() {
        let mut unicast = info();
        unicast.hostname = "127.0.0.1".into();
        let sdp = SdpMessage::describe(&unicast, Ipv4Addr::LOCALHOST).to_sdp();
        assert!(sdp.contains("c=IN IP4 127.0.0.1\r\n"));
    }

    #[test]
    fn decode_announcement() {
        let source = Ipv4Addr::new(192, 168, 1, 10);
        let msg = decode(&encode_announcement(&info(), source, false)).unwrap();
        assert_eq!(msg.session_name, "test_session_name");
        assert_eq!(msg.ip_address, "239.192.1.1");
        assert_eq!(msg.sender, "192.168.1.10");
        assert_eq!(msg.source_address, source);
        assert_eq!((msg.width, msg.height, msg.depth), (640, 480, 8));
        assert_eq!(msg.framerate, 25);
        assert_eq!(msg.sampling, "YCbCr-4:2:2");
        assert!(!msg.deleted);
        assert_eq!(msg.to_stream_information(), info());
    }

    #[test]
    fn decode_deletion_sets_flag() {
        let msg = decode(&encode_announcement(&info(), Ipv4Addr::LOCALHOST, true)).unwrap();
        assert!(msg.deleted);
        assert!(msg.to_stream_information().deleted);
    }

    #[test]
    fn compressed_and_mono16_encodings() {
        for encoding in [
            ColourspaceType::H264,
            ColourspaceType::Jpeg,
            ColourspaceType::Mono16,
            ColourspaceType::Rgba,
        ] {
            let mut i = info();
            i.encoding = encoding;
            let msg = decode(&encode_announcement(&i, Ipv4Addr::LOCALHOST, false)).unwrap();
            assert_eq!(msg.encoding(), encoding);
        }
    }

    #[test]
    fn skips_payload_type_and_auth_data() {
        let sdp = SdpMessage::describe(&info(), Ipv4Addr::LOCALHOST).to_sdp();
        let mut datagram = vec![0x20, 1, 0x12, 0x34, 127, 0, 0, 1];
        datagram.extend_from_slice(&[0xAA; 4]);
        datagram.extend_from_slice(SDP_MIME_TYPE.as_bytes());
        datagram.push(0);
        datagram.extend_from_slice(sdp.as_bytes());

        let msg = decode(&datagram).unwrap();
        assert_eq!(msg.session_name, "test_session_name");
        assert_eq!(msg.port, 5004);
    }

    #[test]
    fn tolerates_unknown_lines_and_lf_endings() {
        let body = "v=0\no=user 1 2 IN IP4 10.1.1.1\ns=cam\nb=AS:1000\nc=IN IP4 239.1.1.1/32\n\
                    m=video 6000 RTP/AVP 96\na=recvonly\na=rtpmap:96 raw/90000\n\
                    a=fmtp:96 sampling=RGB; width=320; height=240; depth=8\na=framerate:29.97\n";
        let msg = SdpMessage::parse_sdp(body).unwrap();
        assert_eq!(msg.username, "user");
        assert_eq!(msg.ip_address, "239.1.1.1");
        assert_eq!(msg.port, 6000);
        assert_eq!(msg.encoding(), ColourspaceType::Rgb24);
        assert_eq!(msg.framerate, 30);
    }

    #[test]
    fn rejects_malformed_datagrams() {
        assert!(matches!(
            decode(&[0x20, 0, 0]),
            Err(MediaxError::Sap {
                kind: SapErrorKind::Truncated
            })
        ));
        let mut bad = encode_announcement(&info(), Ipv4Addr::LOCALHOST, false);
        bad[0] = 0x40;
        assert!(matches!(
            decode(&bad),
            Err(MediaxError::Sap {
                kind: SapErrorKind::UnsupportedVersion(2)
            })
        ));
        bad[0] = 0x22;
        assert!(decode(&bad).is_err());
        bad[0] = 0x30;
        assert!(decode(&bad).is_err());

        let mut no_name = SapHeader {
            deletion: false,
            auth_len: 0,
            msg_id_hash: 0,
            origin: Ipv4Addr::LOCALHOST,
        }
        .write()
        .to_vec();
        no_name.extend_from_slice(b"v=0\r\nt=0 0\r\n");
        assert!(matches!(
            decode(&no_name),
            Err(MediaxError::Sap {
                kind: SapErrorKind::MissingSessionName
            })
        ));
    }
}
