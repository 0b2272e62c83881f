//! Network inlet for LSL-style EEG outlets.
//!
//! Discovery sends an `LSL:shortinfo` query to the multicast group and
//! collects JSON short-info replies. Opening a stream connects over TCP,
//! consumes the `LSL:streaminfo/<len>:<xml>` header and then reads frames of
//! `[f64 LE timestamp][f32 LE x channel_count]`.
//!
//! ```text
//! ┌─────────────────┐  UDP shortinfo   ┌─────────────────┐
//! │  LslDiscovery   │─────────────────►│     Outlet      │
//! └────────┬────────┘                  └────────┬────────┘
//!          │ open()                             │ TCP frames
//!          ▼                                    ▼
//! ┌─────────────────┐                  ┌─────────────────┐
//! │    LslInlet     │◄─────────────────│  sample stream  │
//! └─────────────────┘                  └─────────────────┘
//! ```

use crate::acquisition::live::{StreamDescriptor, StreamDiscovery, StreamInlet};
use crate::acquisition::types::{Sample, SourceError};
use serde::Deserialize;
use std::io::{ErrorKind, Read};
use std::net::{IpAddr, SocketAddr, TcpStream, UdpSocket};
use std::time::{Duration, Instant};

/// Default multicast address for discovery.
pub const LSL_MULTICAST_ADDR: &str = "224.0.0.183";

/// Default multicast port.
pub const LSL_MULTICAST_PORT: u16 = 16571;

const SHORTINFO_QUERY: &[u8] = b"LSL:shortinfo";
const HEADER_PREFIX: &[u8] = b"LSL:streaminfo/";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_HEADER_DIGITS: usize = 9;

/// Short-info reply payload.
#[derive(Debug, Deserialize)]
struct ShortInfo {
    name: String,
    #[serde(rename = "type")]
    stream_type: String,
    channel_count: usize,
    nominal_srate: f64,
    source_id: String,
    port: u16,
}

/// Multicast discovery of LSL-style outlets.
#[derive(Debug, Clone)]
pub struct LslDiscovery {
    multicast: SocketAddr,
}

impl LslDiscovery {
    pub fn new(multicast: SocketAddr) -> Self {
        Self { multicast }
    }
}

impl Default for LslDiscovery {
    fn default() -> Self {
        let ip = LSL_MULTICAST_ADDR
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::from([224, 0, 0, 183]));
        Self::new(SocketAddr::new(ip, LSL_MULTICAST_PORT))
    }
}

impl StreamDiscovery for LslDiscovery {
    fn resolve(
        &self,
        stream_type: &str,
        timeout: Duration,
    ) -> Result<Vec<StreamDescriptor>, SourceError> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.send_to(SHORTINFO_QUERY, self.multicast)?;

        let deadline = Instant::now() + timeout;
        let mut streams = Vec::new();
        let mut buf = [0u8; 4096];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            socket.set_read_timeout(Some(remaining))?;

            match socket.recv_from(&mut buf) {
                Ok((n, peer)) => {
                    let Ok(reply) = std::str::from_utf8(&buf[..n]) else {
                        continue;
                    };
                    if let Some(descriptor) = parse_short_info(reply, stream_type, peer.ip()) {
                        streams.push(descriptor);
                        break;
                    }
                }
                Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    break
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        tracing::debug!("Discovery found {} {} stream(s)", streams.len(), stream_type);
        Ok(streams)
    }

    fn open(&self, descriptor: &StreamDescriptor) -> Result<Box<dyn StreamInlet>, SourceError> {
        let inlet = LslInlet::connect(descriptor)?;
        Ok(Box::new(inlet))
    }
}

/// TCP inlet reading fixed-width sample frames.
pub struct LslInlet {
    stream: TcpStream,
    channel_count: usize,
    pending: Vec<u8>,
}

impl LslInlet {
    /// Connect to the outlet behind `descriptor` and consume its header.
    pub fn connect(descriptor: &StreamDescriptor) -> Result<Self, SourceError> {
        let addr: SocketAddr = descriptor.endpoint.parse().map_err(|_| {
            SourceError::Protocol(format!("invalid endpoint '{}'", descriptor.endpoint))
        })?;

        let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(CONNECT_TIMEOUT))?;

        let xml = read_header(&mut stream)?;
        if let Some(advertised) = xml_field(&xml, "channel_count").and_then(|v| v.parse().ok()) {
            if advertised != descriptor.channel_count {
                return Err(SourceError::ChannelMismatch {
                    expected: descriptor.channel_count,
                    actual: advertised,
                });
            }
        }

        Ok(Self {
            stream,
            channel_count: descriptor.channel_count,
            pending: Vec::new(),
        })
    }

    fn frame_len(&self) -> usize {
        8 + 4 * self.channel_count
    }
}

impl StreamInlet for LslInlet {
    fn pull_sample(&mut self, timeout: Duration) -> Result<Option<Sample>, SourceError> {
        let frame = self.frame_len();
        let deadline = Instant::now() + timeout;

        // Partial frames survive a timeout in `pending`.
        while self.pending.len() < frame {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.stream.set_read_timeout(Some(remaining))?;

            let mut chunk = vec![0u8; frame - self.pending.len()];
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(SourceError::Disconnected),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None)
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let sample = decode_frame(&self.pending[..frame], self.channel_count)?;
        self.pending.drain(..frame);
        Ok(Some(sample))
    }
}

/// Parse one short-info reply, keeping it only if it matches `stream_type`.
fn parse_short_info(reply: &str, stream_type: &str, peer: IpAddr) -> Option<StreamDescriptor> {
    let body = reply.strip_prefix("LSL:shortinfo")?.trim();
    let info: ShortInfo = serde_json::from_str(body).ok()?;

    if !info.stream_type.eq_ignore_ascii_case(stream_type) {
        return None;
    }

    Some(StreamDescriptor {
        name: info.name,
        stream_type: info.stream_type,
        channel_count: info.channel_count,
        nominal_srate: info.nominal_srate,
        source_id: info.source_id,
        endpoint: SocketAddr::new(peer, info.port).to_string(),
    })
}

/// Read the `LSL:streaminfo/<len>:<xml>` header and return the XML.
fn read_header(reader: &mut impl Read) -> Result<String, SourceError> {
    let mut prefix = [0u8; HEADER_PREFIX.len()];
    reader.read_exact(&mut prefix)?;
    if prefix != HEADER_PREFIX {
        return Err(SourceError::Protocol("missing streaminfo header".to_string()));
    }

    let mut digits = String::new();
    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        match byte[0] {
            b':' => break,
            b if b.is_ascii_digit() && digits.len() < MAX_HEADER_DIGITS => {
                digits.push(char::from(b))
            }
            _ => return Err(SourceError::Protocol("bad streaminfo length".to_string())),
        }
    }

    let len: usize = digits
        .parse()
        .map_err(|_| SourceError::Protocol("bad streaminfo length".to_string()))?;
    let mut xml = vec![0u8; len];
    reader.read_exact(&mut xml)?;

    String::from_utf8(xml).map_err(|_| SourceError::Protocol("streaminfo is not UTF-8".to_string()))
}

/// Extract the text of the first `<tag>…</tag>` in `xml`.
fn xml_field<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].trim())
}

fn decode_frame(bytes: &[u8], channel_count: usize) -> Result<Sample, SourceError> {
    if bytes.len() != 8 + 4 * channel_count {
        return Err(SourceError::Protocol(format!(
            "frame of {} bytes for {} channels",
            bytes.len(),
            channel_count
        )));
    }

    let mut stamp = [0u8; 8];
    stamp.copy_from_slice(&bytes[..8]);
    let timestamp = f64::from_le_bytes(stamp);

    let values = bytes[8..]
        .chunks_exact(4)
        .map(|c| f64::from(f32::from_le_bytes([c[0], c[1], c[2], c[3]])))
        .collect();

    Ok(Sample::new(values, timestamp))
}
