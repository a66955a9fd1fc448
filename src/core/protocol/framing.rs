//! Frame codec
//!
//! Host-to-device frames are built with [`encode`], device replies are
//! taken apart with [`decode`]. The device-side directions
//! ([`encode_reply`], [`decode_request`]) exist for the simulator.
//!
//! Decoding never panics on short or garbage input: serial reads are not
//! message-framed, so every failure comes back as a [`DecodeError`].

use super::checksum;
use super::dialect::DialectDescriptor;
use thiserror::Error;

/// Reasons a receive buffer did not hold a valid frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes than the receive header
    #[error("Truncated header: need {needed} bytes, have {available}")]
    TruncatedHeader {
        /// Header size
        needed: usize,
        /// Bytes in the buffer
        available: usize,
    },

    /// Header tag is not the dialect's success pattern
    #[error("Header mismatch: expected {}, found {}", hex::encode(expected), hex::encode(found))]
    HeaderMismatch {
        /// Accepted tag
        expected: Vec<u8>,
        /// Tag read from the buffer
        found: Vec<u8>,
    },

    /// Declared payload, checksum or trailer runs past the buffer
    #[error("Truncated payload: frame needs {declared} bytes, have {available}")]
    TruncatedPayload {
        /// Full frame size implied by the length field
        declared: usize,
        /// Bytes in the buffer
        available: usize,
    },

    /// Checksum over the covered span does not match
    #[error("Checksum mismatch")]
    ChecksumMismatch,

    /// End marker differs from the dialect's trailer
    #[error("Trailer mismatch: expected {}, found {}", hex::encode(expected), hex::encode(found))]
    TrailerMismatch {
        /// Dialect trailer
        expected: Vec<u8>,
        /// Bytes read in its place
        found: Vec<u8>,
    },
}

impl DecodeError {
    /// Whether more bytes could still complete the frame
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::TruncatedHeader { .. } | Self::TruncatedPayload { .. })
    }
}

/// A validated frame borrowed from a receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame<'a> {
    /// Payload bytes (reply data)
    pub payload: &'a [u8],
    /// Bytes after this frame, possibly the start of another
    pub leftover: &'a [u8],
}

/// Build a host-to-device frame
///
/// `header ++ [len16(opcode)] ++ opcode ++ argument ++ checksum ++ trailer`
pub fn encode(dialect: &DialectDescriptor, opcode: &[u8], argument: &[u8]) -> Vec<u8> {
    let mut covered = Vec::with_capacity(opcode.len() + argument.len() + 2);
    if dialect.length_prefixed_opcode {
        let opcode_len = u16::try_from(opcode.len()).unwrap_or(u16::MAX);
        covered.extend_from_slice(&opcode_len.to_be_bytes());
    }
    covered.extend_from_slice(opcode);
    covered.extend_from_slice(argument);

    let check = checksum::calculate(&covered, dialect.checksum);

    let mut frame = Vec::with_capacity(
        dialect.tx_header.len() + covered.len() + check.len() + dialect.trailer.len(),
    );
    frame.extend_from_slice(dialect.tx_header);
    frame.extend_from_slice(&covered);
    frame.extend_from_slice(&check);
    frame.extend_from_slice(dialect.trailer);
    frame
}

/// Take one device reply off the front of `raw`
pub fn decode<'a>(
    dialect: &DialectDescriptor,
    raw: &'a [u8],
) -> Result<DecodedFrame<'a>, DecodeError> {
    let header_len = dialect.rx_header_len();
    if raw.len() < header_len {
        return Err(DecodeError::TruncatedHeader {
            needed: header_len,
            available: raw.len(),
        });
    }

    let tag = &raw[..dialect.rx_header_ok.len()];
    if tag != dialect.rx_header_ok {
        return Err(DecodeError::HeaderMismatch {
            expected: dialect.rx_header_ok.to_vec(),
            found: tag.to_vec(),
        });
    }

    let payload_len = dialect
        .rx_length
        .read(&raw[dialect.rx_header_ok.len()..])
        .ok_or(DecodeError::TruncatedHeader {
            needed: header_len,
            available: raw.len(),
        })?;

    let payload_end = header_len + payload_len;
    let check_end = payload_end + dialect.checksum.size();
    let frame_end = check_end + dialect.trailer.len();
    if raw.len() < frame_end {
        return Err(DecodeError::TruncatedPayload {
            declared: frame_end,
            available: raw.len(),
        });
    }

    if !checksum::verify(&raw[dialect.rx_checksum_start..check_end], dialect.checksum) {
        return Err(DecodeError::ChecksumMismatch);
    }

    let trailer = &raw[check_end..frame_end];
    if trailer != dialect.trailer {
        return Err(DecodeError::TrailerMismatch {
            expected: dialect.trailer.to_vec(),
            found: trailer.to_vec(),
        });
    }

    Ok(DecodedFrame {
        payload: &raw[header_len..payload_end],
        leftover: &raw[frame_end..],
    })
}

/// Build a device-to-host reply frame carrying `payload`
pub fn encode_reply(dialect: &DialectDescriptor, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(dialect.rx_header_len() + payload.len() + 3);
    frame.extend_from_slice(dialect.rx_header_ok);
    frame.extend_from_slice(&dialect.rx_length.encode(payload.len()));
    frame.extend_from_slice(payload);
    let check = checksum::calculate(&frame[dialect.rx_checksum_start..], dialect.checksum);
    frame.extend_from_slice(&check);
    frame.extend_from_slice(dialect.trailer);
    frame
}

/// A host request seen from the device side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Opcode followed by argument bytes
    pub body: Vec<u8>,
    /// Opcode length declared by length-prefixed dialects
    pub opcode_len: Option<usize>,
}

/// Parse a host request frame, as a device would
///
/// Requests carry no overall length, so `frame` must be exactly one request.
pub fn decode_request(dialect: &DialectDescriptor, frame: &[u8]) -> Result<Request, DecodeError> {
    let overhead = dialect.tx_header.len() + dialect.checksum.size() + dialect.trailer.len();
    let prefix = if dialect.length_prefixed_opcode { 2 } else { 0 };
    if frame.len() < overhead + prefix {
        return Err(DecodeError::TruncatedHeader {
            needed: overhead + prefix,
            available: frame.len(),
        });
    }

    let header = &frame[..dialect.tx_header.len()];
    if header != dialect.tx_header {
        return Err(DecodeError::HeaderMismatch {
            expected: dialect.tx_header.to_vec(),
            found: header.to_vec(),
        });
    }

    let check_end = frame.len() - dialect.trailer.len();
    let trailer = &frame[check_end..];
    if trailer != dialect.trailer {
        return Err(DecodeError::TrailerMismatch {
            expected: dialect.trailer.to_vec(),
            found: trailer.to_vec(),
        });
    }

    let covered = &frame[dialect.tx_header.len()..check_end];
    if !checksum::verify(covered, dialect.checksum) {
        return Err(DecodeError::ChecksumMismatch);
    }

    let covered = &covered[..covered.len() - dialect.checksum.size()];
    let opcode_len = if dialect.length_prefixed_opcode {
        let declared = usize::from(u16::from_be_bytes([covered[0], covered[1]]));
        if declared > covered.len() - 2 {
            return Err(DecodeError::TruncatedPayload {
                declared: declared + 2,
                available: covered.len(),
            });
        }
        Some(declared)
    } else {
        None
    };

    Ok(Request {
        body: covered[prefix..].to_vec(),
        opcode_len,
    })
}

/// Bytes to drop from the front of `raw` after a failed decode
///
/// Skips to the next byte that could start a reply header; all of `raw`
/// when there is none.
pub fn resync_offset(dialect: &DialectDescriptor, raw: &[u8]) -> usize {
    let lead = dialect.rx_header_ok.first();
    raw.iter()
        .skip(1)
        .position(|b| Some(b) == lead)
        .map_or(raw.len(), |i| i + 1)
}

/// Streaming reply decoder for continuous capture
///
/// Bytes are buffered until they form a whole frame. When the front of the
/// buffer cannot be a frame, everything up to the next header candidate is
/// moved aside, so line noise in front of a frame does not stall the stream.
pub struct FrameDecoder {
    dialect: &'static DialectDescriptor,
    buffer: Vec<u8>,
    discarded: Vec<u8>,
}

impl FrameDecoder {
    /// Create new decoder
    pub fn new(dialect: &'static DialectDescriptor) -> Self {
        Self {
            dialect,
            buffer: Vec::new(),
            discarded: Vec::new(),
        }
    }

    /// Add data and return the payloads of all complete frames
    pub fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        loop {
            match decode(self.dialect, &self.buffer) {
                Ok(frame) => {
                    frames.push(frame.payload.to_vec());
                    let consumed = self.buffer.len() - frame.leftover.len();
                    self.buffer.drain(..consumed);
                }
                Err(e) if e.is_incomplete() => break,
                Err(_) => {
                    let skip = resync_offset(self.dialect, &self.buffer);
                    self.discarded.extend(self.buffer.drain(..skip));
                }
            }
        }
        frames
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Take the bytes skipped since the last call, in arrival order
    pub fn take_discarded(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.discarded)
    }

    /// Clear buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarded.clear();
    }
}
