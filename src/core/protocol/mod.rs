//! Protocol implementations
//!
//! Provides the wire-level pieces shared by every scanner dialect:
//! - Checksum algorithms (CRC-16/XMODEM, BCC)
//! - Dialect descriptors (headers, checksum selection, opcode tables)
//! - Framing (encode requests, decode replies, stream splitting)

pub mod checksum;
pub mod dialect;
pub mod framing;

pub use checksum::{calculate as calc_checksum, ChecksumType};
pub use dialect::{Command, Dialect, DialectDescriptor, LengthField, GM65, M3YW};
pub use framing::{
    decode as frame_decode, decode_request, encode as frame_encode, encode_reply, DecodeError,
    DecodedFrame, FrameDecoder, Request,
};
