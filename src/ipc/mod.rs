//! Inter-process framing.
//!
//! - [`frame`] — length-prefixed header codec and message-type registry
//! - [`reader`] — streaming reassembly of frames from byte chunks
//! - [`payload`] — typed-array, surface, and delta payload codecs
//!
//! The wire format is little-endian and packed; see [`frame`] for the
//! layout. Message type values are wire ABI.

pub mod frame;
pub mod payload;
pub mod reader;

pub use frame::{
    encode_frame, Frame, FrameFlags, FrameHeader, MessageType, HEADER_LEN, MAX_PAYLOAD_LEN,
};
pub use payload::{decode_surface, encode_surface, SurfaceDelta, TypedArray};
pub use reader::FrameReader;
