//! Length-prefixed binary frame codec.
//!
//! Wire layout, little-endian, packed:
//!
//! ```text
//! offset  field   type
//! 0       length  u32
//! 4       type    u8
//! 5       flags   u8
//! 6       seq     u16
//! 8       payload bytes[length]
//! ```
//!
//! Message type values are wire ABI and must not be renumbered.

use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::error::MarigraphError;

/// Header size in bytes.
pub const HEADER_LEN: usize = 8;
/// Largest accepted payload (encode and decode).
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Canonical message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Control
    Init = 0x00,
    Ready = 0x01,
    Shutdown = 0x02,
    Ping = 0x03,
    Pong = 0x04,
    Error = 0x05,
    Ack = 0x06,
    // Data
    SurfaceFull = 0x10,
    SurfaceDelta = 0x11,
    ChainFull = 0x12,
    ChainDelta = 0x13,
    Timeseries = 0x14,
    Dispersion = 0x15,
    // Widget
    SetData = 0x20,
    AppendData = 0x21,
    Clear = 0x22,
    Scroll = 0x23,
    Focus = 0x24,
    Resize = 0x25,
    SetTitle = 0x26,
    // Events
    Selected = 0x30,
    Clicked = 0x31,
    Submitted = 0x32,
    KeyPressed = 0x33,
    ScrollChanged = 0x34,
    // Render
    RenderRequest = 0x40,
    RenderResult = 0x41,
    // Config
    ConfigUpdate = 0x50,
    WiringUpdate = 0x51,
}

impl MessageType {
    /// Decode a wire byte; `None` for unassigned values (callers treat
    /// unknown types as no-ops, not errors).
    pub fn from_u8(value: u8) -> Option<Self> {
        use MessageType::*;
        Some(match value {
            0x00 => Init,
            0x01 => Ready,
            0x02 => Shutdown,
            0x03 => Ping,
            0x04 => Pong,
            0x05 => Error,
            0x06 => Ack,
            0x10 => SurfaceFull,
            0x11 => SurfaceDelta,
            0x12 => ChainFull,
            0x13 => ChainDelta,
            0x14 => Timeseries,
            0x15 => Dispersion,
            0x20 => SetData,
            0x21 => AppendData,
            0x22 => Clear,
            0x23 => Scroll,
            0x24 => Focus,
            0x25 => Resize,
            0x26 => SetTitle,
            0x30 => Selected,
            0x31 => Clicked,
            0x32 => Submitted,
            0x33 => KeyPressed,
            0x34 => ScrollChanged,
            0x40 => RenderRequest,
            0x41 => RenderResult,
            0x50 => ConfigUpdate,
            0x51 => WiringUpdate,
            _ => return None,
        })
    }

    /// Canonical uppercase name, as used in wiring rules.
    pub fn name(self) -> &'static str {
        use MessageType::*;
        match self {
            Init => "INIT",
            Ready => "READY",
            Shutdown => "SHUTDOWN",
            Ping => "PING",
            Pong => "PONG",
            Error => "ERROR",
            Ack => "ACK",
            SurfaceFull => "SURFACE_FULL",
            SurfaceDelta => "SURFACE_DELTA",
            ChainFull => "CHAIN_FULL",
            ChainDelta => "CHAIN_DELTA",
            Timeseries => "TIMESERIES",
            Dispersion => "DISPERSION",
            SetData => "SET_DATA",
            AppendData => "APPEND_DATA",
            Clear => "CLEAR",
            Scroll => "SCROLL",
            Focus => "FOCUS",
            Resize => "RESIZE",
            SetTitle => "SET_TITLE",
            Selected => "SELECTED",
            Clicked => "CLICKED",
            Submitted => "SUBMITTED",
            KeyPressed => "KEY_PRESSED",
            ScrollChanged => "SCROLL_CHANGED",
            RenderRequest => "RENDER_REQUEST",
            RenderResult => "RENDER_RESULT",
            ConfigUpdate => "CONFIG_UPDATE",
            WiringUpdate => "WIRING_UPDATE",
        }
    }

    /// Inverse of [`name`](MessageType::name).
    pub fn from_name(name: &str) -> Option<Self> {
        use MessageType::*;
        Some(match name {
            "INIT" => Init,
            "READY" => Ready,
            "SHUTDOWN" => Shutdown,
            "PING" => Ping,
            "PONG" => Pong,
            "ERROR" => Error,
            "ACK" => Ack,
            "SURFACE_FULL" => SurfaceFull,
            "SURFACE_DELTA" => SurfaceDelta,
            "CHAIN_FULL" => ChainFull,
            "CHAIN_DELTA" => ChainDelta,
            "TIMESERIES" => Timeseries,
            "DISPERSION" => Dispersion,
            "SET_DATA" => SetData,
            "APPEND_DATA" => AppendData,
            "CLEAR" => Clear,
            "SCROLL" => Scroll,
            "FOCUS" => Focus,
            "RESIZE" => Resize,
            "SET_TITLE" => SetTitle,
            "SELECTED" => Selected,
            "CLICKED" => Clicked,
            "SUBMITTED" => Submitted,
            "KEY_PRESSED" => KeyPressed,
            "SCROLL_CHANGED" => ScrollChanged,
            "RENDER_REQUEST" => RenderRequest,
            "RENDER_RESULT" => RenderResult,
            "CONFIG_UPDATE" => ConfigUpdate,
            "WIRING_UPDATE" => WiringUpdate,
            _ => return None,
        })
    }

    /// Whether this is a user-interaction event routed through wiring rules.
    pub fn is_event(self) -> bool {
        matches!(
            self,
            MessageType::Selected
                | MessageType::Clicked
                | MessageType::Submitted
                | MessageType::KeyPressed
                | MessageType::ScrollChanged
        )
    }
}

/// Frame flag bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FrameFlags(u8);

impl FrameFlags {
    pub const NONE: FrameFlags = FrameFlags(0);
    /// Reserved; never set by this implementation.
    pub const COMPRESSED: FrameFlags = FrameFlags(1);
    pub const REQUEST: FrameFlags = FrameFlags(2);
    pub const RESPONSE: FrameFlags = FrameFlags(4);
    pub const BROADCAST: FrameFlags = FrameFlags(8);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn contains(self, other: FrameFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FrameFlags {
    type Output = FrameFlags;
    fn bitor(self, rhs: FrameFlags) -> FrameFlags {
        FrameFlags(self.0 | rhs.0)
    }
}

/// Decoded 8-byte frame header.
///
/// The message type is kept as a raw byte so unknown values survive
/// decoding; [`FrameHeader::message_type`] resolves known ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub length: u32,
    pub type_byte: u8,
    pub flags: FrameFlags,
    pub seq: u16,
}

impl FrameHeader {
    /// Resolve the type byte; `None` for unassigned values.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_u8(self.type_byte)
    }

    /// Encode into the packed 8-byte wire form.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.length.to_le_bytes());
        out[4] = self.type_byte;
        out[5] = self.flags.bits();
        out[6..8].copy_from_slice(&self.seq.to_le_bytes());
        out
    }

    /// Decode from the packed 8-byte wire form.
    ///
    /// # Errors
    /// Returns [`MarigraphError::Protocol`] on a short slice.
    pub fn decode(bytes: &[u8]) -> crate::error::Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(MarigraphError::protocol(format!(
                "truncated header: {} of {HEADER_LEN} bytes",
                bytes.len()
            )));
        }
        Ok(Self {
            length: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            type_byte: bytes[4],
            flags: FrameFlags::from_bits(bytes[5]),
            seq: u16::from_le_bytes([bytes[6], bytes[7]]),
        })
    }
}

/// A decoded frame: header plus exactly `header.length` payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

/// Encode a frame: header followed by the payload.
///
/// # Errors
/// Returns [`MarigraphError::Protocol`] when the payload exceeds
/// [`MAX_PAYLOAD_LEN`].
pub fn encode_frame(
    msg_type: MessageType,
    payload: &[u8],
    flags: FrameFlags,
    seq: u16,
) -> crate::error::Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(MarigraphError::protocol(format!(
            "payload of {} bytes exceeds the {MAX_PAYLOAD_LEN} byte limit",
            payload.len()
        )));
    }
    let header = FrameHeader {
        length: payload.len() as u32,
        type_byte: msg_type as u8,
        flags,
        seq,
    };
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(payload);
    Ok(out)
}
