//! Streaming frame decoder with partial-frame buffering.
//!
//! [`FrameReader`] is a pull interface: feed it arbitrary byte chunks with
//! [`append`](FrameReader::append) and drain complete frames with
//! [`read`](FrameReader::read) or [`read_all`](FrameReader::read_all).
//! Bytes of an incomplete frame stay buffered across calls; a half-header
//! is never an error, it just waits for more input.

use crate::error::MarigraphError;
use crate::ipc::frame::{Frame, FrameHeader, HEADER_LEN, MAX_PAYLOAD_LEN};

/// Reassembles frames from an in-order byte stream.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently buffered (incomplete frame prefix).
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Append a chunk from the stream.
    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, if any.
    ///
    /// Returns `Ok(None)` while the buffer holds less than one full frame.
    ///
    /// # Errors
    /// Returns [`MarigraphError::Protocol`] when a fully-received header
    /// declares an oversize payload. The header bytes are consumed so
    /// reading can resume at the next header boundary.
    pub fn read(&mut self) -> crate::error::Result<Option<Frame>> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let header = FrameHeader::decode(&self.buf)?;
        let length = header.length as usize;
        if length > MAX_PAYLOAD_LEN {
            self.buf.drain(..HEADER_LEN);
            return Err(MarigraphError::protocol(format!(
                "frame length {length} exceeds the {MAX_PAYLOAD_LEN} byte limit"
            )));
        }
        let total = HEADER_LEN + length;
        if self.buf.len() < total {
            return Ok(None);
        }
        let payload = self.buf[HEADER_LEN..total].to_vec();
        self.buf.drain(..total);
        Ok(Some(Frame { header, payload }))
    }

    /// Drain every complete frame currently buffered.
    ///
    /// # Errors
    /// Propagates the first oversize-frame error; frames drained before the
    /// error are lost to the caller, matching discard-and-continue handling.
    pub fn read_all(&mut self) -> crate::error::Result<Vec<Frame>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.read()? {
            frames.push(frame);
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::frame::{encode_frame, FrameFlags, MessageType};

    fn sample_frames() -> Vec<Vec<u8>> {
        vec![
            encode_frame(MessageType::Ready, b"", FrameFlags::NONE, 0).unwrap(),
            encode_frame(MessageType::Selected, b"{\"idx\":3}", FrameFlags::NONE, 1).unwrap(),
            encode_frame(
                MessageType::SetData,
                &[0u8, 1, 2, 3, 4, 5, 6, 7, 8, 9],
                FrameFlags::RESPONSE,
                2,
            )
            .unwrap(),
        ]
    }

    #[test]
    fn whole_frame_in_one_append() {
        let mut reader = FrameReader::new();
        reader.append(&sample_frames()[1]);
        let frame = reader.read().unwrap().unwrap();
        assert_eq!(frame.header.message_type(), Some(MessageType::Selected));
        assert_eq!(frame.payload, b"{\"idx\":3}");
        assert_eq!(reader.buffered(), 0);
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn byte_by_byte_reassembly() {
        let frames = sample_frames();
        let mut reader = FrameReader::new();
        let mut seen = Vec::new();
        for encoded in &frames {
            for &byte in encoded.iter() {
                reader.append(&[byte]);
                seen.extend(reader.read_all().unwrap());
            }
        }
        assert_eq!(seen.len(), frames.len());
        assert_eq!(seen[0].header.message_type(), Some(MessageType::Ready));
        assert_eq!(seen[1].payload, b"{\"idx\":3}");
        assert_eq!(seen[2].payload, &[0u8, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn concatenated_frames_drain_in_order() {
        let frames = sample_frames();
        let mut stream = Vec::new();
        for f in &frames {
            stream.extend_from_slice(f);
        }
        let mut reader = FrameReader::new();
        reader.append(&stream);
        let out = reader.read_all().unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].header.seq, 0);
        assert_eq!(out[1].header.seq, 1);
        assert_eq!(out[2].header.seq, 2);
    }

    #[test]
    fn half_header_waits_for_more_bytes() {
        let encoded = &sample_frames()[1];
        let mut reader = FrameReader::new();
        reader.append(&encoded[..5]);
        assert!(reader.read().unwrap().is_none());
        assert_eq!(reader.buffered(), 5);
        reader.append(&encoded[5..]);
        assert!(reader.read().unwrap().is_some());
    }

    #[test]
    fn partial_payload_waits_for_more_bytes() {
        let encoded = &sample_frames()[2];
        let mut reader = FrameReader::new();
        reader.append(&encoded[..HEADER_LEN + 4]);
        assert!(reader.read().unwrap().is_none());
        reader.append(&encoded[HEADER_LEN + 4..]);
        let frame = reader.read().unwrap().unwrap();
        assert_eq!(frame.payload.len(), 10);
    }

    #[test]
    fn oversize_length_is_an_error_and_consumes_header() {
        let mut header = [0u8; HEADER_LEN];
        header[0..4].copy_from_slice(&(MAX_PAYLOAD_LEN as u32 + 1).to_le_bytes());
        header[4] = MessageType::SurfaceFull as u8;

        let mut reader = FrameReader::new();
        reader.append(&header);
        let good = encode_frame(MessageType::Ready, b"", FrameFlags::NONE, 9).unwrap();
        reader.append(&good);

        assert!(matches!(
            reader.read(),
            Err(MarigraphError::Protocol { .. })
        ));
        // Reading resumes at the next header boundary.
        let frame = reader.read().unwrap().unwrap();
        assert_eq!(frame.header.message_type(), Some(MessageType::Ready));
        assert_eq!(frame.header.seq, 9);
    }

    #[test]
    fn unknown_type_frames_still_decode() {
        let mut bytes = vec![3, 0, 0, 0, 0x7f, 0, 5, 0];
        bytes.extend_from_slice(b"abc");
        let mut reader = FrameReader::new();
        reader.append(&bytes);
        let frame = reader.read().unwrap().unwrap();
        assert_eq!(frame.header.type_byte, 0x7f);
        assert_eq!(frame.header.message_type(), None);
        assert_eq!(frame.payload, b"abc");
    }
}
