//! Payload codecs: typed numeric arrays, full surfaces, and sparse deltas.
//!
//! All multi-byte values are little-endian IEEE-754 / two's complement.
//! Surface metadata travels as JSON so receivers can ignore unknown keys
//! for forward compatibility.

use serde::{Deserialize, Serialize};

use crate::error::MarigraphError;
use crate::surface::{Surface, SurfaceMeta};

/// A homogeneous numeric batch with a 1-byte element-type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedArray {
    /// Tag 0.
    F32(Vec<f32>),
    /// Tag 1.
    F64(Vec<f64>),
    /// Tag 2.
    U32(Vec<u32>),
    /// Tag 3.
    I32(Vec<i32>),
}

impl TypedArray {
    /// Element count.
    pub fn len(&self) -> usize {
        match self {
            TypedArray::F32(v) => v.len(),
            TypedArray::F64(v) => v.len(),
            TypedArray::U32(v) => v.len(),
            TypedArray::I32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encode as tag byte plus raw little-endian element bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            TypedArray::F32(v) => encode_elems(0, v.iter().map(|e| e.to_le_bytes())),
            TypedArray::F64(v) => encode_elems(1, v.iter().map(|e| e.to_le_bytes())),
            TypedArray::U32(v) => encode_elems(2, v.iter().map(|e| e.to_le_bytes())),
            TypedArray::I32(v) => encode_elems(3, v.iter().map(|e| e.to_le_bytes())),
        }
    }

    /// Decode a tagged array payload.
    ///
    /// # Errors
    /// Returns [`MarigraphError::Protocol`] on an empty payload, unknown
    /// tag, or a body length that is not a multiple of the element size.
    pub fn decode(bytes: &[u8]) -> crate::error::Result<Self> {
        let (&tag, body) = bytes
            .split_first()
            .ok_or_else(|| MarigraphError::protocol("typed array payload is empty"))?;
        match tag {
            0 => Ok(TypedArray::F32(decode_elems(body, f32::from_le_bytes)?)),
            1 => Ok(TypedArray::F64(decode_elems(body, f64::from_le_bytes)?)),
            2 => Ok(TypedArray::U32(decode_elems(body, u32::from_le_bytes)?)),
            3 => Ok(TypedArray::I32(decode_elems(body, i32::from_le_bytes)?)),
            _ => Err(MarigraphError::protocol(format!(
                "unknown typed array tag {tag}"
            ))),
        }
    }
}

fn encode_elems<const N: usize>(tag: u8, elems: impl Iterator<Item = [u8; N]>) -> Vec<u8> {
    let mut out = vec![tag];
    for bytes in elems {
        out.extend_from_slice(&bytes);
    }
    out
}

fn decode_elems<T, const N: usize>(
    body: &[u8],
    from_le: fn([u8; N]) -> T,
) -> crate::error::Result<Vec<T>> {
    if body.len() % N != 0 {
        return Err(MarigraphError::protocol(format!(
            "typed array body of {} bytes is not a multiple of the {N}-byte element",
            body.len()
        )));
    }
    Ok(body
        .chunks_exact(N)
        .map(|c| {
            let mut arr = [0u8; N];
            arr.copy_from_slice(c);
            from_le(arr)
        })
        .collect())
}

/// Round up to the next 4-byte boundary.
#[inline]
fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

/// Serialize a surface for a `SURFACE_FULL` payload.
///
/// Layout: `u32 nx`, `u32 ny`, `u32 meta_len`, JSON metadata, zero padding
/// to 4-byte alignment, then `f32[nx] x`, `f32[ny] y`, `f32[nx·ny] z`
/// row-major, all little-endian.
///
/// # Errors
/// Returns [`MarigraphError::Json`] if metadata serialization fails.
pub fn encode_surface(surface: &Surface) -> crate::error::Result<Vec<u8>> {
    let meta_json = serde_json::to_vec(surface.meta())?;
    let meta_len = meta_json.len();
    let data_start = align4(12 + meta_len);
    let total = data_start + 4 * (surface.nx() + surface.ny() + surface.z().len());

    let mut out = vec![0u8; total];
    out[0..4].copy_from_slice(&(surface.nx() as u32).to_le_bytes());
    out[4..8].copy_from_slice(&(surface.ny() as u32).to_le_bytes());
    out[8..12].copy_from_slice(&(meta_len as u32).to_le_bytes());
    out[12..12 + meta_len].copy_from_slice(&meta_json);

    let mut offset = data_start;
    for &v in surface.x().iter().chain(surface.y()).chain(surface.z()) {
        out[offset..offset + 4].copy_from_slice(&(v as f32).to_le_bytes());
        offset += 4;
    }
    Ok(out)
}

fn read_u32(bytes: &[u8], offset: usize) -> crate::error::Result<u32> {
    let end = offset + 4;
    if bytes.len() < end {
        return Err(MarigraphError::protocol(format!(
            "surface payload truncated at offset {offset}"
        )));
    }
    Ok(u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ]))
}

fn read_f32_array(bytes: &[u8], offset: usize, count: usize) -> crate::error::Result<Vec<f64>> {
    let end = offset + 4 * count;
    if bytes.len() < end {
        return Err(MarigraphError::protocol(format!(
            "surface payload truncated: need {end} bytes, have {}",
            bytes.len()
        )));
    }
    Ok(bytes[offset..end]
        .chunks_exact(4)
        .map(|c| f64::from(f32::from_le_bytes([c[0], c[1], c[2], c[3]])))
        .collect())
}

/// Deserialize a `SURFACE_FULL` payload into a fresh surface.
///
/// Unknown metadata keys are ignored; domains are recomputed from the
/// decoded buffers.
///
/// # Errors
/// Returns [`MarigraphError::Protocol`] on truncation,
/// [`MarigraphError::Json`] on malformed metadata, and
/// [`MarigraphError::InvalidInput`] if the decoded grid is inconsistent.
pub fn decode_surface(bytes: &[u8]) -> crate::error::Result<Surface> {
    let nx = read_u32(bytes, 0)? as usize;
    let ny = read_u32(bytes, 4)? as usize;
    let meta_len = read_u32(bytes, 8)? as usize;

    let meta_end = 12 + meta_len;
    if bytes.len() < meta_end {
        return Err(MarigraphError::protocol(format!(
            "surface payload truncated: metadata claims {meta_len} bytes"
        )));
    }
    let meta: SurfaceMeta = serde_json::from_slice(&bytes[12..meta_end])?;

    let mut offset = align4(meta_end);
    let x = read_f32_array(bytes, offset, nx)?;
    offset += 4 * nx;
    let y = read_f32_array(bytes, offset, ny)?;
    offset += 4 * ny;
    let z = read_f32_array(bytes, offset, nx * ny)?;

    Surface::with_meta(x, y, z, meta)
}

/// Sparse surface update for a `SURFACE_DELTA` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SurfaceDelta {
    /// `(flat z index, new value)` pairs.
    pub updates: Vec<(u32, f32)>,
}

impl SurfaceDelta {
    /// Layout: `u32 count`, `u32[count]` flat indices, `f32[count]` values.
    pub fn encode(&self) -> Vec<u8> {
        let count = self.updates.len();
        let mut out = Vec::with_capacity(4 + 8 * count);
        out.extend_from_slice(&(count as u32).to_le_bytes());
        for &(idx, _) in &self.updates {
            out.extend_from_slice(&idx.to_le_bytes());
        }
        for &(_, value) in &self.updates {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// # Errors
    /// Returns [`MarigraphError::Protocol`] on truncation.
    pub fn decode(bytes: &[u8]) -> crate::error::Result<Self> {
        let count = read_u32(bytes, 0)? as usize;
        let expected = 4 + 8 * count;
        if bytes.len() < expected {
            return Err(MarigraphError::protocol(format!(
                "delta payload truncated: {count} updates need {expected} bytes, have {}",
                bytes.len()
            )));
        }
        let values_start = 4 + 4 * count;
        let updates = (0..count)
            .map(|i| {
                let idx = u32::from_le_bytes([
                    bytes[4 + 4 * i],
                    bytes[5 + 4 * i],
                    bytes[6 + 4 * i],
                    bytes[7 + 4 * i],
                ]);
                let off = values_start + 4 * i;
                let value =
                    f32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]]);
                (idx, value)
            })
            .collect();
        Ok(Self { updates })
    }
}
