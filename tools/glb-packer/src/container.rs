//! GLB container reading and writing
//!
//! Layout: 12-byte header (`glTF`, version 2, total length), then a JSON chunk
//! padded with spaces, then an optional BIN chunk padded with zeros. Chunk
//! lengths are always multiples of 4.

use gltf_json as json;
use std::io::Write;

use crate::buffer::Buffer;
use crate::error::{PackError, PackResult};

pub const GLB_MAGIC: &[u8; 4] = b"glTF";
pub const GLB_VERSION: u32 = 2;
/// "JSON"
pub const CHUNK_JSON: u32 = 0x4E4F534A;
/// "BIN\0"
pub const CHUNK_BIN: u32 = 0x004E4942;

const HEADER_LENGTH: usize = 12;
const CHUNK_HEADER_LENGTH: usize = 8;

/// Length rounded up to a multiple of 4
pub fn padded_length(length: usize) -> usize {
    length.div_ceil(4) * 4
}

/// Exact container size for the given payload lengths. An empty binary
/// payload has no BIN chunk.
pub fn glb_length(json_length: usize, bin_length: usize) -> usize {
    let mut total = HEADER_LENGTH + CHUNK_HEADER_LENGTH + padded_length(json_length);
    if bin_length > 0 {
        total += CHUNK_HEADER_LENGTH + padded_length(bin_length);
    }
    total
}

/// The buffer to embed as the BIN chunk.
///
/// Empty buffers are ignored; more than one non-empty buffer cannot be
/// represented in a single container.
pub fn binary_payload(buffers: &[Buffer]) -> PackResult<Option<&Buffer>> {
    let mut non_empty = buffers.iter().filter(|b| !b.is_empty());
    let first = non_empty.next();
    let extra = non_empty.count();
    if extra > 0 {
        return Err(PackError::MultipleBinaryBuffers(extra + 1));
    }
    Ok(first)
}

fn write_chunk<W: Write>(sink: &mut W, chunk_type: u32, data: &[u8], pad: u8) -> PackResult<()> {
    let padding = padded_length(data.len()) - data.len();
    sink.write_all(&((data.len() + padding) as u32).to_le_bytes())?;
    sink.write_all(&chunk_type.to_le_bytes())?;
    sink.write_all(data)?;
    sink.write_all(&[pad; 3][..padding])?;
    Ok(())
}

/// Write a container to `sink`, returning the number of bytes written
pub fn write_glb<W: Write>(json: &[u8], bin: Option<&[u8]>, sink: &mut W) -> PackResult<usize> {
    let bin = bin.filter(|b| !b.is_empty());
    let total_length = glb_length(json.len(), bin.map_or(0, <[u8]>::len));
    let total = u32::try_from(total_length).map_err(|_| PackError::ContainerTooLarge(total_length))?;

    sink.write_all(GLB_MAGIC)?;
    sink.write_all(&GLB_VERSION.to_le_bytes())?;
    sink.write_all(&total.to_le_bytes())?;

    write_chunk(sink, CHUNK_JSON, json, b' ')?;
    if let Some(bin) = bin {
        write_chunk(sink, CHUNK_BIN, bin, 0)?;
    }
    Ok(total_length)
}

/// Serialize `root` and assemble it with the single non-empty buffer
pub fn assemble_glb(root: &json::Root, buffers: &[Buffer]) -> PackResult<Vec<u8>> {
    let payload = binary_payload(buffers)?;
    let json_string = json::serialize::to_string(root)?;
    let bin = payload.map(Buffer::data);

    let mut glb = Vec::with_capacity(glb_length(json_string.len(), bin.map_or(0, <[u8]>::len)));
    write_glb(json_string.as_bytes(), bin, &mut glb)?;
    Ok(glb)
}

/// Chunks of a parsed container. `json` includes its space padding.
#[derive(Debug, Clone, Copy)]
pub struct GlbChunks<'a> {
    pub version: u32,
    pub total_length: usize,
    pub json: &'a [u8],
    pub bin: Option<&'a [u8]>,
}

fn read_u32(bytes: &[u8], offset: usize) -> PackResult<u32> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(PackError::InvalidContainer("truncated"))
}

fn read_chunk(bytes: &[u8], offset: usize) -> PackResult<(u32, &[u8])> {
    let length = read_u32(bytes, offset)? as usize;
    let chunk_type = read_u32(bytes, offset + 4)?;
    if length % 4 != 0 {
        return Err(PackError::InvalidContainer("chunk length is not a multiple of 4"));
    }
    let start = offset + CHUNK_HEADER_LENGTH;
    let data = bytes
        .get(start..start + length)
        .ok_or(PackError::InvalidContainer("chunk extends past the end"))?;
    Ok((chunk_type, data))
}

/// Validate framing and split a container into its chunks
pub fn parse_glb(bytes: &[u8]) -> PackResult<GlbChunks<'_>> {
    if bytes.get(..4) != Some(GLB_MAGIC.as_slice()) {
        return Err(PackError::InvalidContainer("bad magic"));
    }
    let version = read_u32(bytes, 4)?;
    if version != GLB_VERSION {
        return Err(PackError::InvalidContainer("unsupported version"));
    }
    let total_length = read_u32(bytes, 8)? as usize;
    if total_length != bytes.len() {
        return Err(PackError::InvalidContainer("length field does not match data"));
    }

    let (json_type, json) = read_chunk(bytes, HEADER_LENGTH)?;
    if json_type != CHUNK_JSON {
        return Err(PackError::InvalidContainer("first chunk is not JSON"));
    }

    let mut offset = HEADER_LENGTH + CHUNK_HEADER_LENGTH + json.len();
    let mut bin = None;
    if offset < total_length {
        let (bin_type, data) = read_chunk(bytes, offset)?;
        if bin_type != CHUNK_BIN {
            return Err(PackError::InvalidContainer("second chunk is not BIN"));
        }
        bin = Some(data);
        offset += CHUNK_HEADER_LENGTH + data.len();
    }
    if offset != total_length {
        return Err(PackError::InvalidContainer("trailing data after chunks"));
    }

    Ok(GlbChunks {
        version,
        total_length,
        json,
        bin,
    })
}
