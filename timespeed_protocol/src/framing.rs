// Length-delimited frame encoding over any byte stream.
//
// Wire format: a 4-byte big-endian length prefix followed by the JSON-encoded
// frame. `write_frame` / `read_frame` take typed frames and handle the JSON
// step; `write_message` / `read_message` are the raw byte layer underneath.
//
// `MAX_MESSAGE_SIZE` bounds the allocation a malformed length prefix can
// cause. Time-speed frames are a few hundred bytes at most (the roster in
// `Welcome` is the largest).

use std::io::{self, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Maximum allowed payload size (64 KiB).
pub const MAX_MESSAGE_SIZE: u32 = 64 * 1024;

/// Write a length-delimited payload: 4-byte big-endian length, then bytes.
pub fn write_message<W: Write>(writer: &mut W, msg: &[u8]) -> io::Result<()> {
    let len = u32::try_from(msg.len())
        .ok()
        .filter(|len| *len <= MAX_MESSAGE_SIZE)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "message too large: {} bytes (max {MAX_MESSAGE_SIZE})",
                    msg.len()
                ),
            )
        })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(msg)?;
    writer.flush()?;
    Ok(())
}

/// Read a length-delimited payload.
///
/// Returns `UnexpectedEof` if the stream closes before or during a payload,
/// and `InvalidData` if the length exceeds `MAX_MESSAGE_SIZE`.
pub fn read_message<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message too large: {len} bytes (max {MAX_MESSAGE_SIZE})"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Serialize a frame to JSON and write it with length-delimited framing.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, frame: &T) -> io::Result<()> {
    let json = serde_json::to_vec(frame).map_err(io::Error::other)?;
    write_message(writer, &json)
}

/// Read one length-delimited frame and decode it from JSON. A payload that is
/// not a valid `T` is reported as `InvalidData`.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> io::Result<T> {
    let bytes = read_message(reader)?;
    serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
