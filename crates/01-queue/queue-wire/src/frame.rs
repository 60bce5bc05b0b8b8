//! Length-prefixed frames carrying archived [`Request`]/[`Response`] values.
//!
//! Layout: `[version: u8][reserved: 3 bytes][len: u32 LE][rkyv payload]`.
//! Payloads are validated with bytecheck before being deserialized.

use std::io::{self, Read, Write};

use rkyv::{
    api::high::{to_bytes, HighSerializer},
    rancor::Error,
    ser::allocator::ArenaHandle,
    util::AlignedVec,
    Serialize,
};

use crate::schema::{Request, Response, PROTOCOL_VERSION};
use crate::{WireError, WireResult};

/// Largest payload accepted in either direction.
pub const MAX_FRAME_BYTES: usize = 64 << 20;

const HEADER_LEN: usize = 8;

pub fn write_request<W: Write>(writer: &mut W, request: &Request) -> WireResult<()> {
    write_frame(writer, request)
}

pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> WireResult<()> {
    write_frame(writer, response)
}

/// Reads the next request; `Ok(None)` on a clean end of stream.
pub fn read_request<R: Read>(reader: &mut R) -> WireResult<Option<Request>> {
    let Some(bytes) = read_payload(reader)? else {
        return Ok(None);
    };
    rkyv::from_bytes::<Request, Error>(&bytes)
        .map(Some)
        .map_err(|err| WireError::codec(format!("request decode failure: {err}")))
}

/// Reads the next response. End of stream is an error: a response was owed.
pub fn read_response<R: Read>(reader: &mut R) -> WireResult<Response> {
    let bytes = read_payload(reader)?.ok_or_else(|| {
        WireError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before response",
        ))
    })?;
    rkyv::from_bytes::<Response, Error>(&bytes)
        .map_err(|err| WireError::codec(format!("response decode failure: {err}")))
}

fn write_frame<W, T>(writer: &mut W, value: &T) -> WireResult<()>
where
    W: Write,
    T: for<'a> Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, Error>>,
{
    let payload = to_bytes::<Error>(value)
        .map_err(|err| WireError::codec(format!("serialize failure: {err}")))?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(WireError::FrameTooLarge { len: payload.len() });
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(PROTOCOL_VERSION);
    frame.extend_from_slice(&[0u8; 3]);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

fn read_payload<R: Read>(reader: &mut R) -> WireResult<Option<AlignedVec>> {
    let mut header = [0u8; HEADER_LEN];
    if !read_header(reader, &mut header)? {
        return Ok(None);
    }
    if header[0] != PROTOCOL_VERSION {
        return Err(WireError::Version { found: header[0] });
    }
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(WireError::FrameTooLarge { len });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    // Archived roots must be aligned; a plain Vec gives no such guarantee.
    let mut aligned: AlignedVec = AlignedVec::with_capacity(len);
    aligned.extend_from_slice(&body);
    Ok(Some(aligned))
}

/// Fills `header`, returning `false` if the stream ended before any byte.
fn read_header<R: Read>(reader: &mut R, header: &mut [u8; HEADER_LEN]) -> WireResult<bool> {
    let mut filled = 0;
    while filled < HEADER_LEN {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(WireError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated frame header",
                )))
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(true)
}
