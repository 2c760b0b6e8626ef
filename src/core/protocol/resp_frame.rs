// src/core/protocol/resp_frame.rs

//! RESP2 frames and the codec that moves them on and off the wire.

use crate::core::ClientError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";
const CRLF_LEN: usize = 2;

// Protocol-level limits so a misbehaving server cannot exhaust client memory.
const MAX_FRAME_ELEMENTS: usize = 1_024 * 1_024;
const MAX_BULK_STRING_SIZE: usize = 512 * 1024 * 1024;
const MAX_RECURSION_DEPTH: usize = 256;

/// One RESP2 value as it appears on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    NullArray,
    Array(Vec<RespFrame>),
}

impl RespFrame {
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, ClientError> {
        let mut buf = BytesMut::new();
        RespFrameCodec.encode(self.clone(), &mut buf)?;
        Ok(buf.to_vec())
    }

    /// Builds a request frame: an array of bulk strings.
    pub fn request<I, B>(parts: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        RespFrame::Array(
            parts
                .into_iter()
                .map(|p| RespFrame::BulkString(p.into()))
                .collect(),
        )
    }

    /// Returns the bytes of a bulk or simple string frame.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespFrame::BulkString(b) => Some(b),
            RespFrame::SimpleString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RespFrame::Null | RespFrame::NullArray)
    }
}

/// Frame codec for a client connection: encodes requests, decodes replies and pushes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RespFrameCodec;

/// Writes a simple string or error line, which cannot itself carry CR or LF.
fn put_text_line(dst: &mut BytesMut, marker: u8, text: &str) -> Result<(), ClientError> {
    if text.bytes().any(|b| b == b'\r' || b == b'\n') {
        return Err(ClientError::Encoding(format!(
            "'{}' line cannot contain CR or LF",
            marker as char
        )));
    }
    put_line(dst, marker, text.as_bytes());
    Ok(())
}

/// Writes `marker`, `body` and the terminating CRLF.
fn put_line(dst: &mut BytesMut, marker: u8, body: &[u8]) {
    dst.reserve(body.len() + 1 + CRLF_LEN);
    dst.put_u8(marker);
    dst.extend_from_slice(body);
    dst.extend_from_slice(CRLF);
}

impl Encoder<RespFrame> for RespFrameCodec {
    type Error = ClientError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut digits = itoa::Buffer::new();
        match item {
            RespFrame::SimpleString(s) => put_text_line(dst, b'+', &s)?,
            RespFrame::Error(s) => put_text_line(dst, b'-', &s)?,
            RespFrame::Integer(i) => put_line(dst, b':', digits.format(i).as_bytes()),
            RespFrame::BulkString(b) => {
                put_line(dst, b'$', digits.format(b.len()).as_bytes());
                dst.reserve(b.len() + CRLF_LEN);
                dst.extend_from_slice(&b);
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Null => dst.extend_from_slice(b"$-1\r\n"),
            RespFrame::NullArray => dst.extend_from_slice(b"*-1\r\n"),
            RespFrame::Array(items) => {
                put_line(dst, b'*', digits.format(items.len()).as_bytes());
                for item in items {
                    self.encode(item, dst)?;
                }
            }
        }
        Ok(())
    }
}

impl Decoder for RespFrameCodec {
    type Item = RespFrame;
    type Error = ClientError;

    /// Yields the next complete frame. A trailing partial frame stays in `src`.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((frame, consumed)) = self.parse(src)? else {
            return Ok(None);
        };
        src.advance(consumed);
        Ok(Some(frame))
    }
}

impl RespFrameCodec {
    /// Parses one complete frame from the front of `src` without consuming it.
    ///
    /// Returns the frame and the number of bytes it occupies, or `Ok(None)` when
    /// `src` only holds a prefix of a frame.
    pub fn parse(&self, src: &[u8]) -> Result<Option<(RespFrame, usize)>, ClientError> {
        let mut rest = src;
        match read_frame(&mut rest, 0) {
            Ok(frame) => Ok(Some((frame, src.len() - rest.len()))),
            Err(ClientError::IncompleteData) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Reads one frame from `rest`, advancing it past the bytes read.
fn read_frame(rest: &mut &[u8], depth: usize) -> Result<RespFrame, ClientError> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(ClientError::Protocol(format!(
            "frames nested deeper than {MAX_RECURSION_DEPTH} levels"
        )));
    }
    let Some((&marker, tail)) = rest.split_first() else {
        return Err(ClientError::IncompleteData);
    };
    *rest = tail;

    match marker {
        b'+' => Ok(RespFrame::SimpleString(lossy(take_line(rest)?))),
        b'-' => Ok(RespFrame::Error(lossy(take_line(rest)?))),
        b':' => Ok(RespFrame::Integer(take_number(rest)?)),
        b'$' => read_bulk(rest),
        b'*' => read_array(rest, depth),
        other => Err(ClientError::Protocol(format!(
            "unknown frame type marker 0x{other:02x}"
        ))),
    }
}

fn read_bulk(rest: &mut &[u8]) -> Result<RespFrame, ClientError> {
    let Some(len) = take_length(rest, "bulk")? else {
        return Ok(RespFrame::Null);
    };
    if len > MAX_BULK_STRING_SIZE {
        return Err(ClientError::Protocol(format!(
            "bulk string of {len} bytes exceeds the limit"
        )));
    }
    if rest.len() < len + CRLF_LEN {
        return Err(ClientError::IncompleteData);
    }
    let (data, tail) = rest.split_at(len);
    if !tail.starts_with(CRLF) {
        return Err(ClientError::Protocol(
            "bulk string is not terminated by CRLF".to_string(),
        ));
    }
    let data = Bytes::copy_from_slice(data);
    *rest = &tail[CRLF_LEN..];
    Ok(RespFrame::BulkString(data))
}

fn read_array(rest: &mut &[u8], depth: usize) -> Result<RespFrame, ClientError> {
    let Some(len) = take_length(rest, "array")? else {
        return Ok(RespFrame::NullArray);
    };
    if len > MAX_FRAME_ELEMENTS {
        return Err(ClientError::Protocol(format!(
            "array of {len} elements exceeds the limit"
        )));
    }
    // The length is server-controlled, so the pre-allocation is capped.
    let mut items = Vec::with_capacity(len.min(1024));
    for _ in 0..len {
        items.push(read_frame(rest, depth + 1)?);
    }
    Ok(RespFrame::Array(items))
}

/// Returns the line up to the next CRLF and advances past it.
fn take_line<'a>(rest: &mut &'a [u8]) -> Result<&'a [u8], ClientError> {
    let pos = rest
        .windows(CRLF_LEN)
        .position(|w| w == CRLF)
        .ok_or(ClientError::IncompleteData)?;
    let line = &rest[..pos];
    *rest = &rest[pos + CRLF_LEN..];
    Ok(line)
}

fn take_number(rest: &mut &[u8]) -> Result<i64, ClientError> {
    let line = take_line(rest)?;
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ClientError::Protocol(format!("invalid number '{}'", lossy(line))))
}

/// A length header: `None` for the `-1` null marker, an error for any other negative.
fn take_length(rest: &mut &[u8], what: &str) -> Result<Option<usize>, ClientError> {
    match take_number(rest)? {
        -1 => Ok(None),
        n => usize::try_from(n)
            .map(Some)
            .map_err(|_| ClientError::Protocol(format!("invalid {what} length {n}"))),
    }
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}
