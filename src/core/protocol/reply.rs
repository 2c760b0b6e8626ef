// src/core/protocol/reply.rs

//! Typed interpretation of reply frames.
//!
//! Every command is dispatched through the same untyped path and completes with a
//! `RespFrame`. The caller chooses the result type, and `FromResp` is the decoding
//! strategy that turns the frame into it (or reports a mismatch).

use super::RespFrame;
use crate::core::ClientError;
use bytes::Bytes;

/// Converts a decoded reply frame into a caller-facing value.
///
/// Error frames never reach these implementations; the dispatcher turns them
/// into `ClientError::Server` before completion.
pub trait FromResp: Sized {
    fn from_resp(frame: RespFrame) -> Result<Self, ClientError>;
}

fn unexpected(expected: &str, frame: &RespFrame) -> ClientError {
    ClientError::UnexpectedReply(format!("expected {expected}, got {frame:?}"))
}

impl FromResp for RespFrame {
    fn from_resp(frame: RespFrame) -> Result<Self, ClientError> {
        Ok(frame)
    }
}

/// Accepts any successful reply, e.g. `+OK` or a `SET ... NX` that did not apply.
impl FromResp for () {
    fn from_resp(_frame: RespFrame) -> Result<Self, ClientError> {
        Ok(())
    }
}

impl FromResp for i64 {
    fn from_resp(frame: RespFrame) -> Result<Self, ClientError> {
        match frame {
            RespFrame::Integer(i) => Ok(i),
            RespFrame::BulkString(ref b) => Ok(std::str::from_utf8(b)?.parse::<i64>()?),
            other => Err(unexpected("integer", &other)),
        }
    }
}

impl FromResp for u64 {
    fn from_resp(frame: RespFrame) -> Result<Self, ClientError> {
        let value = i64::from_resp(frame)?;
        u64::try_from(value)
            .map_err(|_| ClientError::UnexpectedReply(format!("expected unsigned integer, got {value}")))
    }
}

impl FromResp for f64 {
    fn from_resp(frame: RespFrame) -> Result<Self, ClientError> {
        match frame {
            RespFrame::BulkString(ref b) => Ok(std::str::from_utf8(b)?.parse::<f64>()?),
            RespFrame::SimpleString(ref s) => Ok(s.parse::<f64>()?),
            RespFrame::Integer(i) => Ok(i as f64),
            other => Err(unexpected("float", &other)),
        }
    }
}

/// `1`/`0` integers, `+OK` and null replies map onto a boolean outcome.
impl FromResp for bool {
    fn from_resp(frame: RespFrame) -> Result<Self, ClientError> {
        match frame {
            RespFrame::Integer(i) => Ok(i != 0),
            RespFrame::SimpleString(s) => Ok(s.eq_ignore_ascii_case("OK")),
            RespFrame::Null | RespFrame::NullArray => Ok(false),
            other => Err(unexpected("boolean", &other)),
        }
    }
}

impl FromResp for Bytes {
    fn from_resp(frame: RespFrame) -> Result<Self, ClientError> {
        match frame {
            RespFrame::BulkString(b) => Ok(b),
            RespFrame::SimpleString(s) => Ok(Bytes::from(s)),
            other => Err(unexpected("bulk string", &other)),
        }
    }
}

impl FromResp for String {
    fn from_resp(frame: RespFrame) -> Result<Self, ClientError> {
        match frame {
            RespFrame::BulkString(b) => Ok(String::from_utf8(b.to_vec())?),
            RespFrame::SimpleString(s) => Ok(s),
            other => Err(unexpected("string", &other)),
        }
    }
}

impl<T: FromResp> FromResp for Option<T> {
    fn from_resp(frame: RespFrame) -> Result<Self, ClientError> {
        if frame.is_null() {
            return Ok(None);
        }
        T::from_resp(frame).map(Some)
    }
}

impl<T: FromResp> FromResp for Vec<T> {
    fn from_resp(frame: RespFrame) -> Result<Self, ClientError> {
        match frame {
            RespFrame::Array(items) => items.into_iter().map(T::from_resp).collect(),
            RespFrame::NullArray => Ok(Vec::new()),
            other => Err(unexpected("array", &other)),
        }
    }
}
