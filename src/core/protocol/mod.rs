// src/core/protocol/mod.rs

//! The RESP2 wire protocol: frames, the codec, typed reply decoding and the
//! classification of incoming frames into replies and push messages.

pub mod incoming;
pub mod reply;
pub mod resp_frame;
pub use incoming::{Incoming, PushMessage};
pub use reply::FromResp;
pub use resp_frame::{RespFrame, RespFrameCodec};
