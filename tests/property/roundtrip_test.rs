// tests/property/roundtrip_test.rs

//! Property-based tests for the wire codec
//! Tests that any frame survives encoding and decoding, however the bytes are split

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use spineldb_client::core::protocol::{RespFrame, RespFrameCodec};
use tokio_util::codec::{Decoder, Encoder};

/// Simple strings and errors are line-based and cannot contain CR or LF.
fn line() -> impl Strategy<Value = String> {
    "[^\r\n]{0,64}"
}

fn frame() -> impl Strategy<Value = RespFrame> {
    let leaf = prop_oneof![
        line().prop_map(RespFrame::SimpleString),
        line().prop_map(RespFrame::Error),
        any::<i64>().prop_map(RespFrame::Integer),
        prop::collection::vec(any::<u8>(), 0..256)
            .prop_map(|b| RespFrame::BulkString(Bytes::from(b))),
        Just(RespFrame::Null),
        Just(RespFrame::NullArray),
    ];
    leaf.prop_recursive(4, 64, 8, |inner| {
        prop::collection::vec(inner, 0..8).prop_map(RespFrame::Array)
    })
}

fn encode(frame: &RespFrame) -> BytesMut {
    let mut buf = BytesMut::new();
    RespFrameCodec.encode(frame.clone(), &mut buf).unwrap();
    buf
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_decode_inverts_encode(frame in frame()) {
        let mut buf = encode(&frame);
        let decoded = RespFrameCodec.decode(&mut buf).unwrap();
        prop_assert_eq!(decoded, Some(frame));
        prop_assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_is_independent_of_chunking(
        frames in prop::collection::vec(frame(), 1..6),
        chunk in 1usize..17,
    ) {
        let mut wire = BytesMut::new();
        for f in &frames {
            wire.extend_from_slice(&encode(f));
        }

        let mut codec = RespFrameCodec;
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        for piece in wire.chunks(chunk) {
            buf.extend_from_slice(piece);
            while let Some(f) = codec.decode(&mut buf).unwrap() {
                decoded.push(f);
            }
        }
        prop_assert_eq!(decoded, frames);
        prop_assert!(buf.is_empty());
    }

    #[test]
    fn test_truncated_frame_is_incomplete_not_an_error(frame in frame(), cut in any::<prop::sample::Index>()) {
        let wire = encode(&frame);
        let cut = cut.index(wire.len());
        let result = RespFrameCodec.parse(&wire[..cut]);
        prop_assert_eq!(result.unwrap(), None);
    }
}
