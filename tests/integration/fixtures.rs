// tests/integration/fixtures.rs

//! Common test fixtures and data generators
//!
//! Fixtures provide reusable test data for:
//! - Consistency: using the same data across different tests
//! - Readability: clear names for test data

#![allow(dead_code)]

use bytes::Bytes;
use spineldb_client::core::protocol::RespFrame;

/// Common test keys - for tests that need multiple keys
pub const TEST_KEY1: &str = "test_key_1";
pub const TEST_KEY2: &str = "test_key_2";
pub const TEST_KEY3: &str = "test_key_3";

/// Common test values - for tests that need multiple values
pub const TEST_VALUE1: &str = "test_value_1";
pub const TEST_VALUE2: &str = "test_value_2";
pub const TEST_VALUE3: &str = "test_value_3";

/// Cluster nodes used by the routing tests. Both resolve to loopback and
/// are told apart by port.
pub const NODE_A_HOST: &str = "node-a.test";
pub const NODE_A_PORT: u16 = 7001;
pub const NODE_B_HOST: &str = "node-b.test";
pub const NODE_B_PORT: u16 = 7002;

/// `foo` hashes to slot 15363, owned by node B in `two_node_slots`.
pub const KEY_ON_NODE_B: &str = "foo";
pub const KEY_ON_NODE_B_SLOT: u16 = 15363;
/// `bar` hashes to slot 5254, owned by node A in `two_node_slots`.
pub const KEY_ON_NODE_A: &str = "bar";
/// `user1000` is slot 12561 (node B) under CRC-16/USB and 3443 (node A) under XMODEM.
pub const KEY_SPLIT_BY_HASH: &str = "user1000";

/// Generates a unique test key with a prefix
pub fn unique_key(prefix: &str, id: usize) -> String {
    format!("{}_{}", prefix, id)
}

/// Builds a `CLUSTER SLOTS` reply from `(start, end, host, port)` ranges.
pub fn cluster_slots_reply(ranges: &[(i64, i64, &str, u16)]) -> RespFrame {
    RespFrame::Array(
        ranges
            .iter()
            .enumerate()
            .map(|(i, (start, end, host, port))| {
                RespFrame::Array(vec![
                    RespFrame::Integer(*start),
                    RespFrame::Integer(*end),
                    RespFrame::Array(vec![
                        RespFrame::BulkString(Bytes::from(host.to_string())),
                        RespFrame::Integer(*port as i64),
                        RespFrame::BulkString(Bytes::from(format!("node-id-{i}"))),
                    ]),
                ])
            })
            .collect(),
    )
}

/// Slots 0-8191 on node A, 8192-16383 on node B.
pub fn two_node_slots() -> RespFrame {
    cluster_slots_reply(&[
        (0, 8191, NODE_A_HOST, NODE_A_PORT),
        (8192, 16383, NODE_B_HOST, NODE_B_PORT),
    ])
}
