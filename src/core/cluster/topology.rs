// src/core/cluster/topology.rs

//! The slot-to-node table learned from `CLUSTER SLOTS` and `MOVED` replies.

use super::slot::NUM_SLOTS;
use crate::core::ClientError;
use crate::core::protocol::RespFrame;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SlotMap {
    slots: Vec<Option<Arc<str>>>,
}

impl Default for SlotMap {
    fn default() -> Self {
        Self {
            slots: vec![None; NUM_SLOTS],
        }
    }
}

impl SlotMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `CLUSTER SLOTS` reply: `[[start, end, [host, port, id], replicas...], ...]`.
    /// Only the primary of each range is used.
    pub fn from_cluster_slots(reply: &RespFrame) -> Result<Self, ClientError> {
        let RespFrame::Array(ranges) = reply else {
            return Err(malformed("reply is not an array"));
        };
        let mut map = SlotMap::new();
        for range in ranges {
            let RespFrame::Array(fields) = range else {
                return Err(malformed("slot range is not an array"));
            };
            let (Some(RespFrame::Integer(start)), Some(RespFrame::Integer(end))) =
                (fields.first(), fields.get(1))
            else {
                return Err(malformed("slot range bounds are not integers"));
            };
            let Some(RespFrame::Array(primary)) = fields.get(2) else {
                return Err(malformed("slot range has no primary node"));
            };
            let host = primary
                .first()
                .and_then(|h| h.as_bytes())
                .map(|h| String::from_utf8_lossy(h).into_owned())
                .ok_or_else(|| malformed("node host is missing"))?;
            let Some(RespFrame::Integer(port)) = primary.get(1) else {
                return Err(malformed("node port is missing"));
            };
            if *start < 0 || *end < *start || *end as usize >= NUM_SLOTS {
                return Err(malformed("slot range is out of bounds"));
            }
            let addr: Arc<str> = node_addr(&host, *port).into();
            for slot in *start as usize..=*end as usize {
                map.slots[slot] = Some(addr.clone());
            }
        }
        Ok(map)
    }

    /// Points one slot at `addr`, as instructed by a `MOVED` redirect.
    pub fn assign(&mut self, slot: u16, addr: &str) {
        if let Some(entry) = self.slots.get_mut(slot as usize) {
            *entry = Some(addr.into());
        }
    }

    pub fn node_for_slot(&self, slot: u16) -> Option<&str> {
        self.slots.get(slot as usize)?.as_deref()
    }

    /// Every distinct node address in the table.
    pub fn nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = Vec::new();
        for addr in self.slots.iter().flatten() {
            if !nodes.iter().any(|n| n.as_str() == addr.as_ref()) {
                nodes.push(addr.to_string());
            }
        }
        nodes
    }

    pub fn covered_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

fn node_addr(host: &str, port: i64) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

fn malformed(reason: &str) -> ClientError {
    ClientError::UnexpectedReply(format!("malformed CLUSTER SLOTS reply: {reason}"))
}
