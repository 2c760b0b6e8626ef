// src/core/cluster/mod.rs

//! Cluster mode: hash slots, the slot table, and the routing client.

pub mod router;
pub mod slot;
pub mod topology;

pub use router::ClusterClient;
pub use slot::{NUM_SLOTS, get_slot, get_slot_with};
pub use topology::SlotMap;
