// src/core/cluster/slot.rs

//! Implements the cluster hash slot algorithm.

use crate::config::SlotHash;
use crc::{CRC_16_USB, CRC_16_XMODEM, Crc};

/// The total number of hash slots in the cluster.
pub const NUM_SLOTS: usize = 16384;

const CRC16_USB: Crc<u16> = Crc::<u16>::new(&CRC_16_USB);
const CRC16_XMODEM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Calculates the hash slot for a given key with SpinelDB's CRC16 variant.
pub fn get_slot(key: &[u8]) -> u16 {
    get_slot_with(SlotHash::default(), key)
}

/// Calculates the hash slot for a given key.
///
/// If the key contains a non-empty "hash tag" (the first `{...}` substring),
/// only the tag is hashed, which lets callers force related keys into the same
/// slot. Otherwise the entire key is used.
///
/// The final slot is `CRC16(key) % NUM_SLOTS`.
pub fn get_slot_with(hash: SlotHash, key: &[u8]) -> u16 {
    let hashed = hash_tag(key).unwrap_or(key);
    let checksum = match hash {
        SlotHash::Usb => CRC16_USB.checksum(hashed),
        SlotHash::Xmodem => CRC16_XMODEM.checksum(hashed),
    };
    checksum % (NUM_SLOTS as u16)
}

/// The contents of the first `{...}` in `key`, if non-empty.
fn hash_tag(key: &[u8]) -> Option<&[u8]> {
    let start = key.iter().position(|&b| b == b'{')?;
    let len = key[start + 1..].iter().position(|&b| b == b'}')?;
    (len > 0).then(|| &key[start + 1..start + 1 + len])
}
