//! Deterministic webhook port per image.
//!
//! Several agents, one per image, may share a host. Each binds a port derived
//! from its image reference so they never need to be told apart by hand.

use std::net::SocketAddr;

use sha2::{Digest, Sha256};

/// First port of the IANA dynamic/private range.
pub const PORT_RANGE_START: u16 = 49152;
const PORT_RANGE_LEN: u16 = 16384;

/// Map an image reference to a port in `[49152, 65535]`.
pub fn derive_port(image_ref: &str) -> u16 {
    let digest = Sha256::digest(image_ref.as_bytes());
    // The first 16 bits of the digest, i.e. its first four hex digits.
    let value = u16::from_be_bytes([digest[0], digest[1]]);
    value % PORT_RANGE_LEN + PORT_RANGE_START
}

pub fn listen_addr(image_ref: &str) -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], derive_port(image_ref)))
}
