//! Seeded version 4 UUIDs.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

/// Version 4 UUIDs from a ChaCha stream keyed by the seed.
#[derive(Debug, Clone)]
pub struct UuidGenerator {
    rng: ChaCha8Rng,
}

impl UuidGenerator {
    pub fn new(seed: u64) -> Self {
        // The seed occupies the first 8 bytes of the 256-bit key
        let mut key = [0u8; 32];
        key[..8].copy_from_slice(&seed.to_le_bytes());
        Self {
            rng: ChaCha8Rng::from_seed(key),
        }
    }

    pub fn next_uuid(&mut self) -> Uuid {
        let mut bytes = [0u8; 16];
        self.rng.fill_bytes(&mut bytes);

        bytes[6] = (bytes[6] & 0x0f) | 0x40; // Version 4
        bytes[8] = (bytes[8] & 0x3f) | 0x80; // Variant RFC 4122

        Uuid::from_bytes(bytes)
    }
}
