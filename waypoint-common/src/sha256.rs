//! A convenience module for hashing things with SHA-256.

use std::fmt;

use crate::hex;

pub const HASH_LEN: usize = 32;

/// A SHA-256 hash value.
#[derive(Copy, Clone, Default, Eq, Hash, PartialEq)]
pub struct Hash([u8; HASH_LEN]);

/// SHA-256 digest a single input.
pub fn digest(input: &[u8]) -> Hash {
    digest_many(&[input])
}

/// SHA-256 digest several input slices concatenated together, without
/// allocating.
pub fn digest_many(inputs: &[&[u8]]) -> Hash {
    let mut ctx = ring::digest::Context::new(&ring::digest::SHA256);
    for input in inputs {
        ctx.update(input);
    }
    let output = ctx.finish();
    Hash(<[u8; HASH_LEN]>::try_from(output.as_ref()).expect("SHA256 is 32B"))
}

impl Hash {
    pub const fn new(value: [u8; HASH_LEN]) -> Self {
        Self(value)
    }

    pub const fn to_array(self) -> [u8; HASH_LEN] {
        self.0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::display(&self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::display(&self.0))
    }
}
