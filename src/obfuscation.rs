//! XOR(1) byte transform used on column names and string-column values.
//!
//! Header text and class names are stored in the clear; only the ranges
//! listed above are transformed. The transform is its own inverse.

/// Key XORed into every byte.
pub const XOR_KEY: u8 = 1;

pub fn obfuscate(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().map(|b| b ^ XOR_KEY).collect()
}

pub fn deobfuscate(bytes: &[u8]) -> Vec<u8> {
    obfuscate(bytes)
}

/// In-place variant for buffers that are about to be consumed anyway.
pub fn obfuscate_in_place(bytes: &mut [u8]) {
    for b in bytes {
        *b ^= XOR_KEY;
    }
}
