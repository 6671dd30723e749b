//! A streaming BLAKE3 hashing core.
//!
//! Three related primitives, all built on the same chunked Merkle tree:
//! the default hash function ([`hash`] / [`Hasher::new`]), a keyed MAC
//! ([`keyed_hash`] / [`Hasher::new_keyed`]), and key derivation
//! ([`derive_key`] / [`Hasher::new_derive_key`]). All three also support
//! extendable output through [`Hasher::finalize_xof`].

#![no_std]

mod chunk;
mod compress;
mod hasher;
mod output;
mod platform;
mod simd;
mod tree;

pub use hasher::Hasher;

/// Name of the compression backend this process will use, for logging and
/// benchmarking. Not part of the correctness contract: every backend
/// produces identical output.
#[must_use]
pub fn detected_backend_name() -> &'static str {
    match platform::detect() {
        platform::Platform::Portable => "portable",
        #[cfg(target_arch = "x86_64")]
        platform::Platform::Avx2 => "avx2",
    }
}

/// The number of bytes in a standard hash output.
pub const OUT_LEN: usize = 32;
/// The number of bytes in a key, for [`Hasher::new_keyed`].
pub const KEY_LEN: usize = 32;
/// The number of bytes in one compression block.
pub const BLOCK_LEN: usize = 64;
/// The number of bytes in a chunk: 16 blocks.
pub const CHUNK_LEN: usize = 1024;

type CVWords = [u32; 8];
type CVBytes = [u8; OUT_LEN]; // little-endian
type BlockWords = [u32; 16];

const IV: &CVWords = &[
    0x6A09_E667,
    0xBB67_AE85,
    0x3C6E_F372,
    0xA54F_F53A,
    0x510E_527F,
    0x9B05_688C,
    0x1F83_D9AB,
    0x5BE0_CD19,
];

const MSG_SCHEDULE: [[usize; 16]; 7] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [2, 6, 3, 10, 7, 0, 4, 13, 1, 11, 12, 5, 9, 14, 15, 8],
    [3, 4, 10, 12, 13, 2, 7, 14, 6, 5, 9, 0, 11, 15, 8, 1],
    [10, 7, 12, 9, 14, 3, 13, 15, 4, 0, 11, 2, 5, 8, 1, 6],
    [12, 13, 9, 11, 15, 10, 14, 8, 7, 2, 5, 3, 0, 1, 6, 4],
    [9, 14, 11, 5, 8, 12, 15, 1, 13, 3, 0, 10, 2, 6, 4, 7],
    [11, 15, 5, 0, 1, 9, 8, 6, 14, 10, 2, 12, 3, 4, 7, 13],
];

// Internal domain-separation flags, set in the high bits of the block flags
// word passed to the compression function.
const CHUNK_START: u8 = 1 << 0;
const CHUNK_END: u8 = 1 << 1;
const PARENT: u8 = 1 << 2;
const ROOT: u8 = 1 << 3;
const KEYED_HASH: u8 = 1 << 4;
const DERIVE_KEY_CONTEXT: u8 = 1 << 5;
const DERIVE_KEY_MATERIAL: u8 = 1 << 6;

/// Hashes `input` with the default, unkeyed hash function.
#[must_use]
pub fn hash(input: &[u8]) -> [u8; OUT_LEN] {
    let mut hasher = Hasher::new();
    hasher.update(input);
    hasher.finalize()
}

/// Hashes `input` as a MAC, using a 32-byte key.
#[must_use]
pub fn keyed_hash(key: &[u8; KEY_LEN], input: &[u8]) -> [u8; OUT_LEN] {
    let mut hasher = Hasher::new_keyed(key);
    hasher.update(input);
    hasher.finalize()
}

/// Derives a subkey from `context` and `key_material`.
///
/// `context` should be a hardcoded, globally unique, application-specific
/// string; it is not a secret. `key_material` is the actual secret input,
/// typically a master key or a password-derived value.
#[must_use]
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; OUT_LEN] {
    let mut hasher = Hasher::new_derive_key(context);
    hasher.update(key_material);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_digits(bytes: &[u8]) -> [u8; OUT_LEN * 2] {
        let mut out = [0u8; OUT_LEN * 2];
        hex::encode_to_slice(bytes, &mut out).expect("output buffer is exactly sized");
        out
    }

    fn assert_hex(bytes: &[u8], expected: &str) {
        let hex = hex_digits(bytes);
        assert_eq!(core::str::from_utf8(&hex).expect("hex is ASCII"), expected);
    }

    #[test]
    fn known_vector_one_byte() {
        assert_hex(
            &hash(&[0x00]),
            "2d3adedff11b61f14c886e35afa036736dcd87a74d27b5c1510225d0f592e213",
        );
    }

    #[test]
    fn known_vector_two_bytes() {
        assert_hex(
            &hash(&[0x00, 0x01]),
            "7b7015bb92cf0b318037702a6cdd81dee41224f734684c2c122cd6359cb1ee63",
        );
    }

    #[test]
    fn known_vector_three_bytes() {
        assert_hex(
            &hash(&[0x00, 0x01, 0x02]),
            "e1be4d7a8ab5560aa4199eea339849ba8e293d55ca0a81006726d184519e647f",
        );
    }

    #[test]
    fn known_vector_64_byte_pattern() {
        let mut data = [0u8; 64];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        assert_hex(
            &hash(&data),
            "4eed7141ea4a5cd4b788606bd23f46e212af9cacebacdc7d1f4c6dc7f2511b98",
        );
    }

    #[test]
    fn known_vector_65_byte_pattern() {
        let mut data = [0u8; 65];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        assert_hex(
            &hash(&data),
            "de1e5fa0be70df6d2be8fffd0e99ceaa8eb6e8c93a63f2d8d1c30ecb6b263dee",
        );
    }

    #[test]
    fn known_vector_1024_byte_pattern() {
        let mut data = [0u8; CHUNK_LEN];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        assert_hex(
            &hash(&data),
            "42214739f095a406f3fc83deb889744ac00df831c10daa55189b5d121c855af7",
        );
    }

    #[test]
    fn known_vector_keyed_hash() {
        let mut data = [0u8; 64];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        let key = b"whats the Elvish word for friend";
        assert_hex(
            &keyed_hash(key, &data),
            "ba8ced36f327700d213f120b1a207a3b8c04330528586f414d09f2f7d9ccb7e6",
        );
    }

    #[test]
    fn known_vector_derive_key() {
        let mut data = [0u8; 64];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        assert_hex(
            &derive_key("BLAKE3 2019-12-27 16:29:52 test vectors context", &data),
            "a5c4a7053fa86b64746d4bb688d06ad1f02a18fce9afd3e818fefaa7126bf73e",
        );
    }

    #[test]
    fn one_shot_matches_streaming_hasher() {
        let input = b"one-shot vs streaming consistency";
        let mut hasher = Hasher::new();
        hasher.update(input);
        assert_eq!(hash(input), hasher.finalize());
    }

    #[test]
    fn xof_prefix_matches_fixed_output() {
        let mut hasher = Hasher::new();
        hasher.update(b"xof consistency check");
        let short = hasher.finalize();
        let mut long = [0u8; 96];
        hasher.finalize_xof(&mut long);
        assert_eq!(&long[..OUT_LEN], &short);
    }
}
