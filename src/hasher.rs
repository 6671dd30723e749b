//! The public streaming hasher: plain hash, keyed MAC, and key derivation.

use crate::chunk::ChunkState;
use crate::output::Output;
use crate::platform::words_from_le_bytes_32;
use crate::simd::compress_chunks_parallel;
use crate::tree::CvStack;
use crate::{
    CHUNK_LEN, CVWords, DERIVE_KEY_CONTEXT, DERIVE_KEY_MATERIAL, IV, KEYED_HASH, KEY_LEN, OUT_LEN,
};

/// The largest chunk batch a single [`Hasher::update`] iteration gathers
/// before handing it to [`compress_chunks_parallel`]. Bounded so the batch
/// can live on the stack without an allocator; `compress_chunks_parallel`
/// internally sub-batches this into lane-sized groups, so this cap only
/// controls how many full chunks one `update` loop iteration processes.
const MAX_BATCH_CHUNKS: usize = 64;

/// An incremental BLAKE3 hasher.
///
/// Construct with [`Hasher::new`], [`Hasher::new_keyed`], or
/// [`Hasher::new_derive_key`], feed bytes with [`Hasher::update`] any number
/// of times, then read the digest with [`Hasher::finalize`] or
/// [`Hasher::finalize_xof`]. Both finalizers take `&self`, so a hasher can be
/// queried repeatedly, or updated further after a finalize, without losing
/// state.
#[derive(Debug, Clone)]
pub struct Hasher {
    key_words: CVWords,
    chunk_state: ChunkState,
    cv_stack: CvStack,
    flags: u8,
}

impl Hasher {
    #[inline]
    fn new_internal(key_words: CVWords, flags: u8) -> Self {
        Self {
            key_words,
            chunk_state: ChunkState::new(key_words, 0, flags),
            cv_stack: CvStack::new(),
            flags,
        }
    }

    /// Creates a hasher for the default, unkeyed hash function.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::new_internal(*IV, 0)
    }

    /// Creates a hasher for the keyed MAC mode, using a 32-byte key.
    #[inline]
    #[must_use]
    pub fn new_keyed(key: &[u8; KEY_LEN]) -> Self {
        let key_words = words_from_le_bytes_32(key);
        Self::new_internal(key_words, KEYED_HASH)
    }

    /// Creates a hasher for the key-derivation function, given a context
    /// string. The context should be a unique, application-specific constant
    /// string, not attacker-controlled input.
    ///
    /// This runs the two-stage derivation described by
    /// [`crate::derive_key`]: the context string is hashed first, and the
    /// resulting digest becomes the key for the hasher returned here, which
    /// the caller then feeds with the actual key material.
    #[must_use]
    pub fn new_derive_key(context: &str) -> Self {
        let mut context_hasher = Self::new_internal(*IV, DERIVE_KEY_CONTEXT);
        context_hasher.update(context.as_bytes());
        let context_key = context_hasher.finalize();
        let context_key_words = words_from_le_bytes_32(&context_key);
        Self::new_internal(context_key_words, DERIVE_KEY_MATERIAL)
    }

    /// Folds a just-completed chunk into the tree and starts the next one.
    fn finalize_chunk_and_advance(&mut self) {
        let total_chunks = self.chunk_state.chunk_counter() + 1;
        let cv = self.chunk_state.output().chaining_value();
        self.cv_stack
            .add_chunk_chaining_value(cv, total_chunks, &self.key_words, self.flags);
        self.chunk_state = ChunkState::new(self.key_words, total_chunks, self.flags);
    }

    /// Feeds more input bytes into the hasher. May be called any number of
    /// times with input of any length, including zero.
    pub fn update(&mut self, mut input: &[u8]) {
        while !input.is_empty() {
            if !self.chunk_state.has_room() {
                self.finalize_chunk_and_advance();
            }

            if self.chunk_state.len() == 0 {
                // Keep at least one full chunk for the ordinary block path below
                // when input ends exactly on a chunk boundary, so a chunk is
                // always open for `finalize` to read from.
                let full_chunks = input.len() / CHUNK_LEN;
                let batchable = if input.len() % CHUNK_LEN == 0 {
                    full_chunks.saturating_sub(1)
                } else {
                    full_chunks
                };
                if batchable > 0 {
                    let batch_size = batchable.min(MAX_BATCH_CHUNKS);
                    let mut refs: [&[u8; CHUNK_LEN]; MAX_BATCH_CHUNKS] =
                        [&[0; CHUNK_LEN]; MAX_BATCH_CHUNKS];
                    for (slot, chunk) in refs
                        .iter_mut()
                        .zip(input.chunks_exact(CHUNK_LEN))
                        .take(batch_size)
                    {
                        *slot = chunk.try_into().expect("exact chunk length");
                    }
                    let mut cvs = [0u8; MAX_BATCH_CHUNKS * OUT_LEN];
                    let counter = self.chunk_state.chunk_counter();
                    compress_chunks_parallel(
                        &refs[..batch_size],
                        &self.key_words,
                        counter,
                        self.flags,
                        &mut cvs[..batch_size * OUT_LEN],
                    );
                    for (i, cv_bytes) in cvs[..batch_size * OUT_LEN].chunks_exact(OUT_LEN).enumerate() {
                        let cv = words_from_le_bytes_32(cv_bytes.try_into().expect("exact OUT_LEN"));
                        let total_chunks = counter + i as u64 + 1;
                        self.cv_stack
                            .add_chunk_chaining_value(cv, total_chunks, &self.key_words, self.flags);
                    }
                    self.chunk_state = ChunkState::new(self.key_words, counter + batch_size as u64, self.flags);
                    input = &input[batch_size * CHUNK_LEN..];
                    continue;
                }
            }

            let want = CHUNK_LEN - self.chunk_state.len();
            let take = want.min(input.len());
            let (head, tail) = input.split_at(take);
            self.chunk_state.update(head);
            input = tail;
        }
    }

    /// Returns this hasher's root [`Output`], folding the open chunk with the
    /// whole subtree stack. Does not mutate or consume `self`.
    fn final_output(&self) -> Output {
        if self.cv_stack.len() == 0 {
            return self.chunk_state.output();
        }
        let chunk_output = self.chunk_state.output();
        self.cv_stack
            .merge_into_root(chunk_output, &self.key_words, self.flags)
    }

    /// Finalizes the hasher and returns a standard 32-byte output.
    ///
    /// May be called multiple times, or interleaved with further
    /// [`Hasher::update`] calls, without disturbing the hasher's state.
    #[must_use]
    pub fn finalize(&self) -> [u8; OUT_LEN] {
        self.final_output().root_hash()
    }

    /// Finalizes the hasher and writes `out.len()` bytes of extendable output.
    ///
    /// `out` may be any length, shorter or longer than [`OUT_LEN`]; the
    /// output is a single extendable stream, so any prefix of a longer
    /// request matches the equivalent shorter request exactly.
    pub fn finalize_xof(&self, out: &mut [u8]) {
        self.final_output().root_output_bytes(out);
    }
}

impl Default for Hasher {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_digits(bytes: &[u8]) -> [u8; OUT_LEN * 2] {
        let mut out = [0u8; OUT_LEN * 2];
        hex::encode_to_slice(bytes, &mut out).expect("output buffer is exactly sized");
        out
    }

    #[test]
    fn empty_input_matches_known_vector() {
        let hasher = Hasher::new();
        let digest = hasher.finalize();
        let hex = hex_digits(&digest);
        assert_eq!(
            core::str::from_utf8(&hex).expect("hex is ASCII"),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[test]
    fn streaming_matches_one_shot_across_chunk_boundary() {
        let mut data = [0u8; CHUNK_LEN * 3 + 17];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }

        let mut whole = Hasher::new();
        whole.update(&data);

        let mut piecewise = Hasher::new();
        for chunk in data.chunks(97) {
            piecewise.update(chunk);
        }

        assert_eq!(whole.finalize(), piecewise.finalize());
    }

    #[test]
    fn finalize_does_not_consume_hasher() {
        let mut hasher = Hasher::new();
        hasher.update(b"abc");
        let first = hasher.finalize();
        let second = hasher.finalize();
        assert_eq!(first, second);
        hasher.update(b"more");
        let third = hasher.finalize();
        assert_ne!(second, third);
    }

    #[test]
    fn keyed_hash_differs_from_unkeyed() {
        let key = [0x42; KEY_LEN];
        let mut keyed = Hasher::new_keyed(&key);
        keyed.update(b"hello world");
        let mut unkeyed = Hasher::new();
        unkeyed.update(b"hello world");
        assert_ne!(keyed.finalize(), unkeyed.finalize());
    }

    #[test]
    fn derive_key_is_deterministic_and_context_sensitive() {
        let mut a = Hasher::new_derive_key("context a");
        a.update(b"key material");
        let mut b = Hasher::new_derive_key("context a");
        b.update(b"key material");
        let mut c = Hasher::new_derive_key("context b");
        c.update(b"key material");
        assert_eq!(a.finalize(), b.finalize());
        assert_ne!(a.finalize(), c.finalize());
    }

    #[test]
    fn one_chunk_boundary_matches_piecewise_feed() {
        check_exact_chunk_multiple::<CHUNK_LEN>();
    }

    #[test]
    fn two_chunk_boundary_matches_piecewise_feed() {
        check_exact_chunk_multiple::<{ CHUNK_LEN * 2 }>();
    }

    #[test]
    fn three_chunk_boundary_matches_piecewise_feed() {
        check_exact_chunk_multiple::<{ CHUNK_LEN * 3 }>();
    }

    /// Checks that feeding exactly `N` bytes (a multiple of `CHUNK_LEN`) in
    /// one call matches feeding the same bytes in small, boundary-crossing
    /// pieces: exercises invariant 2 (chunk rollover happens exactly at 1024
    /// bytes) and property 5 (the last full chunk still carries `CHUNK_END`
    /// rather than handing off to a stray empty chunk).
    fn check_exact_chunk_multiple<const N: usize>() {
        let mut data = [0u8; N];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        let mut whole = Hasher::new();
        whole.update(&data);

        let mut piecewise = Hasher::new();
        for piece in data.chunks(97) {
            piecewise.update(piece);
        }
        assert_eq!(whole.finalize(), piecewise.finalize());
    }

    #[test]
    fn keyed_hash_with_zero_key_and_empty_input_is_deterministic() {
        let key = [0u8; KEY_LEN];
        let a = Hasher::new_keyed(&key).finalize();
        let b = Hasher::new_keyed(&key).finalize();
        assert_eq!(a, b);
    }

    #[test]
    fn many_chunks_exercise_the_simd_batch_path() {
        let data = [0x99u8; CHUNK_LEN * 10 + 3];
        let mut whole = Hasher::new();
        whole.update(&data);

        let mut reference = Hasher::new();
        for byte_chunk in data.chunks(1) {
            reference.update(byte_chunk);
        }
        assert_eq!(whole.finalize(), reference.finalize());
    }
}
