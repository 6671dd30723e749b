//! Finalization: turning a chunk or parent node's state into chaining values
//! or an arbitrary-length extendable output.

use crate::compress::compress;
use crate::platform::le_bytes_from_words_32;
use crate::{BLOCK_LEN, BlockWords, CVBytes, CVWords, OUT_LEN, ROOT};

/// Everything needed to finalize one chunk or parent node, either as a
/// non-root chaining value or as root output of any length.
///
/// Produced by [`crate::chunk::ChunkState::output`] and by parent-node
/// compression in [`crate::tree`]; consumed by [`crate::hasher::Hasher`].
#[derive(Debug, Clone)]
pub(crate) struct Output {
    pub(crate) input_chaining_value: CVWords,
    pub(crate) block_words: BlockWords,
    pub(crate) counter: u64,
    pub(crate) block_len: u32,
    pub(crate) flags: u8,
}

impl Output {
    /// Folds this node down to its non-root 8-word chaining value.
    pub(crate) fn chaining_value(&self) -> CVWords {
        let state = compress(
            &self.input_chaining_value,
            &self.block_words,
            self.block_len,
            self.counter,
            u32::from(self.flags),
        );
        [
            state[0] ^ state[8],
            state[1] ^ state[9],
            state[2] ^ state[10],
            state[3] ^ state[11],
            state[4] ^ state[12],
            state[5] ^ state[13],
            state[6] ^ state[14],
            state[7] ^ state[15],
        ]
    }

    /// Writes this node's root output of arbitrary length, as required for
    /// [`crate::hasher::Hasher::finalize_xof`].
    ///
    /// Each 64-byte block of output is an independent compression with the
    /// `ROOT` flag set and an incrementing block counter, per the extendable
    /// output construction: a single stream that can be truncated to any
    /// length and still agree with a shorter direct request.
    pub(crate) fn root_output_bytes(&self, mut out: &mut [u8]) {
        let mut output_block_counter = 0u64;
        while !out.is_empty() {
            let block_bytes = compress_xof(
                &self.input_chaining_value,
                &self.block_words,
                self.block_len,
                output_block_counter,
                u32::from(self.flags) | u32::from(ROOT),
            );
            let take = out.len().min(BLOCK_LEN);
            let (dst, rest) = out.split_at_mut(take);
            dst.copy_from_slice(&block_bytes[..take]);
            out = rest;
            output_block_counter += 1;
        }
    }

    /// Convenience wrapper around [`Output::root_output_bytes`] for the common
    /// fixed-length case.
    pub(crate) fn root_hash(&self) -> CVBytes {
        let mut out = [0u8; OUT_LEN];
        self.root_output_bytes(&mut out);
        out
    }
}

/// Runs one XOF output block: the full 16-word permutation output, folded
/// into 64 bytes by XORing the second half against the input chaining value
/// rather than discarding it, so every compression yields a full block of
/// pseudorandom output instead of just 32 bytes.
fn compress_xof(
    cv: &CVWords,
    block_words: &BlockWords,
    block_len: u32,
    counter: u64,
    flags: u32,
) -> [u8; 64] {
    let mut state = compress(cv, block_words, block_len, counter, flags);
    state[0] ^= state[8];
    state[1] ^= state[9];
    state[2] ^= state[10];
    state[3] ^= state[11];
    state[4] ^= state[12];
    state[5] ^= state[13];
    state[6] ^= state[14];
    state[7] ^= state[15];
    state[8] ^= cv[0];
    state[9] ^= cv[1];
    state[10] ^= cv[2];
    state[11] ^= cv[3];
    state[12] ^= cv[4];
    state[13] ^= cv[5];
    state[14] ^= cv[6];
    state[15] ^= cv[7];

    let mut out = [0u8; 64];
    for (i, word) in state.into_iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IV;

    #[test]
    fn xof_prefix_matches_fixed_length_output() {
        let output = Output {
            input_chaining_value: *IV,
            block_words: [0x11; 16],
            counter: 0,
            block_len: 64,
            flags: 0,
        };
        let short = output.root_hash();
        let mut long = [0u8; 128];
        output.root_output_bytes(&mut long);
        assert_eq!(&long[..OUT_LEN], &short);
    }

    #[test]
    fn chaining_value_is_not_root_flagged() {
        let output = Output {
            input_chaining_value: *IV,
            block_words: [0; 16],
            counter: 0,
            block_len: 0,
            flags: 0,
        };
        let cv = output.chaining_value();
        let bytes = le_bytes_from_words_32(&cv);
        assert_ne!(bytes, output.root_hash());
    }
}
