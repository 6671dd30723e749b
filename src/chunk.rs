//! Streaming state for a single 1024-byte chunk.

use crate::compress::compress_in_place;
use crate::output::Output;
use crate::platform::words_from_le_bytes_64;
use crate::{BLOCK_LEN, CHUNK_END, CHUNK_LEN, CHUNK_START, CVWords};

/// Accumulates up to [`CHUNK_LEN`] bytes of input, one 64-byte block at a
/// time, compressing blocks in place as they fill.
///
/// Mirrors the chunk half of the reference streaming hasher: a chunk's
/// chaining value only becomes final once [`ChunkState::output`] is called
/// with the last, possibly short, block.
#[derive(Debug, Clone)]
pub(crate) struct ChunkState {
    cv: CVWords,
    chunk_counter: u64,
    block: [u8; BLOCK_LEN],
    block_len: u8,
    blocks_compressed: u8,
    flags: u8,
}

impl ChunkState {
    #[inline]
    pub(crate) const fn new(key: CVWords, chunk_counter: u64, flags: u8) -> Self {
        Self {
            cv: key,
            chunk_counter,
            block: [0; BLOCK_LEN],
            block_len: 0,
            blocks_compressed: 0,
            flags,
        }
    }

    #[inline]
    pub(crate) const fn chunk_counter(&self) -> u64 {
        self.chunk_counter
    }

    /// Total bytes absorbed into this chunk so far.
    #[inline]
    pub(crate) const fn len(&self) -> usize {
        BLOCK_LEN * self.blocks_compressed as usize + self.block_len as usize
    }

    const fn start_flag(&self) -> u8 {
        if self.blocks_compressed == 0 { CHUNK_START } else { 0 }
    }

    /// Compresses one full block's worth of words into the running CV,
    /// advancing `blocks_compressed`. Shared by the buffered path (a block
    /// staged in `self.block` across calls) and the direct path (a block read
    /// straight out of a caller's slice).
    fn compress_block(&mut self, block_words: &[u32; 16]) {
        compress_in_place(
            &mut self.cv,
            block_words,
            BLOCK_LEN as u32,
            self.chunk_counter,
            u32::from(self.flags | self.start_flag()),
        );
        self.blocks_compressed += 1;
    }

    /// Feeds input bytes into the chunk, compressing full blocks as soon as a
    /// later byte proves them non-final.
    ///
    /// A block is only compressed once it's known not to be the chunk's last
    /// one, since the last block needs the `CHUNK_END` flag. When a caller
    /// hands over enough bytes to prove a block non-final up front (more
    /// input follows it in the same call), that block is compressed straight
    /// out of the slice, skipping the staging-buffer copy entirely.
    pub(crate) fn update(&mut self, mut input: &[u8]) {
        while !input.is_empty() {
            if self.block_len as usize == BLOCK_LEN {
                let block_words = words_from_le_bytes_64(&self.block);
                self.compress_block(&block_words);
                self.block = [0; BLOCK_LEN];
                self.block_len = 0;
            }

            while self.block_len == 0 && input.len() > BLOCK_LEN {
                let block: &[u8; BLOCK_LEN] =
                    input[..BLOCK_LEN].try_into().expect("exact block size");
                let block_words = words_from_le_bytes_64(block);
                self.compress_block(&block_words);
                input = &input[BLOCK_LEN..];
            }
            if input.is_empty() {
                break;
            }

            let want = BLOCK_LEN - self.block_len as usize;
            let take = want.min(input.len());
            self.block[self.block_len as usize..self.block_len as usize + take]
                .copy_from_slice(&input[..take]);
            self.block_len += take as u8;
            input = &input[take..];
        }
    }

    /// Produces this chunk's [`Output`], consuming neither `self` nor the
    /// partially-filled final block: a chunk may be queried while empty
    /// (the zero-length input case), but never after it has exceeded
    /// [`CHUNK_LEN`] bytes.
    pub(crate) fn output(&self) -> Output {
        let block_words = words_from_le_bytes_64(&self.block);
        Output {
            input_chaining_value: self.cv,
            block_words,
            counter: self.chunk_counter,
            block_len: u32::from(self.block_len),
            flags: self.flags | self.start_flag() | CHUNK_END,
        }
    }

    #[inline]
    pub(crate) const fn has_room(&self) -> bool {
        self.len() < CHUNK_LEN
    }
}
