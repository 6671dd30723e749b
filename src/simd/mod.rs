//! Multi-lane chunk compression, dispatched to the best backend at runtime.

#[cfg(target_arch = "x86_64")]
mod avx2;

use crate::compress::compress_in_place;
use crate::platform::{self, Platform, le_bytes_from_words_32, words_from_le_bytes_64};
use crate::{BLOCK_LEN, CHUNK_LEN, CHUNK_START, CHUNK_END, CVBytes, CVWords, OUT_LEN};

/// Complete chunks are only routed through the AVX2 kernel when at least this
/// many are pending in one call; fewer than this falls back to scalar
/// per-chunk processing for the remainder.
const MIN_BATCH_CHUNKS: usize = 4;

/// Compresses `chunks.len()` complete, non-root chunks and writes their
/// chaining values back to `out` (`OUT_LEN` bytes per chunk, in input order).
///
/// Every element of `chunks` must be exactly [`CHUNK_LEN`] bytes: this is the
/// fast path for interior, already-complete chunks. The trailing partial chunk
/// of a stream is never passed here; [`crate::chunk::ChunkState`] folds it one
/// block at a time instead.
pub(crate) fn compress_chunks_parallel(
    chunks: &[&[u8; CHUNK_LEN]],
    key: &CVWords,
    chunk_counter: u64,
    flags: u8,
    out: &mut [u8],
) {
    debug_assert_eq!(out.len(), chunks.len() * OUT_LEN, "out length mismatch");

    match platform::detect() {
        #[cfg(target_arch = "x86_64")]
        Platform::Avx2 => {
            let degree = Platform::Avx2.simd_degree();
            let mut chunks = chunks;
            let mut counter = chunk_counter;
            let mut out = out;
            while chunks.len() >= MIN_BATCH_CHUNKS {
                let group_size = chunks.len().min(degree);
                let (batch, rest) = chunks.split_at(group_size);
                chunks = rest;
                let (batch_out, rest_out) = out.split_at_mut(group_size * OUT_LEN);
                out = rest_out;
                if group_size == degree {
                    // SAFETY: runtime-detected AVX2 support gates this call.
                    unsafe {
                        avx2::compress_chunks_8(batch, key, counter, flags, batch_out);
                    }
                } else {
                    // An incomplete group of `MIN_BATCH_CHUNKS..degree` chunks
                    // is padded up to `degree` lanes with a repeated dummy
                    // chunk rather than hand-writing a second, narrower
                    // kernel; the dummy lanes' output is simply discarded.
                    let mut padded: [&[u8; CHUNK_LEN]; 8] = [batch[0]; 8];
                    padded[..group_size].copy_from_slice(batch);
                    let mut padded_out = [0u8; 8 * OUT_LEN];
                    // SAFETY: runtime-detected AVX2 support gates this call.
                    unsafe {
                        avx2::compress_chunks_8(&padded, key, counter, flags, &mut padded_out);
                    }
                    batch_out.copy_from_slice(&padded_out[..group_size * OUT_LEN]);
                }
                counter += group_size as u64;
            }
            for chunk in chunks {
                let cv = compress_chunk_portable(chunk, key, counter, flags);
                let (dst, rest_out) = out.split_at_mut(OUT_LEN);
                out = rest_out;
                dst.copy_from_slice(&cv);
                counter += 1;
            }
        }
        Platform::Portable => {
            let mut counter = chunk_counter;
            let mut out = out;
            for chunk in chunks {
                let cv = compress_chunk_portable(chunk, key, counter, flags);
                let (dst, rest_out) = out.split_at_mut(OUT_LEN);
                out = rest_out;
                dst.copy_from_slice(&cv);
                counter += 1;
            }
        }
    }
}

/// Folds one complete chunk down to its chaining value, one block at a time.
pub(crate) fn compress_chunk_portable(
    chunk: &[u8; CHUNK_LEN],
    key: &CVWords,
    counter: u64,
    flags: u8,
) -> CVBytes {
    let mut cv = *key;
    let mut block_flags = flags | CHUNK_START;
    for (block_idx, block) in chunk.chunks_exact(BLOCK_LEN).enumerate() {
        if block_idx == CHUNK_LEN / BLOCK_LEN - 1 {
            block_flags |= CHUNK_END;
        }
        // SAFETY: `chunks_exact(BLOCK_LEN)` guarantees each slice is `BLOCK_LEN` bytes.
        let block: &[u8; BLOCK_LEN] = block.try_into().expect("exact chunk size");
        let block_words = words_from_le_bytes_64(block);
        compress_in_place(
            &mut cv,
            &block_words,
            BLOCK_LEN as u32,
            counter,
            u32::from(block_flags),
        );
        block_flags = flags;
    }
    le_bytes_from_words_32(&cv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IV;

    /// Builds `n` chunks of distinct pattern data (`n <= 9`) and checks that
    /// `compress_chunks_parallel` agrees with the scalar per-chunk fold,
    /// chunk by chunk. Run at 3, 4, 5, 7, 8, and 9 full chunks: the dispatch
    /// policy changes behavior exactly at 4 (scalar vs. padded-AVX2) and at
    /// 8 (padded vs. full-width AVX2), so those are the counts where a
    /// dispatch off-by-one would surface.
    fn check_batch_matches_portable(n: usize) {
        let mut data = [[0u8; CHUNK_LEN]; 9];
        for (idx, chunk) in data.iter_mut().enumerate() {
            for (i, byte) in chunk.iter_mut().enumerate() {
                *byte = ((i + idx * 13) % 251) as u8;
            }
        }
        let refs: [&[u8; CHUNK_LEN]; 9] = [
            &data[0], &data[1], &data[2], &data[3], &data[4], &data[5], &data[6], &data[7],
            &data[8],
        ];
        let mut out = [0u8; 9 * OUT_LEN];
        compress_chunks_parallel(&refs[..n], IV, 0, 0, &mut out[..n * OUT_LEN]);
        for lane in 0..n {
            let expected = compress_chunk_portable(&data[lane], IV, lane as u64, 0);
            assert_eq!(&out[lane * OUT_LEN..(lane + 1) * OUT_LEN], &expected);
        }
    }

    #[test]
    fn batch_matches_portable_at_dispatch_boundaries() {
        for n in [3usize, 4, 5, 7, 8, 9] {
            check_batch_matches_portable(n);
        }
    }
}
