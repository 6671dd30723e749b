//! Genuine 8-lane AVX2 chunk compressor.
//!
//! Eight independent chunks are compressed in lock-step: each of the 16 blocks
//! within a chunk is still processed sequentially (chaining values carry
//! across blocks), but the 8 chunks themselves are independent, so each
//! `u32` lane of the scalar state becomes one `__m256i` holding that word
//! from all 8 chunks side by side.

use crate::platform::{le_bytes_from_words_32, words_from_le_bytes_64};
use crate::{BLOCK_LEN, CHUNK_END, CHUNK_LEN, CHUNK_START, CVWords, IV, MSG_SCHEDULE, OUT_LEN};
use core::arch::x86_64::*;

const LANES: usize = 8;

#[inline(always)]
unsafe fn load_lanes(words: [u32; LANES]) -> __m256i {
    // SAFETY: caller requires AVX2; `_mm256_set_epi32` has no alignment requirement.
    unsafe {
        _mm256_set_epi32(
            words[7] as i32,
            words[6] as i32,
            words[5] as i32,
            words[4] as i32,
            words[3] as i32,
            words[2] as i32,
            words[1] as i32,
            words[0] as i32,
        )
    }
}

#[inline(always)]
unsafe fn store_lanes(v: __m256i) -> [u32; LANES] {
    let mut out = [0u32; LANES];
    // SAFETY: `out` is exactly 32 bytes, matching `__m256i`'s store width.
    unsafe {
        _mm256_storeu_si256(out.as_mut_ptr().cast::<__m256i>(), v);
    }
    out
}

#[inline(always)]
unsafe fn rotr32(v: __m256i, n: u32) -> __m256i {
    // SAFETY: AVX2 shift/or intrinsics, no alignment or lifetime requirements.
    unsafe { _mm256_or_si256(_mm256_srli_epi32(v, n as i32), _mm256_slli_epi32(v, 32 - n as i32)) }
}

#[inline(always)]
unsafe fn g(
    state: &mut [__m256i; 16],
    a: usize,
    b: usize,
    c: usize,
    d: usize,
    x: __m256i,
    y: __m256i,
) {
    // SAFETY: all operations are AVX2 intrinsics on in-bounds array indices.
    unsafe {
        state[a] = _mm256_add_epi32(_mm256_add_epi32(state[a], state[b]), x);
        state[d] = rotr32(_mm256_xor_si256(state[d], state[a]), 16);
        state[c] = _mm256_add_epi32(state[c], state[d]);
        state[b] = rotr32(_mm256_xor_si256(state[b], state[c]), 12);
        state[a] = _mm256_add_epi32(_mm256_add_epi32(state[a], state[b]), y);
        state[d] = rotr32(_mm256_xor_si256(state[d], state[a]), 8);
        state[c] = _mm256_add_epi32(state[c], state[d]);
        state[b] = rotr32(_mm256_xor_si256(state[b], state[c]), 7);
    }
}

#[inline(always)]
unsafe fn round(state: &mut [__m256i; 16], msg: &[__m256i; 16], round_idx: usize) {
    let schedule = MSG_SCHEDULE[round_idx];
    // SAFETY: indices come from the fixed `MSG_SCHEDULE` table, always < 16.
    unsafe {
        g(state, 0, 4, 8, 12, msg[schedule[0]], msg[schedule[1]]);
        g(state, 1, 5, 9, 13, msg[schedule[2]], msg[schedule[3]]);
        g(state, 2, 6, 10, 14, msg[schedule[4]], msg[schedule[5]]);
        g(state, 3, 7, 11, 15, msg[schedule[6]], msg[schedule[7]]);

        g(state, 0, 5, 10, 15, msg[schedule[8]], msg[schedule[9]]);
        g(state, 1, 6, 11, 12, msg[schedule[10]], msg[schedule[11]]);
        g(state, 2, 7, 8, 13, msg[schedule[12]], msg[schedule[13]]);
        g(state, 3, 4, 9, 14, msg[schedule[14]], msg[schedule[15]]);
    }
}

/// Transposes block `block_idx` of all 8 chunks into lane-major message words.
fn transpose_block(chunks: &[&[u8; CHUNK_LEN]; LANES], block_idx: usize) -> [[u32; LANES]; 16] {
    let mut words = [[0u32; LANES]; 16];
    for (lane, chunk) in chunks.iter().enumerate() {
        let block_start = block_idx * BLOCK_LEN;
        let block: &[u8; BLOCK_LEN] = chunk[block_start..block_start + BLOCK_LEN]
            .try_into()
            .expect("exact block size");
        let block_words = words_from_le_bytes_64(block);
        for (w, word) in block_words.into_iter().enumerate() {
            words[w][lane] = word;
        }
    }
    words
}

/// Compresses exactly 8 complete chunks in parallel.
///
/// # Safety
///
/// The caller must have confirmed AVX2 support via [`crate::platform::detect`].
#[target_feature(enable = "avx2")]
pub(super) unsafe fn compress_chunks_8(
    chunks: &[&[u8; CHUNK_LEN]],
    key: &CVWords,
    chunk_counter: u64,
    flags: u8,
    out: &mut [u8],
) {
    debug_assert_eq!(chunks.len(), LANES);
    debug_assert_eq!(out.len(), LANES * OUT_LEN);
    let chunks: &[&[u8; CHUNK_LEN]; LANES] = chunks.try_into().expect("exactly 8 chunks");

    // SAFETY: function is `#[target_feature(enable = "avx2")]`, called only once
    // the caller has confirmed AVX2 support at runtime.
    unsafe {
        let mut cv = [
            load_lanes([key[0]; LANES]),
            load_lanes([key[1]; LANES]),
            load_lanes([key[2]; LANES]),
            load_lanes([key[3]; LANES]),
            load_lanes([key[4]; LANES]),
            load_lanes([key[5]; LANES]),
            load_lanes([key[6]; LANES]),
            load_lanes([key[7]; LANES]),
        ];

        let mut counter_lo = [0u32; LANES];
        let mut counter_hi = [0u32; LANES];
        for lane in 0..LANES {
            let counter = chunk_counter + lane as u64;
            counter_lo[lane] = counter as u32;
            counter_hi[lane] = (counter >> 32) as u32;
        }
        let counter_lo = load_lanes(counter_lo);
        let counter_hi = load_lanes(counter_hi);

        const BLOCKS_PER_CHUNK: usize = CHUNK_LEN / BLOCK_LEN;
        for block_idx in 0..BLOCKS_PER_CHUNK {
            let mut block_flags = flags;
            if block_idx == 0 {
                block_flags |= CHUNK_START;
            }
            if block_idx == BLOCKS_PER_CHUNK - 1 {
                block_flags |= CHUNK_END;
            }

            let msg_words = transpose_block(chunks, block_idx);
            let msg = [
                load_lanes(msg_words[0]),
                load_lanes(msg_words[1]),
                load_lanes(msg_words[2]),
                load_lanes(msg_words[3]),
                load_lanes(msg_words[4]),
                load_lanes(msg_words[5]),
                load_lanes(msg_words[6]),
                load_lanes(msg_words[7]),
                load_lanes(msg_words[8]),
                load_lanes(msg_words[9]),
                load_lanes(msg_words[10]),
                load_lanes(msg_words[11]),
                load_lanes(msg_words[12]),
                load_lanes(msg_words[13]),
                load_lanes(msg_words[14]),
                load_lanes(msg_words[15]),
            ];

            let mut state = [
                cv[0],
                cv[1],
                cv[2],
                cv[3],
                cv[4],
                cv[5],
                cv[6],
                cv[7],
                load_lanes([IV[0]; LANES]),
                load_lanes([IV[1]; LANES]),
                load_lanes([IV[2]; LANES]),
                load_lanes([IV[3]; LANES]),
                counter_lo,
                counter_hi,
                load_lanes([BLOCK_LEN as u32; LANES]),
                load_lanes([u32::from(block_flags); LANES]),
            ];

            round(&mut state, &msg, 0);
            round(&mut state, &msg, 1);
            round(&mut state, &msg, 2);
            round(&mut state, &msg, 3);
            round(&mut state, &msg, 4);
            round(&mut state, &msg, 5);
            round(&mut state, &msg, 6);

            for i in 0..8 {
                cv[i] = _mm256_xor_si256(state[i], state[i + 8]);
            }
        }

        let cv_lanes: [[u32; LANES]; 8] = [
            store_lanes(cv[0]),
            store_lanes(cv[1]),
            store_lanes(cv[2]),
            store_lanes(cv[3]),
            store_lanes(cv[4]),
            store_lanes(cv[5]),
            store_lanes(cv[6]),
            store_lanes(cv[7]),
        ];

        for lane in 0..LANES {
            let mut words = [0u32; 8];
            for (w, lane_words) in cv_lanes.iter().enumerate() {
                words[w] = lane_words[lane];
            }
            let bytes = le_bytes_from_words_32(&words);
            out[lane * OUT_LEN..(lane + 1) * OUT_LEN].copy_from_slice(&bytes);
        }
    }
}
