//! Byte/word conversions and runtime CPU feature detection.

use crate::{BlockWords, CVBytes, CVWords};
use core::sync::atomic::{AtomicU8, Ordering};

macro_rules! extract_u32_from_byte_chunks {
    ($src:ident, $chunk_index:literal) => {
        u32::from_le_bytes([
            $src[$chunk_index * 4],
            $src[$chunk_index * 4 + 1],
            $src[$chunk_index * 4 + 2],
            $src[$chunk_index * 4 + 3],
        ])
    };
}

/// Converts bytes into `u32` words, the size matches a BLAKE3 chaining value.
#[inline(always)]
pub(crate) const fn words_from_le_bytes_32(bytes: &CVBytes) -> CVWords {
    [
        extract_u32_from_byte_chunks!(bytes, 0),
        extract_u32_from_byte_chunks!(bytes, 1),
        extract_u32_from_byte_chunks!(bytes, 2),
        extract_u32_from_byte_chunks!(bytes, 3),
        extract_u32_from_byte_chunks!(bytes, 4),
        extract_u32_from_byte_chunks!(bytes, 5),
        extract_u32_from_byte_chunks!(bytes, 6),
        extract_u32_from_byte_chunks!(bytes, 7),
    ]
}

/// Converts bytes into `u32` words, the size matches a BLAKE3 block.
#[inline(always)]
pub(crate) const fn words_from_le_bytes_64(bytes: &[u8; 64]) -> BlockWords {
    [
        extract_u32_from_byte_chunks!(bytes, 0),
        extract_u32_from_byte_chunks!(bytes, 1),
        extract_u32_from_byte_chunks!(bytes, 2),
        extract_u32_from_byte_chunks!(bytes, 3),
        extract_u32_from_byte_chunks!(bytes, 4),
        extract_u32_from_byte_chunks!(bytes, 5),
        extract_u32_from_byte_chunks!(bytes, 6),
        extract_u32_from_byte_chunks!(bytes, 7),
        extract_u32_from_byte_chunks!(bytes, 8),
        extract_u32_from_byte_chunks!(bytes, 9),
        extract_u32_from_byte_chunks!(bytes, 10),
        extract_u32_from_byte_chunks!(bytes, 11),
        extract_u32_from_byte_chunks!(bytes, 12),
        extract_u32_from_byte_chunks!(bytes, 13),
        extract_u32_from_byte_chunks!(bytes, 14),
        extract_u32_from_byte_chunks!(bytes, 15),
    ]
}

/// Converts `u32` words into bytes, the size matches a BLAKE3 chaining value.
#[inline(always)]
pub(crate) const fn le_bytes_from_words_32(words: &CVWords) -> CVBytes {
    let mut out = [0; 32];
    let mut i = 0;
    while i < 8 {
        let bytes = words[i].to_le_bytes();
        out[i * 4] = bytes[0];
        out[i * 4 + 1] = bytes[1];
        out[i * 4 + 2] = bytes[2];
        out[i * 4 + 3] = bytes[3];
        i += 1;
    }
    out
}

/// Which compression backend a given process should use.
///
/// Cached process-wide after the first probe; see [`detect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Platform {
    Portable,
    #[cfg(target_arch = "x86_64")]
    Avx2,
}

impl Platform {
    /// The widest batch of chunks this platform can compress in one call to
    /// [`crate::simd::compress_chunks_parallel`].
    #[inline]
    pub(crate) const fn simd_degree(self) -> usize {
        match self {
            Platform::Portable => 1,
            #[cfg(target_arch = "x86_64")]
            Platform::Avx2 => 8,
        }
    }
}

const UNPROBED: u8 = 0;
const SCALAR_ONLY: u8 = 1;
#[cfg(target_arch = "x86_64")]
const AVX2_AVAILABLE: u8 = 2;

static FEATURE_CACHE: AtomicU8 = AtomicU8::new(UNPROBED);

/// Detects the best available compression backend for this process.
///
/// The result of the underlying CPUID/XGETBV probe is cached in a process-wide
/// atomic. The cache is write-once in spirit: concurrent callers may all run the
/// probe before the first store lands, but they all compute the same value, and
/// a `u8` store can never be observed torn.
#[inline]
pub(crate) fn detect() -> Platform {
    match FEATURE_CACHE.load(Ordering::Relaxed) {
        SCALAR_ONLY => return Platform::Portable,
        #[cfg(target_arch = "x86_64")]
        AVX2_AVAILABLE => return Platform::Avx2,
        _ => {}
    }

    #[cfg(target_arch = "x86_64")]
    let platform = if has_avx2() {
        FEATURE_CACHE.store(AVX2_AVAILABLE, Ordering::Relaxed);
        Platform::Avx2
    } else {
        FEATURE_CACHE.store(SCALAR_ONLY, Ordering::Relaxed);
        Platform::Portable
    };
    #[cfg(not(target_arch = "x86_64"))]
    let platform = {
        FEATURE_CACHE.store(SCALAR_ONLY, Ordering::Relaxed);
        Platform::Portable
    };

    platform
}

/// CPUID leaf 1 ECX bit for OSXSAVE: the OS has enabled `xgetbv`/`xsetbv`.
#[cfg(target_arch = "x86_64")]
const CPUID1_ECX_OSXSAVE: u32 = 1 << 27;
/// CPUID leaf 1 ECX bit for AVX support.
#[cfg(target_arch = "x86_64")]
const CPUID1_ECX_AVX: u32 = 1 << 28;
/// CPUID leaf 7 sub-leaf 0 EBX bit for AVX2 support.
#[cfg(target_arch = "x86_64")]
const CPUID7_EBX_AVX2: u32 = 1 << 5;
/// XCR0 bits for SSE (XMM) and AVX (YMM) state being enabled by the OS.
#[cfg(target_arch = "x86_64")]
const XCR0_XMM_YMM: u64 = 0b110;

#[cfg(target_arch = "x86_64")]
fn has_avx2() -> bool {
    // SAFETY: `__cpuid` is available on all x86_64 CPUs; leaf 1 is always supported.
    let leaf1 = unsafe { core::arch::x86_64::__cpuid(1) };
    if leaf1.ecx & CPUID1_ECX_OSXSAVE == 0 || leaf1.ecx & CPUID1_ECX_AVX == 0 {
        return false;
    }

    // SAFETY: gated on OSXSAVE above, so `xgetbv` is safe to execute.
    let xcr0 = unsafe { xgetbv() };
    if xcr0 & XCR0_XMM_YMM != XCR0_XMM_YMM {
        return false;
    }

    // SAFETY: `__cpuid_count` is available on all x86_64 CPUs; leaf 7 subleaf 0
    // is only meaningful once AVX is confirmed above, matching how real-world
    // probes sequence these checks.
    let leaf7 = unsafe { core::arch::x86_64::__cpuid_count(7, 0) };
    leaf7.ebx & CPUID7_EBX_AVX2 != 0
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "xsave")]
unsafe fn xgetbv() -> u64 {
    // SAFETY: caller requires the `xsave` target feature, which is what guards
    // the `xgetbv` instruction's availability.
    unsafe { core::arch::x86_64::_xgetbv(0) }
}
