//! Single-call, allocation-minimal decompressor for the LZMA2 compression
//! format, with optional recognition of a minimal subset of the XZ
//! container that wraps a single LZMA2 block.
//!
//! This crate targets embedded and bootstrap contexts: there is no
//! streaming API, no dictionary window allocated by the library, and no
//! support for filters other than LZMA2. The caller-supplied output buffer
//! doubles as the LZ77 dictionary, exactly as in the original C reference
//! this crate is modeled on (`unlzma2`, a single-call specialization of
//! `xz-embedded`'s `xz_dec_lzma2.c`).
//!
//! ```
//! # fn main() {
//! let input = [0x01, 0x00, 0x04, b'h', b'e', b'l', b'l', b'o', 0x00];
//! let mut output = [0u8; 5];
//! let (consumed, produced, status) = lzma2_embedded::lzma2_decompress(&input, &mut output);
//! assert_eq!(status, lzma2_embedded::Status::Ok);
//! assert_eq!(consumed, input.len());
//! assert_eq!(&output[..produced], b"hello");
//! # }
//! ```
#![cfg_attr(not(feature = "std"), no_std)]

macro_rules! lzma_trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::trace!($($arg)*);
    };
}

macro_rules! lzma_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::debug!($($arg)*);
    };
}

pub mod decode;
#[cfg(feature = "std")]
pub mod error;
#[cfg(feature = "xz")]
pub mod xz;

pub use decode::lzma2::{lzma2_decompress_raw, Status};
#[cfg(feature = "std")]
pub use decode::lzma2::{lzma2_decompress, Lzma2Decoder};
