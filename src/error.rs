//! Error types returned by the `std`-gated convenience wrappers.
//!
//! The raw entry point (`crate::decode::lzma2::lzma2_decompress_raw`) never
//! returns a `Result`: it reports failure through the [`Status`](crate::Status)
//! tag, exactly like the C core it is modeled on. This module exists for
//! callers who would rather use `?` than match on a status code.

use core::fmt;

use crate::Status;

/// Error produced while decompressing LZMA2 or XZ data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The LZMA2 core returned a non-`Ok` status.
    Lzma(LzmaError),
    /// The optional XZ container stripper rejected the input.
    #[cfg(feature = "xz")]
    Xz(XzError),
}

/// Failure reported by the LZMA2 core, carrying along how far it got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaError {
    pub status: Status,
    pub consumed: usize,
    pub produced: usize,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Lzma(e) => write!(
                f,
                "LZMA2 decompression failed: {:?} (consumed {}, produced {})",
                e.status, e.consumed, e.produced
            ),
            #[cfg(feature = "xz")]
            Error::Xz(e) => write!(f, "XZ container error: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<LzmaError> for Error {
    fn from(e: LzmaError) -> Self {
        Error::Lzma(e)
    }
}

/// Failures specific to the optional XZ stream/block stripper.
#[cfg(feature = "xz")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XzError {
    /// Input too short to contain a Stream Header and Stream Footer.
    TooShort,
    /// Stream Header magic bytes did not match.
    BadStreamMagic,
    /// Stream Footer magic bytes did not match.
    BadFooterMagic,
    /// A Stream Flags field used a reserved bit, or the two Stream Flags
    /// copies (header vs. footer) disagreed.
    BadStreamFlags,
    /// CRC32 over the Stream Flags (or Block/Index header) did not match.
    BadHeaderCrc,
    /// The Block Header declared a filter count other than exactly one.
    UnsupportedFilterCount(u8),
    /// The Block Flags byte set a reserved bit, or a Compressed/Uncompressed
    /// Size present bit this stripper doesn't decode.
    BadBlockFlags(u8),
    /// The single filter was something other than LZMA2 (filter ID `0x21`).
    UnsupportedFilter(u64),
    /// The LZMA2 filter's properties field was not the expected one byte.
    BadFilterPropertiesSize(u8),
    /// `lc + lp` exceeded 4, which no compliant `.xz` encoder would produce.
    InvalidLclppb { lc: u32, lp: u32 },
    /// The stream declared (or implied, via the Index) more than one block.
    MultipleBlocks,
    /// The recorded integrity check did not match the decoded data.
    CheckMismatch,
    /// The Index did not describe the block that was actually decoded.
    BadIndex,
}

#[cfg(feature = "xz")]
impl fmt::Display for XzError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XzError::TooShort => write!(f, "input too short to be a valid .xz stream"),
            XzError::BadStreamMagic => write!(f, "bad .xz stream header magic"),
            XzError::BadFooterMagic => write!(f, "bad .xz stream footer magic"),
            XzError::BadStreamFlags => write!(f, "invalid or inconsistent stream flags"),
            XzError::BadHeaderCrc => write!(f, "header CRC32 mismatch"),
            XzError::UnsupportedFilterCount(n) => {
                write!(f, "unsupported filter count: {} (only 1 is supported)", n)
            }
            XzError::BadBlockFlags(flags) => {
                write!(f, "unsupported block flags {:#x}", flags)
            }
            XzError::UnsupportedFilter(id) => {
                write!(f, "unsupported filter id {:#x} (only LZMA2 is supported)", id)
            }
            XzError::BadFilterPropertiesSize(n) => {
                write!(f, "LZMA2 filter properties size must be 1, got {}", n)
            }
            XzError::InvalidLclppb { lc, lp } => {
                write!(f, "invalid lc/lp: lc={} lp={} (lc + lp must be <= 4)", lc, lp)
            }
            XzError::MultipleBlocks => write!(f, "multi-block .xz streams are not supported"),
            XzError::CheckMismatch => write!(f, "integrity check value did not match"),
            XzError::BadIndex => write!(f, "index does not match the decoded block"),
        }
    }
}

#[cfg(feature = "xz")]
impl From<XzError> for Error {
    fn from(e: XzError) -> Self {
        Error::Xz(e)
    }
}

/// Convenience alias used throughout the `std`-gated API.
pub type Result<T> = core::result::Result<T, Error>;
