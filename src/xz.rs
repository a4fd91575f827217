//! Minimal `.xz` container recognition.
//!
//! Strips the Stream Header, a single Block Header, and the Stream
//! Footer off a single-block, single-filter (LZMA2 only) `.xz` file and
//! hands the contiguous LZMA2 chunk stream in between to
//! [`crate::lzma2_decompress_raw`]. This is a fixed-offset header
//! stripper, not a general container parser: multiple blocks, filter
//! chains, or filters other than LZMA2 are rejected rather than
//! skipped.
//!
//! Grounded in the `.xz` sniffing logic of the C reference's test
//! driver (magic/CRC32 offsets, the block-header-size-in-units-of-4
//! encoding, the footer backward-size arithmetic), with the properties
//! validation this crate needs that the driver itself didn't bother
//! with since it trusted its own test fixtures.

use byteorder::{ByteOrder, LittleEndian};

use crate::decode::lzma::Probabilities;
use crate::decode::lzma2::{lzma2_decompress_raw, Status};
use crate::error::{Error, LzmaError, Result, XzError};

const STREAM_HEADER_MAGIC: [u8; 6] = [0xFD, b'7', b'z', b'X', b'Z', 0x00];
const STREAM_FOOTER_MAGIC: [u8; 2] = [b'Y', b'Z'];
const LZMA2_FILTER_ID: u8 = 0x21;

/// The Stream Flags check-type nibble, selecting how the trailing
/// integrity value over the decoded Block data is sized. Any nibble
/// value is accepted and sized with the format's general
/// `4 << ((checktype - 1) / 3)` rule (matching `test-unlzma2.c`'s own
/// `checksize` computation), so the trailer is always skipped
/// correctly; but this stripper only ever *verifies* `Crc32`, matching
/// the reference driver's own `FMT_XZ_CRC32`-only check, which is the
/// only kind spec.md's optional integrity check covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckType {
    None,
    Crc32,
    Other(u8),
}

impl CheckType {
    fn from_nibble(n: u8) -> Result<Self> {
        match n {
            0x0..=0xF => Ok(match n {
                0x0 => CheckType::None,
                0x1 => CheckType::Crc32,
                other => CheckType::Other(other),
            }),
            _ => Err(Error::Xz(XzError::BadStreamFlags)),
        }
    }

    fn trailer_len(self) -> usize {
        match self {
            CheckType::None => 0,
            CheckType::Crc32 => 4,
            CheckType::Other(n) => 4usize << ((n as usize - 1) / 3),
        }
    }
}

/// Caller-selected behavior for the optional trailing integrity check.
/// Decoding always succeeds on a structurally valid container
/// regardless of this flag; only with `verify_check` set does a
/// recorded/computed mismatch turn into `Err`.
#[derive(Debug, Clone, Copy, Default)]
pub struct XzOptions {
    pub verify_check: bool,
}

fn crc32(data: &[u8]) -> u32 {
    crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC).checksum(data)
}

struct StreamHeader {
    check: CheckType,
}

fn parse_stream_header(input: &[u8]) -> Result<StreamHeader> {
    if input.len() < 12 {
        return Err(Error::Xz(XzError::TooShort));
    }
    if input[..6] != STREAM_HEADER_MAGIC[..] {
        return Err(Error::Xz(XzError::BadStreamMagic));
    }
    let flags = LittleEndian::read_u16(&input[6..8]);
    if flags & !0x0F00 != 0 {
        return Err(Error::Xz(XzError::BadStreamFlags));
    }
    if crc32(&input[6..8]) != LittleEndian::read_u32(&input[8..12]) {
        return Err(Error::Xz(XzError::BadHeaderCrc));
    }
    let check = CheckType::from_nibble((flags >> 8) as u8)?;
    Ok(StreamHeader { check })
}

/// Parsed Block Header: just enough to locate the LZMA2 chunk stream
/// and validate that this is a block our core can handle.
struct BlockHeader {
    /// Byte offset (from the start of the Block Header) where the
    /// Block data begins.
    header_len: usize,
}

fn parse_block_header(input: &[u8]) -> Result<BlockHeader> {
    let size_byte = input[0];
    let header_len = (size_byte as usize) * 4;
    if header_len < 8 || input.len() < header_len {
        return Err(Error::Xz(XzError::TooShort));
    }
    if crc32(&input[..header_len - 4]) != LittleEndian::read_u32(&input[header_len - 4..header_len]) {
        return Err(Error::Xz(XzError::BadHeaderCrc));
    }
    let flags = input[1];
    let filter_count = (flags & 0x03) + 1;
    if filter_count != 1 {
        return Err(Error::Xz(XzError::UnsupportedFilterCount(filter_count)));
    }
    if flags & 0xFC != 0 {
        // Bits 2-3 are the Compressed/Uncompressed Size present flags
        // (this stripper doesn't decode either VLI); bits 4-7 are
        // reserved and must be zero.
        return Err(Error::Xz(XzError::BadBlockFlags(flags)));
    }
    let mut pos = 2;
    let filter_id = input[pos];
    if filter_id != LZMA2_FILTER_ID {
        return Err(Error::Xz(XzError::UnsupportedFilter(filter_id as u64)));
    }
    pos += 1;
    let props_size = input[pos];
    pos += 1;
    if props_size != 1 {
        return Err(Error::Xz(XzError::BadFilterPropertiesSize(props_size)));
    }
    // The single properties byte is the LZMA2 dictionary-size code.
    // The core never allocates a window, so the value itself is
    // unused, but reading it keeps `pos` aligned with the real format.
    let _dict_size_code = input[pos];

    Ok(BlockHeader { header_len })
}

struct StreamFooter {
    backward_size: usize,
}

fn parse_stream_footer(input: &[u8], header_flags: u16) -> Result<StreamFooter> {
    let n = input.len();
    if n < 12 {
        return Err(Error::Xz(XzError::TooShort));
    }
    let footer = &input[n - 12..];
    if footer[10..12] != STREAM_FOOTER_MAGIC[..] {
        return Err(Error::Xz(XzError::BadFooterMagic));
    }
    if crc32(&footer[4..10]) != LittleEndian::read_u32(&footer[0..4]) {
        return Err(Error::Xz(XzError::BadHeaderCrc));
    }
    let backward_size = (LittleEndian::read_u32(&footer[4..8]) as usize + 1) * 4;
    let footer_flags = LittleEndian::read_u16(&footer[8..10]);
    if footer_flags != header_flags {
        return Err(Error::Xz(XzError::BadStreamFlags));
    }
    Ok(StreamFooter { backward_size })
}

/// `xz`-valid streams constrain `lc + lp <= 4` (so that `lc + lp + pb`
/// stays small enough for a real encoder's window), a stricter
/// contract than the core's own `props <= 224` check. The core accepts
/// any combination the fixed 16-row literal table can still safely
/// index (rejecting the rest lazily, per-symbol); this stripper instead
/// rejects a non-compliant first chunk up front, matching what a real
/// `.xz` decoder would refuse to open at all. Only the first chunk is
/// inspected: it is always the one that establishes `lc`/`lp` for a
/// freshly opened stream.
fn validate_first_chunk_lc_lp(chunk_stream: &[u8]) -> Result<()> {
    if let Some(&control) = chunk_stream.first() {
        if control >= 0xC0 {
            // reset >= 2: a properties byte follows the 5-byte chunk
            // header (control + 2-byte uncompressed size + 2-byte
            // compressed size).
            if let Some(&props) = chunk_stream.get(5) {
                if props <= 224 {
                    let lp = (props as u32 % 45) / 9;
                    let lc = (props as u32 % 45) % 9;
                    if lc + lp > 4 {
                        return Err(Error::Xz(XzError::InvalidLclppb { lc, lp }));
                    }
                }
            }
        }
    }
    Ok(())
}

/// Decompresses a single-block `.xz` file, validating the container
/// framing and (optionally) the recorded integrity check, then
/// decoding the enclosed LZMA2 stream with `lzma2_decompress_raw`.
pub fn xz_decompress(input: &[u8], output: &mut [u8], options: XzOptions) -> Result<(usize, usize)> {
    let header = parse_stream_header(input)?;
    let header_flags = LittleEndian::read_u16(&input[6..8]);

    if input.len() < 12 + 1 || input[12] == 0 {
        // Index Indicator in place of a Block Header: an empty stream.
        // Nothing to decode; still require a well-formed footer so a
        // truncated file isn't silently accepted as "empty".
        parse_stream_footer(input, header_flags)?;
        return Ok((input.len(), 0));
    }

    let block = parse_block_header(&input[12..])?;
    let block_data_start = 12 + block.header_len;
    if block_data_start >= input.len() {
        return Err(Error::Xz(XzError::TooShort));
    }

    let footer = parse_stream_footer(input, header_flags)?;
    let footer_start = input.len() - 12;
    let index_start = footer_start - footer.backward_size;
    if index_start <= block_data_start || index_start > input.len() {
        return Err(Error::Xz(XzError::BadIndex));
    }
    if input[index_start] != 0x00 {
        return Err(Error::Xz(XzError::BadIndex));
    }
    if index_start + 1 >= input.len() || input[index_start + 1] != 0x01 {
        return Err(Error::Xz(XzError::MultipleBlocks));
    }

    let trailer_len = header.check.trailer_len();
    if index_start < trailer_len || index_start - trailer_len <= block_data_start {
        return Err(Error::Xz(XzError::BadIndex));
    }
    // Everything from here to the check value is the LZMA2 chunk
    // stream plus, possibly, zero padding up to a 4-byte boundary;
    // the core stops at its own end-of-stream control byte, so the
    // padding (if any) is simply never read.
    let block_data_end = index_start - trailer_len;
    let chunk_stream = &input[block_data_start..block_data_end];

    validate_first_chunk_lc_lp(chunk_stream)?;

    let mut probs = Probabilities::new();
    let (consumed, produced, status) = lzma2_decompress_raw(chunk_stream, output, &mut probs);
    if status != Status::Ok {
        return Err(Error::Lzma(LzmaError {
            status,
            consumed: block_data_start + consumed,
            produced,
        }));
    }

    // A stream declaring a check type other than None/CRC32 is still
    // decoded and its trailer correctly skipped (`trailer_len` above),
    // but this stripper has no way to compute CRC64 or SHA-256, so
    // `verify_check` is a no-op for those streams rather than a hard
    // error; spec.md's own optional integrity check is CRC32-only.
    if options.verify_check && header.check == CheckType::Crc32 {
        let recorded = &input[block_data_end..block_data_end + trailer_len];
        if crc32(&output[..produced]).to_le_bytes()[..] != recorded[..] {
            return Err(Error::Xz(XzError::CheckMismatch));
        }
    }

    Ok((input.len(), produced))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_header(check: u8) -> [u8; 12] {
        let mut h = [0u8; 12];
        h[..6].copy_from_slice(&STREAM_HEADER_MAGIC);
        h[7] = check;
        let crc = crc32(&h[6..8]);
        LittleEndian::write_u32(&mut h[8..12], crc);
        h
    }

    #[test]
    fn empty_stream_round_trips() {
        let header = stream_header(0);
        let mut stream = Vec::new();
        stream.extend_from_slice(&header);
        // Index: Indicator 0x00, Number of Records vli 0x00, pad to 4,
        // CRC32 over those 2 bytes + 2 bytes padding.
        let index_start = stream.len();
        stream.push(0x00);
        stream.push(0x00);
        while stream.len() % 4 != 0 {
            stream.push(0x00);
        }
        let index_crc = crc32(&stream[index_start..]);
        let mut crc_bytes = [0u8; 4];
        LittleEndian::write_u32(&mut crc_bytes, index_crc);
        stream.extend_from_slice(&crc_bytes);

        let backward_size = ((stream.len() - index_start) / 4) as u32 - 1;
        let mut footer = [0u8; 12];
        LittleEndian::write_u32(&mut footer[4..8], backward_size);
        footer[8] = header[6];
        footer[9] = header[7];
        footer[10..12].copy_from_slice(&STREAM_FOOTER_MAGIC);
        let footer_crc = crc32(&footer[4..10]);
        LittleEndian::write_u32(&mut footer[0..4], footer_crc);
        stream.extend_from_slice(&footer);

        let mut out = [0u8; 0];
        let (consumed, produced) = xz_decompress(&stream, &mut out, XzOptions::default()).unwrap();
        assert_eq!(consumed, stream.len());
        assert_eq!(produced, 0);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut out = [0u8; 4];
        let err = xz_decompress(&[0u8; 20], &mut out, XzOptions::default()).unwrap_err();
        assert_eq!(err, Error::Xz(XzError::BadStreamMagic));
    }

    /// Builds a single-block `.xz` stream wrapping `chunk_stream`, with a
    /// CRC32 check type and `trailer` as the recorded check value (the
    /// caller supplies it directly so a mismatch test can pass a
    /// deliberately wrong one).
    fn xz_stream_with_crc32_trailer(chunk_stream: &[u8], trailer: &[u8; 4]) -> Vec<u8> {
        let header = stream_header(1); // check-type nibble 1 == CRC32
        let mut stream = Vec::new();
        stream.extend_from_slice(&header);

        // Block Header: size_byte=3 (header_len=12), no size flags, one
        // LZMA2 filter, 1-byte properties, then 3 bytes of padding up to
        // the CRC32 at the last 4 bytes of the 12-byte header.
        let mut block_header = [0u8; 12];
        block_header[0] = 3;
        block_header[1] = 0;
        block_header[2] = LZMA2_FILTER_ID;
        block_header[3] = 1;
        block_header[4] = 0; // dictionary-size code, unused by the core
        let crc = crc32(&block_header[..8]);
        LittleEndian::write_u32(&mut block_header[8..12], crc);
        stream.extend_from_slice(&block_header);

        stream.extend_from_slice(chunk_stream);
        stream.extend_from_slice(trailer);

        let index_start = stream.len();
        stream.push(0x00); // Index Indicator
        stream.push(0x01); // Number of Records
        while stream.len() % 4 != 0 {
            stream.push(0x00);
        }
        let index_crc = crc32(&stream[index_start..]);
        let mut crc_bytes = [0u8; 4];
        LittleEndian::write_u32(&mut crc_bytes, index_crc);
        stream.extend_from_slice(&crc_bytes);

        let backward_size = ((stream.len() - index_start) / 4) as u32 - 1;
        let mut footer = [0u8; 12];
        LittleEndian::write_u32(&mut footer[4..8], backward_size);
        footer[8] = header[6];
        footer[9] = header[7];
        footer[10..12].copy_from_slice(&STREAM_FOOTER_MAGIC);
        let footer_crc = crc32(&footer[4..10]);
        LittleEndian::write_u32(&mut footer[0..4], footer_crc);
        stream.extend_from_slice(&footer);

        stream
    }

    // The known 16-byte LZMA2 chunk stream (shared with the core's own
    // tests) that decodes to 100 repeats of b'A'.
    const A_CHUNK_STREAM: [u8; 16] = [224, 0, 99, 0, 8, 93, 0, 32, 192, 2, 233, 224, 0, 0, 0, 0];

    #[test]
    fn verify_check_accepts_matching_crc32() {
        let expected = [b'A'; 100];
        let trailer_crc = crc32(&expected);
        let mut trailer = [0u8; 4];
        LittleEndian::write_u32(&mut trailer, trailer_crc);
        let stream = xz_stream_with_crc32_trailer(&A_CHUNK_STREAM, &trailer);

        let mut out = [0u8; 100];
        let options = XzOptions { verify_check: true };
        let (consumed, produced) = xz_decompress(&stream, &mut out, options).unwrap();
        assert_eq!(consumed, stream.len());
        assert_eq!(produced, 100);
        assert_eq!(&out[..], &expected[..]);
    }

    #[test]
    fn verify_check_rejects_mismatched_crc32() {
        let expected = [b'A'; 100];
        let trailer_crc = crc32(&expected).wrapping_add(1);
        let mut trailer = [0u8; 4];
        LittleEndian::write_u32(&mut trailer, trailer_crc);
        let stream = xz_stream_with_crc32_trailer(&A_CHUNK_STREAM, &trailer);

        let mut out = [0u8; 100];
        let options = XzOptions { verify_check: true };
        let err = xz_decompress(&stream, &mut out, options).unwrap_err();
        assert_eq!(err, Error::Xz(XzError::CheckMismatch));
    }

    #[test]
    fn verify_check_false_ignores_mismatched_crc32() {
        let expected = [b'A'; 100];
        let trailer_crc = crc32(&expected).wrapping_add(1);
        let mut trailer = [0u8; 4];
        LittleEndian::write_u32(&mut trailer, trailer_crc);
        let stream = xz_stream_with_crc32_trailer(&A_CHUNK_STREAM, &trailer);

        let mut out = [0u8; 100];
        let (consumed, produced) =
            xz_decompress(&stream, &mut out, XzOptions::default()).unwrap();
        assert_eq!(consumed, stream.len());
        assert_eq!(produced, 100);
    }
}
