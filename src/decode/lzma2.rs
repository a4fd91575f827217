//! The LZMA2 chunk-stream control layer: parses control bytes, drives
//! resets, and hands each chunk's payload to the LZMA symbol decoder
//! (`super::lzma`) or copies it straight through for uncompressed
//! chunks.

use super::lzma::{Lzma, Probabilities, StopReason};
use super::rangecoder::{Exhausted, RangeDecoder};

/// Outcome of a single-call decompression. `NoMemory` is part of the
/// contract's status space but this crate never allocates during
/// decoding, so it is never actually returned; it exists so callers
/// that also drive other backends can match on one `Status` type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    DataError,
    InLimit,
    OutLimit,
    NoMemory,
}

/// A parsed LZMA2 control byte. Reserved byte values (`0x03..=0x7F`)
/// decode to `Reserved` rather than being rejected by the match arm
/// that calls `parse`, so the caller can turn that into `DataError` at
/// the same place it handles every other chunk kind.
enum ChunkControl {
    End,
    Reserved,
    Uncompressed {
        dict_reset: bool,
    },
    Lzma {
        dict_reset: bool,
        state_reset: bool,
        probs_reset: bool,
        properties_reset: bool,
        uncompressed_hi: u8,
    },
}

impl ChunkControl {
    fn parse(control: u8) -> Self {
        match control {
            0x00 => ChunkControl::End,
            0x01 => ChunkControl::Uncompressed { dict_reset: true },
            0x02 => ChunkControl::Uncompressed { dict_reset: false },
            0x03..=0x7F => ChunkControl::Reserved,
            _ => {
                let reset = (control >> 5) & 0x3;
                ChunkControl::Lzma {
                    dict_reset: reset == 3,
                    state_reset: reset >= 1,
                    probs_reset: reset >= 1,
                    properties_reset: reset >= 2,
                    uncompressed_hi: control & 0x1F,
                }
            }
        }
    }
}

/// `lc`, `lp`, `pb` packed the way every LZMA properties byte encodes
/// them: `pb * 45 + lp * 9 + lc`. Bounds (`lc <= 8`, `lp <= 4`) fall out
/// of the byte range check; their *sum* is not validated here (see the
/// literal-table bounds check in `super::lzma::decode_literal`, which
/// is what actually protects the fixed 16-row table against
/// non-compliant streams that pick a combination this byte alone can't
/// rule out).
fn parse_properties(props: u8) -> Option<(u32, u32, u32)> {
    if props > 224 {
        return None;
    }
    let props = props as u32;
    let pb = props / 45;
    let rem = props % 45;
    let lp = rem / 9;
    let lc = rem % 9;
    Some((lc, lp, pb))
}

/// Decompresses a full LZMA2 stream in one call, using caller-supplied
/// `probs` as scratch space instead of allocating. `input` is consumed
/// up to and including the terminating `0x00` control byte on success;
/// partial consumption on `InLimit`/`OutLimit`/`DataError` reflects how
/// far decoding got; re-driving after such a status is not supported
/// (callers needing resumable decoding should buffer a full stream
/// before calling, same as the contract this crate targets).
pub fn lzma2_decompress_raw(
    input: &[u8],
    output: &mut [u8],
    probs: &mut Probabilities,
) -> (usize, usize, Status) {
    let mut lzma = Lzma::new();
    let mut incount = 0usize;
    let mut outcount = 0usize;
    let mut dict_origin = 0usize;
    let mut have_props = false;
    let in_limit = input.len();
    let out_limit_caller = output.len();

    loop {
        if incount >= in_limit {
            return (incount, outcount, Status::InLimit);
        }
        let control = input[incount];
        match ChunkControl::parse(control) {
            ChunkControl::End => {
                return (incount + 1, outcount, Status::Ok);
            }
            ChunkControl::Reserved => {
                return (incount, outcount, Status::DataError);
            }
            ChunkControl::Uncompressed { dict_reset } => {
                if incount + 3 > in_limit {
                    return (incount, outcount, Status::InLimit);
                }
                let size =
                    ((input[incount + 1] as usize) << 8 | input[incount + 2] as usize) + 1;
                let header_end = incount + 3;
                if header_end + size > in_limit {
                    return (incount, outcount, Status::InLimit);
                }
                if dict_reset {
                    dict_origin = outcount;
                }
                let mut copy = size;
                let overflow = out_limit_caller - outcount < copy;
                if overflow {
                    copy = out_limit_caller - outcount;
                }
                output[outcount..outcount + copy]
                    .copy_from_slice(&input[header_end..header_end + copy]);
                outcount += copy;
                incount = header_end + copy;
                if overflow {
                    return (incount, outcount, Status::OutLimit);
                }
            }
            ChunkControl::Lzma {
                dict_reset,
                state_reset,
                probs_reset,
                properties_reset,
                uncompressed_hi,
            } => {
                if !properties_reset && !have_props {
                    // The first LZMA chunk a stream ever sees must
                    // establish lc/lp/pb; nothing has set them yet.
                    return (incount, outcount, Status::DataError);
                }
                if incount + 5 > in_limit {
                    return (incount, outcount, Status::InLimit);
                }
                let uncompressed = ((uncompressed_hi as usize) << 16
                    | (input[incount + 1] as usize) << 8
                    | input[incount + 2] as usize)
                    + 1;
                let compressed =
                    ((input[incount + 3] as usize) << 8 | input[incount + 4] as usize) + 1;
                let mut header_end = incount + 5;

                if properties_reset {
                    if header_end >= in_limit {
                        return (incount, outcount, Status::InLimit);
                    }
                    let props = input[header_end];
                    header_end += 1;
                    match parse_properties(props) {
                        Some((lc, lp, pb)) => {
                            lzma.lc = lc;
                            lzma.lp = lp;
                            lzma.pb = pb;
                        }
                        None => return (incount, outcount, Status::DataError),
                    }
                    have_props = true;
                }
                if dict_reset {
                    dict_origin = outcount;
                }
                if state_reset {
                    lzma.reset_state();
                }
                if probs_reset {
                    probs.reset();
                }

                let chunk_start = header_end;
                if chunk_start + compressed > in_limit {
                    return (incount, outcount, Status::InLimit);
                }
                let chunk_limit = chunk_start + compressed;

                let mut out_limit = outcount + uncompressed;
                let more_run = if out_limit_caller - outcount > uncompressed {
                    true
                } else {
                    out_limit = out_limit_caller;
                    false
                };

                let mut rc = match RangeDecoder::new(input, chunk_start, chunk_limit) {
                    Some(rc) => rc,
                    // Enough bytes exist in the caller's input up to
                    // `chunk_limit` (checked above), so a too-small
                    // `compressed` field here is a corrupt header, not a
                    // starved caller buffer.
                    None => return (incount, outcount, Status::DataError),
                };

                let produced_before = outcount;
                let reason = super::lzma::run(
                    &mut lzma,
                    probs,
                    &mut rc,
                    output,
                    &mut outcount,
                    dict_origin,
                    out_limit,
                    more_run,
                );

                match reason {
                    StopReason::Done => {
                        if more_run {
                            if outcount - produced_before != uncompressed {
                                return (incount, outcount, Status::DataError);
                            }
                        } else if outcount - produced_before < uncompressed {
                            // Filled the caller's whole output buffer
                            // without finishing this chunk's declared
                            // size; the chunk itself isn't corrupt.
                            return (incount, outcount, Status::OutLimit);
                        }
                        if rc.pos() != chunk_limit {
                            return (incount, outcount, Status::DataError);
                        }
                        incount = chunk_limit;
                    }
                    StopReason::OutLimit { produced } => {
                        outcount = produced;
                        return (incount, outcount, Status::OutLimit);
                    }
                    StopReason::DataError => {
                        return (incount, outcount, Status::DataError);
                    }
                    StopReason::Exhausted(Exhausted::ChunkLimit) => {
                        return (incount, outcount, Status::DataError);
                    }
                    StopReason::Exhausted(Exhausted::InputEnd) => {
                        return (incount, outcount, Status::InLimit);
                    }
                }
            }
        }
    }
}

/// `std`-only convenience wrapper that owns its `Probabilities` table
/// (boxed, ~28 KiB) so callers don't need to manage the scratch space
/// themselves across repeated decompressions.
#[cfg(feature = "std")]
pub fn lzma2_decompress(input: &[u8], output: &mut [u8]) -> (usize, usize, Status) {
    let mut probs = alloc_probabilities();
    lzma2_decompress_raw(input, output, &mut probs)
}

#[cfg(feature = "std")]
fn alloc_probabilities() -> alloc::boxed::Box<Probabilities> {
    alloc::boxed::Box::new(Probabilities::new())
}

#[cfg(feature = "std")]
extern crate alloc;

/// Stateful decoder that reuses one boxed `Probabilities` table across
/// calls, for callers decoding many independent streams (or chunks of
/// one stream arriving incrementally is out of scope; see `reset`'s
/// doc comment).
#[cfg(feature = "std")]
pub struct Lzma2Decoder {
    probs: alloc::boxed::Box<Probabilities>,
}

#[cfg(feature = "std")]
impl Lzma2Decoder {
    pub fn new() -> Self {
        Self {
            probs: alloc_probabilities(),
        }
    }

    /// Re-initializes the probability table in place, reusing the
    /// existing allocation. Each `decompress` call already resets
    /// everything an LZMA2 stream's own dict-reset chunk would reset;
    /// this exists for callers who want a fresh decoder without a new
    /// allocation, not for mid-stream resumption.
    pub fn reset(&mut self) {
        self.probs.reset();
    }

    pub fn decompress(&mut self, input: &[u8], output: &mut [u8]) -> crate::error::Result<(usize, usize)> {
        let (consumed, produced, status) = lzma2_decompress_raw(input, output, &mut self.probs);
        match status {
            Status::Ok => Ok((consumed, produced)),
            other => Err(crate::error::Error::Lzma(crate::error::LzmaError {
                status: other,
                consumed,
                produced,
            })),
        }
    }
}

#[cfg(feature = "std")]
impl Default for Lzma2Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probs() -> alloc::boxed::Box<Probabilities> {
        alloc::boxed::Box::new(Probabilities::new())
    }

    #[test]
    fn s1_empty_stream_is_just_the_end_marker() {
        let mut out = [0u8; 0];
        let (c, p, s) = lzma2_decompress_raw(&[0x00], &mut out, &mut probs());
        assert_eq!((c, p, s), (1, 0, Status::Ok));
    }

    #[test]
    fn s5_reserved_control_byte_is_data_error() {
        let mut out = [0u8; 4];
        let (_, _, s) = lzma2_decompress_raw(&[0x03], &mut out, &mut probs());
        assert_eq!(s, Status::DataError);
    }

    #[test]
    fn s6_lzma_chunk_before_properties_is_data_error() {
        // Control byte 0x80: reset level 0 (no dict/state/probs/properties
        // reset), but no earlier chunk has ever set lc/lp/pb.
        let mut out = [0u8; 4];
        let (c, p, s) = lzma2_decompress_raw(&[0x80], &mut out, &mut probs());
        assert_eq!(s, Status::DataError);
        assert_eq!(c, 0);
        assert_eq!(p, 0);
    }

    #[test]
    fn s6_lzma_chunk_with_state_reset_only_is_still_data_error() {
        // Control byte 0xA0: reset level 1 (state + probs reset, but not
        // properties). Still no lc/lp/pb established yet.
        let mut out = [0u8; 4];
        let (_, _, s) = lzma2_decompress_raw(&[0xA0], &mut out, &mut probs());
        assert_eq!(s, Status::DataError);
    }

    #[test]
    fn uncompressed_chunk_round_trips() {
        let stream = [0x01, 0x00, 0x04, b'h', b'e', b'l', b'l', b'o', 0x00];
        let mut out = [0u8; 5];
        let (c, p, s) = lzma2_decompress_raw(&stream, &mut out, &mut probs());
        assert_eq!(s, Status::Ok);
        assert_eq!(c, stream.len());
        assert_eq!(p, 5);
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn uncompressed_chunk_truncated_by_out_limit() {
        let stream = [0x01, 0x00, 0x04, b'h', b'e', b'l', b'l', b'o', 0x00];
        let mut out = [0u8; 3];
        let (_, p, s) = lzma2_decompress_raw(&stream, &mut out, &mut probs());
        assert_eq!(s, Status::OutLimit);
        assert_eq!(p, 3);
        assert_eq!(&out, b"hel");
    }

    #[test]
    fn short_rep0_run_of_a() {
        let stream: [u8; 16] = [
            224, 0, 99, 0, 8, 93, 0, 32, 192, 2, 233, 224, 0, 0, 0, 0,
        ];
        let mut out = [0u8; 100];
        let (c, p, s) = lzma2_decompress_raw(&stream, &mut out, &mut probs());
        assert_eq!(s, Status::Ok);
        assert_eq!(c, stream.len());
        assert_eq!(p, 100);
        assert!(out.iter().all(|&b| b == b'A'));
    }

    #[test]
    fn small_distance_match_abc_repeat() {
        let stream: [u8; 17] = [
            224, 0, 59, 0, 9, 93, 0, 48, 152, 136, 171, 68, 30, 41, 128, 0, 0,
        ];
        let mut out = [0u8; 60];
        let (c, p, s) = lzma2_decompress_raw(&stream, &mut out, &mut probs());
        assert_eq!(s, Status::Ok);
        assert_eq!(c, stream.len());
        assert_eq!(p, 60);
        assert_eq!(&out[..], b"abc".repeat(20).as_slice());
    }

    #[test]
    fn dist_special_reverse_bittree_path() {
        let stream: [u8; 67] = [
            224, 0, 129, 0, 59, 93, 0, 44, 22, 7, 61, 197, 58, 180, 181, 0, 181, 118, 5, 33, 101,
            86, 98, 138, 107, 148, 58, 73, 5, 69, 236, 85, 189, 237, 80, 20, 124, 32, 222, 14, 43,
            226, 108, 201, 157, 185, 45, 6, 151, 109, 187, 30, 226, 93, 141, 227, 108, 143, 235,
            119, 229, 202, 135, 24, 0, 0, 0,
        ];
        let mut out = [0u8; 130];
        let (c, p, s) = lzma2_decompress_raw(&stream, &mut out, &mut probs());
        assert_eq!(s, Status::Ok);
        assert_eq!(c, stream.len());
        assert_eq!(p, 130);
        let mut expected = Vec::new();
        expected.extend(core::iter::repeat(b'X').take(40));
        expected.extend(core::iter::repeat(b' ').take(50));
        expected.extend(core::iter::repeat(b'X').take(40));
        assert_eq!(&out[..], expected.as_slice());
    }

    #[test]
    fn direct_bits_and_align_path() {
        let stream: [u8; 78] = [
            224, 1, 23, 0, 70, 93, 0, 44, 150, 71, 100, 85, 115, 81, 233, 55, 128, 93, 180, 202,
            23, 157, 95, 238, 177, 96, 83, 141, 31, 48, 0, 136, 135, 191, 228, 4, 41, 63, 168, 197,
            244, 28, 223, 12, 212, 248, 63, 58, 26, 73, 246, 193, 101, 224, 118, 240, 91, 170, 146,
            27, 195, 219, 170, 249, 214, 171, 57, 19, 98, 191, 102, 253, 139, 2, 14, 160, 0, 0,
        ];
        let mut out = [0u8; 280];
        let (c, p, s) = lzma2_decompress_raw(&stream, &mut out, &mut probs());
        assert_eq!(s, Status::Ok);
        assert_eq!(c, stream.len());
        assert_eq!(p, 280);
        let mut expected = Vec::new();
        expected.extend(core::iter::repeat(b'Y').take(40));
        expected.extend(core::iter::repeat(b'z').take(200));
        expected.extend(core::iter::repeat(b'Y').take(40));
        assert_eq!(&out[..], expected.as_slice());
    }
}
