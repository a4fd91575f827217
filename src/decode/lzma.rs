//! The LZMA probabilistic symbol decoder: literal/match/rep emission
//! over the 12-state automaton, and the LZ77 byte-copy engine that
//! turns a decoded (length, distance) pair into output bytes.
//!
//! This module knows nothing about chunk framing; it decodes symbols
//! into an output slice until told to stop (`out_limit` reached) or
//! until the range coder runs out of input. The LZMA2 control layer
//! (`super::lzma2`) owns chunk boundaries, resets, and budget
//! accounting.

use super::rangecoder::{Exhausted, LenDecoder, RangeDecoder, RcResult, PROB_INIT};

/// Previous emission was a literal for states `0..LIT_STATES`.
const LIT_STATES: u8 = 7;
const NUM_STATES: usize = 12;
const DIST_SLOTS: u32 = 6; // bittree width 2^6 = 64
const DIST_MODEL_START: u32 = 4;
const DIST_MODEL_END: u32 = 14;
const ALIGN_BITS: u32 = 4;
const DIST_SPECIAL_SIZE: usize = 115; // see `dist_special` layout note below
const MIN_MATCH_LEN: usize = 2;

/// One of the 12 states the reference decoder tracks, summarizing the
/// kinds of the last couple of emissions. Numbered 0-11 exactly as in
/// the source material so that `as u8` stays a direct array index
/// wherever the arithmetic is clearer than a match expression.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LzmaState {
    LitLit = 0,
    MatchLitLit = 1,
    RepLitLit = 2,
    ShortRepLitLit = 3,
    MatchLit = 4,
    RepLit = 5,
    ShortRepLit = 6,
    LitMatch = 7,
    LitLongRep = 8,
    LitShortRep = 9,
    NonLitMatch = 10,
    NonLitRep = 11,
}

impl LzmaState {
    pub(crate) const fn is_literal_state(self) -> bool {
        (self as u8) < LIT_STATES
    }

    fn from_u8(v: u8) -> Self {
        debug_assert!(v < NUM_STATES as u8);
        // SAFETY: all values 0..NUM_STATES are valid discriminants, and
        // callers only ever construct `v` via arithmetic on an existing
        // `LzmaState as u8`.
        unsafe { core::mem::transmute(v) }
    }

    fn after_literal(self) -> Self {
        let s = self as u8;
        Self::from_u8(if s < 4 {
            0
        } else if s < 10 {
            s - 3
        } else {
            s - 6
        })
    }

    fn after_match(self) -> Self {
        Self::from_u8(if self.is_literal_state() { 7 } else { 10 })
    }

    fn after_rep(self) -> Self {
        Self::from_u8(if self.is_literal_state() { 8 } else { 11 })
    }

    fn after_short_rep(self) -> Self {
        Self::from_u8(if self.is_literal_state() { 9 } else { 11 })
    }
}

/// The full probability table for one LZMA stream, laid out as the
/// logical nested sub-tables from the format rather than one flat
/// slice, so `reset()` reads as a walk over named fields instead of an
/// opaque memset. Total variable count is checked by a unit test
/// below.
pub struct Probabilities {
    pub(crate) is_match: [[u16; 16]; NUM_STATES],
    pub(crate) is_rep: [u16; NUM_STATES],
    pub(crate) is_rep0: [u16; NUM_STATES],
    pub(crate) is_rep1: [u16; NUM_STATES],
    pub(crate) is_rep2: [u16; NUM_STATES],
    pub(crate) is_rep0_long: [[u16; 16]; NUM_STATES],
    pub(crate) dist_slot: [[u16; 64]; 4],
    // Indexed as `dist_special[base - slot - 1 + m]`; the real table
    // only needs 114 entries (`FULL_DISTANCES(128) - DIST_MODEL_END(14)`)
    // but the smallest `base - slot - 1` used is -1 for `slot ==
    // DIST_MODEL_START`, so one extra unused slot keeps the indexing
    // arithmetic unsigned throughout.
    pub(crate) dist_special: [u16; DIST_SPECIAL_SIZE],
    pub(crate) dist_align: [u16; 16],
    pub(crate) match_len_dec: LenDecoder,
    pub(crate) rep_len_dec: LenDecoder,
    pub(crate) literal: [[u16; 0x300]; 16],
}

impl Probabilities {
    pub const fn new() -> Self {
        Self {
            is_match: [[PROB_INIT; 16]; NUM_STATES],
            is_rep: [PROB_INIT; NUM_STATES],
            is_rep0: [PROB_INIT; NUM_STATES],
            is_rep1: [PROB_INIT; NUM_STATES],
            is_rep2: [PROB_INIT; NUM_STATES],
            is_rep0_long: [[PROB_INIT; 16]; NUM_STATES],
            dist_slot: [[PROB_INIT; 64]; 4],
            dist_special: [PROB_INIT; DIST_SPECIAL_SIZE],
            dist_align: [PROB_INIT; 16],
            match_len_dec: LenDecoder::new(),
            rep_len_dec: LenDecoder::new(),
            literal: [[PROB_INIT; 0x300]; 16],
        }
    }

    pub(crate) fn reset(&mut self) {
        for row in &mut self.is_match {
            row.fill(PROB_INIT);
        }
        self.is_rep.fill(PROB_INIT);
        self.is_rep0.fill(PROB_INIT);
        self.is_rep1.fill(PROB_INIT);
        self.is_rep2.fill(PROB_INIT);
        for row in &mut self.is_rep0_long {
            row.fill(PROB_INIT);
        }
        for row in &mut self.dist_slot {
            row.fill(PROB_INIT);
        }
        self.dist_special.fill(PROB_INIT);
        self.dist_align.fill(PROB_INIT);
        self.match_len_dec.reset();
        self.rep_len_dec.reset();
        for row in &mut self.literal {
            row.fill(PROB_INIT);
        }
    }
}

impl Default for Probabilities {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable decoding frame threaded through one LZMA stream's lifetime
/// (which may span several LZMA2 chunks when later chunks don't reset
/// state). Owned by `Lzma2Decoder`.
pub(crate) struct Lzma {
    pub(crate) state: LzmaState,
    pub(crate) rep: [usize; 4],
    pub(crate) lc: u32,
    pub(crate) lp: u32,
    pub(crate) pb: u32,
}

impl Lzma {
    pub(crate) const fn new() -> Self {
        Self {
            state: LzmaState::LitLit,
            rep: [0; 4],
            lc: 0,
            lp: 0,
            pb: 0,
        }
    }

    pub(crate) fn reset_state(&mut self) {
        self.state = LzmaState::LitLit;
        self.rep = [0; 4];
    }

    fn pos_state(&self, pos_in_dict: usize) -> usize {
        pos_in_dict & ((1 << self.pb) - 1)
    }
}

/// Why the symbol loop stopped.
pub(crate) enum StopReason {
    /// Reached `out_limit`; no error.
    Done,
    /// The range coder ran out of input mid-symbol.
    Exhausted(Exhausted),
    /// Format-level corruption (bad back-reference, or literal context
    /// index overflowing the fixed 16-row table because `lc + lp > 4`
    /// — a combination no compliant encoder ever produces, but one a
    /// safe decoder must still reject rather than index out of bounds).
    DataError,
    /// A match or rep would overflow `out_limit`, which this chunk's
    /// declared `uncompressed` size says should not happen for a
    /// caller-buffer-limited chunk (`more_run == false`). `produced` is
    /// how many bytes of the overflowing copy fit before the limit.
    OutLimit { produced: usize },
}

/// Runs the symbol decoder, appending bytes to `out[*outcount..]` until
/// `*outcount == out_limit` or input runs out. `dict_origin` is the
/// output offset of the most recent dictionary reset; back-references
/// may not cross it. `more_run` selects whether output overflow mid-copy
/// is `DataError` (declared size should have fit) or `OutLimit`
/// (caller's buffer is the binding constraint).
pub(crate) fn run(
    lzma: &mut Lzma,
    probs: &mut Probabilities,
    rc: &mut RangeDecoder,
    out: &mut [u8],
    outcount: &mut usize,
    dict_origin: usize,
    out_limit: usize,
    more_run: bool,
) -> StopReason {
    loop {
        // Lookahead normalize for the symbol about to be decoded, done
        // unconditionally before the out_limit check so a symbol already
        // fully committed on the previous iteration is never retracted
        // by a normalize failure belonging to the *next* one.
        if let Err(e) = rc.normalize() {
            return StopReason::Exhausted(e);
        }
        if *outcount >= out_limit {
            return StopReason::Done;
        }
        let pos_state = lzma.pos_state(*outcount - dict_origin);
        let state_idx = lzma.state as usize;

        let is_match = match rc.decode_bit(&mut probs.is_match[state_idx][pos_state]) {
            Ok(b) => b,
            Err(e) => return StopReason::Exhausted(e),
        };

        if !is_match {
            match decode_literal(lzma, probs, rc, out, *outcount, dict_origin) {
                Ok(byte) => {
                    out[*outcount] = byte;
                    *outcount += 1;
                    lzma.state = lzma.state.after_literal();
                    continue;
                }
                Err(StopReason::Done) => unreachable!(),
                Err(other) => return other,
            }
        }

        let (length, dist): (usize, usize);
        let is_rep = match rc.decode_bit(&mut probs.is_rep[state_idx]) {
            Ok(b) => b,
            Err(e) => return StopReason::Exhausted(e),
        };
        if is_rep {
            let is_rep0 = match rc.decode_bit(&mut probs.is_rep0[state_idx]) {
                Ok(b) => b,
                Err(e) => return StopReason::Exhausted(e),
            };
            if !is_rep0 {
                let is_long = match rc.decode_bit(&mut probs.is_rep0_long[state_idx][pos_state]) {
                    Ok(b) => b,
                    Err(e) => return StopReason::Exhausted(e),
                };
                if !is_long {
                    // short rep: length 1, distance rep[0], no rep rotation.
                    dist = lzma.rep[0];
                    length = 1;
                    lzma.state = lzma.state.after_short_rep();
                } else {
                    dist = lzma.rep[0];
                    length = match lzma.rep_len_dec_decode(probs, rc, pos_state) {
                        Ok(l) => l,
                        Err(e) => return StopReason::Exhausted(e),
                    };
                    lzma.state = lzma.state.after_rep();
                }
            } else {
                let idx = match decode_rep_index(lzma, probs, rc) {
                    Ok(i) => i,
                    Err(e) => return StopReason::Exhausted(e),
                };
                dist = lzma.rep[idx];
                for i in (0..idx).rev() {
                    lzma.rep[i + 1] = lzma.rep[i];
                }
                lzma.rep[0] = dist;
                length = match lzma.rep_len_dec_decode(probs, rc, pos_state) {
                    Ok(l) => l,
                    Err(e) => return StopReason::Exhausted(e),
                };
                lzma.state = lzma.state.after_rep();
            }
        } else {
            lzma.rep[3] = lzma.rep[2];
            lzma.rep[2] = lzma.rep[1];
            lzma.rep[1] = lzma.rep[0];
            let length_code = match probs.match_len_dec.decode(rc, pos_state) {
                Ok(l) => l,
                Err(e) => return StopReason::Exhausted(e),
            };
            length = length_code as usize + MIN_MATCH_LEN;
            dist = match decode_distance(probs, rc, length_code) {
                Ok(d) => d,
                Err(e) => return StopReason::Exhausted(e),
            };
            lzma.rep[0] = dist;
            lzma.state = lzma.state.after_match();
        }

        if *outcount - dict_origin <= dist {
            return StopReason::DataError;
        }

        let mut copy_len = length;
        let mut overflow = false;
        if out_limit - *outcount < copy_len {
            copy_len = out_limit - *outcount;
            overflow = true;
        }
        for _ in 0..copy_len {
            out[*outcount] = out[*outcount - dist - 1];
            *outcount += 1;
        }
        if overflow {
            return if more_run {
                StopReason::DataError
            } else {
                StopReason::OutLimit { produced: *outcount }
            };
        }
    }
}

impl Lzma {
    fn rep_len_dec_decode(
        &self,
        probs: &mut Probabilities,
        rc: &mut RangeDecoder,
        pos_state: usize,
    ) -> RcResult<usize> {
        probs
            .rep_len_dec
            .decode(rc, pos_state)
            .map(|l| l as usize + MIN_MATCH_LEN)
    }
}

fn decode_rep_index(
    lzma: &Lzma,
    probs: &mut Probabilities,
    rc: &mut RangeDecoder,
) -> RcResult<usize> {
    let state_idx = lzma.state as usize;
    if !rc.decode_bit(&mut probs.is_rep1[state_idx])? {
        Ok(1)
    } else if !rc.decode_bit(&mut probs.is_rep2[state_idx])? {
        Ok(2)
    } else {
        Ok(3)
    }
}

/// Decodes one literal byte, handling both the plain 8-bit bittree
/// (previous emission was a literal) and the "matched literal" variant
/// that biases decoding toward the byte at `rep[0]` (previous emission
/// was a match). Returns `StopReason::DataError` both for an
/// unavailable matched-literal source byte and for a literal-context
/// row index that would overflow the fixed 16-row table.
fn decode_literal(
    lzma: &Lzma,
    probs: &mut Probabilities,
    rc: &mut RangeDecoder,
    out: &[u8],
    outcount: usize,
    dict_origin: usize,
) -> Result<u8, StopReason> {
    let prev_byte = if outcount > dict_origin {
        out[outcount - 1]
    } else {
        0
    };
    let lit_state = (((outcount - dict_origin) & ((1 << lzma.lp) - 1)) << lzma.lc)
        | (prev_byte as usize >> (8 - lzma.lc));
    if lit_state >= probs.literal.len() {
        return Err(StopReason::DataError);
    }
    let row = &mut probs.literal[lit_state];

    let mut symbol: u32 = 1;
    if lzma.state.is_literal_state() {
        while symbol < 0x100 {
            let bit = rc
                .decode_bit(&mut row[symbol as usize])
                .map_err(StopReason::Exhausted)?;
            symbol = (symbol << 1) | bit as u32;
        }
    } else {
        if outcount - dict_origin <= lzma.rep[0] {
            return Err(StopReason::DataError);
        }
        let mut match_byte = out[outcount - lzma.rep[0] - 1];
        while symbol < 0x100 {
            let match_bit = ((match_byte >> 7) & 1) as u32;
            match_byte <<= 1;
            let idx = ((1 + match_bit) << 8) as usize + symbol as usize;
            let bit = rc.decode_bit(&mut row[idx]).map_err(StopReason::Exhausted)?;
            symbol = (symbol << 1) | bit as u32;
            if match_bit != bit as u32 {
                while symbol < 0x100 {
                    let bit = rc
                        .decode_bit(&mut row[symbol as usize])
                        .map_err(StopReason::Exhausted)?;
                    symbol = (symbol << 1) | bit as u32;
                }
                break;
            }
        }
    }
    Ok((symbol & 0xFF) as u8)
}

/// Decodes a new-match distance: a 6-bit `dist_slot` bittree selected
/// by `min(length_code, 3)`, then 0, a reverse bittree, or a
/// direct-bits-plus-align-bittree pair of extra bits depending on the
/// slot, per the classic LZMA distance table layout.
fn decode_distance(
    probs: &mut Probabilities,
    rc: &mut RangeDecoder,
    length_code: u32,
) -> RcResult<usize> {
    let len_state = (length_code as usize).min(3);
    let slot = rc.decode_bittree(&mut probs.dist_slot[len_state], 0, DIST_SLOTS)?;
    if slot < DIST_MODEL_START {
        return Ok(slot as usize);
    }
    let footer_bits = (slot >> 1) - 1;
    let base = ((2 | (slot & 1)) << footer_bits) as usize;
    if slot < DIST_MODEL_END {
        let extra = rc.decode_rev_bittree(&mut probs.dist_special, base - slot as usize - 1, footer_bits)?;
        Ok(base + extra as usize)
    } else {
        let high = rc.decode_direct_bits(footer_bits - ALIGN_BITS)?;
        let low = rc.decode_rev_bittree(&mut probs.dist_align, 0, ALIGN_BITS)?;
        Ok(base + ((high << ALIGN_BITS) | low) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probability_count_matches_spec() {
        let p = Probabilities::new();
        let total = p.is_match.len() * p.is_match[0].len()
            + p.is_rep.len()
            + p.is_rep0.len()
            + p.is_rep1.len()
            + p.is_rep2.len()
            + p.is_rep0_long.len() * p.is_rep0_long[0].len()
            + p.dist_slot.len() * p.dist_slot[0].len()
            + p.dist_special.len()
            + p.dist_align.len()
            + 2 + 2 // match_len_dec.choice/choice2, rep_len_dec.choice/choice2
            + 2 * (16 * 8 + 16 * 8 + 256)
            + p.literal.len() * p.literal[0].len();
        // One extra slot in dist_special beyond the classic 114-entry
        // table, kept for indexing convenience (see field doc comment).
        assert_eq!(total, 1846 + 16 * 0x300 + 1);
    }

    #[test]
    fn state_transitions_match_reference_tables() {
        assert_eq!(LzmaState::LitLit.after_literal() as u8, 0);
        assert_eq!(LzmaState::NonLitRep.after_literal() as u8, 5);
        assert_eq!(LzmaState::NonLitMatch.after_literal() as u8, 4);
        assert!(LzmaState::LitLit.is_literal_state());
        assert!(!LzmaState::LitMatch.is_literal_state());
        assert_eq!(LzmaState::LitLit.after_match() as u8, 7);
        assert_eq!(LzmaState::NonLitMatch.after_match() as u8, 10);
        assert_eq!(LzmaState::LitLit.after_rep() as u8, 8);
        assert_eq!(LzmaState::NonLitMatch.after_rep() as u8, 11);
        assert_eq!(LzmaState::LitLit.after_short_rep() as u8, 9);
        assert_eq!(LzmaState::NonLitMatch.after_short_rep() as u8, 11);
    }
}
