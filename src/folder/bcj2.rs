//! BCJ2's demultiplexing x86 branch-converter.
//!
//! Unlike the BCJ filters (one input, one output, reversible by XOR-ing
//! address deltas in place), BCJ2 splits converted call/jump targets out
//! into two side channels at encode time, plus a range-coded bitstream that
//! records which `0xE8`/`0xE9`/near-`Jcc` occurrences were actually
//! converted (as opposed to incidental byte values). Decoding re-threads
//! the four streams back into one.

use crate::error::Error;

const NUM_MOVE_BITS: u32 = 5;
const NUM_BIT_MODEL_TOTAL_BITS: u32 = 11;
const BIT_MODEL_TOTAL: u32 = 1 << NUM_BIT_MODEL_TOTAL_BITS;
const TOP_VALUE: u32 = 1 << 24;
const PROB_INIT: u16 = (BIT_MODEL_TOTAL / 2) as u16;
/// One context per possible byte preceding an `0xE8`, plus one for `0xE9`,
/// plus one for the two-byte near-`Jcc` (`0x0F 0x8x`) form.
const NUM_PROBS: usize = 256 + 2;

struct RangeDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    range: u32,
    code: u32,
}

impl<'a> RangeDecoder<'a> {
    fn new(data: &'a [u8]) -> Result<Self, Error> {
        if data.len() < 5 {
            return Err(Error::data("BCJ2 range-coder stream too short"));
        }
        // First byte is always zero and carries no information; matches
        // the 5-byte range-coder preamble used throughout the LZMA family.
        let mut dec = Self {
            data,
            pos: 1,
            range: 0xFFFF_FFFF,
            code: 0,
        };
        for _ in 0..4 {
            let b = dec.next_byte()?;
            dec.code = (dec.code << 8) | b as u32;
        }
        Ok(dec)
    }

    fn next_byte(&mut self) -> Result<u8, Error> {
        let b = self
            .data
            .get(self.pos)
            .copied()
            .ok_or_else(|| Error::data("BCJ2 range-coder stream exhausted"))?;
        self.pos += 1;
        Ok(b)
    }

    fn decode_bit(&mut self, prob: &mut u16) -> Result<u32, Error> {
        if self.range < TOP_VALUE {
            self.range <<= 8;
            self.code = (self.code << 8) | self.next_byte()? as u32;
        }
        let bound = (self.range >> NUM_BIT_MODEL_TOTAL_BITS) * (*prob as u32);
        if self.code < bound {
            self.range = bound;
            *prob += ((BIT_MODEL_TOTAL - *prob as u32) >> NUM_MOVE_BITS) as u16;
            Ok(0)
        } else {
            self.range -= bound;
            self.code -= bound;
            *prob -= *prob >> NUM_MOVE_BITS;
            Ok(1)
        }
    }

    /// Whether the range-coder cursor has reached the end of its buffer.
    /// Part of the "maybe-finished" terminal condition alongside the three
    /// byte-stream cursors: a well-formed BCJ2 stream consumes its range
    /// coder exactly when the output reaches its declared size.
    fn is_exhausted(&self) -> bool {
        self.pos == self.data.len()
    }
}

/// Reassembles the original byte stream from BCJ2's four sub-streams.
///
/// `rc` is the range-coder stream, `main` the bulk of the data (including
/// every trigger byte, converted or not), and `call`/`jump` hold the
/// absolute, big-endian target addresses for converted `0xE8` and
/// `0xE9`/near-`Jcc` instructions respectively. `unpack_size` is the exact
/// size of the decoded folder this coder contributes to; decoding stops the
/// instant that many bytes have been produced.
pub(crate) fn decode(
    main: &[u8],
    call: &[u8],
    jump: &[u8],
    rc: &[u8],
    unpack_size: usize,
) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(unpack_size);
    let mut probs = [PROB_INIT; NUM_PROBS];
    let mut rc = RangeDecoder::new(rc)?;
    let mut main_pos = 0usize;
    let mut call_pos = 0usize;
    let mut jump_pos = 0usize;
    let mut prev_byte = 0u8;

    while out.len() < unpack_size {
        let b = *main
            .get(main_pos)
            .ok_or_else(|| Error::data("BCJ2 main stream exhausted before folder was complete"))?;
        main_pos += 1;
        out.push(b);
        if out.len() == unpack_size {
            break;
        }

        let is_near_jcc = prev_byte == 0x0F && (b & 0xF0) == 0x80;
        if b != 0xE8 && b != 0xE9 && !is_near_jcc {
            prev_byte = b;
            continue;
        }

        let prob_index = if b == 0xE8 {
            prev_byte as usize
        } else if b == 0xE9 {
            256
        } else {
            257
        };
        let converted = rc.decode_bit(&mut probs[prob_index])? == 1;
        if !converted {
            prev_byte = b;
            continue;
        }

        let (source, source_pos) = if b == 0xE8 {
            (call, &mut call_pos)
        } else {
            (jump, &mut jump_pos)
        };
        let bytes = source
            .get(*source_pos..*source_pos + 4)
            .ok_or_else(|| Error::data("BCJ2 call/jump stream exhausted"))?;
        let dest = u32::from_be_bytes(bytes.try_into().unwrap());
        *source_pos += 4;

        let rel = dest.wrapping_sub(out.len() as u32 + 4);
        out.extend_from_slice(&rel.to_le_bytes());
        if out.len() >= unpack_size {
            out.truncate(unpack_size);
            break;
        }
        prev_byte = *out.last().unwrap();
    }

    // "Maybe-finished": per the folder's declared sizes, a well-formed
    // encoding consumes every byte of all four sub-streams — main, call,
    // jump, and the range coder — exactly when `out` reaches its final
    // size; leftover bytes in any of them mean the streams were cut at the
    // wrong point.
    if main_pos != main.len() || call_pos != call.len() || jump_pos != jump.len() || !rc.is_exhausted()
    {
        return Err(Error::data(
            "BCJ2 sub-streams not fully consumed when output reached its declared size",
        ));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_main_stream_passes_through() {
        let main = b"hello, world, no branches here".to_vec();
        let out = decode(&main, &[], &[], &[0u8; 5], main.len()).unwrap();
        assert_eq!(out, main);
    }

    #[test]
    fn converts_a_call_instruction() {
        // main: a single 0xE8 trigger byte, nothing else.
        let main = vec![0xE8u8];
        // range coder must decode a single `1` bit for probability index
        // `prev_byte` (0, since nothing precedes it). With all probabilities
        // at their initial midpoint, a code of all-ones selects the upper
        // (bit=1) interval.
        let rc = [0x00, 0xFF, 0xFF, 0xFF, 0xFF];
        // dest = 0x0000_0010, out position after the opcode is 1, so
        // rel = dest - (1 + 4) = 0x0B.
        let call = 0x10u32.to_be_bytes();
        let unpack_size = 5;
        let out = decode(&main, &call, &[], &rc, unpack_size).unwrap();
        assert_eq!(out.len(), unpack_size);
        assert_eq!(out[0], 0xE8);
        assert_eq!(u32::from_le_bytes(out[1..5].try_into().unwrap()), 0x0B);
    }

    #[test]
    fn truncated_main_stream_is_a_data_error() {
        let err = decode(&[], &[], &[], &[0u8; 5], 1).unwrap_err();
        assert!(matches!(err, Error::DataError(_)));
    }
}
