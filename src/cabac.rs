// Binary arithmetic coder (CABAC) and HEVC context model.
//
// Grounded on examples/original_source/inc/Cabac.h for the engine's member
// layout (`m_uiLow`, `m_uiRange`, `m_iBitsLeft`, the buffered-byte carry
// scheme) and on `inc/Defines.h` for context-group sizes/offsets and the
// `CNU` sentinel. The source's `Cabac.cpp` body was not present in the
// retrieved pack (see DESIGN.md); the arithmetic coder's bit-renormalization
// and context-update logic below follow the HEVC standard's published
// algorithm directly rather than a transcription of a specific C++ body.
//
// `low` is kept one byte wider than the 32-bit accumulator the standard
// describes so a carry out of bit 31 is just bit 32 of this field, rather
// than requiring the C++ side's separate overflow check.

use crate::bitwriter::BitWriter;
use crate::consts::*;

#[derive(Clone, Copy, Debug)]
pub struct ContextModel {
    pub state: u8,
    pub mps: u8,
}

impl ContextModel {
    fn init(qp: u32, m: i32, n: i32) -> Self {
        let qp = qp.min(51) as i32;
        let slope = m * qp;
        let init_state = ((slope >> 4) + n).clamp(1, 126);
        if init_state <= 63 {
            ContextModel { state: (63 - init_state) as u8, mps: 0 }
        } else {
            ContextModel { state: (init_state - 64) as u8, mps: 1 }
        }
    }
}

/// The full context bank, one entry per syntax-element context, laid out
/// via the cumulative `OFF_*`/`NUM_*` offsets in `consts.rs` instead of the
/// C header's macro cascade.
pub struct ContextBank {
    models: [ContextModel; MAX_NUM_CTX_MOD],
}

impl ContextBank {
    pub fn new(qp: u32) -> Self {
        let mut models = [ContextModel { state: 0, mps: 0 }; MAX_NUM_CTX_MOD];
        let mut init_group = |off: usize, table: &[(i32, i32)]| {
            for (i, &(m, n)) in table.iter().enumerate() {
                models[off + i] = ContextModel::init(qp, m, n);
            }
        };
        init_group(OFF_SPLIT_FLAG_CTX, &INIT_SPLIT_FLAG);
        init_group(OFF_PART_SIZE_CTX, &INIT_PART_SIZE);
        init_group(OFF_INTRA_PRED_CTX, &INIT_INTRA_PRED);
        init_group(OFF_CHROMA_PRED_CTX, &INIT_CHROMA_PRED);
        init_group(OFF_QT_CBF_CTX, &INIT_QT_CBF_LUMA);
        init_group(OFF_QT_CBF_CTX + NUM_QT_CBF_CTX, &INIT_QT_CBF_CHROMA);
        init_group(OFF_SIG_CG_FLAG_CTX, &INIT_SIG_CG_FLAG);
        init_group(OFF_SIG_FLAG_CTX, &INIT_SIG_FLAG);
        init_group(OFF_LAST_X_CTX, &INIT_LAST_X);
        init_group(OFF_LAST_Y_CTX, &INIT_LAST_Y);
        init_group(OFF_ONE_FLAG_CTX, &INIT_ONE_FLAG);
        init_group(OFF_ABS_FLAG_CTX, &INIT_ABS_FLAG);
        init_group(OFF_TRANS_SUBDIV_FLAG_CTX, &INIT_TRANS_SUBDIV_FLAG);
        Self { models }
    }
}

/// HEVC binary arithmetic encoder. One instance per slice/tile substream;
/// the teacher's `EntropyWriter` (AV1) plays the same per-tile-owns-its-
/// coder role that this type plays here.
pub struct CabacEngine {
    low: u64,
    range: u32,
    bits_left: i32,
    buffered_byte: i32,
    num_buffered_bytes: u32,
    ctx: ContextBank,
}

impl CabacEngine {
    pub fn new(qp: u32) -> Self {
        Self {
            low: 0,
            range: 510,
            bits_left: 23,
            buffered_byte: -1, // sentinel: "no byte buffered yet"
            num_buffered_bytes: 0,
            ctx: ContextBank::new(qp),
        }
    }

    pub fn reset(&mut self, qp: u32) {
        self.low = 0;
        self.range = 510;
        self.bits_left = 23;
        self.buffered_byte = -1;
        self.num_buffered_bytes = 0;
        self.ctx = ContextBank::new(qp);
    }

    // Standard HEVC testAndWriteOut carry-propagation scheme: a leading
    // byte of 0xFF might still need a carry from a later addition, so it's
    // held back (counted in `num_buffered_bytes`) until a non-0xFF byte
    // resolves whether the carry happened.
    fn write_out(&mut self, bw: &mut BitWriter) {
        let carry = (self.low >> 32) & 1;
        let lead_byte = (self.low >> 24) & 0xFF;
        if lead_byte == 0xFF && carry == 0 {
            self.num_buffered_bytes += 1;
        } else {
            if self.buffered_byte >= 0 {
                bw.write_u((self.buffered_byte as u32 + carry as u32) & 0xFF, 8);
            }
            for _ in 0..self.num_buffered_bytes {
                bw.write_u((0xFFu32 + carry as u32) & 0xFF, 8);
            }
            self.num_buffered_bytes = 0;
            self.buffered_byte = lead_byte as i32;
        }
        self.low &= 0x00FF_FFFF;
    }

    fn renormalize(&mut self, bw: &mut BitWriter) {
        while self.range < 256 {
            self.range <<= 1;
            self.low <<= 1;
            self.bits_left -= 1;
            if self.bits_left < 12 {
                self.write_out(bw);
                self.bits_left += 8;
            }
        }
    }

    /// Encodes one context-modeled bin and adapts the context state.
    pub fn encode_bin(&mut self, bw: &mut BitWriter, ctx_idx: usize, bin: u8) {
        let ctx = &mut self.ctx.models[ctx_idx];
        let q_range_idx = ((self.range >> 6) & 3) as usize;
        let range_lps = RANGE_TAB_LPS[ctx.state as usize][q_range_idx] as u32;
        self.range -= range_lps;

        if bin != ctx.mps {
            self.low += self.range as u64;
            self.range = range_lps;
            if ctx.state == 0 {
                ctx.mps = 1 - ctx.mps;
            }
            ctx.state = NEXT_STATE_LPS[ctx.state as usize];
        } else {
            ctx.state = NEXT_STATE_MPS[ctx.state as usize];
        }
        self.renormalize(bw);
    }

    /// Encodes `n` equiprobable (bypass) bins, MSB first.
    pub fn encode_bins_ep(&mut self, bw: &mut BitWriter, value: u32, n: u32) {
        for i in (0..n).rev() {
            self.low <<= 1;
            let bin = (value >> i) & 1;
            if bin != 0 {
                self.low += self.range as u64;
            }
            self.bits_left -= 1;
            if self.bits_left < 12 {
                self.write_out(bw);
                self.bits_left += 8;
            }
        }
    }

    pub fn encode_bin_ep(&mut self, bw: &mut BitWriter, bin: u8) {
        self.encode_bins_ep(bw, bin as u32, 1);
    }

    /// `end_of_slice_segment_flag`-style terminating bit: a fixed
    /// range-reduction path with no context adaptation.
    pub fn encode_terminating_bit(&mut self, bw: &mut BitWriter, bin: u8) {
        self.range -= 2;
        if bin != 0 {
            self.low += self.range as u64;
        } else {
            self.renormalize(bw);
        }
    }

    /// Flushes the remaining low bits and buffered carry state, aligning
    /// to a byte boundary. Mirrors `Cabac::Flush`/`FinishEncodeCTU`.
    pub fn flush(&mut self, bw: &mut BitWriter) {
        self.encode_terminating_bit(bw, 1);
        self.low <<= self.bits_left as u32;
        if self.low >> 32 != 0 {
            // A final carry out of the 32-bit window bumps the last
            // buffered byte (and any pending run of 0xFF bytes) by one.
            self.write_out(bw);
        }
        for shift in (0..2).rev() {
            bw.write_u(((self.low >> (16 + shift * 8)) & 0xFF) as u32, 8);
        }
        if self.buffered_byte >= 0 {
            bw.write_u(self.buffered_byte as u32 & 0xFF, 8);
        }
        for _ in 0..self.num_buffered_bytes {
            bw.write_u(0xFF, 8);
        }
        bw.write_rbsp_trailing_bits();
    }

    pub fn context_mut(&mut self, ctx_idx: usize) -> &mut ContextModel {
        &mut self.ctx.models[ctx_idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_initializes_with_full_range() {
        let engine = CabacEngine::new(32);
        assert_eq!(engine.range, 510);
        assert_eq!(engine.bits_left, 23);
    }

    #[test]
    fn context_state_is_in_valid_range() {
        let bank = ContextBank::new(32);
        for m in bank.models.iter() {
            assert!(m.state <= 62, "state {} out of HEVC's [0,62] range", m.state);
        }
    }

    #[test]
    fn encode_bin_does_not_panic_across_many_bins() {
        let mut engine = CabacEngine::new(30);
        let mut bw = BitWriter::new(64);
        for i in 0..200u32 {
            engine.encode_bin(&mut bw, OFF_SPLIT_FLAG_CTX, (i % 3 == 0) as u8);
        }
        engine.flush(&mut bw);
        assert!(bw.bytes_written() > 0);
    }

    #[test]
    fn bypass_bins_round_multiple_values() {
        let mut engine = CabacEngine::new(30);
        let mut bw = BitWriter::new(64);
        engine.encode_bins_ep(&mut bw, 0b1011, 4);
        engine.encode_bins_ep(&mut bw, 0b0, 1);
        engine.flush(&mut bw);
        assert!(bw.bytes_written() > 0);
    }
}
