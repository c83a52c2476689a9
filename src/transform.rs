// Forward/inverse HEVC DCT-II (sizes 4/8/16/32) and DST-4, plus scalar
// quantization/dequantization.
//
// Grounded on examples/original_source/inc/H265Transform.h: the C++ class
// dispatches per size through `DCT DCTN[5]`/`IDCT IDCTN[5]` function-pointer
// tables. The REDESIGN FLAG in spec.md §9 asks for that indirection to be
// replaced by a plain match on size, which is what `forward`/`inverse`
// below do. The two-pass (columns-then-rows) structure, the fixed
// round-shift amounts (`SHIFT_INV_1`/`SHIFT_INV_2`/`QUANT_SHIFT`/
// `IQUANT_SHIFT`), and reliance on bit-exact basis constants all carry
// over from that header; the teacher's `txfm.rs` is the idiomatic-Rust
// reference for how a 2D separable transform is shaped as two 1D passes
// over an `Array2D`, even though its basis/stage math is AV1-specific and
// not reused directly.

use crate::array2d::Array2D;
use crate::consts::*;

fn basis_matrix(size: usize) -> &'static [i32] {
    match size {
        4 => &DCT4,
        8 => &DCT8,
        16 => &DCT16,
        _ => panic!("transform: unsupported size {}", size),
    }
}

// The 32-point basis interleaves the 16-point basis on even rows with 16
// distinct odd rows (the standard recursive relation between sizes).
fn basis_row_32(row: usize) -> [i32; 32] {
    if row % 2 == 0 {
        let src = &DCT16[(row / 2) * 16..(row / 2) * 16 + 16];
        let mut out = [0i32; 32];
        for (i, v) in src.iter().enumerate() {
            out[2 * i] = *v;
            out[2 * i + 1] = *v;
        }
        out
    } else {
        DCT32_ODD_ROWS[row / 2]
    }
}

fn basis_row(size: usize, row: usize) -> Vec<i32> {
    if size == 32 {
        basis_row_32(row).to_vec()
    } else {
        let m = basis_matrix(size);
        m[row * size..row * size + size].to_vec()
    }
}

fn round_shift(value: i64, shift: i32) -> i32 {
    if shift <= 0 {
        return (value << (-shift)) as i32;
    }
    let offset = 1i64 << (shift - 1);
    ((value + offset) >> shift) as i32
}

/// 1D forward transform of one row/column of length `size`, `out[k] =
/// round((sum_n basis[k][n] * in[n]), shift)`.
fn forward_1d(input: &[i32], size: usize, use_dst: bool, shift: i32, out: &mut [i32]) {
    for k in 0..size {
        let row = if use_dst { DST4[k * 4..k * 4 + 4].to_vec() } else { basis_row(size, k) };
        let mut acc: i64 = 0;
        for n in 0..size {
            acc += row[n] as i64 * input[n] as i64;
        }
        out[k] = round_shift(acc, shift);
    }
}

/// 1D inverse transform: `out[n] = round(sum_k basis[k][n] * coeff[k], shift)`.
fn inverse_1d(coeff: &[i32], size: usize, use_dst: bool, shift: i32, out: &mut [i32]) {
    for n in 0..size {
        let mut acc: i64 = 0;
        for k in 0..size {
            let row = if use_dst { DST4[k * 4..k * 4 + 4].to_vec() } else { basis_row(size, k) };
            acc += row[n] as i64 * coeff[k] as i64;
        }
        out[n] = round_shift(acc, shift);
    }
}

/// Forward 2D separable transform in place. `use_dst` selects the 4x4 DST-4
/// alternative transform used for luma 4x4 intra residuals; all other
/// blocks (and all chroma blocks) use the DCT-II basis for their size.
pub fn forward(block: &mut Array2D<i32>, size: usize, use_dst: bool) {
    assert!(block.rows() == size && block.cols() == size);
    let log2_size = size.trailing_zeros() as i32;
    // Stage shifts per the HEVC transform: the column pass removes the
    // input dynamic range down to the internal transform precision, the
    // row pass brings the result down to MAX_TR_DYN_RANGE bits.
    let first_shift = log2_size + BIT_DEPTH - 9;
    let second_shift = log2_size + 6;

    let mut tmp = Array2D::<i32>::zeroed(size, size);

    // Columns first.
    let mut col_in = vec![0i32; size];
    let mut col_out = vec![0i32; size];
    for c in 0..size {
        for r in 0..size {
            col_in[r] = block[r][c];
        }
        forward_1d(&col_in, size, use_dst, first_shift, &mut col_out);
        for r in 0..size {
            tmp[r][c] = col_out[r];
        }
    }

    // Then rows.
    let mut row_out = vec![0i32; size];
    for r in 0..size {
        forward_1d(&tmp[r], size, use_dst, second_shift, &mut row_out);
        for c in 0..size {
            block[r][c] = row_out[c];
        }
    }
}

/// Inverse 2D separable transform in place.
pub fn inverse(coeff: &mut Array2D<i32>, size: usize, use_dst: bool) {
    assert!(coeff.rows() == size && coeff.cols() == size);

    let mut tmp = Array2D::<i32>::zeroed(size, size);
    let mut row_in = vec![0i32; size];
    let mut row_out = vec![0i32; size];
    for r in 0..size {
        row_in.copy_from_slice(&coeff[r]);
        inverse_1d(&row_in, size, use_dst, SHIFT_INV_1, &mut row_out);
        for c in 0..size {
            tmp[r][c] = row_out[c];
        }
    }

    let max_dyn = (1i32 << (BIT_DEPTH + 5)) - 1;
    let min_dyn = -(1i32 << (BIT_DEPTH + 5));
    let final_shift = SHIFT_INV_2 - (BIT_DEPTH - 8);

    let mut col_in = vec![0i32; size];
    let mut col_out = vec![0i32; size];
    for c in 0..size {
        for r in 0..size {
            col_in[r] = tmp[r][c];
        }
        inverse_1d(&col_in, size, use_dst, final_shift, &mut col_out);
        for r in 0..size {
            coeff[r][c] = col_out[r].clamp(min_dyn, max_dyn);
        }
    }
}

/// Scalar forward quantization of one coefficient, HM-style
/// `level = sign(c) * ((|c| * scale[qp%6] + round) >> qBits)` with
/// `qBits = QUANT_SHIFT + qp/6 + transShift` and `round = 171<<(qBits-9)`
/// for I slices (the only slice type this encoder emits), per spec.md
/// §4.2 and `H265Transform::Quant` (original_source/src/
/// H265Transform.cpp:634-659). `transShift` and `qBits` are always
/// positive for every supported block size/QP combination (`transShift`
/// ranges 2..5 for log2_size 2..5, so `qBits` never needs the
/// negative-shift fallback the inverse HM code path guards against).
pub fn quantize(coeff: i32, qp: u32, log2_size: u32) -> i32 {
    let per = (qp / 6) as i32;
    let rem = (qp % 6) as usize;
    let transform_shift = MAX_TR_DYN_RANGE - BIT_DEPTH - log2_size as i32;
    let q_bits = QUANT_SHIFT + per + transform_shift;
    debug_assert!(q_bits > 0, "qBits must stay positive for all supported sizes/QPs");
    let scale = QUANT_SCALE[rem] as i64;
    let round = 171i64 << (q_bits - 9);
    let sign = coeff.signum() as i64;
    let mag = (coeff.abs() as i64 * scale + round) >> q_bits;
    (sign * mag).clamp(-32768, 32767) as i32
}

/// Scalar dequantization inverse to `quantize`, HM-style `iScale =
/// invScale[qp%6] << qp/6`, `iShift = IQUANT_SHIFT - QUANT_SHIFT -
/// transShift`, per `H265Transform::InvQuant`
/// (original_source/src/H265Transform.cpp:663-681).
pub fn dequantize(level: i32, qp: u32, log2_size: u32) -> i32 {
    let per = (qp / 6) as i32;
    let rem = (qp % 6) as usize;
    let transform_shift = MAX_TR_DYN_RANGE - BIT_DEPTH - log2_size as i32;
    let shift = IQUANT_SHIFT - QUANT_SHIFT - transform_shift;
    debug_assert!(shift > 0, "inverse shift must stay positive for all supported sizes/QPs");
    let scale = (INV_QUANT_SCALE[rem] as i64) << per;
    let round = 1i64 << (shift - 1);
    let value = (level as i64 * scale + round) >> shift;
    value.clamp(-32768, 32767) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dc_only_4x4_forward_inverse_round_trip_is_close() {
        let mut block = Array2D::<i32>::zeroed(4, 4);
        block.fill_with(|_, _| 10);
        let original = block.clone();
        forward(&mut block, 4, false);
        inverse(&mut block, 4, false);
        // A flat DC block should reconstruct near-exactly modulo the fixed
        // rounding in the HEVC shift stages.
        for r in 0..4 {
            for c in 0..4 {
                assert!((block[r][c] - original[r][c]).abs() <= 2);
            }
        }
    }

    #[test]
    fn quantize_dequantize_is_identity_near_qp0() {
        for &coeff in &[-100, -1, 0, 1, 100] {
            let level = quantize(coeff, 4, 2);
            let back = dequantize(level, 4, 2);
            assert!((back - coeff).abs() <= coeff.abs() / 4 + 4);
        }
    }

    #[test]
    fn quantize_zero_is_zero() {
        assert_eq!(quantize(0, 32, 3), 0);
    }

    #[test]
    fn chroma_qp_table_is_monotonic_non_decreasing_in_tail() {
        assert_eq!(chroma_qp(0), 0);
        assert!(chroma_qp(51) >= chroma_qp(40));
    }

    #[test]
    fn dct8_forward_then_inverse_preserves_mean() {
        let mut block = Array2D::<i32>::zeroed(8, 8);
        block.fill_with(|r, c| ((r + c) as i32) * 3 - 10);
        let original = block.clone();
        forward(&mut block, 8, false);
        inverse(&mut block, 8, false);
        for r in 0..8 {
            for c in 0..8 {
                assert!((block[r][c] - original[r][c]).abs() <= 4);
            }
        }
    }
}
