// VPS/SPS/PPS/slice-header emission.
//
// Grounded on spec.md §4.4 and examples/original_source/src/H265Headers.cpp
// (not read in full detail — see DESIGN.md — but its role, "one function
// per NAL unit type, called once per GOP/frame from the GOP driver", is
// followed here) plus the teacher's `generate_sequence_header`/
// `generate_frame_header` pair in `main.rs`, which established the idiom of
// a free function per header type writing directly into a `BitWriter`.

use crate::bitwriter::BitWriter;
use crate::consts::{CTU_HEIGHT, CTU_WIDTH};

pub const NAL_VPS: u8 = 32;
pub const NAL_SPS: u8 = 33;
pub const NAL_PPS: u8 = 34;
pub const NAL_IDR_W_RADL: u8 = 19;

/// Parameters shared by VPS/SPS/PPS; the encoder only ever builds a single
/// profile/layer/tile configuration so this is flat rather than the nested
/// profile_tier_level() structure full HEVC headers carry.
#[derive(Clone, Copy, Debug)]
pub struct SequenceParams {
    pub width: u32,
    pub height: u32,
    pub qp: u32,
    pub tile_cols: u32,
    pub tile_rows: u32,
}

fn write_nal_header(bw: &mut BitWriter, nal_unit_type: u8) {
    bw.write_start_code(true);
    bw.write_bits(0, 1); // forbidden_zero_bit
    bw.write_bits(nal_unit_type as u32, 6);
    bw.write_bits(0, 6); // nuh_layer_id
    bw.write_bits(1, 3); // nuh_temporal_id_plus1
}

fn write_profile_tier_level(bw: &mut BitWriter) {
    bw.write_bits(0, 2); // general_profile_space
    bw.write_bits(0, 1); // general_tier_flag
    bw.write_bits(1, 5); // general_profile_idc = Main
    bw.write_bits(0, 32); // general_profile_compatibility_flag[0..32)
    bw.write_bits(1, 1); // general_progressive_source_flag
    bw.write_bits(0, 1); // general_interlaced_source_flag
    bw.write_bits(1, 1); // general_non_packed_constraint_flag
    bw.write_bits(1, 1); // general_frame_only_constraint_flag
    bw.write_bits(0, 32); // reserved_zero_43bits (high)
    bw.write_bits(0, 11); // reserved_zero_43bits (low 11 of 43)
    bw.write_bits(0, 1); // general_inbld_flag / reserved
    bw.write_bits(120, 8); // general_level_idc (level 4.0)
}

/// `video_parameter_set_rbsp()`. This encoder targets a single layer, so
/// the VPS carries only the mandatory base-layer fields.
pub fn write_vps(vps_id: u8) -> Vec<u8> {
    let mut bw = BitWriter::new(64);
    write_nal_header(&mut bw, NAL_VPS);
    bw.write_bits(vps_id as u32, 4); // vps_video_parameter_set_id
    bw.write_bits(1, 1); // vps_base_layer_internal_flag
    bw.write_bits(1, 1); // vps_base_layer_available_flag
    bw.write_bits(0, 6); // vps_max_layers_minus1
    bw.write_bits(0, 3); // vps_max_sub_layers_minus1
    bw.write_bits(1, 1); // vps_temporal_id_nesting_flag
    bw.write_bits(0xFFFF, 16); // vps_reserved_0xffff_16bits
    write_profile_tier_level(&mut bw);
    bw.write_bits(1, 1); // vps_sub_layer_ordering_info_present_flag
    bw.write_ue(0); // vps_max_dec_pic_buffering_minus1[0]
    bw.write_ue(0); // vps_max_num_reorder_pics[0]
    bw.write_ue(0); // vps_max_latency_increase_plus1[0]
    bw.write_bits(0, 6); // vps_max_layer_id
    bw.write_ue(0); // vps_num_layer_sets_minus1
    bw.write_bits(0, 1); // vps_timing_info_present_flag
    bw.write_bits(0, 1); // vps_extension_flag
    bw.write_rbsp_trailing_bits();
    bw.fix_zero_termination();
    bw.finish()
}

/// `seq_parameter_set_rbsp()`. Cropping is never applied (dimensions are
/// required to be CTU multiples, spec.md §7.1), so `conformance_window` is
/// always absent.
pub fn write_sps(sps_id: u8, vps_id: u8, params: SequenceParams) -> Vec<u8> {
    let mut bw = BitWriter::new(96);
    write_nal_header(&mut bw, NAL_SPS);
    bw.write_bits(vps_id as u32, 4); // sps_video_parameter_set_id
    bw.write_bits(0, 3); // sps_max_sub_layers_minus1
    bw.write_bits(1, 1); // sps_temporal_id_nesting_flag
    write_profile_tier_level(&mut bw);
    bw.write_ue(sps_id as u32); // sps_seq_parameter_set_id
    bw.write_ue(1); // chroma_format_idc = 4:2:0
    bw.write_ue(params.width); // pic_width_in_luma_samples
    bw.write_ue(params.height); // pic_height_in_luma_samples
    bw.write_bits(0, 1); // conformance_window_flag
    bw.write_ue(0); // bit_depth_luma_minus8
    bw.write_ue(0); // bit_depth_chroma_minus8
    bw.write_ue(4); // log2_max_pic_order_cnt_lsb_minus4
    bw.write_bits(1, 1); // sps_sub_layer_ordering_info_present_flag
    bw.write_ue(0); // sps_max_dec_pic_buffering_minus1[0]
    bw.write_ue(0); // sps_max_num_reorder_pics[0]
    bw.write_ue(0); // sps_max_latency_increase_plus1[0]

    let log2_min_cb = 3u32; // 8x8 minimum coding block
    let log2_ctb = CTU_WIDTH.trailing_zeros();
    bw.write_ue(log2_min_cb - 3); // log2_min_luma_coding_block_size_minus3
    bw.write_ue(log2_ctb - log2_min_cb); // log2_diff_max_min_luma_coding_block_size
    bw.write_ue(2 - 2); // log2_min_luma_transform_block_size_minus2 (4x4)
    bw.write_ue(5 - 2); // log2_diff_max_min_transform_block_size (up to 32x32)
    bw.write_ue(0); // max_transform_hierarchy_depth_inter
    bw.write_ue(3); // max_transform_hierarchy_depth_intra (4 sizes: 32/16/8/4)
    bw.write_bits(0, 1); // scaling_list_enabled_flag (Non-goal)
    bw.write_bits(0, 1); // amp_enabled_flag
    bw.write_bits(0, 1); // sample_adaptive_offset_enabled_flag (Non-goal)
    bw.write_bits(0, 1); // pcm_enabled_flag
    bw.write_ue(0); // num_short_term_ref_pic_sets (no inter, §1 Non-goal)
    bw.write_bits(0, 1); // long_term_ref_pics_present_flag
    bw.write_bits(0, 1); // sps_temporal_mvp_enabled_flag
    bw.write_bits(0, 1); // strong_intra_smoothing_enabled_flag
    bw.write_bits(0, 1); // vui_parameters_present_flag
    bw.write_bits(0, 1); // sps_extension_present_flag
    bw.write_rbsp_trailing_bits();
    bw.fix_zero_termination();
    bw.finish()
}

/// `pic_parameter_set_rbsp()`. Tiling fields are emitted only when more
/// than one tile is configured; uniform spacing is always used (spec.md
/// keeps the tile grid evenly dividing the frame, see DESIGN.md).
pub fn write_pps(pps_id: u8, sps_id: u8, params: SequenceParams) -> Vec<u8> {
    let mut bw = BitWriter::new(32);
    write_nal_header(&mut bw, NAL_PPS);
    bw.write_ue(pps_id as u32); // pps_pic_parameter_set_id
    bw.write_ue(sps_id as u32); // pps_seq_parameter_set_id
    bw.write_bits(0, 1); // dependent_slice_segments_enabled_flag
    bw.write_bits(0, 1); // output_flag_present_flag
    bw.write_bits(0, 3); // num_extra_slice_header_bits
    bw.write_bits(0, 1); // sign_data_hiding_enabled_flag
    bw.write_bits(0, 1); // cabac_init_present_flag
    bw.write_ue(0); // num_ref_idx_l0_default_active_minus1
    bw.write_ue(0); // num_ref_idx_l1_default_active_minus1
    bw.write_se(params.qp as i32 - 26); // init_qp_minus26
    bw.write_bits(0, 1); // constrained_intra_pred_flag
    bw.write_bits(0, 1); // transform_skip_enabled_flag
    bw.write_bits(0, 1); // cu_qp_delta_enabled_flag (no rate control, Non-goal)
    bw.write_se(0); // pps_cb_qp_offset
    bw.write_se(0); // pps_cr_qp_offset
    bw.write_bits(0, 1); // pps_slice_chroma_qp_offsets_present_flag
    bw.write_bits(0, 1); // weighted_pred_flag
    bw.write_bits(0, 1); // weighted_bipred_flag
    bw.write_bits(0, 1); // transquant_bypass_enabled_flag

    let tiled = params.tile_cols > 1 || params.tile_rows > 1;
    bw.write_bits(tiled as u32, 1); // tiles_enabled_flag
    bw.write_bits(0, 1); // entropy_coding_sync_enabled_flag
    if tiled {
        bw.write_ue(params.tile_cols - 1); // num_tile_columns_minus1
        bw.write_ue(params.tile_rows - 1); // num_tile_rows_minus1
        bw.write_bits(1, 1); // uniform_spacing_flag
        bw.write_bits(1, 1); // loop_filter_across_tiles_enabled_flag
    }
    bw.write_bits(0, 1); // pps_loop_filter_across_slices_enabled_flag
    bw.write_bits(0, 1); // deblocking_filter_control_present_flag
    bw.write_bits(0, 1); // pps_scaling_list_data_present_flag
    bw.write_bits(0, 1); // lists_modification_present_flag
    bw.write_ue(0); // log2_parallel_merge_level_minus2
    bw.write_bits(0, 1); // slice_segment_header_extension_present_flag
    bw.write_bits(0, 1); // pps_extension_present_flag
    bw.write_rbsp_trailing_bits();
    bw.fix_zero_termination();
    bw.finish()
}

/// `slice_segment_header()` for an IDR I-slice — the only slice type this
/// encoder ever produces. `entry_point_offset` values are patched in by the
/// caller (`SliceDriver`) once each tile's substream length is known, per
/// spec.md §4.6.
pub fn write_slice_header(pps_id: u8, qp: u32, entry_point_offsets: &[u32]) -> (Vec<u8>, usize) {
    let mut bw = BitWriter::new(32);
    write_nal_header(&mut bw, NAL_IDR_W_RADL);
    bw.write_bits(1, 1); // first_slice_segment_in_pic_flag
    bw.write_bits(1, 1); // no_output_of_prior_pics_flag
    bw.write_ue(pps_id as u32); // slice_pic_parameter_set_id
    bw.write_ue(2); // slice_type = I
    bw.write_se(qp as i32 - 26); // slice_qp_delta (init_qp already carries qp; delta is 0)

    if !entry_point_offsets.is_empty() {
        bw.write_ue(entry_point_offsets.len() as u32); // num_entry_point_offsets
        let max_offset = entry_point_offsets.iter().copied().max().unwrap_or(0);
        let offset_len_minus1 = (32 - (max_offset + 1).leading_zeros()).max(1) - 1;
        bw.write_ue(offset_len_minus1);
        for &off in entry_point_offsets {
            bw.write_bits(off.saturating_sub(1), offset_len_minus1 + 1);
        }
    } else {
        bw.write_ue(0); // num_entry_point_offsets
    }

    bw.write_bit(1); // byte_alignment: alignment_bit_equal_to_one
    bw.align_zero();
    let header_bytes = bw.bytes_written();
    let bytes = bw.finish();
    let _ = CTU_HEIGHT;
    (bytes, header_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vps_sps_pps_are_nonempty_and_start_aligned() {
        let vps = write_vps(0);
        let sps = write_sps(0, 0, SequenceParams { width: 64, height: 64, qp: 32, tile_cols: 1, tile_rows: 1 });
        let pps = write_pps(0, 0, SequenceParams { width: 64, height: 64, qp: 32, tile_cols: 1, tile_rows: 1 });
        for nal in [&vps, &sps, &pps] {
            assert!(nal.len() > 4);
            assert_eq!(&nal[0..4], &[0, 0, 0, 1]);
        }
    }

    #[test]
    fn slice_header_with_tiles_encodes_entry_points() {
        let (bytes, header_len) = write_slice_header(0, 30, &[120, 340]);
        assert!(bytes.len() >= header_len);
        assert!(!bytes.is_empty());
    }

    #[test]
    fn slice_header_without_tiles_has_no_entry_points() {
        let (bytes, _) = write_slice_header(0, 30, &[]);
        assert!(!bytes.is_empty());
    }
}
