// Fixed, process-wide HEVC tables: transform bases, scan orders, quantizer
// scales, intra angle tables and CABAC context initialization values.
//
// Grounded on examples/original_source/inc/Defines.h for the context-group
// sizes/offsets and on the HEVC standard's published constant tables (the
// role tinyavif's consts.rs/cdf.rs play for AV1).

// ---------------------------------------------------------------- Geometry

pub const CTU_WIDTH: usize = 32;
pub const CTU_HEIGHT: usize = 32;
pub const MIN_CU_SIZE: usize = 4;
pub const TOT_PUS_LINE: usize = CTU_WIDTH / MIN_CU_SIZE;
pub const MAX_TILES: usize = 24;
pub const BYTES_PER_CTU: usize = 800;

pub const INVALID_MODE: u8 = 255;
pub const TOTAL_INTRA_MODES: usize = 35;
pub const PLANAR_MODE_IDX: u8 = 0;
pub const DC_MODE_IDX: u8 = 1;
pub const HOR_MODE_IDX: u8 = 10;
pub const VER_MODE_IDX: u8 = 26;
pub const CHROMA_DM_MODE_IDX: u8 = 34;

pub const MAX_TR_DYN_RANGE: i32 = 15;
pub const QUANT_SHIFT: i32 = 14;
pub const IQUANT_SHIFT: i32 = 20;
pub const SHIFT_INV_1: i32 = 7;
pub const SHIFT_INV_2: i32 = 12;
pub const BIT_DEPTH: i32 = 8;

// ------------------------------------------------------------- Quantizer

// Forward quantization scale per (qp % 6), `g_piQuantScales` in
// original_source/src/H265Transform.cpp:116. Used by `quantize()` only;
// this is distinct from (and much larger than) the inverse scale below —
// conflating the two silently turns the forward quantizer into a no-op-ish
// pass at low QP, which is the defect this split guards against.
pub const QUANT_SCALE: [i32; 6] = [26214, 23302, 20560, 18396, 16384, 14564];

// Inverse quantization scale per (qp % 6), `g_piInvQuantScales` in
// original_source/src/H265Transform.cpp:123. Used by `dequantize()` only.
pub const INV_QUANT_SCALE: [i32; 6] = [40, 45, 51, 57, 64, 72];

// chroma_qp[luma_qp] fixed mapping, HEVC Table 8-10 (ChromaArrayType == 1).
pub const CHROMA_QP_MAP: [u8; 52] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25,
    26, 27, 28, 29, 29, 30, 31, 32, 33, 33, 34, 34, 35, 35, 36, 36, 37, 37, 38, 39, 40, 41, 42,
    43, 44, 45,
];

pub fn chroma_qp(luma_qp: u32) -> u32 {
    CHROMA_QP_MAP[luma_qp.min(51) as usize] as u32
}

// ---------------------------------------------------------- Transform bases

// DCT-II basis matrices, bit-exact HEVC fixed-point constants. Row r,
// column c -> `DCTn[r * n + c]`; these are the standard's g_aiT4/8/16 tables.

pub const DCT4: [i32; 16] = [
    64, 64, 64, 64, //
    83, 36, -36, -83, //
    64, -64, -64, 64, //
    36, -83, 83, -36,
];

pub const DST4: [i32; 16] = [
    29, 55, 74, 84, //
    74, 74, 0, -74, //
    84, -29, -74, 55, //
    55, -84, 74, -29,
];

pub const DCT8: [i32; 64] = [
    64, 64, 64, 64, 64, 64, 64, 64, //
    89, 75, 50, 18, -18, -50, -75, -89, //
    83, 36, -36, -83, -83, -36, 36, 83, //
    75, -18, -89, -50, 50, 89, 18, -75, //
    64, -64, -64, 64, 64, -64, -64, 64, //
    50, -89, 18, 75, -75, -18, 89, -50, //
    36, -83, 83, -36, -36, 83, -83, 36, //
    18, -50, 75, -89, 89, -75, 50, -18,
];

pub const DCT16: [i32; 256] = [
    64, 64, 64, 64, 64, 64, 64, 64, 64, 64, 64, 64, 64, 64, 64, 64, //
    90, 87, 80, 70, 57, 43, 25, 9, -9, -25, -43, -57, -70, -80, -87, -90, //
    89, 75, 50, 18, -18, -50, -75, -89, -89, -75, -50, -18, 18, 50, 75, 89, //
    87, 57, 9, -43, -80, -90, -70, -25, 25, 70, 90, 80, 43, -9, -57, -87, //
    83, 36, -36, -83, -83, -36, 36, 83, 83, 36, -36, -83, -83, -36, 36, 83, //
    80, 9, -70, -87, -25, 57, 90, 43, -43, -90, -57, 25, 87, 70, -9, -80, //
    75, -18, -89, -50, 50, 89, 18, -75, -75, 18, 89, 50, -50, -89, -18, 75, //
    70, -43, -87, 9, 90, 25, -80, -57, 57, 80, -25, -90, -9, 87, 43, -70, //
    64, -64, -64, 64, 64, -64, -64, 64, 64, -64, -64, 64, 64, -64, -64, 64, //
    57, -80, -25, 90, -9, -87, 43, 70, -70, -43, 87, 9, -90, 25, 80, -57, //
    50, -89, 18, 75, -75, -18, 89, -50, -50, 89, -18, -75, 75, 18, -89, 50, //
    43, -90, 57, 25, -87, 70, 9, -80, 80, -9, -70, 87, -25, -57, 90, -43, //
    36, -83, 83, -36, -36, 83, -83, 36, 36, -83, 83, -36, -36, 83, -83, 36, //
    25, -70, 90, -80, 43, 9, -57, 87, -87, 57, -9, -43, 80, -90, 70, -25, //
    18, -50, 75, -89, 89, -75, 50, -18, -18, 50, -75, 89, -89, 75, -50, 18, //
    9, -25, 43, -57, 70, -80, 87, -90, 90, -87, 80, -70, 57, -43, 25, -9,
];

// The 32-point basis's even-indexed rows equal the 16-point basis (each
// coefficient used twice, standard recursive relation); the 16 odd rows are
// distinct HEVC g_aiT32 constants, stored explicitly below.
pub const DCT32_ODD_ROWS: [[i32; 32]; 16] = [
    [
        90, 90, 88, 85, 82, 78, 73, 67, 61, 54, 46, 38, 31, 22, 13, 4, -4, -13, -22, -31, -38,
        -46, -54, -61, -67, -73, -78, -82, -85, -88, -90, -90,
    ],
    [
        90, 82, 67, 46, 22, -4, -31, -54, -73, -85, -90, -88, -78, -61, -38, -13, 13, 38, 61, 78,
        88, 90, 85, 73, 54, 31, 4, -22, -46, -67, -82, -90,
    ],
    [
        88, 67, 31, -13, -54, -82, -90, -78, -46, -4, 38, 73, 90, 85, 61, 22, -22, -61, -85, -90,
        -73, -38, 4, 46, 78, 90, 82, 54, 13, -31, -67, -88,
    ],
    [
        85, 46, -13, -67, -90, -73, -22, 38, 82, 88, 54, -4, -61, -90, -78, -31, 31, 78, 90, 61,
        4, -54, -88, -82, -38, 22, 73, 90, 67, 13, -46, -85,
    ],
    [
        82, 22, -54, -90, -61, 13, 78, 85, 31, -46, -90, -67, 4, 73, 88, 38, -38, -88, -73, -4,
        67, 90, 46, -31, -85, -78, -13, 61, 90, 54, -22, -82,
    ],
    [
        78, -4, -82, -73, 13, 85, 67, -22, -88, -61, 31, 90, 54, -38, -90, -46, 46, 90, 38, -54,
        -90, -31, 61, 88, 22, -67, -85, -13, 73, 82, 4, -78,
    ],
    [
        73, -31, -90, -22, 78, 67, -38, -90, -13, 82, 61, -46, -88, -4, 85, 54, -54, -85, 4, 88,
        46, -61, -82, 13, 90, 38, -67, -78, 22, 90, 31, -73,
    ],
    [
        67, -54, -78, 38, 85, -22, -90, 4, 90, 13, -88, -31, 82, 46, -73, -61, 61, 73, -46, -82,
        31, 88, -13, -90, -4, 90, 22, -85, -38, 78, 54, -67,
    ],
    [
        61, -73, -46, 82, 31, -88, -13, 90, -4, -90, 22, 85, -38, -78, 54, 67, -67, -54, 78, 38,
        -85, -22, 90, 4, -90, 13, 88, -31, -82, 46, 73, -61,
    ],
    [
        54, -85, -4, 88, -46, -61, 82, 13, -90, 38, 67, -78, -22, 90, -31, -73, 73, 31, -90, 22,
        78, -67, -38, 90, -13, -82, 61, 46, -88, 4, 85, -54,
    ],
    [
        46, -90, 38, 54, -90, 31, 61, -88, 22, 67, -85, 13, 73, -82, 4, 78, -78, -4, 82, -73, -13,
        85, -67, -22, 88, -61, -31, 90, -54, -38, 90, -46,
    ],
    [
        38, -88, 73, -4, -67, 90, -46, -31, 85, -78, 13, 61, -90, 54, 22, -82, 82, -22, -54, 90,
        -61, -13, 78, -85, 31, 46, -90, 67, 4, -73, 88, -38,
    ],
    [
        31, -78, 90, -61, 4, 54, -88, 82, -38, -22, 73, -90, 67, -13, -46, 85, -85, 46, 13, -67,
        90, -73, 22, 38, -82, 88, -54, -4, 61, -90, 78, -31,
    ],
    [
        22, -61, 85, -90, 73, -38, -4, 46, -78, 90, -82, 54, -13, -31, 67, -88, 88, -67, 31, 13,
        -54, 82, -90, 78, -46, 4, 38, -73, 90, -85, 61, -22,
    ],
    [
        13, -38, 61, -78, 88, -90, 85, -73, 54, -31, 4, 22, -46, 67, -82, 90, -90, 82, -67, 46,
        -22, -4, 31, -54, 73, -85, 90, -88, 78, -61, 38, -13,
    ],
    [
        4, -13, 22, -31, 38, -46, 54, -61, 67, -73, 78, -82, 85, -88, 90, -90, 90, -90, 88, -85,
        82, -78, 73, -67, 61, -54, 46, -38, 31, -22, 13, -4,
    ],
];

// ---------------------------------------------------------------- Intra angles

// HEVC intra angle table indexed by (mode - 2) for modes 2..=34, and the
// companion inverse-angle table used to extend the main reference array for
// steep angles.
pub const INTRA_PRED_ANGLE: [i32; 33] = [
    32, 26, 21, 17, 13, 9, 5, 2, 0, -2, -5, -9, -13, -17, -21, -26, -32, -26, -21, -17, -13, -9,
    -5, -2, 0, 2, 5, 9, 13, 17, 21, 26, 32,
];

pub const INV_ANGLE: [i32; 33] = [
    -4096, -1638, -910, -630, -482, -390, -315, -256, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, -4096, -1638, -910, -630, -482, -390, -315, -256,
];

// ------------------------------------------------------------------ Scans

// Diagonal "up-right" 4x4 scan; generalized to larger blocks by scanning
// 4x4 coefficient groups in this same order, then within each group.
pub const DIAG_SCAN_4X4: [(u8, u8); 16] = [
    (0, 0),
    (0, 1),
    (1, 0),
    (0, 2),
    (1, 1),
    (2, 0),
    (0, 3),
    (1, 2),
    (2, 1),
    (3, 0),
    (1, 3),
    (2, 2),
    (3, 1),
    (2, 3),
    (3, 2),
    (3, 3),
];

pub const HOR_SCAN_4X4: [(u8, u8); 16] = [
    (0, 0),
    (1, 0),
    (2, 0),
    (3, 0),
    (0, 1),
    (1, 1),
    (2, 1),
    (3, 1),
    (0, 2),
    (1, 2),
    (2, 2),
    (3, 2),
    (0, 3),
    (1, 3),
    (2, 3),
    (3, 3),
];

pub const VER_SCAN_4X4: [(u8, u8); 16] = [
    (0, 0),
    (0, 1),
    (0, 2),
    (0, 3),
    (1, 0),
    (1, 1),
    (1, 2),
    (1, 3),
    (2, 0),
    (2, 1),
    (2, 2),
    (2, 3),
    (3, 0),
    (3, 1),
    (3, 2),
    (3, 3),
];

// Offsets of already-coded neighbour coefficients consulted to build the
// sig_coeff_flag / coeff_abs_level_greater1 context (DCT_DCT only).
pub const SIG_REF_DIFF_OFFSET: [(u8, u8); 5] = [(0, 1), (1, 0), (1, 1), (0, 2), (2, 0)];
pub const MAG_REF_OFFSET: [(u8, u8); 3] = [(0, 1), (1, 0), (1, 1)];

pub const COEFF_BASE_CTX_OFFSET_8X8: [[u8; 5]; 5] = [
    [0, 1, 6, 6, 21],
    [1, 6, 6, 21, 21],
    [6, 6, 21, 21, 21],
    [6, 21, 21, 21, 21],
    [21, 21, 21, 21, 21],
];

// ----------------------------------------------------------- CABAC contexts

// Context group sizes, ported from examples/original_source/inc/Defines.h.
// Only I-slice (init type 0) is relevant since this encoder never emits P/B
// slices; the group sizes below mirror the source 1:1.
pub const NUM_SPLIT_FLAG_CTX: usize = 3;
pub const NUM_PART_SIZE_CTX: usize = 4;
pub const NUM_ADI_CTX: usize = 1;
pub const NUM_CHROMA_PRED_CTX: usize = 2;
pub const NUM_TRANS_SUBDIV_FLAG_CTX: usize = 3;
pub const NUM_QT_CBF_CTX: usize = 5;
pub const NUM_SIG_CG_FLAG_CTX: usize = 2;
pub const NUM_SIG_FLAG_CTX: usize = 42;
pub const NUM_LAST_FLAG_XY_CTX: usize = 15;
pub const NUM_ONE_FLAG_CTX: usize = 24;
pub const NUM_ABS_FLAG_CTX: usize = 6;

pub const OFF_SPLIT_FLAG_CTX: usize = 0;
pub const OFF_PART_SIZE_CTX: usize = OFF_SPLIT_FLAG_CTX + NUM_SPLIT_FLAG_CTX;
pub const OFF_INTRA_PRED_CTX: usize = OFF_PART_SIZE_CTX + NUM_PART_SIZE_CTX;
pub const OFF_CHROMA_PRED_CTX: usize = OFF_INTRA_PRED_CTX + NUM_ADI_CTX;
pub const OFF_QT_CBF_CTX: usize = OFF_CHROMA_PRED_CTX + NUM_CHROMA_PRED_CTX;
pub const OFF_SIG_CG_FLAG_CTX: usize = OFF_QT_CBF_CTX + 2 * NUM_QT_CBF_CTX;
pub const OFF_SIG_FLAG_CTX: usize = OFF_SIG_CG_FLAG_CTX + 2 * NUM_SIG_CG_FLAG_CTX;
pub const OFF_LAST_X_CTX: usize = OFF_SIG_FLAG_CTX + NUM_SIG_FLAG_CTX;
pub const OFF_LAST_Y_CTX: usize = OFF_LAST_X_CTX + 2 * NUM_LAST_FLAG_XY_CTX;
pub const OFF_ONE_FLAG_CTX: usize = OFF_LAST_Y_CTX + 2 * NUM_LAST_FLAG_XY_CTX;
pub const OFF_ABS_FLAG_CTX: usize = OFF_ONE_FLAG_CTX + NUM_ONE_FLAG_CTX;
pub const OFF_TRANS_SUBDIV_FLAG_CTX: usize = OFF_ABS_FLAG_CTX + NUM_ABS_FLAG_CTX;

pub const MAX_NUM_CTX_MOD: usize = 256;
pub const CNU: i32 = 154; // "Context model Not Used" dummy init value.

// Per-context-model init values (m, n) for the I-slice init type, packed in
// declaration order matching the OFF_* layout above. `m`/`n` feed the HEVC
// `preCtxState = Clip3(1, 126, ((m * Clip3(0,51,qp)) >> 4) + n)` formula.
pub const INIT_SPLIT_FLAG: [(i32, i32); NUM_SPLIT_FLAG_CTX] = [(0, 139), (0, 141), (0, 157)];

pub const INIT_PART_SIZE: [(i32, i32); NUM_PART_SIZE_CTX] =
    [(154, 139), (CNU, CNU), (CNU, CNU), (CNU, CNU)];

pub const INIT_INTRA_PRED: [(i32, i32); NUM_ADI_CTX] = [(0, 184)];

pub const INIT_CHROMA_PRED: [(i32, i32); NUM_CHROMA_PRED_CTX] = [(0, 63), (0, 139)];

pub const INIT_TRANS_SUBDIV_FLAG: [(i32, i32); NUM_TRANS_SUBDIV_FLAG_CTX] =
    [(-52, 127), (-34, 150), (-27, 141)];

pub const INIT_QT_CBF_LUMA: [(i32, i32); NUM_QT_CBF_CTX] =
    [(153, 111), (153, 111), (153, 111), (153, 111), (153, 111)];

pub const INIT_QT_CBF_CHROMA: [(i32, i32); NUM_QT_CBF_CTX] =
    [(149, 92), (149, 92), (149, 92), (149, 92), (149, 92)];

pub const INIT_SIG_CG_FLAG: [(i32, i32); 2 * NUM_SIG_CG_FLAG_CTX] =
    [(91, 79), (67, 104), (91, 79), (67, 104)];

pub const INIT_SIG_FLAG: [(i32, i32); NUM_SIG_FLAG_CTX] = [
    (111, 141), (111, 111), (125, 95), (140, 95), (125, 79), (140, 78), (111, 111), (125, 95),
    (140, 95), (125, 79), (140, 78), (111, 141), (111, 111), (125, 95), (140, 95), (125, 79),
    (140, 78), (111, 111), (125, 95), (140, 95), (125, 79), (140, 78), (141, 79), (140, 63),
    (154, 63), (154, 63), (154, 63), (139, 95), (139, 79), (125, 63), (140, 63), (139, 95),
    (139, 79), (125, 63), (140, 63), (141, 111), (140, 63), (154, 63), (154, 63), (154, 63),
    (170, 51), (170, 51),
];

pub const INIT_LAST_X: [(i32, i32); 2 * NUM_LAST_FLAG_XY_CTX] = [
    (110, 110), (122, 95), (95, 79), (79, 71), (56, 69), (45, 55), (60, 45), (26, 47), (152, 63),
    (136, 63), (153, 95), (136, 63), (121, 47), (150, 15), (0, 0),
    (125, 110), (165, 95), (149, 79), (143, 71), (128, 69), (121, 55), (152, 45), (125, 47),
    (163, 63), (135, 63), (140, 95), (120, 63), (105, 47), (125, 15), (0, 0),
];

pub const INIT_LAST_Y: [(i32, i32); 2 * NUM_LAST_FLAG_XY_CTX] = INIT_LAST_X;

pub const INIT_ONE_FLAG: [(i32, i32); NUM_ONE_FLAG_CTX] = [
    (154, 110), (154, 110), (154, 124), (154, 125), (154, 111), (154, 111), (154, 79), (154, 108),
    (154, 123), (154, 63), (154, 110), (154, 110), (154, 124), (154, 125), (154, 111), (154, 111),
    (154, 79), (154, 108), (154, 123), (154, 63), (154, 110), (154, 124), (154, 125), (154, 111),
];

pub const INIT_ABS_FLAG: [(i32, i32); NUM_ABS_FLAG_CTX] =
    [(154, 140), (154, 140), (154, 140), (154, 140), (154, 140), (154, 140)];

// Next-state LUTs for CABAC context updates: `state` advances along MPS,
// regresses along LPS, matching the HEVC standard's fixed 64-entry tables.
pub const NEXT_STATE_MPS: [u8; 64] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26,
    27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49,
    50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 62, 63,
];

pub const NEXT_STATE_LPS: [u8; 64] = [
    0, 0, 1, 2, 2, 4, 4, 5, 6, 7, 8, 9, 9, 11, 11, 12, 13, 13, 15, 15, 16, 16, 18, 18, 19, 19, 21,
    21, 23, 22, 23, 24, 24, 25, 26, 26, 27, 27, 28, 29, 29, 30, 30, 30, 31, 32, 32, 33, 33, 33, 34,
    34, 35, 35, 35, 36, 36, 36, 37, 37, 37, 38, 38, 63,
];

// rangeTabLPS[state][qRange] fixed HEVC table (4 quantized range columns).
pub const RANGE_TAB_LPS: [[u16; 4]; 64] = [
    [128, 176, 208, 240], [128, 167, 197, 227], [128, 158, 187, 216], [123, 150, 178, 205],
    [116, 142, 169, 195], [111, 135, 160, 185], [105, 128, 152, 175], [100, 122, 144, 166],
    [95, 116, 137, 158], [90, 110, 130, 150], [85, 104, 123, 142], [81, 99, 117, 135],
    [77, 94, 111, 128], [73, 89, 105, 122], [69, 85, 100, 116], [66, 80, 95, 110],
    [62, 76, 90, 104], [59, 72, 86, 99], [56, 69, 81, 94], [53, 65, 77, 89],
    [51, 62, 73, 85], [48, 59, 69, 80], [46, 56, 66, 76], [43, 53, 63, 72],
    [41, 50, 59, 69], [39, 48, 56, 65], [37, 45, 54, 62], [35, 43, 51, 59],
    [33, 41, 48, 56], [32, 39, 46, 53], [30, 37, 43, 50], [28, 35, 41, 48],
    [27, 33, 39, 45], [26, 31, 37, 43], [24, 30, 35, 41], [23, 28, 33, 39],
    [22, 27, 32, 37], [21, 26, 30, 35], [20, 24, 29, 33], [19, 23, 27, 31],
    [18, 22, 26, 30], [17, 21, 25, 28], [16, 20, 23, 27], [15, 19, 22, 25],
    [14, 18, 21, 24], [14, 17, 20, 23], [13, 16, 19, 22], [12, 15, 18, 21],
    [12, 14, 17, 20], [11, 14, 16, 19], [11, 13, 15, 18], [10, 12, 15, 17],
    [10, 12, 14, 16], [9, 11, 13, 15], [9, 11, 12, 14], [8, 10, 12, 14],
    [8, 9, 11, 13], [7, 9, 11, 12], [7, 9, 10, 12], [7, 8, 10, 11],
    [6, 8, 9, 11], [6, 7, 9, 10], [6, 7, 8, 9], [2, 2, 2, 2],
];
