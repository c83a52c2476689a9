// Error taxonomy for the encoder's non-hot-path boundaries.
//
// Per the design, the hot path (BitWriter, CabacEngine, CtuCoder, WorkQueue)
// treats its invariants as programming errors and asserts/panics on
// violation. This type only covers startup validation and file I/O, the
// two places a user-visible diagnostic is warranted.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("frame width {width} is not a multiple of CTU_WIDTH ({ctu})")]
    WidthNotCtuMultiple { width: usize, ctu: usize },

    #[error("frame height {height} is not a multiple of CTU_HEIGHT ({ctu})")]
    HeightNotCtuMultiple { height: usize, ctu: usize },

    #[error("QP {qp} out of range [0, 51]")]
    QpOutOfRange { qp: u32 },

    #[error("GOP size {0} unsupported; only 1 is currently implemented")]
    UnsupportedGopSize(u32),

    #[error("slice thread count {0} unsupported; only 1 is currently implemented")]
    UnsupportedSliceThreads(u32),

    #[error("tile grid inconsistent: {tiles} tiles requested but {cols}x{rows} = {product}")]
    TileGridInconsistent {
        tiles: u32,
        cols: u32,
        rows: u32,
        product: u32,
    },

    #[error("tile grid does not evenly divide frame: {frame_ctus} CTUs across {tile_dim} tiles")]
    TileGridDoesNotDivideFrame { frame_ctus: u32, tile_dim: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, EncoderError>;
