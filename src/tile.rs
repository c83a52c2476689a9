// Tile-scoped encoding: one `TileWorker` owns one `CtuCoder`, one
// `CabacEngine`, and one `BitWriter`, and encodes every CTU within its
// rectangle independently of every other tile (spec.md §3's write-disjoint
// output rule). Grounded on
// examples/original_source/inc/H265TileCompressor.h's CTU address maps and
// per-tile byte/timing accounting.

use crate::bitwriter::BitWriter;
use crate::cabac::CabacEngine;
use crate::consts::{CTU_HEIGHT, CTU_WIDTH};
use crate::ctu::CtuCoder;
use crate::frame::Frame;

#[derive(Clone, Copy, Debug)]
pub struct TileBounds {
    pub ctu_x0: usize,
    pub ctu_y0: usize,
    pub ctu_cols: usize,
    pub ctu_rows: usize,
    pub tile_id: u32,
}

impl TileBounds {
    pub fn pixel_origin(&self) -> (usize, usize) {
        (self.ctu_x0 * CTU_WIDTH, self.ctu_y0 * CTU_HEIGHT)
    }
}

/// Encodes every CTU in one tile, start to finish, producing a standalone
/// CABAC-terminated byte substream. `SliceDriver` is responsible for
/// concatenating substreams and patching `entry_point_offset` values.
pub struct TileWorker {
    bounds: TileBounds,
    coder: CtuCoder,
}

impl TileWorker {
    pub fn new(bounds: TileBounds, qp: u32) -> Self {
        Self { bounds, coder: CtuCoder::new(qp, bounds.ctu_cols) }
    }

    /// Runs the full tile: returns the finished substream bytes plus a
    /// frame-sized reconstruction buffer holding just this tile's written
    /// pixels (every other sample stays at the mid-grey fill `Frame::new`
    /// starts with). `source` is read-only.
    ///
    /// Per-tile private reconstruction (rather than one shared `&mut Frame`
    /// guarded across tiles) is what lets `SliceDriver` hand every
    /// non-final tile to its own thread with no locking on the hot path,
    /// matching spec.md §5's "tile rectangles are disjoint, so this is
    /// unsynchronized" sharing rule without `unsafe` aliasing of a shared
    /// buffer — the driver stitches each tile's rectangle into the picture-
    /// wide output afterward, a cheap single-threaded copy. It also falls
    /// out of spec.md §3 verbatim: "a CtuCoder owns ... reconstruction ...
    /// buffers for its tile."
    pub fn run(&mut self, source: &Frame, frame_width: usize, frame_height: usize) -> (Vec<u8>, Frame) {
        let mut bw = BitWriter::new(self.bounds.ctu_cols * self.bounds.ctu_rows * crate::consts::BYTES_PER_CTU);
        let mut cabac = CabacEngine::new(self.coder.qp());
        let mut recon = Frame::new(frame_width, frame_height);

        let (origin_x, origin_y) = self.bounds.pixel_origin();
        for row in 0..self.bounds.ctu_rows {
            self.coder.start_new_row();
            for col in 0..self.bounds.ctu_cols {
                if col > 0 {
                    self.coder.advance_to_next_ctu_in_row();
                }
                let ctu_x = origin_x + col * CTU_WIDTH;
                let ctu_y = origin_y + row * CTU_HEIGHT;
                self.coder.begin_ctu(col);
                self.coder.compress_ctu(&mut bw, &mut cabac, source, &mut recon, ctu_x, ctu_y);
                self.coder.commit_ctu(col);

                let is_last = row + 1 == self.bounds.ctu_rows && col + 1 == self.bounds.ctu_cols;
                cabac.encode_terminating_bit(&mut bw, is_last as u8);
            }
        }
        cabac.flush(&mut bw);
        (bw.finish(), recon)
    }

    pub fn bounds(&self) -> TileBounds {
        self.bounds
    }
}

/// Builds the evenly-spaced tile grid for a frame, per spec.md's
/// Open-Question resolution to keep (not generalize) uniform tile spacing.
/// Grounded on `ImageParameters::SetTileStruct`.
pub fn build_tile_grid(frame_width: usize, frame_height: usize, tile_cols: u32, tile_rows: u32) -> Vec<TileBounds> {
    let ctu_cols_total = frame_width / CTU_WIDTH;
    let ctu_rows_total = frame_height / CTU_HEIGHT;
    assert!(
        ctu_cols_total % tile_cols as usize == 0,
        "tile grid does not evenly divide frame width in CTUs"
    );
    assert!(
        ctu_rows_total % tile_rows as usize == 0,
        "tile grid does not evenly divide frame height in CTUs"
    );
    let tile_w = ctu_cols_total / tile_cols as usize;
    let tile_h = ctu_rows_total / tile_rows as usize;

    let mut tiles = Vec::with_capacity((tile_cols * tile_rows) as usize);
    let mut tile_id = 0u32;
    for ty in 0..tile_rows as usize {
        for tx in 0..tile_cols as usize {
            tiles.push(TileBounds {
                ctu_x0: tx * tile_w,
                ctu_y0: ty * tile_h,
                ctu_cols: tile_w,
                ctu_rows: tile_h,
                tile_id,
            });
            tile_id += 1;
        }
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_tile_covers_whole_frame() {
        let tiles = build_tile_grid(64, 64, 1, 1);
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].ctu_cols, 2);
        assert_eq!(tiles[0].ctu_rows, 2);
    }

    #[test]
    fn tile_grid_partitions_all_ctus_without_overlap() {
        let tiles = build_tile_grid(128, 64, 2, 1);
        assert_eq!(tiles.len(), 2);
        let total_ctus: usize = tiles.iter().map(|t| t.ctu_cols * t.ctu_rows).sum();
        assert_eq!(total_ctus, (128 / CTU_WIDTH) * (64 / CTU_HEIGHT));
    }

    #[test]
    fn single_tile_run_produces_terminated_bytes() {
        let tiles = build_tile_grid(CTU_WIDTH, CTU_HEIGHT, 1, 1);
        let mut worker = TileWorker::new(tiles[0], 32);
        let source = Frame::new(CTU_WIDTH, CTU_HEIGHT);
        let (bytes, _recon) = worker.run(&source, CTU_WIDTH, CTU_HEIGHT);
        assert!(!bytes.is_empty());
    }
}
