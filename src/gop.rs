// Thin per-frame driver: the GOP-iterating shell spec.md §1 places out of
// scope for the encoding core, kept here only because a runnable binary
// needs one. GOP size is fixed at 1 (every frame its own IDR slice, per
// the Open-Question resolution in DESIGN.md), so this reduces to "read a
// frame, run one `SliceDriver` over it, write the slice NAL".
//
// Grounded on `original_source/src/EncTop.cpp`'s top-level frame loop:
// parameter sets are written once up front, then each frame contributes
// one IDR slice NAL to the Annex-B stream.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use crate::driver::SliceDriver;
use crate::error::Result;
use crate::headers::{write_pps, write_sps, write_vps, SequenceParams};
use crate::stats::{frame_psnr, FrameStats, StatsWriter};
use crate::yuv::{YuvReader, YuvWriter};

pub struct GopConfig {
    pub width: usize,
    pub height: usize,
    pub num_frames: u32,
    pub qp: u32,
    pub tile_cols: u32,
    pub tile_rows: u32,
    pub tile_threads: usize,
    pub write_recon: bool,
    pub write_stats: bool,
}

/// Runs the whole encode: opens the input, writes parameter sets once,
/// then encodes each frame as its own IDR slice until the input is
/// exhausted or `num_frames` is reached.
pub fn run(config: &GopConfig, input_path: &Path, output_path: &Path, recon_path: &Path, stats_dir: &Path) -> Result<()> {
    let mut reader = YuvReader::open(input_path, config.width, config.height)?;
    let mut output = File::create(output_path)?;

    let mut recon_writer = if config.write_recon { Some(YuvWriter::create(recon_path)?) } else { None };

    let seq_params = SequenceParams {
        width: config.width as u32,
        height: config.height as u32,
        qp: config.qp,
        tile_cols: config.tile_cols,
        tile_rows: config.tile_rows,
    };
    output.write_all(&write_vps(0))?;
    output.write_all(&write_sps(0, 0, seq_params))?;
    output.write_all(&write_pps(0, 0, seq_params))?;

    let driver = SliceDriver::new(config.width, config.height, config.tile_cols, config.tile_rows, config.qp, 0);

    let mut stats = StatsWriter::new();
    let mut frame_number = 0u32;
    while frame_number < config.num_frames {
        let Some(source) = reader.read_frame()? else { break };

        let started = Instant::now();
        let (nal_bytes, recon) = driver.run(&source, config.tile_threads);
        let encode_time = started.elapsed();

        output.write_all(&nal_bytes)?;
        log::debug!("frame {frame_number}: {} bytes in {:?}", nal_bytes.len(), encode_time);

        if let Some(writer) = recon_writer.as_mut() {
            writer.write_frame(&recon)?;
        }

        if config.write_stats {
            let (psnr_y, psnr_u, psnr_v) = frame_psnr(&source, &recon);
            stats.record(FrameStats {
                frame_number,
                qp: config.qp,
                bytes: nal_bytes.len(),
                encode_time,
                psnr_y,
                psnr_u,
                psnr_v,
            });
        }

        frame_number += 1;
    }

    if config.write_stats {
        stats.write_statistics(&stats_dir.join("Statistics.txt"))?;
        stats.write_rd(&stats_dir.join("RD.txt"))?;
    }

    Ok(())
}
