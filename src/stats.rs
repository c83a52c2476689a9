// Per-frame PSNR and byte-rate reporting: `Statistics.txt` (tab-separated
// frame number / QP / byte count / encode time) and `RD.txt` (per-frame
// PSNR Y/Cb/Cr + byte rate), grounded on `original_source/src/EncTop.cpp`'s
// reporting responsibilities, which spec.md §1 places outside the encoding
// core but which a runnable binary still needs.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::frame::{Frame, Plane};

#[derive(Clone, Copy, Debug)]
pub struct FrameStats {
    pub frame_number: u32,
    pub qp: u32,
    pub bytes: usize,
    pub encode_time: Duration,
    pub psnr_y: f64,
    pub psnr_u: f64,
    pub psnr_v: f64,
}

/// Mean squared error between two equally-sized planes, converted to PSNR
/// in dB. 8-bit samples, so `MAX = 255`.
pub fn psnr(reference: &Plane, reconstructed: &Plane) -> f64 {
    assert_eq!(reference.width, reconstructed.width);
    assert_eq!(reference.height, reconstructed.height);

    let mut sum_sq_err = 0u64;
    for row in 0..reference.height {
        for (a, b) in reference.row(row).iter().zip(reconstructed.row(row).iter()) {
            let diff = *a as i32 - *b as i32;
            sum_sq_err += (diff * diff) as u64;
        }
    }
    let samples = (reference.width * reference.height) as f64;
    let mse = sum_sq_err as f64 / samples;
    if mse == 0.0 {
        return f64::INFINITY;
    }
    10.0 * (255.0f64 * 255.0 / mse).log10()
}

pub fn frame_psnr(source: &Frame, recon: &Frame) -> (f64, f64, f64) {
    (psnr(source.y(), recon.y()), psnr(source.u(), recon.u()), psnr(source.v(), recon.v()))
}

/// Accumulates per-frame stats across a run and writes both report files
/// when the encode finishes.
pub struct StatsWriter {
    frames: Vec<FrameStats>,
}

impl StatsWriter {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn record(&mut self, stats: FrameStats) {
        self.frames.push(stats);
    }

    pub fn write_statistics(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        writeln!(file, "frame\tqp\tbytes\tencode_ms")?;
        for f in &self.frames {
            writeln!(file, "{}\t{}\t{}\t{}", f.frame_number, f.qp, f.bytes, f.encode_time.as_millis())?;
        }
        Ok(())
    }

    pub fn write_rd(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        writeln!(file, "frame\tpsnr_y\tpsnr_u\tpsnr_v\tbytes")?;
        for f in &self.frames {
            writeln!(file, "{}\t{:.4}\t{:.4}\t{:.4}\t{}", f.frame_number, f.psnr_y, f.psnr_u, f.psnr_v, f.bytes)?;
        }
        Ok(())
    }
}

impl Default for StatsWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_planes_give_infinite_psnr() {
        let a = Plane::new(16, 16);
        let b = Plane::new(16, 16);
        assert_eq!(psnr(&a, &b), f64::INFINITY);
    }

    #[test]
    fn differing_planes_give_finite_psnr() {
        let a = Plane::new(16, 16);
        let mut b = Plane::new(16, 16);
        b.set(0, 0, 0);
        let value = psnr(&a, &b);
        assert!(value.is_finite());
        assert!(value > 0.0);
    }

    #[test]
    fn writer_produces_both_report_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = StatsWriter::new();
        writer.record(FrameStats {
            frame_number: 0,
            qp: 32,
            bytes: 128,
            encode_time: Duration::from_millis(5),
            psnr_y: 40.0,
            psnr_u: 42.0,
            psnr_v: 43.0,
        });

        let stats_path = dir.path().join("Statistics.txt");
        let rd_path = dir.path().join("RD.txt");
        writer.write_statistics(&stats_path).unwrap();
        writer.write_rd(&rd_path).unwrap();

        assert!(stats_path.exists());
        assert!(rd_path.exists());
    }
}
