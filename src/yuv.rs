// Raw planar 4:2:0 YUV file I/O: one frame is Y, then Cb, then Cr, with no
// per-frame header, matching spec.md §6's input format. Adapted in idiom
// from the teacher's `y4m.rs` reader (a `File` held open across frame
// reads, one `read_exact`/`write_all` call per plane) but without y4m's
// container header, since the source format here has none.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{EncoderError, Result};
use crate::frame::Frame;

/// Sequential reader over a headerless planar YUV 4:2:0 file.
pub struct YuvReader {
    file: File,
    width: usize,
    height: usize,
}

impl YuvReader {
    pub fn open(path: &Path, width: usize, height: usize) -> Result<Self> {
        let file = File::open(path).map_err(|_| EncoderError::InputNotFound(path.to_path_buf()))?;
        Ok(Self { file, width, height })
    }

    pub fn frame_size(&self) -> usize {
        let luma = self.width * self.height;
        luma + 2 * (luma / 4)
    }

    /// Reads one frame's worth of Y/Cb/Cr planes. Returns `Ok(None)` at a
    /// clean end of file (zero bytes read for the luma plane); a short
    /// read partway through a frame is an I/O error per spec.md §7's
    /// "short read on YUV" case, logged and surfaced rather than silently
    /// truncated.
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        let mut frame = Frame::new(self.width, self.height);

        if !read_plane_or_eof(&mut self.file, frame.y_mut())? {
            return Ok(None);
        }
        read_plane(&mut self.file, frame.u_mut())?;
        read_plane(&mut self.file, frame.v_mut())?;
        Ok(Some(frame))
    }
}

fn read_plane_or_eof(file: &mut File, plane: &mut crate::frame::Plane) -> Result<bool> {
    let expected = plane.data.len();
    let mut got = 0;
    let mut buf = vec![0u8; expected];
    loop {
        match file.read(&mut buf[got..])? {
            0 => break,
            n => got += n,
        }
    }
    if got == 0 {
        return Ok(false);
    }
    if got != expected {
        log::warn!("short read on YUV plane: expected {expected} bytes, got {got}");
        return Err(EncoderError::ShortRead { expected, got });
    }
    plane.data.copy_from_slice(&buf);
    Ok(true)
}

fn read_plane(file: &mut File, plane: &mut crate::frame::Plane) -> Result<()> {
    let expected = plane.data.len();
    file.read_exact(&mut plane.data).map_err(|e| {
        log::warn!("short read on YUV plane: expected {expected} bytes ({e})");
        EncoderError::Io(e)
    })
}

/// Sequential writer for the `--rec` reconstructed-YUV output, same
/// headerless planar layout as `YuvReader`.
pub struct YuvWriter {
    file: File,
}

impl YuvWriter {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self { file: File::create(path)? })
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.file.write_all(&frame.y().data)?;
        self.file.write_all(&frame.u().data)?;
        self.file.write_all(&frame.v().data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn round_trips_a_single_frame() {
        let tmp = NamedTempFile::new().unwrap();
        let frame = Frame::new(32, 32);
        {
            let mut writer = YuvWriter::create(tmp.path()).unwrap();
            writer.write_frame(&frame).unwrap();
        }

        let mut reader = YuvReader::open(tmp.path(), 32, 32).unwrap();
        let read_back = reader.read_frame().unwrap().expect("one frame present");
        assert_eq!(read_back.y().data, frame.y().data);
        assert_eq!(read_back.u().data, frame.u().data);
        assert_eq!(read_back.v().data, frame.v().data);

        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn missing_input_is_reported() {
        let err = YuvReader::open(Path::new("/nonexistent/path.yuv"), 32, 32).unwrap_err();
        assert!(matches!(err, EncoderError::InputNotFound(_)));
    }
}
