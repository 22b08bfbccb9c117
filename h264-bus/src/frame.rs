use std::{
    fmt::{Display, Formatter},
    io::{ErrorKind, Read},
};

use bytes::{Bytes, BytesMut};

use crate::error::{StreamError, StreamResult};

/// An uncompressed picture in packed system memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPicture {
    pub data: Bytes,
    pub pts: i64,
}

impl RawPicture {
    pub fn new(data: Bytes, pts: i64) -> Self {
        Self { data, pts }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// NV12: a full resolution Y plane followed by an interleaved half resolution
/// UV plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nv12Layout {
    pub width: u32,
    pub height: u32,
}

impl Nv12Layout {
    pub fn new(width: u32, height: u32) -> StreamResult<Self> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(StreamError::InvalidArgument(format!(
                "invalid NV12 size {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    pub fn luma_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn chroma_len(&self) -> usize {
        self.luma_len() / 2
    }

    pub fn frame_len(&self) -> usize {
        self.luma_len() + self.chroma_len()
    }
}

impl Display for Nv12Layout {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "nv12 {}x{}", self.width, self.height)
    }
}

/// Reads back-to-back NV12 frames from a byte channel.
pub struct RawFrameReader<R: Read> {
    reader: R,
    layout: Nv12Layout,
    next_pts: i64,
    done: bool,
}

impl<R: Read> RawFrameReader<R> {
    pub fn new(reader: R, layout: Nv12Layout) -> Self {
        Self {
            reader,
            layout,
            next_pts: 0,
            done: false,
        }
    }

    /// `Ok(None)` once the channel closes. A trailing partial frame is dropped.
    pub fn read_frame(&mut self) -> StreamResult<Option<RawPicture>> {
        if self.done {
            return Ok(None);
        }
        let frame_len = self.layout.frame_len();
        let mut buf = BytesMut::zeroed(frame_len);
        let mut filled = 0;
        while filled < frame_len {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled < frame_len {
            self.done = true;
            if filled > 0 {
                log::warn!(
                    "dropping partial {} frame: {} of {} bytes",
                    self.layout,
                    filled,
                    frame_len
                );
            }
            return Ok(None);
        }

        let pts = self.next_pts;
        self.next_pts += 1;
        Ok(Some(RawPicture::new(buf.freeze(), pts)))
    }
}

impl<R: Read> Iterator for RawFrameReader<R> {
    type Item = StreamResult<RawPicture>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_frame().transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_layout_sizes() -> anyhow::Result<()> {
        let layout = Nv12Layout::new(640, 480)?;
        assert_eq!(layout.luma_len(), 640 * 480);
        assert_eq!(layout.chroma_len(), 640 * 480 / 2);
        assert_eq!(layout.frame_len(), 640 * 480 * 3 / 2);
        assert!(Nv12Layout::new(0, 480).is_err());
        assert!(Nv12Layout::new(641, 480).is_err());
        Ok(())
    }

    #[test]
    fn test_read_frames_and_drop_partial() -> anyhow::Result<()> {
        let layout = Nv12Layout::new(4, 2)?;
        let mut input = vec![1u8; layout.frame_len() * 2];
        input.extend_from_slice(&[9, 9, 9]);

        let frames: Vec<RawPicture> =
            RawFrameReader::new(Cursor::new(input), layout).collect::<Result<_, _>>()?;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].pts, 0);
        assert_eq!(frames[1].pts, 1);
        assert_eq!(frames[1].size(), 12);
        Ok(())
    }

    #[test]
    fn test_read_empty_channel() -> anyhow::Result<()> {
        let mut reader = RawFrameReader::new(Cursor::new(Vec::new()), Nv12Layout::new(2, 2)?);
        assert!(reader.read_frame()?.is_none());
        assert!(reader.read_frame()?.is_none());
        Ok(())
    }
}
