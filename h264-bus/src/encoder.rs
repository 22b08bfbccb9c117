use ffmpeg_next::{Rational, format::Pixel};

use crate::{
    accel::EncodeAccelerator,
    error::{StreamError, StreamResult},
    frame::{Nv12Layout, RawPicture},
    hw::{HwDevice, HwFrames, accel_error, find_h264_encoder},
    packet::EncodedUnit,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub layout: Nv12Layout,
    pub fps: u32,
    /// 1 makes every picture an IDR preceded by SPS/PPS.
    pub gop_size: u32,
    pub max_b_frames: usize,
    pub level: i32,
    pub qmin: Option<i32>,
    pub qmax: Option<i32>,
    pub global_quality: Option<i32>,
}

impl EncoderSettings {
    pub fn new(layout: Nv12Layout, fps: u32) -> Self {
        Self {
            layout,
            fps,
            gop_size: 1,
            max_b_frames: 0,
            level: 20,
            qmin: None,
            qmax: None,
            global_quality: None,
        }
    }
}

/// H.264 encoding on a VAAPI device. Pictures are uploaded from NV12 system
/// memory into the device's surface pool before submission.
pub struct VaapiEncoder {
    encoder: ffmpeg_next::codec::encoder::Video,
    frames: HwFrames,
    layout: Nv12Layout,
    // kept alive for the frame pool and the codec
    _device: HwDevice,
}

impl VaapiEncoder {
    pub fn new(device: HwDevice, settings: &EncoderSettings) -> StreamResult<Self> {
        if settings.fps == 0 {
            return Err(StreamError::InvalidArgument("fps must be positive".to_string()));
        }
        let layout = settings.layout;
        let codec = find_h264_encoder()?;
        let frames = HwFrames::nv12(&device, layout.width, layout.height)?;

        let ctx = ffmpeg_next::codec::Context::new_with_codec(codec);
        let mut encoder = ctx
            .encoder()
            .video()
            .map_err(|e| accel_error("encoder context", e))?;
        encoder.set_width(layout.width);
        encoder.set_height(layout.height);
        encoder.set_format(Pixel::VAAPI);
        encoder.set_time_base(Rational(1, settings.fps as i32));
        encoder.set_frame_rate(Some(Rational(settings.fps as i32, 1)));
        encoder.set_aspect_ratio(Rational(1, 1));
        encoder.set_gop(settings.gop_size);
        encoder.set_max_b_frames(settings.max_b_frames);
        unsafe {
            let raw = encoder.as_mut_ptr();
            (*raw).level = settings.level;
            if let Some(q) = settings.qmin {
                (*raw).qmin = q;
            }
            if let Some(q) = settings.qmax {
                (*raw).qmax = q;
            }
            if let Some(q) = settings.global_quality {
                (*raw).global_quality = q;
            }
            (*raw).hw_frames_ctx = frames.new_ref()?;
        }

        let encoder = encoder
            .open_as(codec)
            .map_err(|e| accel_error("cannot open video encoder", e))?;
        log::info!(
            "encoder opened: {}, {}, {} fps, gop: {}",
            codec.name(),
            layout,
            settings.fps,
            settings.gop_size
        );

        Ok(Self {
            encoder,
            frames,
            layout,
            _device: device,
        })
    }

    fn to_surface(&self, picture: &RawPicture) -> StreamResult<ffmpeg_next::frame::Video> {
        if picture.size() != self.layout.frame_len() {
            return Err(StreamError::InvalidArgument(format!(
                "picture of {} bytes, {} needs {}",
                picture.size(),
                self.layout,
                self.layout.frame_len()
            )));
        }
        let (width, height) = (self.layout.width as usize, self.layout.height as usize);
        let mut sw = ffmpeg_next::frame::Video::new(Pixel::NV12, self.layout.width, self.layout.height);
        let (luma, chroma) = picture.data.split_at(self.layout.luma_len());
        copy_plane(&mut sw, 0, luma, width, height);
        copy_plane(&mut sw, 1, chroma, width, height / 2);

        let mut hw = self.frames.upload(&sw)?;
        hw.set_pts(Some(picture.pts));
        Ok(hw)
    }
}

fn copy_plane(frame: &mut ffmpeg_next::frame::Video, plane: usize, src: &[u8], row_len: usize, rows: usize) {
    let stride = frame.stride(plane);
    let dst = frame.data_mut(plane);
    for (row, line) in src.chunks_exact(row_len).take(rows).enumerate() {
        dst[row * stride..row * stride + row_len].copy_from_slice(line);
    }
}

impl EncodeAccelerator for VaapiEncoder {
    fn send_picture(&mut self, picture: Option<&RawPicture>) -> StreamResult<()> {
        match picture {
            Some(picture) => {
                let surface = self.to_surface(picture)?;
                self.encoder
                    .send_frame(&surface)
                    .map_err(|e| accel_error("send frame", e))
            }
            None => self.encoder.send_eof().map_err(|e| accel_error("send eof", e)),
        }
    }

    fn receive_unit(&mut self) -> StreamResult<Option<EncodedUnit>> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        match self.encoder.receive_packet(&mut packet) {
            Ok(()) => Ok(Some(EncodedUnit::from(&packet))),
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(e) => Err(accel_error("receive packet", e)),
        }
    }
}
