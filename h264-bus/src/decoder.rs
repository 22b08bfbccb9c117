use std::ptr;

use bytes::Bytes;
use ffmpeg_next::ffi;

use crate::{
    accel::DecodeAccelerator,
    bootstrap::DecodeContext,
    error::{StreamError, StreamResult},
    frame::RawPicture,
    hw::{HwDevice, accel_error, download, pack_planes},
};

/// H.264 decoding on a VAAPI device. Decoded surfaces are copied back to
/// system memory and packed without row padding.
pub struct VaapiDecoder {
    device: HwDevice,
    decoder: Option<ffmpeg_next::codec::decoder::Video>,
    next_pts: i64,
}

impl VaapiDecoder {
    pub fn new(device: HwDevice) -> Self {
        Self {
            device,
            decoder: None,
            next_pts: 0,
        }
    }

    fn decoder(&mut self) -> StreamResult<&mut ffmpeg_next::codec::decoder::Video> {
        self.decoder
            .as_mut()
            .ok_or_else(|| StreamError::Accelerator("decoder used before configure".to_string()))
    }
}

impl DecodeAccelerator for VaapiDecoder {
    fn configure(&mut self, context: &DecodeContext) -> StreamResult<()> {
        let stream = context.stream();
        let codec = ffmpeg_next::decoder::find(stream.codec().into()).ok_or_else(|| {
            StreamError::DecoderConfig(format!("decoder not available: {}", stream.codec().name()))
        })?;

        let mut ctx = ffmpeg_next::codec::Context::new_with_codec(codec);
        let block = context.parameter_sets().as_bytes();
        unsafe {
            let raw = ctx.as_mut_ptr();
            // the codec context owns and frees its extradata
            let extradata =
                ffi::av_mallocz(block.len() + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize) as *mut u8;
            if extradata.is_null() {
                return Err(StreamError::DecoderConfig("extradata allocation failed".to_string()));
            }
            ptr::copy_nonoverlapping(block.as_ptr(), extradata, block.len());
            (*raw).extradata = extradata;
            (*raw).extradata_size = block.len() as i32;
            (*raw).hw_device_ctx = self.device.new_ref()?;
        }

        let decoder = ctx
            .decoder()
            .video()
            .map_err(|e| StreamError::DecoderConfig(format!("cannot open decoder: {}", e)))?;
        log::info!("decoder opened: {}, {}", codec.name(), stream);
        self.decoder = Some(decoder);
        Ok(())
    }

    fn send_unit(&mut self, unit: &[u8]) -> StreamResult<()> {
        let decoder = self.decoder()?;
        if unit.is_empty() {
            return decoder.send_eof().map_err(|e| accel_error("send eof", e));
        }
        let packet = ffmpeg_next::codec::packet::Packet::copy(unit);
        decoder
            .send_packet(&packet)
            .map_err(|e| accel_error("send packet", e))
    }

    fn receive_picture(&mut self) -> StreamResult<Option<RawPicture>> {
        let mut frame = ffmpeg_next::frame::Video::empty();
        match self.decoder()?.receive_frame(&mut frame) {
            Ok(()) => {}
            Err(ffmpeg_next::Error::Eof) => return Ok(None),
            Err(e) => return Err(accel_error("receive frame", e)),
        }

        let frame = download(frame)?;
        let data = pack_planes(&frame)?;
        let pts = frame.pts().unwrap_or(self.next_pts);
        self.next_pts = pts + 1;
        log::debug!(
            "decoded picture {}x{} {:?}, pts: {}",
            frame.width(),
            frame.height(),
            frame.format(),
            pts
        );
        Ok(Some(RawPicture::new(Bytes::from(data), pts)))
    }
}
