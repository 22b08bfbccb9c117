//! VAAPI device and surface pool handles.
//!
//! Thin owners around the FFmpeg `AVBufferRef`s; dropping one unrefs it.

use std::{ffi::CString, ptr};

use ffmpeg_next::ffi;

use crate::error::{StreamError, StreamResult};

/// The H.264 encoder backed by VAAPI.
pub const VAAPI_H264_ENCODER: &str = "h264_vaapi";

/// Surfaces preallocated in the encoder's upload pool.
const FRAME_POOL_SIZE: i32 = 20;

/// Maps an FFmpeg error to the accelerator error kinds. `EAGAIN` is the only
/// transient one.
pub(crate) fn accel_error(what: &str, err: ffmpeg_next::Error) -> StreamError {
    match err {
        ffmpeg_next::Error::Other { errno } if errno == ffmpeg_next::util::error::EAGAIN => {
            StreamError::AcceleratorTransient
        }
        err => StreamError::Accelerator(format!("{}: {}", what, err)),
    }
}

fn check(what: &str, ret: i32) -> StreamResult<()> {
    if ret < 0 {
        return Err(accel_error(what, ffmpeg_next::Error::from(ret)));
    }
    Ok(())
}

/// Try to find the VAAPI H.264 encoder.
pub fn find_h264_encoder() -> StreamResult<ffmpeg_next::Codec> {
    let codec = ffmpeg_next::encoder::find_by_name(VAAPI_H264_ENCODER).ok_or_else(|| {
        StreamError::Accelerator(format!("encoder not available: {}", VAAPI_H264_ENCODER))
    })?;
    log::info!("found hardware encoder: {}", VAAPI_H264_ENCODER);
    Ok(codec)
}

/// An open VAAPI device.
pub struct HwDevice {
    ptr: *mut ffi::AVBufferRef,
}

// The device context is reference counted and only touched from the thread
// that owns the codec using it.
unsafe impl Send for HwDevice {}

impl HwDevice {
    /// Opens `path` (a DRM render node), or the default device when `None`.
    pub fn vaapi(path: Option<&str>) -> StreamResult<Self> {
        let c_path = path
            .map(CString::new)
            .transpose()
            .map_err(|e| StreamError::InvalidArgument(format!("device path: {}", e)))?;
        let mut ptr = ptr::null_mut();
        let ret = unsafe {
            ffi::av_hwdevice_ctx_create(
                &mut ptr,
                ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI,
                c_path.as_ref().map_or(ptr::null(), |p| p.as_ptr()),
                ptr::null_mut(),
                0,
            )
        };
        check("failed to create a VAAPI device", ret)?;
        log::info!("VAAPI device opened: {}", path.unwrap_or("default"));
        Ok(Self { ptr })
    }

    /// A new reference for a codec context to own.
    pub(crate) fn new_ref(&self) -> StreamResult<*mut ffi::AVBufferRef> {
        let r = unsafe { ffi::av_buffer_ref(self.ptr) };
        if r.is_null() {
            return Err(StreamError::Accelerator("av_buffer_ref failed".to_string()));
        }
        Ok(r)
    }
}

impl Drop for HwDevice {
    fn drop(&mut self) {
        unsafe { ffi::av_buffer_unref(&mut self.ptr) };
    }
}

/// A pool of VAAPI surfaces with NV12 as the software side format.
pub struct HwFrames {
    ptr: *mut ffi::AVBufferRef,
}

unsafe impl Send for HwFrames {}

impl HwFrames {
    pub fn nv12(device: &HwDevice, width: u32, height: u32) -> StreamResult<Self> {
        let mut ptr = unsafe { ffi::av_hwframe_ctx_alloc(device.ptr) };
        if ptr.is_null() {
            return Err(StreamError::Accelerator(
                "failed to create VAAPI frame context".to_string(),
            ));
        }
        let ret = unsafe {
            let frames = (*ptr).data as *mut ffi::AVHWFramesContext;
            (*frames).format = ffi::AVPixelFormat::AV_PIX_FMT_VAAPI;
            (*frames).sw_format = ffi::AVPixelFormat::AV_PIX_FMT_NV12;
            (*frames).width = width as i32;
            (*frames).height = height as i32;
            (*frames).initial_pool_size = FRAME_POOL_SIZE;
            ffi::av_hwframe_ctx_init(ptr)
        };
        if let Err(e) = check("failed to initialize VAAPI frame context", ret) {
            unsafe { ffi::av_buffer_unref(&mut ptr) };
            return Err(e);
        }
        Ok(Self { ptr })
    }

    pub(crate) fn new_ref(&self) -> StreamResult<*mut ffi::AVBufferRef> {
        let r = unsafe { ffi::av_buffer_ref(self.ptr) };
        if r.is_null() {
            return Err(StreamError::Accelerator("av_buffer_ref failed".to_string()));
        }
        Ok(r)
    }

    /// Takes a surface from the pool and uploads `sw` into it.
    pub fn upload(&self, sw: &ffmpeg_next::frame::Video) -> StreamResult<ffmpeg_next::frame::Video> {
        let mut hw = ffmpeg_next::frame::Video::empty();
        check("av_hwframe_get_buffer", unsafe {
            ffi::av_hwframe_get_buffer(self.ptr, hw.as_mut_ptr(), 0)
        })?;
        check("av_hwframe_transfer_data", unsafe {
            ffi::av_hwframe_transfer_data(hw.as_mut_ptr(), sw.as_ptr(), 0)
        })?;
        Ok(hw)
    }
}

impl Drop for HwFrames {
    fn drop(&mut self) {
        unsafe { ffi::av_buffer_unref(&mut self.ptr) };
    }
}

/// Copies a hardware surface back into system memory. Software frames are
/// returned as they are.
pub fn download(frame: ffmpeg_next::frame::Video) -> StreamResult<ffmpeg_next::frame::Video> {
    if frame.format() != ffmpeg_next::format::Pixel::VAAPI {
        return Ok(frame);
    }
    let mut sw = ffmpeg_next::frame::Video::empty();
    check("av_hwframe_transfer_data", unsafe {
        ffi::av_hwframe_transfer_data(sw.as_mut_ptr(), frame.as_ptr(), 0)
    })?;
    sw.set_pts(frame.pts());
    Ok(sw)
}

/// Packs the planes of a software frame back to back, rows without padding.
pub fn pack_planes(frame: &ffmpeg_next::frame::Video) -> StreamResult<Vec<u8>> {
    let format: ffi::AVPixelFormat = frame.format().into();
    let (width, height) = (frame.width() as i32, frame.height() as i32);
    let size = unsafe { ffi::av_image_get_buffer_size(format, width, height, 1) };
    check("av_image_get_buffer_size", size)?;

    let mut buf = vec![0u8; size as usize];
    let ret = unsafe {
        let raw = frame.as_ptr();
        ffi::av_image_copy_to_buffer(
            buf.as_mut_ptr(),
            size,
            (*raw).data.as_ptr() as *const *const u8,
            (*raw).linesize.as_ptr(),
            format,
            width,
            height,
            1,
        )
    };
    check("av_image_copy_to_buffer", ret)?;
    Ok(buf)
}
