use std::path::Path;

use crate::capture::domain::capture_error::CaptureError;
use crate::capture::domain::media_devices::{
    select_device, MediaConstraints, MediaDevices, MediaStream, VideoInputDevice,
};
use crate::shared::frame::Frame;

/// `errno` for a denied open on every platform ffmpeg supports.
const EACCES: i32 = 13;

/// Name of the libavdevice input format for the current platform.
#[cfg(target_os = "linux")]
const PLATFORM_INPUT_FORMAT: &str = "video4linux2,v4l2";
#[cfg(target_os = "macos")]
const PLATFORM_INPUT_FORMAT: &str = "avfoundation";
#[cfg(target_os = "windows")]
const PLATFORM_INPUT_FORMAT: &str = "dshow";
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const PLATFORM_INPUT_FORMAT: &str = "";

/// Camera access through libavdevice (v4l2, avfoundation or dshow).
///
/// Linux devices are discovered from `/dev/video*`. Other platforms have no
/// portable listing API in ffmpeg, so they expose the system default camera
/// unless an explicit device list is configured.
pub struct FfmpegMediaDevices {
    configured: Option<Vec<VideoInputDevice>>,
}

impl FfmpegMediaDevices {
    pub fn new() -> Self {
        Self { configured: None }
    }

    /// Uses `devices` instead of probing the host.
    pub fn with_devices(devices: Vec<VideoInputDevice>) -> Self {
        Self {
            configured: Some(devices),
        }
    }

    fn input_format() -> Option<ffmpeg_next::Format> {
        if ffmpeg_next::init().is_err() {
            return None;
        }
        ffmpeg_next::device::register_all();
        ffmpeg_next::device::input::video().find(|f| f.name() == PLATFORM_INPUT_FORMAT)
    }
}

impl Default for FfmpegMediaDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaDevices for FfmpegMediaDevices {
    fn is_supported(&self) -> bool {
        Self::input_format().is_some()
    }

    fn enumerate_video_inputs(&self) -> Result<Vec<VideoInputDevice>, CaptureError> {
        if let Some(devices) = &self.configured {
            return Ok(devices.clone());
        }
        probe_devices()
    }

    fn get_user_media(
        &mut self,
        constraints: &MediaConstraints,
    ) -> Result<Box<dyn MediaStream>, CaptureError> {
        let devices = self.enumerate_video_inputs()?;
        let device = select_device(&devices, constraints.facing_mode).ok_or(
            CaptureError::NoDevice {
                facing_mode: constraints.facing_mode,
            },
        )?;

        let size = format!("{}x{}", constraints.ideal_width, constraints.ideal_height);
        let ictx = match open_device(&device.id, Some(&size)) {
            Ok(ictx) => ictx,
            Err(CaptureError::Overconstrained { reason, .. }) => {
                // The resolution is only a preference; retry with the device default.
                log::debug!("{} rejected {size} ({reason}), using device default", device.id);
                open_device(&device.id, None)?
            }
            Err(e) => return Err(e),
        };

        let stream = FfmpegStream::from_input(ictx, &device.id)?;
        log::info!(
            "Opened {} ({}) at {}x{}",
            device.id,
            device.label,
            stream.width,
            stream.height
        );
        Ok(Box::new(stream))
    }
}

#[cfg(target_os = "linux")]
fn probe_devices() -> Result<Vec<VideoInputDevice>, CaptureError> {
    let entries =
        std::fs::read_dir("/dev").map_err(|e| CaptureError::Enumeration(e.to_string()))?;

    let mut nodes: Vec<(u32, String)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let number = name.strip_prefix("video")?.parse::<u32>().ok()?;
            Some((number, name))
        })
        .collect();
    nodes.sort();

    Ok(nodes
        .into_iter()
        .map(|(_, name)| {
            let sysfs_name = Path::new("/sys/class/video4linux").join(&name).join("name");
            let label = std::fs::read_to_string(sysfs_name)
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            VideoInputDevice::new(format!("/dev/{name}"), label)
        })
        .collect())
}

#[cfg(not(target_os = "linux"))]
fn probe_devices() -> Result<Vec<VideoInputDevice>, CaptureError> {
    #[cfg(target_os = "windows")]
    let default = VideoInputDevice::new("video=Integrated Camera", "Integrated Camera");
    #[cfg(not(target_os = "windows"))]
    let default = VideoInputDevice::new("0", "Default camera");
    Ok(vec![default])
}

fn open_device(
    id: &str,
    video_size: Option<&str>,
) -> Result<ffmpeg_next::format::context::Input, CaptureError> {
    let format = FfmpegMediaDevices::input_format().ok_or(CaptureError::Unsupported)?;
    let mut options = ffmpeg_next::Dictionary::new();
    if let Some(size) = video_size {
        options.set("video_size", size);
    }
    #[cfg(target_os = "macos")]
    options.set("framerate", "30");

    let ctx = ffmpeg_next::format::open_with(
        Path::new(id),
        &format,
        options,
    )
    .map_err(|e| classify_open_error(id, e))?;

    match ctx {
        ffmpeg_next::format::context::Context::Input(ictx) => Ok(ictx),
        ffmpeg_next::format::context::Context::Output(_) => Err(CaptureError::Open {
            device: id.to_string(),
            source: "device opened as an output".into(),
        }),
    }
}

fn classify_open_error(id: &str, e: ffmpeg_next::Error) -> CaptureError {
    match e {
        ffmpeg_next::Error::Other { errno } if errno == EACCES => CaptureError::PermissionDenied {
            device: id.to_string(),
        },
        ffmpeg_next::Error::InvalidData | ffmpeg_next::Error::OptionNotFound => {
            CaptureError::Overconstrained {
                device: id.to_string(),
                reason: e.to_string(),
            }
        }
        other => CaptureError::Open {
            device: id.to_string(),
            source: Box::new(other),
        },
    }
}

/// A decoding camera stream converted to RGB24 frames.
struct FfmpegStream {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    video_stream_index: usize,
    track_count: usize,
    width: u32,
    height: u32,
    live: bool,
}

// Safety: a stream is owned by the capture controller and only touched from
// the thread that currently holds it; ffmpeg pointers are never shared.
unsafe impl Send for FfmpegStream {}

impl FfmpegStream {
    fn from_input(
        ictx: ffmpeg_next::format::context::Input,
        device: &str,
    ) -> Result<Self, CaptureError> {
        let open_err = |e: ffmpeg_next::Error| CaptureError::Open {
            device: device.to_string(),
            source: Box::new(e),
        };

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| CaptureError::Open {
                device: device.to_string(),
                source: "no video track".into(),
            })?;
        let video_stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(open_err)?;
        let decoder = codec_ctx.decoder().video().map_err(open_err)?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(open_err)?;
        let track_count = ictx.streams().count();

        Ok(Self {
            ictx,
            decoder,
            scaler,
            video_stream_index,
            track_count,
            width,
            height,
            live: true,
        })
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, CaptureError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb)
            .map_err(|e| CaptureError::Read(e.to_string()))?;
        let pixels = extract_rgb_pixels(&rgb, self.width, self.height);
        Ok(Some(Frame::new(pixels, self.width, self.height, 0)))
    }
}

impl MediaStream for FfmpegStream {
    fn live_tracks(&self) -> usize {
        if self.live {
            self.track_count
        } else {
            0
        }
    }

    fn stop(&mut self) {
        self.live = false;
        let _ = self.decoder.send_eof();
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if !self.live {
            return Ok(None);
        }
        loop {
            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
            let Some((stream, packet)) = self.ictx.packets().next() else {
                self.live = false;
                return Ok(None);
            };
            if stream.index() != self.video_stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .map_err(|e| CaptureError::Read(e.to_string()))?;
        }
    }
}

/// Strips per-row stride padding from an RGB24 ffmpeg frame.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_bytes = width as usize * Frame::CHANNELS;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    pixels
}
