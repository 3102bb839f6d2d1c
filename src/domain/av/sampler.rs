//! Frame sampling on top of the ffmpeg decoder.
//!
//! Every frame is decoded so that `frame_index` counts decode order exactly;
//! only every `step`-th frame is converted to RGB and handed to the caller.

use crate::error::ScanError;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{context::Context as Scaler, flag::Flags};
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProbe {
    /// 0.0 when the container does not tell
    pub fps: f64,
    pub total_frames: u64,
    pub duration: f64,
}

/// Which frames get sampled and at what timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cadence {
    step: u64,
    fps: f64,
}

impl Cadence {
    /// `step = max(1, round(fps / sample_rate))`. Without a usable frame
    /// rate every frame is sampled.
    pub fn new(fps: f64, sample_rate: f64) -> Self {
        let step = if fps > 0.0 && sample_rate > 0.0 {
            ((fps / sample_rate).round() as u64).max(1)
        } else {
            1
        };
        Self { step, fps }
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn is_sampled(&self, frame_index: u64) -> bool {
        frame_index % self.step == 0
    }

    /// Seconds from the start; the frame index itself when fps is unknown.
    pub fn timestamp(&self, frame_index: u64) -> f64 {
        if self.fps > 0.0 {
            frame_index as f64 / self.fps
        } else {
            frame_index as f64
        }
    }
}

/// Target size for detection: downscale to `max_width` keeping the aspect
/// ratio, never upscale, and keep the original size for degenerate inputs.
pub fn detection_size(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width == 0 || height == 0 || max_width == 0 || width <= max_width {
        return (width, height);
    }
    let new_height = (u64::from(max_width) * u64::from(height) / u64::from(width)) as u32;
    if new_height == 0 {
        return (width, height);
    }
    (max_width, new_height)
}

/// One sampled frame: the full-resolution picture (for thumbnails) and the
/// downscaled one the classifiers see.
#[derive(Debug, Clone)]
pub struct SampledFrame {
    pub index: u64,
    pub timestamp: f64,
    pub full: RgbImage,
    pub detect: RgbImage,
}

pub struct FrameSampler {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    probe: VideoProbe,
}

impl FrameSampler {
    pub fn open(path: &Path) -> Result<Self, ScanError> {
        let open_error = |message: String| ScanError::Open {
            path: path.to_path_buf(),
            message,
        };

        ffmpeg::init().map_err(|e| open_error(e.to_string()))?;
        let input = ffmpeg::format::input(&path).map_err(|e| open_error(e.to_string()))?;

        let (stream_index, fps, total_frames, parameters) = {
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| ScanError::NoVideoStream(path.to_path_buf()))?;
            let fps = rational_to_f64(stream.avg_frame_rate())
                .or_else(|| rational_to_f64(stream.rate()))
                .unwrap_or(0.0);
            (
                stream.index(),
                fps,
                stream.frames().max(0) as u64,
                stream.parameters(),
            )
        };

        let context = ffmpeg::codec::context::Context::from_parameters(parameters)
            .map_err(|e| open_error(e.to_string()))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| open_error(e.to_string()))?;

        let duration = if total_frames > 0 && fps > 0.0 {
            total_frames as f64 / fps
        } else if input.duration() > 0 {
            input.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
        } else {
            0.0
        };

        Ok(Self {
            path: path.to_path_buf(),
            input,
            stream_index,
            decoder,
            probe: VideoProbe {
                fps,
                total_frames,
                duration,
            },
        })
    }

    pub fn probe(&self) -> VideoProbe {
        self.probe
    }

    /// Decode the whole stream and call `on_sample` for every frame on the
    /// cadence. Returns the number of frames handed out.
    pub fn run<F>(self, sample_rate: f64, max_width: u32, mut on_sample: F) -> Result<u64, ScanError>
    where
        F: FnMut(SampledFrame),
    {
        let cadence = Cadence::new(self.probe.fps, sample_rate);
        let mut converter = FrameConverter::new(max_width);
        let mut sampled = 0;

        tracing::debug!(
            "sampling {:?} every {} frame(s) at {:.3} fps",
            self.path,
            cadence.step(),
            self.probe.fps
        );

        self.decode(|index, frame| {
            if cadence.is_sampled(index) {
                match converter.convert(frame) {
                    Ok((full, detect)) => {
                        on_sample(SampledFrame {
                            index,
                            timestamp: cadence.timestamp(index),
                            full,
                            detect,
                        });
                        sampled += 1;
                    }
                    Err(e) => tracing::warn!("frame {} skipped: {}", index, e),
                }
            }
            ControlFlow::Continue(())
        })?;

        Ok(sampled)
    }

    /// First decodable frame at full resolution.
    pub fn first_frame(self) -> Result<RgbImage, ScanError> {
        let path = self.path.clone();
        let mut converter = FrameConverter::new(u32::MAX);
        let mut first = None;

        self.decode(|index, frame| match converter.convert(frame) {
            Ok((full, _)) => {
                first = Some(full);
                ControlFlow::Break(())
            }
            Err(e) => {
                tracing::debug!("frame {} not convertible: {}", index, e);
                ControlFlow::Continue(())
            }
        })?;

        first.ok_or(ScanError::NoFrame(path))
    }

    fn decode<F>(mut self, mut on_frame: F) -> Result<u64, ScanError>
    where
        F: FnMut(u64, &VideoFrame) -> ControlFlow<()>,
    {
        let mut decoded = VideoFrame::empty();
        let mut index = 0u64;

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            if let Err(e) = self.decoder.send_packet(&packet) {
                tracing::debug!("skipping undecodable packet: {}", e);
                continue;
            }
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let flow = on_frame(index, &decoded);
                index += 1;
                if flow.is_break() {
                    return Ok(index);
                }
            }
        }

        if self.decoder.send_eof().is_ok() {
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let flow = on_frame(index, &decoded);
                index += 1;
                if flow.is_break() {
                    break;
                }
            }
        }

        Ok(index)
    }
}

fn rational_to_f64(rational: ffmpeg::Rational) -> Option<f64> {
    if rational.numerator() > 0 && rational.denominator() > 0 {
        Some(f64::from(rational))
    } else {
        None
    }
}

/// Decoded frame to RGB, with scalers rebuilt whenever the input geometry
/// changes mid-stream.
struct FrameConverter {
    max_width: u32,
    geometry: Option<(Pixel, u32, u32)>,
    full: Option<Scaler>,
    detect: Option<Scaler>,
}

impl FrameConverter {
    fn new(max_width: u32) -> Self {
        Self {
            max_width,
            geometry: None,
            full: None,
            detect: None,
        }
    }

    fn convert(&mut self, frame: &VideoFrame) -> Result<(RgbImage, RgbImage), ScanError> {
        let geometry = (frame.format(), frame.width(), frame.height());
        let (format, width, height) = geometry;
        if width == 0 || height == 0 {
            return Err(ScanError::Decode("frame has no pixels".to_string()));
        }

        if self.geometry != Some(geometry) {
            self.full = Some(Scaler::get(
                format,
                width,
                height,
                Pixel::RGB24,
                width,
                height,
                Flags::BILINEAR,
            )?);
            let (dw, dh) = detection_size(width, height, self.max_width);
            self.detect = if (dw, dh) != (width, height) {
                Some(Scaler::get(
                    format,
                    width,
                    height,
                    Pixel::RGB24,
                    dw,
                    dh,
                    Flags::AREA,
                )?)
            } else {
                None
            };
            self.geometry = Some(geometry);
        }

        let full = match self.full.as_mut() {
            Some(scaler) => scale(scaler, frame)?,
            None => return Err(ScanError::Decode("no scaler".to_string())),
        };
        let detect = match self.detect.as_mut() {
            Some(scaler) => scale(scaler, frame)?,
            None => full.clone(),
        };
        Ok((full, detect))
    }
}

fn scale(scaler: &mut Scaler, frame: &VideoFrame) -> Result<RgbImage, ScanError> {
    let mut rgb = VideoFrame::empty();
    scaler.run(frame, &mut rgb)?;
    packed_rgb(&rgb).ok_or_else(|| ScanError::Decode("short RGB buffer".to_string()))
}

/// Copy an RGB24 frame into a tightly packed image, dropping line padding.
fn packed_rgb(frame: &VideoFrame) -> Option<RgbImage> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let stride = frame.stride(0);
    let row = width * 3;
    let data = frame.data(0);

    let mut buffer = Vec::with_capacity(row * height);
    for y in 0..height {
        let start = y * stride;
        buffer.extend_from_slice(data.get(start..start + row)?);
    }
    RgbImage::from_raw(frame.width(), frame.height(), buffer)
}
