use crate::capture::domain::frame_source::{CaptureError, FrameSource, SourceConfig};
use crate::capture::source_probe::SourceOpener;
use crate::shared::frame::Frame;

/// Live frames decoded by ffmpeg-next from a camera device, a stream URL,
/// or a video file.
///
/// Each decoded frame is converted to RGB24. When a file or stream ends the
/// input is reopened, so file input loops like an endless feed.
pub struct FfmpegFrameSource {
    location: String,
    config: SourceConfig,
    input: Option<OpenInput>,
    frame_index: usize,
}

struct OpenInput {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
}

// Safety: the source is moved into the capture thread and only used there.
// The raw pointers inside ffmpeg types are never shared across threads.
unsafe impl Send for FfmpegFrameSource {}

impl FfmpegFrameSource {
    /// Creates an unopened source; `configure` opens it.
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            config: SourceConfig::default(),
            input: None,
            frame_index: 0,
        }
    }

    /// Conventional device path for a numeric camera index.
    pub fn camera_location(index: u32) -> String {
        if cfg!(target_os = "linux") {
            format!("/dev/video{index}")
        } else {
            index.to_string()
        }
    }

    fn open_input(&self) -> Result<OpenInput, CaptureError> {
        let open_err = |reason: String| CaptureError::Open {
            source_name: self.location.clone(),
            reason,
        };
        ffmpeg_next::init().map_err(|e| open_err(e.to_string()))?;

        let mut options = ffmpeg_next::Dictionary::new();
        if self.is_device() {
            options.set(
                "video_size",
                &format!("{}x{}", self.config.width, self.config.height),
            );
            options.set("framerate", &self.config.fps.to_string());
        }
        // Keep stream latency low; device buffering is the caller's choice.
        if self.config.buffer_size <= 1 {
            options.set("fflags", "nobuffer");
        }

        let ictx = ffmpeg_next::format::input_with_dictionary(&self.location, options)
            .map_err(|e| open_err(e.to_string()))?;
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| open_err("no video stream found".to_string()))?;
        let stream_index = stream.index();

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| open_err(e.to_string()))?;
        let decoder = codec_ctx
            .decoder()
            .video()
            .map_err(|e| open_err(e.to_string()))?;

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
        .map_err(|e| open_err(e.to_string()))?;

        if (width, height) != (self.config.width, self.config.height) {
            log::info!(
                "{} delivers {width}x{height} (requested {}x{})",
                self.location,
                self.config.width,
                self.config.height
            );
        }

        Ok(OpenInput {
            ictx,
            decoder,
            scaler,
            stream_index,
            width,
            height,
        })
    }

    fn is_device(&self) -> bool {
        self.location.starts_with("/dev/")
    }

    fn decode_next(&mut self) -> Result<Option<Frame>, ffmpeg_next::Error> {
        let Some(input) = self.input.as_mut() else {
            return Ok(None);
        };
        loop {
            if let Some(frame) = input.receive(self.frame_index)? {
                self.frame_index += 1;
                return Ok(Some(frame));
            }
            let Some((stream, packet)) = input.ictx.packets().next() else {
                return Ok(None);
            };
            if stream.index() != input.stream_index {
                continue;
            }
            // Corrupt packets are common on live streams; skip them.
            if input.decoder.send_packet(&packet).is_err() {
                continue;
            }
        }
    }
}

impl OpenInput {
    fn receive(&mut self, index: usize) -> Result<Option<Frame>, ffmpeg_next::Error> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler.run(&decoded, &mut rgb)?;
        let pixels = packed_rgb(&rgb, self.width, self.height);
        Ok(Some(Frame::new(pixels, self.width, self.height, 3, index)))
    }
}

impl FrameSource for FfmpegFrameSource {
    fn configure(&mut self, config: &SourceConfig) -> Result<(), CaptureError> {
        self.config = *config;
        self.input = Some(self.open_input()?);
        log::debug!("Opened {}", self.location);
        Ok(())
    }

    fn read(&mut self) -> Option<Frame> {
        if self.input.is_none() {
            return None;
        }
        match self.decode_next() {
            Ok(Some(frame)) => Some(frame),
            Ok(None) => {
                log::debug!("{} reached end of stream, reopening", self.location);
                self.input = self.open_input().ok();
                None
            }
            Err(e) => {
                log::debug!("Decode error on {}: {e}", self.location);
                None
            }
        }
    }

    fn release(&mut self) {
        self.input = None;
    }

    fn describe(&self) -> String {
        self.location.clone()
    }
}

/// Opens cameras by index through ffmpeg.
pub struct FfmpegCameraOpener;

impl SourceOpener for FfmpegCameraOpener {
    fn open(&self, index: u32) -> Result<Box<dyn FrameSource>, CaptureError> {
        let location = FfmpegFrameSource::camera_location(index);
        if cfg!(target_os = "linux") && !std::path::Path::new(&location).exists() {
            return Err(CaptureError::Open {
                source_name: location,
                reason: "device not present".to_string(),
            });
        }
        Ok(Box::new(FfmpegFrameSource::new(location)))
    }
}

/// Copies an ffmpeg RGB24 frame into a tightly packed buffer, dropping the
/// per-row stride padding.
fn packed_rgb(rgb: &ffmpeg_next::util::frame::video::Video, width: u32, height: u32) -> Vec<u8> {
    let stride = rgb.stride(0);
    let data = rgb.data(0);
    let row_bytes = width as usize * 3;
    (0..height as usize)
        .flat_map(|row| &data[row * stride..row * stride + row_bytes])
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    /// Encodes `num_frames` flat grey frames of increasing brightness.
    fn create_test_video(path: &Path, num_frames: usize, width: u32, height: u32) {
        ffmpeg_next::init().unwrap();
        let fps = 25;
        let mut octx = ffmpeg_next::format::output(path).unwrap();
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4).unwrap();
        let mut ost = octx.add_stream(Some(codec)).unwrap();
        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .unwrap();
        encoder_ctx.set_width(width);
        encoder_ctx.set_height(height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }
        let mut encoder = encoder_ctx.open_with(ffmpeg_next::Dictionary::new()).unwrap();
        ost.set_parameters(&encoder);
        octx.write_header().unwrap();
        let ost_time_base = octx.stream(0).unwrap().time_base();

        let mut scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::format::Pixel::YUV420P,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .unwrap();

        for i in 0..num_frames {
            let mut rgb = ffmpeg_next::util::frame::video::Video::new(
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
            );
            let value = (i * 40 % 256) as u8;
            rgb.data_mut(0).fill(value);
            let mut yuv = ffmpeg_next::util::frame::video::Video::empty();
            scaler.run(&rgb, &mut yuv).unwrap();
            yuv.set_pts(Some(i as i64));
            encoder.send_frame(&yuv).unwrap();
            let mut packet = ffmpeg_next::Packet::empty();
            while encoder.receive_packet(&mut packet).is_ok() {
                packet.set_stream(0);
                packet.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
                packet.write_interleaved(&mut octx).unwrap();
            }
        }
        encoder.send_eof().unwrap();
        let mut packet = ffmpeg_next::Packet::empty();
        while encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(0);
            packet.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
            packet.write_interleaved(&mut octx).unwrap();
        }
        octx.write_trailer().unwrap();
    }

    #[test]
    fn test_reads_frames_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        create_test_video(&path, 4, 64, 48);

        let mut source = FfmpegFrameSource::new(path.to_string_lossy());
        source.configure(&SourceConfig::default()).unwrap();
        let frame = source.read().unwrap();
        assert_eq!((frame.width(), frame.height()), (64, 48));
        assert_eq!(frame.data().len(), 64 * 48 * 3);
        assert_eq!(frame.index(), 0);
    }

    #[test]
    fn test_end_of_file_reopens_and_loops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        create_test_video(&path, 3, 32, 32);

        let mut source = FfmpegFrameSource::new(path.to_string_lossy());
        source.configure(&SourceConfig::default()).unwrap();
        let mut delivered = 0;
        let mut misses = 0;
        for _ in 0..10 {
            match source.read() {
                Some(_) => delivered += 1,
                None => misses += 1,
            }
        }
        assert!(misses >= 1);
        assert!(delivered > 3, "expected looping, got {delivered} frames");
    }

    #[test]
    fn test_missing_file_fails_to_configure() {
        let mut source = FfmpegFrameSource::new("/nonexistent/clip.mp4");
        let err = source.configure(&SourceConfig::default()).unwrap_err();
        assert!(matches!(err, CaptureError::Open { .. }));
    }

    #[test]
    fn test_unconfigured_and_released_reads_are_none() {
        let mut source = FfmpegFrameSource::new("/nonexistent/clip.mp4");
        assert!(source.read().is_none());
        source.release();
        assert!(source.read().is_none());
    }

    #[test]
    fn test_camera_location() {
        let location = FfmpegFrameSource::camera_location(2);
        assert!(location.ends_with('2'));
    }
}
