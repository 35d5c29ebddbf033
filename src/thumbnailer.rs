//! Preview image generation.
//!
//! Video files get a frame decoded at roughly 10% of the duration and scaled
//! to the configured width. Audio files get their embedded cover art when one
//! is present. Every failure path degrades to a built-in placeholder pair;
//! this module never surfaces an error to callers.

use std::io::Cursor;
use std::path::Path;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{context::Context as SwsContext, flag::Flags};
use ffmpeg::format::stream::Disposition;
use ffmpeg::util::frame::video::Video as VideoFrame;
use image::{ImageFormat, Rgba, RgbaImage};
use log::debug;

use crate::config::ThumbnailConfig;
use crate::playlist::Thumbnail;

#[derive(Clone)]
pub struct Thumbnailer {
    target_width: u32,
    fallback: Thumbnail,
}

impl Thumbnailer {
    pub fn new(config: &ThumbnailConfig) -> Thumbnailer {
        let target_width = config.target_width().max(1);
        Thumbnailer {
            target_width,
            fallback: placeholder_pair(target_width),
        }
    }

    /// Produces the preview pair for a local file. `audio` selects cover-art
    /// extraction instead of frame decoding.
    pub fn generate(&self, path: &Path, audio: bool) -> Thumbnail {
        crate::media_info::ensure_ffmpeg();
        let attempt = if audio {
            self.embedded_cover(path)
        } else {
            self.video_frame(path)
        };
        match attempt {
            Ok(png) => Thumbnail::new(png.clone(), png),
            Err(err) => {
                debug!("thumbnail fallback for {}: {err}", path.display());
                self.fallback.clone()
            }
        }
    }

    pub fn fallback(&self) -> Thumbnail {
        self.fallback.clone()
    }

    fn video_frame(&self, path: &Path) -> Result<Vec<u8>, String> {
        let mut ictx =
            ffmpeg::format::input(&path).map_err(|err| format!("could not open input: {err}"))?;

        let stream = ictx
            .streams()
            .best(Type::Video)
            .ok_or_else(|| "no video stream".to_string())?;
        let stream_index = stream.index();

        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|err| format!("codec parameters: {err}"))?;
        let mut decoder = context
            .decoder()
            .video()
            .map_err(|err| format!("video decoder: {err}"))?;

        // Land past intros and black leaders; failures fall back to the
        // first decodable frame.
        let duration = ictx.duration();
        if duration > 0 {
            let target = duration / 10;
            if let Err(err) = ictx.seek(target, ..=target) {
                debug!("seek failed for {}: {err}", path.display());
            }
        }

        let mut decoded: Option<VideoFrame> = None;
        for (packet_stream, packet) in ictx.packets().flatten() {
            if packet_stream.index() != stream_index {
                continue;
            }
            if decoder.send_packet(&packet).is_err() {
                continue;
            }
            let mut frame = VideoFrame::empty();
            if decoder.receive_frame(&mut frame).is_ok() {
                decoded = Some(frame);
                break;
            }
        }
        let frame = decoded.ok_or_else(|| "no decodable frame".to_string())?;

        if decoder.width() == 0 || decoder.height() == 0 {
            return Err("decoder reports zero dimensions".to_string());
        }
        let scaled_height =
            (u64::from(self.target_width) * u64::from(decoder.height()) / u64::from(decoder.width()))
                .max(1) as u32;

        let mut scaler = SwsContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGBA,
            self.target_width,
            scaled_height,
            Flags::BILINEAR,
        )
        .map_err(|err| format!("scaler: {err}"))?;

        let mut rgba = VideoFrame::empty();
        scaler
            .run(&frame, &mut rgba)
            .map_err(|err| format!("scale: {err}"))?;

        encode_frame_png(&rgba, self.target_width, scaled_height)
    }

    fn embedded_cover(&self, path: &Path) -> Result<Vec<u8>, String> {
        let mut ictx =
            ffmpeg::format::input(&path).map_err(|err| format!("could not open input: {err}"))?;

        let cover_index = ictx
            .streams()
            .find(|stream| stream.disposition().contains(Disposition::ATTACHED_PIC))
            .map(|stream| stream.index())
            .ok_or_else(|| "no attached picture".to_string())?;

        let data = ictx
            .packets()
            .flatten()
            .find(|(stream, _)| stream.index() == cover_index)
            .and_then(|(_, packet)| packet.data().map(|data| data.to_vec()))
            .ok_or_else(|| "attached picture carries no data".to_string())?;

        let cover = image::load_from_memory(&data)
            .map_err(|err| format!("cover decode: {err}"))?
            .thumbnail(self.target_width, self.target_width)
            .to_rgba8();
        encode_png(&cover)
    }
}

/// Copies an RGBA frame row-by-row (the decoder pads rows to its own stride)
/// and encodes it as PNG.
fn encode_frame_png(frame: &VideoFrame, width: u32, height: u32) -> Result<Vec<u8>, String> {
    let stride = frame.stride(0);
    let data = frame.data(0);
    let row_bytes = width as usize * 4;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        if end > data.len() {
            return Err("frame buffer shorter than expected".to_string());
        }
        pixels.extend_from_slice(&data[start..end]);
    }

    let image = RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| "frame dimensions do not match buffer".to_string())?;
    encode_png(&image)
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, String> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|err| format!("png encode: {err}"))?;
    Ok(buffer.into_inner())
}

/// Neutral placeholder tiles shown while no real preview exists.
fn placeholder_pair(width: u32) -> Thumbnail {
    let height = width * 9 / 16;
    let light = solid_png(width, height.max(1), Rgba([0xee, 0xee, 0xee, 0xff]));
    let dark = solid_png(width, height.max(1), Rgba([0x2a, 0x2a, 0x2a, 0xff]));
    Thumbnail::new(light, dark)
}

fn solid_png(width: u32, height: u32, color: Rgba<u8>) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, color);
    // Encoding an in-memory buffer cannot fail for a well-formed image.
    encode_png(&image).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_degrades_to_placeholder() {
        let thumbnailer = Thumbnailer::new(&ThumbnailConfig::default());
        let thumb = thumbnailer.generate(Path::new("/nonexistent/clip.mkv"), false);
        assert_eq!(thumb, thumbnailer.fallback());
        assert!(!thumb.is_empty());
    }

    #[test]
    fn test_placeholder_variants_differ() {
        let pair = placeholder_pair(64);
        assert_ne!(pair.light, pair.dark);
        let light = image::load_from_memory(&pair.light).unwrap();
        assert_eq!(light.width(), 64);
        assert_eq!(light.height(), 36);
    }

    #[test]
    fn test_encode_frame_respects_stride_bounds() {
        let frame = VideoFrame::new(Pixel::RGBA, 4, 4);
        // Asking for more rows than the frame holds must fail, not panic.
        assert!(encode_frame_png(&frame, 4, 4).is_ok());
        assert!(encode_frame_png(&frame, 4, 500).is_err());
    }

    #[test]
    fn test_cover_extraction_requires_media_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.mp3");
        std::fs::write(&path, b"not audio").unwrap();
        let thumbnailer = Thumbnailer::new(&ThumbnailConfig::default());
        let thumb = thumbnailer.generate(&path, true);
        assert_eq!(thumb, thumbnailer.fallback());
    }
}
