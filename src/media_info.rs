//! Stream metadata extraction backed by ffmpeg demuxing.
//!
//! `probe_file` opens a container, resolves the best video and audio streams
//! independently, and produces a `MediaInfo` record. No persistence and no
//! threading happen here; callers decide what to do with failures.

use std::path::Path;
use std::sync::Once;

use chrono::{DateTime, Local};
use ffmpeg_the_third as ffmpeg;
use ffmpeg::media::Type;
use log::debug;

/// Microsecond guard added to container durations so that truncated tail
/// seconds still round up, capped against i64 overflow.
const DURATION_ROUND_GUARD: i64 = 5000;

static FFMPEG_INIT: Once = Once::new();

pub(crate) fn ensure_ffmpeg() {
    FFMPEG_INIT.call_once(|| {
        if let Err(err) = ffmpeg::init() {
            log::error!("ffmpeg init failed: {err}");
        }
    });
}

/// Structured metadata for one media resource.
///
/// When `valid` is false every other field is meaningless and must not be
/// trusted by consumers.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct MediaInfo {
    pub valid: bool,
    pub title: String,
    pub file_type: String,
    pub resolution: String,
    pub file_path: String,
    pub creation: String,
    pub raw_rotate: i32,
    pub file_size: i64,
    /// Whole seconds.
    pub duration: i64,
    pub width: u32,
    pub height: u32,
    pub video_codec: String,
    pub video_bitrate: usize,
    pub fps: i32,
    pub proportion: f32,
    pub audio_codec: String,
    pub audio_bitrate: usize,
    pub sample_format: String,
    pub channels: u16,
    pub sample_rate: u32,
}

/// Normalizes a raw rotation tag into [0, 360).
pub fn normalized_rotation(raw: i32) -> i32 {
    (raw % 360 + 360) % 360
}

/// Container duration in whole seconds; `AV_NOPTS_VALUE` yields 0.
pub fn rounded_duration_seconds(raw: i64) -> i64 {
    let mut duration = if raw == ffmpeg::ffi::AV_NOPTS_VALUE {
        0
    } else {
        raw
    };
    if duration <= i64::MAX - DURATION_ROUND_GUARD {
        duration += DURATION_ROUND_GUARD;
    }
    duration / i64::from(ffmpeg::ffi::AV_TIME_BASE)
}

fn filesystem_creation(path: &Path) -> String {
    let Ok(meta) = std::fs::metadata(path) else {
        return String::new();
    };
    meta.created()
        .or_else(|_| meta.modified())
        .map(|time| DateTime::<Local>::from(time).to_rfc3339())
        .unwrap_or_default()
}

/// Derives a `MediaInfo` for a local file.
///
/// Fails when the file is missing, the container cannot be opened or its
/// stream info resolved, the container has zero streams, or neither a video
/// nor an audio stream resolves.
pub fn probe_file(path: &Path) -> Result<MediaInfo, String> {
    ensure_ffmpeg();

    let mut info = MediaInfo::default();

    if !path.exists() {
        return Err(format!("{} does not exist", path.display()));
    }

    let ictx =
        ffmpeg::format::input(&path).map_err(|err| format!("could not open input: {err}"))?;

    if ictx.streams().count() == 0 {
        return Err(format!("{} has no streams", path.display()));
    }

    let video_stream = ictx.streams().best(Type::Video);
    let audio_stream = ictx.streams().best(Type::Audio);
    if video_stream.is_none() && audio_stream.is_none() {
        return Err(format!(
            "no decodable audio or video stream in {}",
            path.display()
        ));
    }

    if let Some(stream) = &video_stream {
        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|err| format!("video codec parameters: {err}"))?;
        info.video_codec = format!("{:?}", context.id());
        if let Ok(video) = context.decoder().video() {
            info.width = video.width();
            info.height = video.height();
            info.video_bitrate = video.bit_rate();
        }

        let rate = stream.rate();
        info.fps = if rate.denominator() != 0 {
            rate.numerator() / rate.denominator()
        } else {
            0
        };
        info.proportion = if info.height != 0 {
            info.width as f32 / info.height as f32
        } else {
            0.0
        };
    }

    if let Some(stream) = &audio_stream {
        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|err| format!("audio codec parameters: {err}"))?;
        info.audio_codec = format!("{:?}", context.id());
        if let Ok(audio) = context.decoder().audio() {
            info.audio_bitrate = audio.bit_rate();
            info.sample_format = format!("{:?}", audio.format());
            info.channels = audio.channels();
            info.sample_rate = audio.rate();
        }
    }

    info.duration = rounded_duration_seconds(ictx.duration());
    info.resolution = format!("{}x{}", info.width, info.height);
    info.title = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    info.file_path = path
        .canonicalize()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string_lossy().into_owned());
    info.creation = filesystem_creation(path);
    info.file_size = std::fs::metadata(path).map(|m| m.len() as i64).unwrap_or(0);
    info.file_type = path
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default();

    // Container-level creation_time overrides the filesystem timestamp.
    if let Some(tag) = ictx.metadata().get("creation_time") {
        match DateTime::parse_from_rfc3339(tag) {
            Ok(parsed) => info.creation = parsed.to_rfc3339(),
            Err(err) => debug!("unparseable creation_time tag {tag:?}: {err}"),
        }
    }

    // Rotation comes from whichever stream resolved first.
    let tagged_stream = video_stream.or(audio_stream);
    if let Some(stream) = tagged_stream {
        if let Some(tag) = stream.metadata().get("rotate") {
            info.raw_rotate = tag.trim().parse().unwrap_or(0);
            if matches!(normalized_rotation(info.raw_rotate), 90 | 270) {
                std::mem::swap(&mut info.width, &mut info.height);
                info.resolution = format!("{}x{}", info.width, info.height);
            }
        }
    }

    info.valid = true;
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_normalizes_into_circle() {
        assert_eq!(normalized_rotation(90), 90);
        assert_eq!(normalized_rotation(-270), 90);
        assert_eq!(normalized_rotation(450), 90);
        assert_eq!(normalized_rotation(0), 0);
        assert_eq!(normalized_rotation(180), 180);
        assert_eq!(normalized_rotation(-180), 180);
        assert_eq!(normalized_rotation(270), 270);
    }

    #[test]
    fn test_quarter_turns_swap_dimensions() {
        for raw in [90, -270, 450] {
            assert!(matches!(normalized_rotation(raw), 90 | 270), "raw={raw}");
        }
        for raw in [0, 180, -180] {
            assert!(!matches!(normalized_rotation(raw), 90 | 270), "raw={raw}");
        }
    }

    #[test]
    fn test_duration_rounds_up_and_handles_missing_marker() {
        assert_eq!(rounded_duration_seconds(ffmpeg::ffi::AV_NOPTS_VALUE), 0);
        // 1.999s of media still reports at least 1 whole second after the
        // rounding guard; 0.996s rounds up to 1.
        assert_eq!(rounded_duration_seconds(996_000), 1);
        assert_eq!(rounded_duration_seconds(0), 0);
        // Near-overflow durations skip the guard instead of wrapping.
        assert!(rounded_duration_seconds(i64::MAX - 1) > 0);
    }

    #[test]
    fn test_probe_missing_file_fails() {
        let err = probe_file(Path::new("/nonexistent/clip.mkv")).unwrap_err();
        assert!(err.contains("does not exist"));
    }
}
