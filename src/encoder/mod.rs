//! External transcoder invocation.

pub mod command;
pub mod ffmpeg;

use async_trait::async_trait;
use std::path::Path;

pub use ffmpeg::FfmpegEncoder;

/// Fixed output settings for every encode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeProfile {
    pub name: &'static str,
    pub video_codec: &'static str,
    pub video_bitrate: &'static str,
    /// Output height; width follows the source aspect ratio.
    pub height: u32,
    pub audio_codec: &'static str,
    pub audio_bitrate: &'static str,
    /// Muxer name passed to `-f`
    pub container: &'static str,
    pub extension: &'static str,
}

impl EncodeProfile {
    /// VP9 + Opus in WebM, 720p, ~1 Mbps video / 128 kbps audio.
    pub const WEBM_720P: EncodeProfile = EncodeProfile {
        name: "webm-720p",
        video_codec: "libvpx-vp9",
        video_bitrate: "1M",
        height: 720,
        audio_codec: "libopus",
        audio_bitrate: "128k",
        container: "webm",
        extension: "webm",
    };
}

/// Result of one encode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeOutcome {
    Success,
    /// `diagnostics` is for operator logs only.
    Failure { diagnostics: String },
}

/// Runs the transcoder for a single job.
///
/// The call completes only when the encode has finished. On `Failure`
/// nothing is left at `output`. No retries happen at this level.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, input: &Path, output: &Path, profile: &EncodeProfile) -> EncodeOutcome;
}
