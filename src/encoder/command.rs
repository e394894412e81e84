//! FFmpeg command builder.

use std::path::{Path, PathBuf};

use super::EncodeProfile;

/// Builder for FFmpeg command lines.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Command line for `profile`, reading `input` and writing `output`.
    pub fn for_profile(input: impl AsRef<Path>, output: impl AsRef<Path>, profile: &EncodeProfile) -> Self {
        Self::new(input, output)
            .video_codec(profile.video_codec)
            .video_bitrate(profile.video_bitrate)
            .video_filter(format!("scale=-2:{}", profile.height))
            .audio_codec(profile.audio_codec)
            .audio_bitrate(profile.audio_bitrate)
            .format(profile.container)
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn video_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:v").output_arg(bitrate)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Force the muxer; the output path's extension is not trusted to pick it.
    pub fn format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }
        args.push("-hide_banner".to_string());
        args.push("-nostdin".to_string());
        args.push("-v".to_string());
        args.push(self.log_level.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}
