// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! `ffmpeg` argument skeletons for the virtual camera / virtual microphone pipelines.

use serde::{Deserialize, Serialize};

/// Where a track's bytes come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub kind: SourceKind,
    pub looped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Stream,
    File,
}

/// Reconnecting-input args shared by both pipelines.
fn input_args(source: &Source) -> Vec<String> {
    let mut args = Vec::new();
    if source.looped && source.kind == SourceKind::File {
        args.push("-stream_loop".to_string());
        args.push("-1".to_string());
    }
    args.extend([
        "-reconnect".to_string(),
        "1".to_string(),
        "-reconnect_streamed".to_string(),
        "1".to_string(),
        "-reconnect_delay_max".to_string(),
        "5".to_string(),
    ]);
    args.push("-i".to_string());
    args.push(source.url.clone());
    args
}

/// Builds the video pipeline: scale to 1280:-2, 30fps, yuv420p, into a v4l2
/// loopback device.
#[must_use]
pub fn build_video_args(source: &Source, device_path: &str) -> Vec<String> {
    let mut args = input_args(source);
    args.extend([
        "-vf".to_string(),
        "scale=1280:-2,fps=30,format=yuv420p".to_string(),
        "-f".to_string(),
        "v4l2".to_string(),
        device_path.to_string(),
    ]);
    args
}

/// Builds the audio pipeline: `pcm_s16le` 48kHz stereo into a sound-server sink.
#[must_use]
pub fn build_audio_args(source: &Source, sink_name: &str) -> Vec<String> {
    let mut args = input_args(source);
    args.extend([
        "-f".to_string(),
        "s16le".to_string(),
        "-ar".to_string(),
        "48000".to_string(),
        "-ac".to_string(),
        "2".to_string(),
        "-acodec".to_string(),
        "pcm_s16le".to_string(),
        format!("pulse:{sink_name}"),
    ]);
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_args_scale_to_1280_and_target_device() {
        let source = Source { url: "rtsp://x".to_string(), kind: SourceKind::Stream, looped: false };
        let args = build_video_args(&source, "/dev/video10");
        assert!(args.contains(&"scale=1280:-2,fps=30,format=yuv420p".to_string()));
        assert_eq!(args.last(), Some(&"/dev/video10".to_string()));
        assert!(!args.contains(&"-stream_loop".to_string()));
    }

    #[test]
    fn looped_file_source_adds_stream_loop() {
        let source = Source { url: "/tmp/a.mp4".to_string(), kind: SourceKind::File, looped: true };
        let args = build_video_args(&source, "/dev/video10");
        assert!(args.contains(&"-stream_loop".to_string()));
    }

    #[test]
    fn audio_args_target_pulse_sink() {
        let source = Source { url: "rtsp://x".to_string(), kind: SourceKind::Stream, looped: false };
        let args = build_audio_args(&source, "sidecar_mic");
        assert!(args.contains(&"pulse:sidecar_mic".to_string()));
        assert!(args.contains(&"pcm_s16le".to_string()));
    }
}
