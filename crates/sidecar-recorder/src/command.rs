// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Builds the `ffmpeg` argument vector for a screen-capture session.

use crate::RecordingParams;

/// Target platform for the capture input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Darwin,
}

impl Platform {
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::Darwin
        } else {
            Self::Linux
        }
    }
}

/// Builds the full `ffmpeg` argument list for `params` on `platform`.
///
/// Mirrors the fragmented-MP4, wall-clock-timestamped skeleton: a forcibly
/// killed encoder still leaves a playable file up to the last complete
/// fragment.
#[must_use]
pub fn build_args(params: &RecordingParams, platform: Platform) -> Vec<String> {
    let mut args = vec!["-y".to_string()];

    match platform {
        Platform::Linux => {
            args.push("-f".to_string());
            args.push("x11grab".to_string());
            args.push("-framerate".to_string());
            args.push(params.frame_rate.to_string());
            args.push("-i".to_string());
            args.push(format!(":{}", params.display_index));
        },
        Platform::Darwin => {
            args.push("-f".to_string());
            args.push("avfoundation".to_string());
            args.push("-framerate".to_string());
            args.push(params.frame_rate.to_string());
            args.push("-pixel_format".to_string());
            args.push("nv12".to_string());
            args.push("-i".to_string());
            args.push(format!("{}:none", params.display_index));
        },
    }

    args.extend([
        "-c:v".to_string(),
        "libx264".to_string(),
        "-movflags".to_string(),
        "frag_keyframe+empty_moov".to_string(),
        "-frag_duration".to_string(),
        "2000000".to_string(),
        "-use_wallclock_as_timestamps".to_string(),
        "1".to_string(),
        "-fflags".to_string(),
        "+genpts".to_string(),
        "-reset_timestamps".to_string(),
        "1".to_string(),
        "-avoid_negative_ts".to_string(),
        "make_zero".to_string(),
        "-fs".to_string(),
        format!("{}M", params.max_size_mb),
    ]);

    if let Some(max_duration_s) = params.max_duration_s {
        args.push("-t".to_string());
        args.push(max_duration_s.to_string());
    }

    args.push(params.output_path.display().to_string());
    args
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn params() -> RecordingParams {
        RecordingParams {
            frame_rate: 5,
            display_index: 0,
            max_size_mb: 1,
            max_duration_s: None,
            output_path: PathBuf::from("/tmp/x/r1.mp4"),
        }
    }

    #[test]
    fn linux_uses_x11grab() {
        let args = build_args(&params(), Platform::Linux);
        assert_eq!(args[1], "x11grab");
        assert!(args.contains(&":0".to_string()));
    }

    #[test]
    fn darwin_uses_avfoundation() {
        let args = build_args(&params(), Platform::Darwin);
        assert_eq!(args[1], "avfoundation");
        assert!(args.contains(&"0:none".to_string()));
    }

    #[test]
    fn duration_cap_adds_t_flag() {
        let mut p = params();
        p.max_duration_s = Some(10);
        let args = build_args(&p, Platform::Linux);
        let idx = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[idx + 1], "10");
    }

    #[test]
    fn no_duration_cap_omits_t_flag() {
        let args = build_args(&params(), Platform::Linux);
        assert!(!args.contains(&"-t".to_string()));
    }
}
