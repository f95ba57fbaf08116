// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Resolves and validates the OS-level targets a virtual media track writes to.

use sidecar_core::SidecarError;
use tokio::process::Command;
use tracing::{info, warn};

/// Default loopback device node probed/created for the video track.
pub const DEFAULT_VIDEO_DEVICE: &str = "/dev/video10";

/// Default sound-server sink name used for the audio track.
pub const DEFAULT_AUDIO_SINK: &str = "sidecar_mic";

/// Ensures the v4l2 loopback device node exists, loading the kernel module if
/// it is missing.
///
/// # Errors
/// Returns [`SidecarError::NotFound`] if the device is still absent after
/// attempting to load `v4l2loopback`.
pub async fn ensure_video_device(device_path: &str) -> Result<(), SidecarError> {
    if tokio::fs::metadata(device_path).await.is_ok() {
        return Ok(());
    }

    info!(device_path, "loopback device missing, attempting to load v4l2loopback");
    let label = device_path.trim_start_matches("/dev/video");
    let status = Command::new("modprobe")
        .args(["v4l2loopback", &format!("video_nr={label}"), "card_label=sidecar", "exclusive_caps=1"])
        .status()
        .await;

    match status {
        Ok(status) if status.success() => {},
        Ok(status) => warn!(?status, "modprobe v4l2loopback exited non-zero"),
        Err(err) => warn!(error = %err, "failed to run modprobe"),
    }

    if tokio::fs::metadata(device_path).await.is_ok() {
        Ok(())
    } else {
        Err(SidecarError::NotFound(format!("loopback video device '{device_path}' not available")))
    }
}

/// Ensures a named sink exists in the sound server, returning an error if the
/// sound server cannot be queried or the sink never appears.
///
/// # Errors
/// Returns [`SidecarError::NotFound`] if the sink does not exist.
pub async fn ensure_audio_sink(sink_name: &str) -> Result<(), SidecarError> {
    if sink_exists(sink_name).await {
        return Ok(());
    }

    info!(sink_name, "audio sink missing, creating a null sink");
    let status = Command::new("pactl")
        .args(["load-module", "module-null-sink", &format!("sink_name={sink_name}")])
        .status()
        .await;

    if let Err(err) = status {
        warn!(error = %err, "failed to run pactl load-module");
    }

    if sink_exists(sink_name).await {
        Ok(())
    } else {
        Err(SidecarError::NotFound(format!("audio sink '{sink_name}' not available")))
    }
}

async fn sink_exists(sink_name: &str) -> bool {
    let output = match Command::new("pactl").args(["list", "short", "sinks"]).output().await {
        Ok(output) => output,
        Err(err) => {
            warn!(error = %err, "failed to query pactl sinks");
            return false;
        },
    };
    String::from_utf8_lossy(&output.stdout).lines().any(|line| line.contains(sink_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_targets_are_non_empty() {
        assert!(!DEFAULT_VIDEO_DEVICE.is_empty());
        assert!(!DEFAULT_AUDIO_SINK.is_empty());
    }
}
