// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Taking photos
//! - Recording videos
//!
//! Every command runs through a [`CaptureSession`], the same way a UI would.

use camera_session::constants::output;
use camera_session::{
    CaptureSession, Config, DeviceDescriptor, DeviceRegistry, SessionError, get_backend,
};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// List all available cameras
pub fn list_cameras(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();
    let registry = DeviceRegistry::new(get_backend(&config));

    let rt = tokio::runtime::Runtime::new()?;
    let cameras = rt.block_on(registry.refresh_available_devices(&CancellationToken::new()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&*cameras)?);
        return Ok(());
    }

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for (index, camera) in cameras.iter().enumerate() {
        println!("  [{}] {} ({})", index, camera.name(), camera.id());
        println!("      Facing: {}", camera.facing());

        // Highest resolution first
        let mut res_strs: Vec<String> = camera.resolutions().map(|r| r.to_string()).collect();
        res_strs.reverse();
        println!("      Resolutions: {}", res_strs.join(", "));

        let zoom = camera.zoom_range();
        println!("      Zoom: {:.1}x - {:.1}x", zoom.min, zoom.max);
        if camera.flash_supported() {
            println!("      Flash: yes");
        }
        println!();
    }

    Ok(())
}

/// Take a photo using the specified camera
pub fn take_photo(
    camera_index: Option<usize>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load();
    let rt = tokio::runtime::Runtime::new()?;

    let output_path = match output {
        Some(path) if path.is_dir() => path.join(timestamped_name(
            output::PHOTO_PREFIX,
            output::PHOTO_EXTENSION,
        )),
        Some(path) => path,
        None => get_default_photo_dir().join(timestamped_name(
            output::PHOTO_PREFIX,
            output::PHOTO_EXTENSION,
        )),
    };

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel())?;

    rt.block_on(capture_photo(&mut config, camera_index, &output_path, &token))?;

    save_config(&config);
    Ok(())
}

/// Record a video using the specified camera
///
/// The first Ctrl+C stops early and keeps the recording; a second one
/// discards it.
pub fn record_video(
    camera_index: Option<usize>,
    duration: u64,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load();
    let rt = tokio::runtime::Runtime::new()?;

    let output_path = match output {
        Some(path) if path.is_dir() => path.join(timestamped_name(
            output::VIDEO_PREFIX,
            output::VIDEO_EXTENSION,
        )),
        Some(path) => path,
        None => get_default_video_dir().join(timestamped_name(
            output::VIDEO_PREFIX,
            output::VIDEO_EXTENSION,
        )),
    };

    println!("Output: {}", output_path.display());
    println!("Duration: {} seconds", duration);

    // Set up Ctrl+C handler
    let stop_early = CancellationToken::new();
    let discard = CancellationToken::new();
    let presses = Arc::new(AtomicUsize::new(0));
    {
        let stop_early = stop_early.clone();
        let discard = discard.clone();
        ctrlc::set_handler(move || {
            if presses.fetch_add(1, Ordering::SeqCst) == 0 {
                stop_early.cancel();
            } else {
                discard.cancel();
            }
        })?;
    }

    rt.block_on(capture_video(
        &mut config,
        camera_index,
        duration,
        &output_path,
        &stop_early,
        &discard,
    ))?;

    save_config(&config);
    Ok(())
}

async fn capture_photo(
    config: &mut Config,
    camera_index: Option<usize>,
    output_path: &Path,
    token: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = open_session(config, camera_index, token).await?;

    println!("Capturing...");
    let result = session.take_picture(token).await;
    session.disconnect().await;
    let photo = result?;

    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(output_path, &photo.data).await?;

    match photo.resolution {
        Some(resolution) => println!("Capture resolution: {}", resolution),
        None => println!("Capture resolution: device default"),
    }
    println!("Photo saved: {}", output_path.display());
    Ok(())
}

async fn capture_video(
    config: &mut Config,
    camera_index: Option<usize>,
    duration: u64,
    output_path: &Path,
    stop_early: &CancellationToken,
    discard: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = open_session(config, camera_index, stop_early).await?;

    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let sink = tokio::fs::File::create(output_path).await?;

    if let Err(err) = session.start_recording(Box::new(sink), stop_early).await {
        session.disconnect().await;
        remove_partial_output(output_path).await;
        return Err(err.into());
    }

    println!();
    println!("Recording... (press Ctrl+C to stop early, twice to discard)");

    let target_duration = Duration::from_secs(duration);
    while let Some(elapsed) = session.recording_elapsed()
        && elapsed < target_duration
    {
        if stop_early.is_cancelled() {
            println!();
            println!("Stopping early...");
            break;
        }

        // Print progress
        let elapsed = elapsed.as_secs();
        print!("\rRecording: {:02}:{:02}", elapsed / 60, elapsed % 60);
        std::io::Write::flush(&mut std::io::stdout())?;

        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    println!();

    let result = session.stop_recording(discard).await;
    session.disconnect().await;

    match result {
        Ok(summary) => {
            println!(
                "Video saved: {} ({} bytes, {:.1}s)",
                output_path.display(),
                summary.bytes_written,
                summary.duration.as_secs_f32()
            );
            Ok(())
        }
        Err(SessionError::OperationCancelled(_)) => {
            remove_partial_output(output_path).await;
            println!("Recording discarded");
            Ok(())
        }
        Err(err) => {
            remove_partial_output(output_path).await;
            Err(err.into())
        }
    }
}

/// Build a session and connect it to the requested (or remembered) camera
async fn open_session(
    config: &mut Config,
    camera_index: Option<usize>,
    token: &CancellationToken,
) -> Result<CaptureSession, Box<dyn std::error::Error>> {
    let backend = get_backend(config);
    let registry = DeviceRegistry::new(Arc::clone(&backend));
    let cameras = registry.refresh_available_devices(token).await?;

    let camera = select_camera(&cameras, camera_index, config.last_device_id.as_deref())?;
    println!("Using camera: {}", camera.name());

    let session = CaptureSession::new(backend, registry, config);
    session.connect(Some(camera.clone()), token).await?;
    config.last_device_id = Some(camera.id().to_string());

    if let Some(resolution) = config.preferred_resolution {
        if camera.supports_resolution(&resolution) {
            if let Err(err) = session.update_capture_resolution(resolution, token).await {
                warn!(error = %err, %resolution, "Could not apply preferred resolution");
            }
        } else {
            info!(%resolution, camera = %camera.id(), "Preferred resolution not supported");
        }
    }

    Ok(session)
}

/// Pick by index, else the last used camera, else the first one
fn select_camera(
    cameras: &[DeviceDescriptor],
    camera_index: Option<usize>,
    last_device_id: Option<&str>,
) -> Result<DeviceDescriptor, Box<dyn std::error::Error>> {
    if cameras.is_empty() {
        return Err("No cameras found".into());
    }

    if let Some(index) = camera_index {
        return cameras.get(index).cloned().ok_or_else(|| {
            format!(
                "Camera index {} out of range (0-{})",
                index,
                cameras.len() - 1
            )
            .into()
        });
    }

    let remembered = last_device_id.and_then(|id| cameras.iter().find(|c| c.id() == id));
    Ok(remembered.unwrap_or(&cameras[0]).clone())
}

fn save_config(config: &Config) {
    if let Err(err) = config.save() {
        warn!(error = %err, "Failed to save config");
    }
}

async fn remove_partial_output(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await
        && err.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %err, "Failed to remove partial output");
    }
}

fn timestamped_name(prefix: &str, extension: &str) -> String {
    let timestamp = Local::now().format(output::TIMESTAMP_FORMAT);
    format!("{}_{}.{}", prefix, timestamp, extension)
}

/// Get default photo directory
fn get_default_photo_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(output::APP_SUBDIR)
}

/// Get default video directory
fn get_default_video_dir() -> PathBuf {
    dirs::video_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(output::APP_SUBDIR)
}
