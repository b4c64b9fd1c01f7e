//! Screenshot capture for the mirror output.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use image::{ImageBuffer, Rgba, RgbaImage};
use tracing::info;

/// Which frames to capture and where to save them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScreenshotConfig {
    pub enabled: bool,
    /// Output path pattern (use `{}` for frame number placeholder).
    pub output_pattern: String,
    pub frames: BTreeSet<u64>,
    /// Exit after capturing all specified frames.
    pub exit_after_capture: bool,
}

impl ScreenshotConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable capture with the given output pattern.
    pub fn with_output(mut self, pattern: impl Into<String>) -> Self {
        self.enabled = true;
        self.output_pattern = pattern.into();
        self
    }

    pub fn with_frames(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.enabled = true;
        self.frames.extend(frames);
        self
    }

    pub fn with_exit_after(mut self, exit: bool) -> Self {
        self.exit_after_capture = exit;
        self
    }

    pub fn output_path(&self, frame: u64) -> PathBuf {
        PathBuf::from(self.output_pattern.replace("{}", &frame.to_string()))
    }

    pub fn should_capture(&self, frame: u64) -> bool {
        self.enabled && self.frames.contains(&frame)
    }

    /// All requested frames lie before `current_frame`.
    pub fn all_captured(&self, current_frame: u64) -> bool {
        if !self.enabled {
            return false;
        }
        self.frames.last().is_some_and(|&last| current_frame > last)
    }

    /// Parse from a slice of arguments.
    ///
    /// Recognizes:
    /// - `-S` or `--screenshot`: enable capture
    /// - `-o` or `--output <PATTERN>`: output path pattern
    /// - `-f` or `--frames <FRAMES>`: frame indices, e.g. "0,5,10-15"
    /// - `--exit-after`: exit after capturing all specified frames
    ///
    /// Anything else is ignored so the caller can parse its own flags.
    pub fn parse_args(args: &[String]) -> Self {
        let mut config = Self::default();

        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-S" | "--screenshot" => config.enabled = true,
                "-o" | "--output" => {
                    if let Some(pattern) = iter.next() {
                        config.output_pattern.clone_from(pattern);
                    }
                }
                "-f" | "--frames" => {
                    if let Some(frames) = iter.next() {
                        config.frames = parse_frame_indices(frames);
                    }
                }
                "--exit-after" => config.exit_after_capture = true,
                _ => {}
            }
        }

        if config.enabled {
            if config.output_pattern.is_empty() {
                config.output_pattern = "stereo_{}.png".to_string();
            }
            if config.frames.is_empty() {
                config.frames.insert(0);
            }
        }

        config
    }
}

/// Parse frame indices from a string like "0,5,10-15,20".
pub fn parse_frame_indices(s: &str) -> BTreeSet<u64> {
    let mut frames = BTreeSet::new();

    for part in s.split(',').map(str::trim) {
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.trim().parse::<u64>(), end.trim().parse::<u64>()) {
                frames.extend(start..=end);
            }
        } else if let Ok(frame) = part.parse::<u64>() {
            frames.insert(frame);
        }
    }

    frames
}

/// Save raw RGBA8 pixels; the format follows the path's extension.
pub fn save_screenshot(
    data: Vec<u8>,
    width: u32,
    height: u32,
    path: impl AsRef<Path>,
) -> Result<(), ScreenshotError> {
    let image = ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, data)
        .ok_or(ScreenshotError::InvalidImageData)?;
    save_image(&image, path)
}

pub fn save_image(image: &RgbaImage, path: impl AsRef<Path>) -> Result<(), ScreenshotError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ScreenshotError::SaveFailed(e.to_string()))?;
    }
    image
        .save(path)
        .map_err(|e| ScreenshotError::SaveFailed(e.to_string()))?;

    info!("Screenshot saved: {}", path.display());
    Ok(())
}

/// Errors that can occur during screenshot capture.
#[derive(Debug)]
pub enum ScreenshotError {
    /// Composing the image failed.
    Compose(String),
    /// Pixel data was invalid or wrong size.
    InvalidImageData,
    /// Failed to save image to file.
    SaveFailed(String),
}

impl std::fmt::Display for ScreenshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compose(e) => write!(f, "Failed to compose screenshot: {e}"),
            Self::InvalidImageData => write!(f, "Invalid image data"),
            Self::SaveFailed(e) => write!(f, "Failed to save screenshot: {e}"),
        }
    }
}

impl std::error::Error for ScreenshotError {}

impl From<stereocast_core::Error> for ScreenshotError {
    fn from(e: stereocast_core::Error) -> Self {
        Self::Compose(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("viewer")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parse_frame_lists() {
        assert_eq!(parse_frame_indices("5"), BTreeSet::from([5]));
        assert_eq!(parse_frame_indices("0,5,10"), BTreeSet::from([0, 5, 10]));
        assert_eq!(parse_frame_indices("3-6"), BTreeSet::from([3, 4, 5, 6]));
        assert_eq!(
            parse_frame_indices("0, 5-7 ,10,x"),
            BTreeSet::from([0, 5, 6, 7, 10])
        );
    }

    #[test]
    fn parse_args_fills_defaults() {
        let config = ScreenshotConfig::parse_args(&args(&["--budget", "4", "-S"]));
        assert!(config.enabled);
        assert_eq!(config.output_pattern, "stereo_{}.png");
        assert_eq!(config.frames, BTreeSet::from([0]));
        assert!(!config.exit_after_capture);
    }

    #[test]
    fn parse_args_reads_everything() {
        let config = ScreenshotConfig::parse_args(&args(&[
            "-S",
            "-o",
            "out/frame_{}.png",
            "-f",
            "2,4-5",
            "--exit-after",
        ]));
        assert_eq!(config.output_path(4), PathBuf::from("out/frame_4.png"));
        assert!(config.should_capture(5));
        assert!(!config.should_capture(3));
        assert!(config.exit_after_capture);
        assert!(!config.all_captured(5));
        assert!(config.all_captured(6));
    }

    #[test]
    fn disabled_by_default() {
        let config = ScreenshotConfig::parse_args(&args(&[]));
        assert!(!config.enabled);
        assert!(!config.should_capture(0));
        assert!(!config.all_captured(100));
    }

    #[test]
    fn wrong_sized_data_is_rejected() {
        let err = save_screenshot(vec![0; 7], 2, 1, "unused.png").unwrap_err();
        assert!(matches!(err, ScreenshotError::InvalidImageData));
    }
}
