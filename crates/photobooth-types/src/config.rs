use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{PhotoboothError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Quality of the continuously encoded preview stream.
    pub jpeg_quality: u8,
    pub vflip: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1350,
            frame_rate: 15,
            jpeg_quality: 80,
            vflip: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedConfig {
    pub num_pixels: usize,
    pub data_pin: u8,
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            num_pixels: 16,
            data_pin: 18,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub capture_dir: String,
    pub watermark_path: Option<String>,
    pub watermark_width: u32,
    pub watermark_height: u32,
    pub watermark_opacity: f32,
    pub watermark_bottom_offset: u32,
    pub photo_quality: u8,
    pub countdown_ms: u64,
    pub flash_ms: u64,
    /// Delay between firing the flash and reading the sensor.
    pub flash_settle_ms: u64,
    pub burst_interval_ms: u64,
    /// Advance the counter by one extra number after a three-photo burst.
    pub burst_skips_number: bool,
    pub stream_frame_interval_ms: u64,
    pub stream_idle_timeout_ms: u64,
    pub ready_pulse_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            capture_dir: "captures".into(),
            watermark_path: Some("static/img/watermark.png".into()),
            watermark_width: 1080,
            watermark_height: 146,
            watermark_opacity: 0.70,
            watermark_bottom_offset: 100,
            photo_quality: 90,
            countdown_ms: 3_000,
            flash_ms: 300,
            flash_settle_ms: 100,
            burst_interval_ms: 1_000,
            burst_skips_number: true,
            stream_frame_interval_ms: 33,
            stream_idle_timeout_ms: 1_000,
            ready_pulse_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub enabled: bool,
    pub credentials_path: Option<String>,
    pub folder_id: String,
    /// Local mount point of the remote storage.
    pub mirror_dir: String,
    pub poll_timeout_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            credentials_path: Some("credentials.json".into()),
            folder_id: "photobooth".into(),
            mirror_dir: "uploads".into(),
            poll_timeout_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub ready_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 80,
            ready_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub log_level: String,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoboothConfig {
    pub camera: CameraConfig,
    pub leds: LedConfig,
    pub capture: CaptureConfig,
    pub upload: UploadConfig,
    pub server: ServerConfig,
    pub ops: OpsConfig,
    pub startup: StartupConfig,
}

impl PhotoboothConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            PhotoboothError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            PhotoboothError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(config_error("camera resolution must be non-zero"));
        }
        if self.camera.frame_rate == 0 {
            return Err(config_error("camera.frame_rate must be greater than zero"));
        }
        if !(1..=100).contains(&self.camera.jpeg_quality) {
            return Err(config_error("camera.jpeg_quality must be between 1 and 100"));
        }
        if !(1..=100).contains(&self.capture.photo_quality) {
            return Err(config_error("capture.photo_quality must be between 1 and 100"));
        }
        if self.leds.num_pixels == 0 {
            return Err(config_error("leds.num_pixels must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.capture.watermark_opacity) {
            return Err(config_error(
                "capture.watermark_opacity must be between 0.0 and 1.0",
            ));
        }
        if self.capture.watermark_width == 0 || self.capture.watermark_height == 0 {
            return Err(config_error("watermark dimensions must be non-zero"));
        }
        let watermark_span = self.capture.watermark_height as u64
            + self.capture.watermark_bottom_offset as u64;
        if self.capture.watermark_path.is_some() && watermark_span > self.camera.height as u64 {
            return Err(config_error(
                "watermark height plus bottom offset exceeds camera height",
            ));
        }
        if self.upload.poll_timeout_ms == 0 {
            return Err(config_error("upload.poll_timeout_ms must be greater than zero"));
        }
        if self.server.port == 0 {
            return Err(config_error("server.port must be a valid port (>0)"));
        }
        if self.startup.max_attempts == 0 {
            return Err(config_error("startup.max_attempts must be greater than zero"));
        }
        Ok(())
    }

    /// Offset of the watermark's top-left corner within a captured frame.
    pub fn watermark_position(&self) -> (i64, i64) {
        let y = self.camera.height as i64
            - self.capture.watermark_height as i64
            - self.capture.watermark_bottom_offset as i64;
        (0, y)
    }
}

fn config_error(message: &str) -> PhotoboothError {
    PhotoboothError::Configuration(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn load_photobooth_config_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let temp_path = dir.path().join("photobooth.toml");
        let mut config = PhotoboothConfig::default();
        config.leds.num_pixels = 24;
        config.capture.capture_dir = "/srv/booth/captures".into();
        config.capture.burst_skips_number = false;
        config.upload.folder_id = "wedding-2026".into();
        config.startup.max_attempts = 5;

        let doc = toml::to_string(&config).expect("serialize config");
        fs::write(&temp_path, doc).expect("write temp config");

        let loaded = PhotoboothConfig::from_file(&temp_path).expect("load config");
        assert_eq!(loaded.leds.num_pixels, 24);
        assert_eq!(loaded.capture.capture_dir, "/srv/booth/captures");
        assert!(!loaded.capture.burst_skips_number);
        assert_eq!(loaded.upload.folder_id, "wedding-2026");
        assert_eq!(loaded.startup.max_attempts, 5);
    }

    #[test]
    fn partial_file_falls_back_to_section_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let temp_path = dir.path().join("partial.toml");
        fs::write(&temp_path, "[camera]\nframe_rate = 30\n\n[server]\nport = 8080\n")
            .expect("write temp config");

        let loaded = PhotoboothConfig::from_file(&temp_path).expect("load config");
        assert_eq!(loaded.camera.frame_rate, 30);
        assert_eq!(loaded.camera.width, 1080);
        assert_eq!(loaded.server.port, 8080);
        assert_eq!(loaded.capture.countdown_ms, 3_000);
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let err = PhotoboothConfig::from_file("/nonexistent/photobooth.toml")
            .expect_err("missing file");
        assert!(matches!(err, PhotoboothError::Configuration(_)));
    }

    #[test]
    fn validate_configuration_rules() {
        let mut config = PhotoboothConfig::default();
        assert!(config.validate().is_ok());

        config.camera.frame_rate = 0;
        assert!(config.validate().is_err());
        config.camera.frame_rate = 15;
        config.camera.jpeg_quality = 0;
        assert!(config.validate().is_err());
        config.camera.jpeg_quality = 80;
        config.leds.num_pixels = 0;
        assert!(config.validate().is_err());
        config.leds.num_pixels = 16;
        config.capture.watermark_opacity = 1.5;
        assert!(config.validate().is_err());
        config.capture.watermark_opacity = 0.7;
        config.capture.watermark_bottom_offset = 1_300;
        assert!(config.validate().is_err());
        config.capture.watermark_path = None;
        assert!(config.validate().is_ok());
        config.startup.max_attempts = 0;
        assert!(config.validate().is_err());
        config.startup.max_attempts = 1;
        config.server.port = 0;
        assert!(config.validate().is_err());
        config.server.port = 8080;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn watermark_sits_above_bottom_offset() {
        let config = PhotoboothConfig::default();
        assert_eq!(config.watermark_position(), (0, 1350 - 146 - 100));
    }
}
