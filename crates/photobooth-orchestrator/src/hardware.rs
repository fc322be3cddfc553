use std::sync::Arc;

use photobooth_camera::{CameraDevice, SyntheticCamera};
use photobooth_leds::{PixelStrip, VirtualStrip};
use photobooth_types::{
    config::{CameraConfig, LedConfig, UploadConfig},
    Result,
};
use photobooth_upload::{DirectoryUploader, StorageUploader};
use tracing::info;

/// Devices handed to a new capture system.
pub struct CaptureParts {
    pub camera: Box<dyn CameraDevice>,
    pub strip: Box<dyn PixelStrip>,
    /// `None` keeps photos local only.
    pub uploader: Option<Arc<dyn StorageUploader>>,
}

/// Opens the devices the capture system runs on. Called again on every
/// initialization attempt.
pub trait HardwareProvider: Send + Sync {
    fn open_camera(&self, config: &CameraConfig) -> Result<Box<dyn CameraDevice>>;
    fn open_strip(&self, config: &LedConfig) -> Result<Box<dyn PixelStrip>>;
    fn open_uploader(&self, config: &UploadConfig) -> Result<Option<Arc<dyn StorageUploader>>>;

    fn open_all(
        &self,
        camera: &CameraConfig,
        leds: &LedConfig,
        upload: &UploadConfig,
    ) -> Result<CaptureParts> {
        Ok(CaptureParts {
            camera: self.open_camera(camera)?,
            strip: self.open_strip(leds)?,
            uploader: self.open_uploader(upload)?,
        })
    }
}

/// Software devices: synthetic sensor, in-memory strip, directory mirror.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedHardware;

impl HardwareProvider for SimulatedHardware {
    fn open_camera(&self, config: &CameraConfig) -> Result<Box<dyn CameraDevice>> {
        Ok(Box::new(SyntheticCamera::new(config.clone())))
    }

    fn open_strip(&self, config: &LedConfig) -> Result<Box<dyn PixelStrip>> {
        info!(
            "Virtual LED strip with {} pixels on pin {}",
            config.num_pixels, config.data_pin
        );
        Ok(Box::new(VirtualStrip::new(config.num_pixels)))
    }

    fn open_uploader(&self, config: &UploadConfig) -> Result<Option<Arc<dyn StorageUploader>>> {
        if !config.enabled {
            info!("Remote upload disabled; photos stay local");
            return Ok(None);
        }
        let uploader = DirectoryUploader::from_config(config);
        info!("Uploads mirrored to {}", uploader.target_dir().display());
        Ok(Some(Arc::new(uploader)))
    }
}
