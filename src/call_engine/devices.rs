//! Lokale Mediengeräte (Mikrofon, Kamera)
//!
//! Kann das Mikrofon beim Join nicht belegt werden, ist das fatal und wird
//! sofort gemeldet. Mit dem Feature `native-audio` prüft `CpalDevices` die
//! echten Eingabegeräte über cpal.

use super::video::VideoConstraints;
use parking_lot::Mutex;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("No audio input device found")]
    NoInputDevice,

    #[error("No camera found")]
    NoCamera,

    #[error("Unsupported device configuration: {0}")]
    UnsupportedConfig(String),

    #[error("Device is busy: {0}")]
    Busy(String),
}

// ============================================================================
// DEVICE TRAIT
// ============================================================================

/// Belegt und gibt lokale Mediengeräte frei
pub trait MediaDevices: Send + Sync {
    fn acquire_microphone(&self) -> Result<(), DeviceError>;

    fn acquire_camera(&self, constraints: &VideoConstraints) -> Result<(), DeviceError>;

    fn release_camera(&self);

    /// Gibt Mikrofon und Kamera frei
    fn release_all(&self);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct HeldDevices {
    microphone: bool,
    camera: bool,
}

// ============================================================================
// VIRTUAL DEVICES
// ============================================================================

/// Geräte ohne Hardware-Zugriff, z.B. wenn Medien von außen eingespeist werden
#[derive(Debug)]
pub struct VirtualDevices {
    has_microphone: bool,
    has_camera: bool,
    held: Mutex<HeldDevices>,
}

impl VirtualDevices {
    pub fn available() -> Self {
        Self {
            has_microphone: true,
            has_camera: true,
            held: Mutex::new(HeldDevices::default()),
        }
    }

    pub fn without_microphone() -> Self {
        Self {
            has_microphone: false,
            ..Self::available()
        }
    }

    pub fn without_camera() -> Self {
        Self {
            has_camera: false,
            ..Self::available()
        }
    }

    pub fn microphone_held(&self) -> bool {
        self.held.lock().microphone
    }

    pub fn camera_held(&self) -> bool {
        self.held.lock().camera
    }
}

impl MediaDevices for VirtualDevices {
    fn acquire_microphone(&self) -> Result<(), DeviceError> {
        if !self.has_microphone {
            return Err(DeviceError::NoInputDevice);
        }
        self.held.lock().microphone = true;
        Ok(())
    }

    fn acquire_camera(&self, constraints: &VideoConstraints) -> Result<(), DeviceError> {
        if !self.has_camera {
            return Err(DeviceError::NoCamera);
        }
        tracing::debug!(
            "Virtual camera acquired: {}x{}@{}fps",
            constraints.width,
            constraints.height,
            constraints.frame_rate
        );
        self.held.lock().camera = true;
        Ok(())
    }

    fn release_camera(&self) {
        self.held.lock().camera = false;
    }

    fn release_all(&self) {
        *self.held.lock() = HeldDevices::default();
    }
}

// ============================================================================
// CPAL DEVICES
// ============================================================================

/// Prüft echte Audio-Eingabegeräte über cpal
#[cfg(feature = "native-audio")]
pub struct CpalDevices {
    camera: VirtualDevices,
    held: Mutex<HeldDevices>,
}

#[cfg(feature = "native-audio")]
impl CpalDevices {
    /// `camera_available` kommt vom Host, cpal kennt keine Kameras
    pub fn new(camera_available: bool) -> Self {
        let camera = if camera_available {
            VirtualDevices::available()
        } else {
            VirtualDevices::without_camera()
        };
        Self {
            camera,
            held: Mutex::new(HeldDevices::default()),
        }
    }
}

#[cfg(feature = "native-audio")]
impl MediaDevices for CpalDevices {
    fn acquire_microphone(&self) -> Result<(), DeviceError> {
        use cpal::traits::{DeviceTrait, HostTrait};

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(DeviceError::NoInputDevice)?;

        let config = device
            .default_input_config()
            .map_err(|e| DeviceError::UnsupportedConfig(e.to_string()))?;

        tracing::info!(
            "Microphone acquired: {} ({}Hz, {} channel(s))",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            config.sample_rate().0,
            config.channels()
        );

        self.held.lock().microphone = true;
        Ok(())
    }

    fn acquire_camera(&self, constraints: &VideoConstraints) -> Result<(), DeviceError> {
        self.camera.acquire_camera(constraints)?;
        self.held.lock().camera = true;
        Ok(())
    }

    fn release_camera(&self) {
        self.camera.release_camera();
        self.held.lock().camera = false;
    }

    fn release_all(&self) {
        self.camera.release_all();
        *self.held.lock() = HeldDevices::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let devices = VirtualDevices::available();
        devices.acquire_microphone().unwrap();
        devices.acquire_camera(&VideoConstraints::default()).unwrap();
        assert!(devices.microphone_held());
        assert!(devices.camera_held());

        devices.release_camera();
        assert!(!devices.camera_held());
        assert!(devices.microphone_held());

        devices.release_all();
        assert!(!devices.microphone_held());
    }

    #[test]
    fn test_missing_devices_are_reported() {
        assert_eq!(
            VirtualDevices::without_microphone().acquire_microphone(),
            Err(DeviceError::NoInputDevice)
        );
        assert_eq!(
            VirtualDevices::without_camera().acquire_camera(&VideoConstraints::default()),
            Err(DeviceError::NoCamera)
        );
    }
}
