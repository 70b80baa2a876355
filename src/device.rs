//! # Compute Device Selection
//!
//! Picks the candle device both emotion models are loaded onto. GPU backends
//! are tried in order and the CPU is the fallback, so a missing driver never
//! prevents the service from starting.

use candle_core::Device;
use tracing::{debug, info};

/// Device preferences for model inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// Automatically select the best available device
    #[default]
    Auto,
    /// Force CPU usage
    Cpu,
    /// CUDA GPU (falls back to CPU if not available)
    Cuda,
    /// Metal GPU (falls back to CPU if not available)
    Metal,
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "automatic" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            "metal" => Ok(DevicePreference::Metal),
            _ => Err(format!("Unknown device preference: {}", s)),
        }
    }
}

/// Resolve a preference to a concrete device.
pub fn select_device(preference: DevicePreference) -> Device {
    let device = match preference {
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda => cuda_device().unwrap_or(Device::Cpu),
        DevicePreference::Metal => metal_device().unwrap_or(Device::Cpu),
        DevicePreference::Auto => cuda_device().or_else(metal_device).unwrap_or(Device::Cpu),
    };

    info!(preference = ?preference, device = device_name(&device), "Selected inference device");
    device
}

/// Short name used in logs and the health report.
pub fn device_name(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}

fn cuda_device() -> Option<Device> {
    match Device::new_cuda(0) {
        Ok(device) => Some(device),
        Err(e) => {
            debug!("CUDA not available: {}", e);
            None
        }
    }
}

fn metal_device() -> Option<Device> {
    match Device::new_metal(0) {
        Ok(device) => Some(device),
        Err(e) => {
            debug!("Metal not available: {}", e);
            None
        }
    }
}
