//! Audio device enumeration and lookup

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

use crate::error::AudioError;

/// Device summary as shown by the host binaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    /// `input:<name>` or `output:<name>`
    pub id: String,
    pub name: String,
    pub is_input: bool,
    pub is_output: bool,
    pub is_default: bool,
}

/// Wrapper around cpal device
pub struct AudioDevice {
    inner: cpal::Device,
    pub name: String,
}

impl AudioDevice {
    fn from_cpal(device: cpal::Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self {
            inner: device,
            name,
        }
    }

    pub fn inner(&self) -> &cpal::Device {
        &self.inner
    }

    pub fn into_inner(self) -> cpal::Device {
        self.inner
    }
}

/// Direction a device id refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Input,
    Output,
}

/// Split a device id into its direction and device name.
///
/// Bare names are taken to mean `default_kind`.
pub fn parse_device_id(id: &str, default_kind: DeviceKind) -> (DeviceKind, &str) {
    if let Some(name) = id.strip_prefix("input:") {
        (DeviceKind::Input, name)
    } else if let Some(name) = id.strip_prefix("output:") {
        (DeviceKind::Output, name)
    } else {
        (default_kind, id)
    }
}

/// List all available audio devices
pub fn list_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_input = host.default_input_device().and_then(|d| d.name().ok());
    let default_output = host.default_output_device().and_then(|d| d.name().ok());

    if let Ok(inputs) = host.input_devices() {
        for name in inputs.filter_map(|d| d.name().ok()) {
            devices.push(AudioDeviceInfo {
                id: format!("input:{}", name),
                is_default: default_input.as_ref() == Some(&name),
                name,
                is_input: true,
                is_output: false,
            });
        }
    }

    if let Ok(outputs) = host.output_devices() {
        for name in outputs.filter_map(|d| d.name().ok()) {
            devices.push(AudioDeviceInfo {
                id: format!("output:{}", name),
                is_default: default_output.as_ref() == Some(&name),
                name,
                is_input: false,
                is_output: true,
            });
        }
    }

    devices
}

/// Get a device by id; `default_kind` applies to bare names
pub fn get_device_by_id(id: &str, default_kind: DeviceKind) -> Result<AudioDevice, AudioError> {
    let host = cpal::default_host();
    let (kind, name) = parse_device_id(id, default_kind);

    let devices = match kind {
        DeviceKind::Input => host.input_devices(),
        DeviceKind::Output => host.output_devices(),
    }
    .map_err(|e| AudioError::CpalError(e.to_string()))?;

    devices
        .into_iter()
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        .map(AudioDevice::from_cpal)
        .ok_or_else(|| AudioError::DeviceNotFound(id.to_string()))
}

/// Get default input device
pub fn get_default_input_device() -> Result<AudioDevice, AudioError> {
    cpal::default_host()
        .default_input_device()
        .map(AudioDevice::from_cpal)
        .ok_or_else(|| AudioError::DeviceNotFound("No default input device".to_string()))
}

/// Get default output device
pub fn get_default_output_device() -> Result<AudioDevice, AudioError> {
    cpal::default_host()
        .default_output_device()
        .map(AudioDevice::from_cpal)
        .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_id() {
        assert_eq!(parse_device_id("input:Mic", DeviceKind::Output), (DeviceKind::Input, "Mic"));
        assert_eq!(parse_device_id("output:Spk", DeviceKind::Input), (DeviceKind::Output, "Spk"));
        assert_eq!(parse_device_id("USB Audio", DeviceKind::Output), (DeviceKind::Output, "USB Audio"));
    }

    #[test]
    fn test_unknown_device_not_found() {
        // Hosts without audio hardware report either an empty list or a backend error
        let result = get_device_by_id("input:__no_such_device__", DeviceKind::Input);
        assert!(result.is_err());
    }
}
