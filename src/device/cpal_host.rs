use cpal::traits::{DeviceTrait, HostTrait};

use super::{collect_flat, AudioDevice, DeviceError, DeviceSource, RawDevice};

/// Output devices of a cpal host. cpal identifies devices by name, so the
/// name doubles as id and description.
pub struct CpalDevices<'a> {
    host: &'a cpal::Host,
    max: usize,
}

impl<'a> CpalDevices<'a> {
    pub fn new(host: &'a cpal::Host, max: usize) -> Self {
        Self { host, max }
    }
}

impl DeviceSource for CpalDevices<'_> {
    fn backend(&self) -> &'static str {
        "cpal"
    }

    fn enumerate(&self) -> Result<Vec<AudioDevice>, DeviceError> {
        let devices = self
            .host
            .output_devices()
            .map_err(|e| DeviceError::Backend {
                backend: "cpal",
                message: e.to_string(),
            })?;

        Ok(collect_flat(
            devices.map(|d| {
                let name = d.name().ok();
                RawDevice {
                    id: name.clone(),
                    description: name,
                }
            }),
            self.max,
        ))
    }
}
