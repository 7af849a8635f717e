//! Output device enumeration.
//!
//! Backends hand out devices in one of two shapes: a native list that must
//! be released after iteration (ALSA name hints) or a flat list (cpal). Both
//! end up as a plain `Vec<AudioDevice>` capped at `max` entries.

mod alsa_hints;
mod cpal_host;

use serde::Serialize;
use thiserror::Error;

pub use alsa_hints::{AlsaDevices, AlsaHintList};
pub use cpal_host::CpalDevices;

/// Interactive listings stop here.
pub const MAX_DEVICES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioDevice {
    /// Opaque id understood by the backend (ALSA PCM name, cpal device name)
    pub id: String,
    pub description: String,
}

impl AudioDevice {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("{backend} device enumeration failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
    #[error("device list used after release")]
    Released,
}

/// One entry as the backend reports it; either field may be missing.
#[derive(Debug, Clone, Default)]
pub struct RawDevice {
    pub id: Option<String>,
    pub description: Option<String>,
}

impl RawDevice {
    /// Entries without an id are dropped; a missing description falls back to the id.
    fn into_device(self) -> Option<AudioDevice> {
        let id = self.id.filter(|id| !id.is_empty())?;
        let description = self
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| id.clone());
        Some(AudioDevice { id, description })
    }
}

/// A backend-owned device list that must be handed back after iteration.
pub trait RawDeviceList {
    /// Next entry, or `Ok(None)` at the end of the list.
    fn next_entry(&mut self) -> Result<Option<RawDevice>, DeviceError>;
    /// Give the list back to the backend. Called exactly once by [`ListGuard`].
    fn release(&mut self);
}

/// Owns a [`RawDeviceList`] and releases it exactly once, including on early
/// return and on errors mid-iteration.
pub struct ListGuard<L: RawDeviceList> {
    list: L,
    released: bool,
}

impl<L: RawDeviceList> ListGuard<L> {
    pub fn new(list: L) -> Self {
        Self {
            list,
            released: false,
        }
    }

    pub fn next_entry(&mut self) -> Result<Option<RawDevice>, DeviceError> {
        if self.released {
            return Err(DeviceError::Released);
        }
        self.list.next_entry()
    }

    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.list.release();
        }
    }
}

impl<L: RawDeviceList> Drop for ListGuard<L> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Drain a releasable list into at most `max` devices.
pub fn collect_devices<L: RawDeviceList>(
    list: L,
    max: usize,
) -> Result<Vec<AudioDevice>, DeviceError> {
    let mut guard = ListGuard::new(list);
    let mut devices = Vec::new();
    while devices.len() < max {
        match guard.next_entry()? {
            Some(raw) => devices.extend(raw.into_device()),
            None => break,
        }
    }
    guard.release();
    Ok(devices)
}

/// Collect a flat backend list into at most `max` devices.
pub fn collect_flat<I>(entries: I, max: usize) -> Vec<AudioDevice>
where
    I: IntoIterator<Item = RawDevice>,
{
    entries
        .into_iter()
        .filter_map(RawDevice::into_device)
        .take(max)
        .collect()
}

/// A backend able to list its audio outputs.
pub trait DeviceSource {
    fn backend(&self) -> &'static str;
    fn enumerate(&self) -> Result<Vec<AudioDevice>, DeviceError>;
}

/// Enumerate, treating backend failures like an empty list (default output).
pub fn enumerate_or_empty(source: &dyn DeviceSource) -> Vec<AudioDevice> {
    match source.enumerate() {
        Ok(devices) => {
            log::info!("{}: {} output device(s)", source.backend(), devices.len());
            devices
        }
        Err(e) => {
            log::warn!("{}; using default output", e);
            Vec::new()
        }
    }
}

/// Render a device listing, either `index: description (id)` lines or JSON.
pub fn render_list(devices: &[AudioDevice], json: bool) -> Result<String, serde_json::Error> {
    if json {
        return serde_json::to_string_pretty(devices);
    }
    if devices.is_empty() {
        return Ok("No output devices found; the default output will be used.".to_string());
    }
    Ok(devices
        .iter()
        .enumerate()
        .map(|(i, d)| format!("{}: {} ({})", i, d.description, d.id))
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    struct FakeList {
        entries: VecDeque<Result<RawDevice, DeviceError>>,
        releases: Rc<Cell<u32>>,
    }

    impl FakeList {
        fn new(entries: Vec<Result<RawDevice, DeviceError>>) -> (Self, Rc<Cell<u32>>) {
            let releases = Rc::new(Cell::new(0));
            (
                Self {
                    entries: entries.into(),
                    releases: releases.clone(),
                },
                releases,
            )
        }
    }

    impl RawDeviceList for FakeList {
        fn next_entry(&mut self) -> Result<Option<RawDevice>, DeviceError> {
            self.entries.pop_front().transpose()
        }

        fn release(&mut self) {
            self.releases.set(self.releases.get() + 1);
        }
    }

    fn raw(id: &str, desc: Option<&str>) -> Result<RawDevice, DeviceError> {
        Ok(RawDevice {
            id: Some(id.to_string()),
            description: desc.map(str::to_string),
        })
    }

    fn backend_error() -> Result<RawDevice, DeviceError> {
        Err(DeviceError::Backend {
            backend: "fake",
            message: "boom".to_string(),
        })
    }

    #[test]
    fn empty_list_is_not_an_error() {
        let (list, releases) = FakeList::new(vec![]);
        let devices = collect_devices(list, MAX_DEVICES).unwrap();
        assert!(devices.is_empty());
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn collects_in_order_and_releases_once() {
        let (list, releases) = FakeList::new(vec![
            raw("hw:0", Some("Built-in")),
            raw("hw:1", Some("USB Box Audio")),
        ]);
        let devices = collect_devices(list, MAX_DEVICES).unwrap();
        assert_eq!(
            devices,
            vec![
                AudioDevice::new("hw:0", "Built-in"),
                AudioDevice::new("hw:1", "USB Box Audio"),
            ]
        );
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn caps_at_max_and_still_releases() {
        let entries = (0..15).map(|i| raw(&format!("dev{i}"), None)).collect();
        let (list, releases) = FakeList::new(entries);
        let devices = collect_devices(list, MAX_DEVICES).unwrap();
        assert_eq!(devices.len(), MAX_DEVICES);
        assert_eq!(devices[9].id, "dev9");
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn error_mid_iteration_releases_once() {
        let (list, releases) = FakeList::new(vec![
            raw("hw:0", Some("Built-in")),
            backend_error(),
            raw("hw:1", Some("never reached")),
        ]);
        assert!(collect_devices(list, MAX_DEVICES).is_err());
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn skips_entries_without_id_and_defaults_description() {
        let (list, _) = FakeList::new(vec![
            Ok(RawDevice::default()),
            raw("", Some("blank id")),
            raw("plughw:1", None),
            raw("plughw:2", Some("  ")),
        ]);
        let devices = collect_devices(list, MAX_DEVICES).unwrap();
        assert_eq!(
            devices,
            vec![
                AudioDevice::new("plughw:1", "plughw:1"),
                AudioDevice::new("plughw:2", "plughw:2"),
            ]
        );
    }

    #[test]
    fn guard_release_is_idempotent() {
        let (list, releases) = FakeList::new(vec![raw("a", None)]);
        let mut guard = ListGuard::new(list);
        guard.release();
        guard.release();
        assert!(matches!(guard.next_entry(), Err(DeviceError::Released)));
        drop(guard);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn flat_list_is_capped() {
        let entries = (0..12).map(|i| RawDevice {
            id: Some(format!("out{i}")),
            description: None,
        });
        let devices = collect_flat(entries, MAX_DEVICES);
        assert_eq!(devices.len(), MAX_DEVICES);
        assert_eq!(devices[0], AudioDevice::new("out0", "out0"));
    }

    struct Failing;

    impl DeviceSource for Failing {
        fn backend(&self) -> &'static str {
            "fake"
        }

        fn enumerate(&self) -> Result<Vec<AudioDevice>, DeviceError> {
            Err(DeviceError::Backend {
                backend: "fake",
                message: "no sound server".to_string(),
            })
        }
    }

    #[test]
    fn renders_text_and_json() {
        let devices = vec![AudioDevice::new("hw:1", "USB Box Audio")];
        assert_eq!(render_list(&devices, false).unwrap(), "0: USB Box Audio (hw:1)");

        let json: serde_json::Value =
            serde_json::from_str(&render_list(&devices, true).unwrap()).unwrap();
        assert_eq!(json[0]["id"], "hw:1");
        assert_eq!(json[0]["description"], "USB Box Audio");
    }

    #[test]
    fn enumeration_failure_means_no_devices() {
        assert!(enumerate_or_empty(&Failing).is_empty());
    }
}
