//! ALSA name-hint enumeration.
//!
//! `snd_device_name_hint` hands back an array that must be freed with
//! `snd_device_name_free_hint`; the alsa crate frees it when the
//! `HintIter` is dropped, so releasing the list means dropping the iterator.

use std::collections::HashSet;

use alsa::device_name::HintIter;
use alsa::Direction;

use super::{collect_devices, AudioDevice, DeviceError, DeviceSource, RawDevice, RawDeviceList};

const BACKEND: &str = "ALSA";

pub struct AlsaHintList {
    hints: Option<HintIter>,
    /// Cards that already produced a sink
    cards: HashSet<String>,
}

impl AlsaHintList {
    /// Acquire the PCM hint list.
    pub fn open() -> Result<Self, DeviceError> {
        let hints = HintIter::new_str(None, "pcm").map_err(|e| DeviceError::Backend {
            backend: BACKEND,
            message: e.to_string(),
        })?;
        Ok(Self {
            hints: Some(hints),
            cards: HashSet::new(),
        })
    }
}

impl RawDeviceList for AlsaHintList {
    fn next_entry(&mut self) -> Result<Option<RawDevice>, DeviceError> {
        let hints = self.hints.as_mut().ok_or(DeviceError::Released)?;
        while let Some(hint) = hints.next() {
            // 只要能输出的设备
            if hint.direction == Some(Direction::Capture) {
                continue;
            }
            if let Some(name) = hint.name.as_deref() {
                if !keep_hint(name, &mut self.cards) {
                    continue;
                }
            }
            return Ok(Some(RawDevice {
                id: hint.name,
                description: hint.desc.map(|d| flatten_description(&d)),
            }));
        }
        Ok(None)
    }

    fn release(&mut self) {
        self.hints.take();
    }
}

/// What a PCM hint name stands for.
#[derive(Debug, PartialEq, Eq)]
enum HintKind<'a> {
    /// Configured PCM without card arguments (`default`, `pulse`, `pipewire`)
    Virtual,
    /// Whole-card sink (`default:CARD=x`, `sysdefault:CARD=x`)
    CardSink(&'a str),
    /// `null`, raw `hw:`/`plughw:`, `dmix:`, `dsnoop:`, per-connector PCMs
    Skip,
}

fn classify_hint(name: &str) -> HintKind<'_> {
    match name.split_once(':') {
        None if name == "null" => HintKind::Skip,
        None => HintKind::Virtual,
        Some(("default" | "sysdefault", args)) => args
            .split(',')
            .find_map(|arg| arg.strip_prefix("CARD="))
            .map_or(HintKind::Skip, HintKind::CardSink),
        Some(_) => HintKind::Skip,
    }
}

/// Keep one sink per card so every card fits under the listing cap.
fn keep_hint(name: &str, cards: &mut HashSet<String>) -> bool {
    match classify_hint(name) {
        HintKind::Virtual => true,
        HintKind::CardSink(card) => cards.insert(card.to_string()),
        HintKind::Skip => false,
    }
}

/// ALSA descriptions are multi-line ("card\nstream"); keep them on one line.
fn flatten_description(desc: &str) -> String {
    desc.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Playback PCMs as listed by ALSA's name hints.
pub struct AlsaDevices {
    max: usize,
}

impl AlsaDevices {
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

impl DeviceSource for AlsaDevices {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn enumerate(&self) -> Result<Vec<AudioDevice>, DeviceError> {
        collect_devices(AlsaHintList::open()?, self.max)
    }
}
