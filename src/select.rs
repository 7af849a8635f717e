//! Output device selection.
//!
//! Resolution order for a user choice (first match wins):
//! no devices, blank input, single in-range digit, then a case-insensitive
//! substring match on the description. Anything else falls back to the
//! default output with a warning.

use std::io::{self, BufRead, Write};

use crate::device::AudioDevice;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionChoice {
    Default,
    Index(usize),
    Keyword(String),
}

impl SelectionChoice {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.is_empty() {
            return SelectionChoice::Default;
        }
        let mut chars = input.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if let Some(digit) = c.to_digit(10) {
                return SelectionChoice::Index(digit as usize);
            }
        }
        SelectionChoice::Keyword(input.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultReason {
    NoDevices,
    Blank,
    NoMatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Default(DefaultReason),
    Device { index: usize, id: String },
}

impl Selection {
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Selection::Default(_) => None,
            Selection::Device { id, .. } => Some(id),
        }
    }

    fn device(index: usize, devices: &[AudioDevice]) -> Self {
        Selection::Device {
            index,
            id: devices[index].id.clone(),
        }
    }
}

pub fn resolve(devices: &[AudioDevice], choice: &SelectionChoice) -> Selection {
    if devices.is_empty() {
        return Selection::Default(DefaultReason::NoDevices);
    }
    let needle = match choice {
        SelectionChoice::Default => return Selection::Default(DefaultReason::Blank),
        SelectionChoice::Index(i) if *i < devices.len() => return Selection::device(*i, devices),
        // 越界的数字当作普通文本继续匹配
        SelectionChoice::Index(i) => i.to_string(),
        SelectionChoice::Keyword(k) => k.clone(),
    };
    find_substring(devices, &needle)
        .map(|i| Selection::device(i, devices))
        .unwrap_or(Selection::Default(DefaultReason::NoMatch))
}

/// Try each keyword in order against all devices; the first hit wins.
pub fn match_keywords(devices: &[AudioDevice], keywords: &[String]) -> Selection {
    if devices.is_empty() {
        return Selection::Default(DefaultReason::NoDevices);
    }
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .find_map(|k| find_substring(devices, k))
        .map(|i| Selection::device(i, devices))
        .unwrap_or(Selection::Default(DefaultReason::NoMatch))
}

fn find_substring(devices: &[AudioDevice], needle: &str) -> Option<usize> {
    let needle = needle.to_lowercase();
    devices
        .iter()
        .position(|d| d.description.to_lowercase().contains(&needle))
}

/// Print the device list and read one answer. EOF counts as a blank answer.
pub fn prompt_choice<R: BufRead, W: Write>(
    devices: &[AudioDevice],
    mut input: R,
    mut out: W,
) -> io::Result<SelectionChoice> {
    writeln!(
        out,
        "Select audio output device (0-{}). Press Enter to use default.\n",
        devices.len().saturating_sub(1)
    )?;
    for (i, device) in devices.iter().enumerate() {
        writeln!(out, "{}: {}", i, device.description)?;
    }
    write!(out, "\nDevice #: ")?;
    out.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(SelectionChoice::parse(&line))
}

/// Resolve the interactive player's device: from `arg` if given, otherwise by
/// prompting on stdin. Returns `None` for the default output.
pub fn choose_device(devices: &[AudioDevice], arg: Option<&str>) -> io::Result<Option<String>> {
    if devices.is_empty() {
        return Ok(None);
    }
    let choice = match arg {
        Some(arg) => SelectionChoice::parse(arg),
        None => {
            let stdin = io::stdin();
            prompt_choice(devices, stdin.lock(), io::stdout())?
        }
    };

    let selection = resolve(devices, &choice);
    report(devices, &selection);
    Ok(selection.device_id().map(str::to_string))
}

fn report(devices: &[AudioDevice], selection: &Selection) {
    match selection {
        Selection::Device { index, id } => {
            log::info!("Selected output {}: {} ({})", index, devices[*index].description, id);
        }
        Selection::Default(DefaultReason::NoMatch) => {
            eprintln!("Invalid selection; using default output device.");
        }
        Selection::Default(reason) => log::info!("Using default output ({:?})", reason),
    }
}
