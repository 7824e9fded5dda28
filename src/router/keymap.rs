//! # Keymap
//!
//! Parses Falcon BMS key files into `callback -> key combination` entries.
//!
//! ## Key File Format
//!
//! One binding per line, whitespace separated:
//!
//! ```text
//! SimICPStpt  0  0  0x2E  4  0  0  1  "ICP: STPT"
//! ```
//!
//! | Field | Meaning                                   |
//! |-------|-------------------------------------------|
//! | 0     | Callback (action) name                    |
//! | 3     | DirectInput scan code, hexadecimal        |
//! | 4     | Modifier code 0..=7 (shift, ctrl, alt)    |
//!
//! Comment lines start with `#`. Lines containing a standalone `-1` field
//! in the middle describe unbound callbacks or button bindings and are
//! skipped.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};

/// Key symbol for a DirectInput scan code
pub fn key_symbol(scan_code: u32) -> Option<&'static str> {
    let symbol = match scan_code {
        0x01 => "esc",
        0x02 => "1",
        0x03 => "2",
        0x04 => "3",
        0x05 => "4",
        0x06 => "5",
        0x07 => "6",
        0x08 => "7",
        0x09 => "8",
        0x0a => "9",
        0x0b => "0",
        0x0c => "minus",
        0x0d => "equals",
        0x0e => "backspace",
        0x0f => "tab",
        0x10 => "q",
        0x11 => "w",
        0x12 => "e",
        0x13 => "r",
        0x14 => "t",
        0x15 => "y",
        0x16 => "u",
        0x17 => "i",
        0x18 => "o",
        0x19 => "p",
        0x1a => "left brace",
        0x1b => "right brace",
        0x1c => "enter",
        0x1e => "a",
        0x1f => "s",
        0x20 => "d",
        0x21 => "f",
        0x22 => "g",
        0x23 => "h",
        0x24 => "j",
        0x25 => "k",
        0x26 => "l",
        0x27 => "semicolon",
        0x28 => "apostrophe",
        0x29 => "backquote",
        0x2b => "backslash",
        0x2c => "z",
        0x2d => "x",
        0x2e => "c",
        0x2f => "v",
        0x30 => "b",
        0x31 => "n",
        0x32 => "m",
        0x33 => "comma",
        0x34 => "period",
        0x35 => "slash",
        0x37 => "keypad *",
        0x39 => "spacebar",
        0x3a => "caps lock",
        0x3b => "f1",
        0x3c => "f2",
        0x3d => "f3",
        0x3e => "f4",
        0x3f => "f5",
        0x40 => "f6",
        0x41 => "f7",
        0x42 => "f8",
        0x43 => "f9",
        0x44 => "f10",
        0x47 => "num 7",
        0x48 => "num 8",
        0x49 => "num 9",
        0x4a => "num -",
        0x4b => "num 4",
        0x4c => "num 5",
        0x4d => "num 6",
        0x4e => "num +",
        0x4f => "num 1",
        0x50 => "num 2",
        0x51 => "num 3",
        0x52 => "num 0",
        0x53 => "num .",
        0x57 => "f11",
        0x58 => "f12",
        0x9c => "keypad enter",
        0xb5 => "keypad /",
        0xc7 => "home",
        0xc8 => "up",
        0xc9 => "page up",
        0xcb => "left",
        0xcd => "right",
        0xcf => "end",
        0xd0 => "down",
        0xd1 => "page down",
        0xd2 => "insert",
        0xd3 => "delete",
        _ => return None,
    };
    Some(symbol)
}

/// Modifier keys held during a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        alt: false,
    };

    /// Expand a key file modifier code (bit 0 shift, bit 1 ctrl, bit 2 alt)
    pub fn from_code(code: u8) -> Option<Self> {
        if code > 7 {
            return None;
        }
        Some(Self {
            shift: code & 0b001 != 0,
            ctrl: code & 0b010 != 0,
            alt: code & 0b100 != 0,
        })
    }

    pub fn is_empty(&self) -> bool {
        !(self.shift || self.ctrl || self.alt)
    }

    /// Held keys in display order
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(3);
        if self.ctrl {
            names.push("ctrl");
        }
        if self.shift {
            names.push("shift");
        }
        if self.alt {
            names.push("alt");
        }
        names
    }
}

/// A key symbol plus the modifiers held with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCombo {
    pub modifiers: Modifiers,
    pub key: &'static str,
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in self.modifiers.names() {
            write!(f, "{}+", name)?;
        }
        f.write_str(self.key)
    }
}

/// Action name to key combination, last binding wins
pub type Keymap = HashMap<String, KeyCombo>;

#[derive(Debug, PartialEq, Eq)]
enum LineParse {
    Skipped,
    Binding(String, KeyCombo),
    UnknownScanCode(u32),
    Malformed(&'static str),
}

fn parse_line(line: &str) -> LineParse {
    if line.starts_with('#') || line.contains(" -1 ") {
        return LineParse::Skipped;
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.is_empty() {
        return LineParse::Skipped;
    }
    if fields.len() < 5 {
        return LineParse::Malformed("fewer than 5 fields");
    }

    let hex = fields[3]
        .strip_prefix("0x")
        .or_else(|| fields[3].strip_prefix("0X"))
        .unwrap_or(fields[3]);
    let Ok(scan_code) = u32::from_str_radix(hex, 16) else {
        return LineParse::Malformed("scan code is not hexadecimal");
    };

    let Some(modifiers) = fields[4].parse::<u8>().ok().and_then(Modifiers::from_code) else {
        return LineParse::Malformed("modifier code is not 0-7");
    };

    match key_symbol(scan_code) {
        Some(key) => LineParse::Binding(fields[0].to_string(), KeyCombo { modifiers, key }),
        None => LineParse::UnknownScanCode(scan_code),
    }
}

/// Parse key file contents
pub fn parse_keymap(contents: &str) -> Keymap {
    let mut keymap = Keymap::new();

    for (number, line) in contents.lines().enumerate() {
        match parse_line(line) {
            LineParse::Binding(action, combo) => {
                keymap.insert(action, combo);
            }
            LineParse::UnknownScanCode(code) => {
                debug!("Line {}: no key for scan code {:#x}", number + 1, code);
            }
            LineParse::Malformed(reason) => {
                warn!("Skipping key file line {}: {}", number + 1, reason);
            }
            LineParse::Skipped => {}
        }
    }

    keymap
}

/// Load and parse a key file
///
/// # Errors
///
/// Returns [`BridgeError::Keymap`] if the file cannot be read
pub fn load_keymap<P: AsRef<Path>>(path: P) -> Result<Keymap> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| BridgeError::Keymap {
        path: path.display().to_string(),
        source,
    })?;
    let keymap = parse_keymap(&String::from_utf8_lossy(&bytes));
    info!("Loaded {} key bindings from {}", keymap.len(), path.display());
    Ok(keymap)
}
