//! # Input Injection
//!
//! Synthetic keyboard and joystick input through Linux `uinput`.
//!
//! The router only sees the [`KeySink`] and [`AxisSink`] traits. The evdev
//! backed [`VirtualKeyboard`] and [`VirtualJoystick`] need write access to
//! `/dev/uinput`.

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AbsInfo, AbsoluteAxisType, AttributeSet, EventType, InputEvent, Key, UinputAbsSetup};
use tracing::info;

use super::axis::{Axis, AXIS_OUTPUT_MAX, AXIS_OUTPUT_MIN};
use super::keymap::{key_symbol, KeyCombo};
use crate::error::{BridgeError, Result};

const KEYBOARD_NAME: &str = "Cockpit Bridge Keyboard";
const JOYSTICK_NAME: &str = "Cockpit Bridge Joystick";

/// Receiver of synthetic key combinations
#[cfg_attr(test, mockall::automock)]
pub trait KeySink: Send {
    /// Press the modifiers and key, then release them in reverse order
    fn press_and_release(&mut self, combo: &KeyCombo) -> Result<()>;
}

/// Receiver of virtual axis positions
#[cfg_attr(test, mockall::automock)]
pub trait AxisSink: Send {
    /// Move `axis` to `value` (already scaled to the output range)
    fn set_axis(&mut self, axis: Axis, value: u32) -> Result<()>;
}

/// evdev key for a key symbol from the scan-code table
pub fn evdev_key(symbol: &str) -> Option<Key> {
    let key = match symbol {
        "esc" => Key::KEY_ESC,
        "1" => Key::KEY_1,
        "2" => Key::KEY_2,
        "3" => Key::KEY_3,
        "4" => Key::KEY_4,
        "5" => Key::KEY_5,
        "6" => Key::KEY_6,
        "7" => Key::KEY_7,
        "8" => Key::KEY_8,
        "9" => Key::KEY_9,
        "0" => Key::KEY_0,
        "minus" => Key::KEY_MINUS,
        "equals" => Key::KEY_EQUAL,
        "backspace" => Key::KEY_BACKSPACE,
        "tab" => Key::KEY_TAB,
        "q" => Key::KEY_Q,
        "w" => Key::KEY_W,
        "e" => Key::KEY_E,
        "r" => Key::KEY_R,
        "t" => Key::KEY_T,
        "y" => Key::KEY_Y,
        "u" => Key::KEY_U,
        "i" => Key::KEY_I,
        "o" => Key::KEY_O,
        "p" => Key::KEY_P,
        "left brace" => Key::KEY_LEFTBRACE,
        "right brace" => Key::KEY_RIGHTBRACE,
        "enter" => Key::KEY_ENTER,
        "a" => Key::KEY_A,
        "s" => Key::KEY_S,
        "d" => Key::KEY_D,
        "f" => Key::KEY_F,
        "g" => Key::KEY_G,
        "h" => Key::KEY_H,
        "j" => Key::KEY_J,
        "k" => Key::KEY_K,
        "l" => Key::KEY_L,
        "semicolon" => Key::KEY_SEMICOLON,
        "apostrophe" => Key::KEY_APOSTROPHE,
        "backquote" => Key::KEY_GRAVE,
        "backslash" => Key::KEY_BACKSLASH,
        "z" => Key::KEY_Z,
        "x" => Key::KEY_X,
        "c" => Key::KEY_C,
        "v" => Key::KEY_V,
        "b" => Key::KEY_B,
        "n" => Key::KEY_N,
        "m" => Key::KEY_M,
        "comma" => Key::KEY_COMMA,
        "period" => Key::KEY_DOT,
        "slash" => Key::KEY_SLASH,
        "keypad *" => Key::KEY_KPASTERISK,
        "spacebar" => Key::KEY_SPACE,
        "caps lock" => Key::KEY_CAPSLOCK,
        "f1" => Key::KEY_F1,
        "f2" => Key::KEY_F2,
        "f3" => Key::KEY_F3,
        "f4" => Key::KEY_F4,
        "f5" => Key::KEY_F5,
        "f6" => Key::KEY_F6,
        "f7" => Key::KEY_F7,
        "f8" => Key::KEY_F8,
        "f9" => Key::KEY_F9,
        "f10" => Key::KEY_F10,
        "num 7" => Key::KEY_KP7,
        "num 8" => Key::KEY_KP8,
        "num 9" => Key::KEY_KP9,
        "num -" => Key::KEY_KPMINUS,
        "num 4" => Key::KEY_KP4,
        "num 5" => Key::KEY_KP5,
        "num 6" => Key::KEY_KP6,
        "num +" => Key::KEY_KPPLUS,
        "num 1" => Key::KEY_KP1,
        "num 2" => Key::KEY_KP2,
        "num 3" => Key::KEY_KP3,
        "num 0" => Key::KEY_KP0,
        "num ." => Key::KEY_KPDOT,
        "f11" => Key::KEY_F11,
        "f12" => Key::KEY_F12,
        "keypad enter" => Key::KEY_KPENTER,
        "keypad /" => Key::KEY_KPSLASH,
        "home" => Key::KEY_HOME,
        "up" => Key::KEY_UP,
        "page up" => Key::KEY_PAGEUP,
        "left" => Key::KEY_LEFT,
        "right" => Key::KEY_RIGHT,
        "end" => Key::KEY_END,
        "down" => Key::KEY_DOWN,
        "page down" => Key::KEY_PAGEDOWN,
        "insert" => Key::KEY_INSERT,
        "delete" => Key::KEY_DELETE,
        _ => return None,
    };
    Some(key)
}

/// evdev absolute axis backing a virtual joystick axis
pub fn evdev_axis(axis: Axis) -> AbsoluteAxisType {
    match axis {
        Axis::X => AbsoluteAxisType::ABS_X,
        Axis::Y => AbsoluteAxisType::ABS_Y,
        Axis::Z => AbsoluteAxisType::ABS_Z,
        Axis::Rx => AbsoluteAxisType::ABS_RX,
        Axis::Ry => AbsoluteAxisType::ABS_RY,
        Axis::Rz => AbsoluteAxisType::ABS_RZ,
        Axis::Slider0 => AbsoluteAxisType::ABS_THROTTLE,
        Axis::Slider1 => AbsoluteAxisType::ABS_RUDDER,
    }
}

fn injection_error(context: &str, e: std::io::Error) -> BridgeError {
    BridgeError::Injection(format!("{}: {}", context, e))
}

/// Modifier keys held for `combo`, in press order
fn modifier_keys(combo: &KeyCombo) -> Vec<Key> {
    let mut keys = Vec::with_capacity(3);
    if combo.modifiers.ctrl {
        keys.push(Key::KEY_LEFTCTRL);
    }
    if combo.modifiers.shift {
        keys.push(Key::KEY_LEFTSHIFT);
    }
    if combo.modifiers.alt {
        keys.push(Key::KEY_LEFTALT);
    }
    keys
}

/// uinput keyboard exposing every key in the scan-code table
pub struct VirtualKeyboard {
    device: VirtualDevice,
}

impl VirtualKeyboard {
    /// Create the virtual keyboard
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Injection`] if `/dev/uinput` cannot be used
    pub fn create() -> Result<Self> {
        let mut keys = AttributeSet::<Key>::new();
        for code in 0..=0xffu32 {
            if let Some(key) = key_symbol(code).and_then(evdev_key) {
                keys.insert(key);
            }
        }
        keys.insert(Key::KEY_LEFTCTRL);
        keys.insert(Key::KEY_LEFTSHIFT);
        keys.insert(Key::KEY_LEFTALT);

        let device = VirtualDeviceBuilder::new()
            .map_err(|e| injection_error("Failed to open /dev/uinput", e))?
            .name(KEYBOARD_NAME)
            .with_keys(&keys)
            .map_err(|e| injection_error("Failed to register keys", e))?
            .build()
            .map_err(|e| injection_error("Failed to create virtual keyboard", e))?;

        info!("Created virtual keyboard '{}'", KEYBOARD_NAME);
        Ok(Self { device })
    }

    fn emit_key(&mut self, key: Key, value: i32) -> Result<()> {
        self.device
            .emit(&[InputEvent::new(EventType::KEY, key.code(), value)])
            .map_err(|e| injection_error("Failed to emit key event", e))
    }
}

impl KeySink for VirtualKeyboard {
    fn press_and_release(&mut self, combo: &KeyCombo) -> Result<()> {
        let key = evdev_key(combo.key)
            .ok_or_else(|| BridgeError::Injection(format!("No evdev key for '{}'", combo.key)))?;
        let modifiers = modifier_keys(combo);

        for modifier in &modifiers {
            self.emit_key(*modifier, 1)?;
        }
        self.emit_key(key, 1)?;
        self.emit_key(key, 0)?;
        for modifier in modifiers.iter().rev() {
            self.emit_key(*modifier, 0)?;
        }
        Ok(())
    }
}

/// uinput joystick with all eight axes
pub struct VirtualJoystick {
    device: VirtualDevice,
}

impl VirtualJoystick {
    /// Create the virtual joystick, every axis centered
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Injection`] if `/dev/uinput` cannot be used
    pub fn create() -> Result<Self> {
        let min = AXIS_OUTPUT_MIN as i32;
        let max = AXIS_OUTPUT_MAX as i32;
        let center = (min + max) / 2;

        // Joystick handlers only bind devices that report a button.
        let mut buttons = AttributeSet::<Key>::new();
        buttons.insert(Key::BTN_TRIGGER);

        let mut builder = VirtualDeviceBuilder::new()
            .map_err(|e| injection_error("Failed to open /dev/uinput", e))?
            .name(JOYSTICK_NAME)
            .with_keys(&buttons)
            .map_err(|e| injection_error("Failed to register buttons", e))?;
        for axis in Axis::ALL {
            let setup = UinputAbsSetup::new(evdev_axis(axis), AbsInfo::new(center, min, max, 0, 0, 0));
            builder = builder
                .with_absolute_axis(&setup)
                .map_err(|e| injection_error("Failed to register axis", e))?;
        }
        let device = builder
            .build()
            .map_err(|e| injection_error("Failed to create virtual joystick", e))?;

        info!("Created virtual joystick '{}'", JOYSTICK_NAME);
        Ok(Self { device })
    }
}

impl AxisSink for VirtualJoystick {
    fn set_axis(&mut self, axis: Axis, value: u32) -> Result<()> {
        let value = value.clamp(AXIS_OUTPUT_MIN, AXIS_OUTPUT_MAX) as i32;
        self.device
            .emit(&[InputEvent::new(EventType::ABSOLUTE, evdev_axis(axis).0, value)])
            .map_err(|e| injection_error("Failed to emit axis event", e))
    }
}
