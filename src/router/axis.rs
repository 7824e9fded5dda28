//! Virtual joystick axes and potentiometer scaling

use serde::Deserialize;
use std::fmt;

/// Largest raw value a panel potentiometer reports
pub const AXIS_INPUT_MAX: u32 = 65534;

/// Smallest value written to a virtual axis
pub const AXIS_OUTPUT_MIN: u32 = 1;

/// Largest value written to a virtual axis
pub const AXIS_OUTPUT_MAX: u32 = 32768;

/// Virtual joystick axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Axis {
    #[serde(rename = "X")]
    X,
    #[serde(rename = "Y")]
    Y,
    #[serde(rename = "Z")]
    Z,
    #[serde(rename = "RX")]
    Rx,
    #[serde(rename = "RY")]
    Ry,
    #[serde(rename = "RZ")]
    Rz,
    #[serde(rename = "SL0")]
    Slider0,
    #[serde(rename = "SL1")]
    Slider1,
}

impl Axis {
    pub const ALL: [Axis; 8] = [
        Axis::X,
        Axis::Y,
        Axis::Z,
        Axis::Rx,
        Axis::Ry,
        Axis::Rz,
        Axis::Slider0,
        Axis::Slider1,
    ];

    /// HID generic desktop usage ID
    pub fn hid_usage(&self) -> u8 {
        match self {
            Axis::X => 0x30,
            Axis::Y => 0x31,
            Axis::Z => 0x32,
            Axis::Rx => 0x33,
            Axis::Ry => 0x34,
            Axis::Rz => 0x35,
            Axis::Slider0 => 0x36,
            Axis::Slider1 => 0x37,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
            Axis::Rx => "RX",
            Axis::Ry => "RY",
            Axis::Rz => "RZ",
            Axis::Slider0 => "SL0",
            Axis::Slider1 => "SL1",
        };
        f.write_str(name)
    }
}

/// Scale a raw potentiometer reading to the virtual axis range
///
/// Input is clamped to `0..=65534` before scaling. The mapping is
/// `floor(value * 32767 / 65534) + 1`, so the output covers `1..=32768`.
///
/// # Examples
///
/// ```
/// use cockpit_bridge::router::axis::scale_axis_value;
///
/// assert_eq!(scale_axis_value(0), 1);
/// assert_eq!(scale_axis_value(32767), 16384);
/// assert_eq!(scale_axis_value(65534), 32768);
/// ```
pub fn scale_axis_value(raw: i64) -> u32 {
    let clamped = raw.clamp(0, i64::from(AXIS_INPUT_MAX)) as u64;
    let scaled = clamped * u64::from(AXIS_OUTPUT_MAX - 1) / u64::from(AXIS_INPUT_MAX);
    scaled as u32 + AXIS_OUTPUT_MIN
}
