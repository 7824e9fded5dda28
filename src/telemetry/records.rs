//! # Falcon BMS Shared Memory Records
//!
//! Decoders for the fixed-size records Falcon BMS publishes in named shared
//! memory, plus the variable-size string table.
//!
//! ## Regions
//!
//! | Region | Size | Contents |
//! |--------|------|----------|
//! | `FalconSharedMemoryArea` | 1920 | Primary flight data, DED/PFL lines |
//! | `FalconSharedMemoryArea2` | 1264 | Secondary flight data |
//! | `FalconIntellivibeSharedMemoryArea` | 52 | Event counters |
//! | `FalconSharedMemoryAreaString` | ≤ 1 MiB | String table |
//!
//! All integers and floats are little-endian. Only the fields the bridge
//! consumes are decoded; the rest of each record is skipped by offset.

use std::collections::BTreeMap;

use super::{DED_LINE_COUNT, DED_LINE_WIDTH};
use crate::error::{BridgeError, Result};

/// Name of the primary flight data region
pub const FLIGHT_DATA_AREA: &str = "FalconSharedMemoryArea";
/// Name of the secondary flight data region
pub const FLIGHT_DATA2_AREA: &str = "FalconSharedMemoryArea2";
/// Name of the event counter region
pub const INTELLIVIBE_AREA: &str = "FalconIntellivibeSharedMemoryArea";
/// Name of the string table region
pub const STRING_AREA: &str = "FalconSharedMemoryAreaString";

/// Size of the primary record in bytes
pub const FLIGHT_DATA_SIZE: usize = 1920;
/// Size of the secondary record in bytes
pub const FLIGHT_DATA2_SIZE: usize = 1264;
/// Size of the event counter record in bytes
pub const INTELLIVIBE_SIZE: usize = 52;
/// Upper bound on the string table region
pub const STRING_AREA_MAX_SIZE: usize = 1024 * 1024;

/// Raw DED/PFL line block: 5 lines of 26 bytes
pub type DisplayLines = [[u8; DED_LINE_WIDTH]; DED_LINE_COUNT];

const DISPLAY_BLOCK_SIZE: usize = DED_LINE_COUNT * DED_LINE_WIDTH;

mod offsets {
    pub const Z: usize = 8;
    pub const PITCH: usize = 36;
    pub const ROLL: usize = 40;
    pub const YAW: usize = 44;
    pub const MACH: usize = 48;
    pub const KIAS: usize = 52;
    pub const INTERNAL_FUEL: usize = 72;
    pub const EXTERNAL_FUEL: usize = 76;
    pub const FUEL_FLOW: usize = 80;
    pub const RPM: usize = 84;
    pub const GEAR_POS: usize = 92;
    pub const LIGHT_BITS: usize = 108;
    pub const LIGHT_BITS2: usize = 124;
    pub const LIGHT_BITS3: usize = 128;
    pub const CHAFF_COUNT: usize = 132;
    pub const FLARE_COUNT: usize = 136;
    pub const CURRENT_HEADING: usize = 188;
    pub const HSI_BITS: usize = 232;
    pub const DED_LINES: usize = 236;
    pub const DED_INVERT: usize = 366;
    pub const PFL_LINES: usize = 496;
    pub const PFL_INVERT: usize = 626;
    pub const UFC_TACAN_CHAN: usize = 756;
    pub const AUX_TACAN_CHAN: usize = 760;
    pub const VERSION_NUM: usize = 1900;
    pub const MAIN_POWER: usize = 1916;

    pub mod area2 {
        pub const NAV_MODE: usize = 16;
        pub const ALT_CAL_READING: usize = 28;
        pub const CURRENT_TIME: usize = 68;
        pub const VERSION_NUM: usize = 76;
        pub const LATITUDE: usize = 1032;
        pub const LONGITUDE: usize = 1036;
        pub const RALT: usize = 1116;
        pub const BINGO_FUEL: usize = 1120;
        pub const BMS_VERSION_MAJOR: usize = 1136;
        pub const BMS_VERSION_MINOR: usize = 1140;
        pub const BMS_VERSION_MICRO: usize = 1144;
        pub const BMS_BUILD_NUMBER: usize = 1148;
    }

    pub mod intellivibe {
        pub const AA_MISSILE_FIRED: usize = 0;
        pub const AG_MISSILE_FIRED: usize = 1;
        pub const BOMB_DROPPED: usize = 2;
        pub const FLARE_DROPPED: usize = 3;
        pub const CHAFF_DROPPED: usize = 4;
        pub const BULLETS_FIRED: usize = 5;
        pub const COLLISION_COUNTER: usize = 8;
        pub const IS_FIRING_GUN: usize = 12;
        pub const IS_END_FLIGHT: usize = 13;
        pub const IS_EJECTING: usize = 14;
        pub const IN_3D: usize = 15;
        pub const IS_PAUSED: usize = 16;
        pub const IS_FROZEN: usize = 17;
        pub const IS_OVER_G: usize = 18;
        pub const IS_ON_GROUND: usize = 19;
        pub const IS_EXIT_GAME: usize = 20;
        pub const G_FORCE: usize = 24;
        pub const LAST_DAMAGE: usize = 40;
        pub const DAMAGE_FORCE: usize = 44;
        pub const WHEN_DAMAGE: usize = 48;
    }
}

/// Identifiers of the string table entries, in id order
pub const STRING_IDS: [&str; 35] = [
    "BmsExe",
    "KeyFile",
    "BmsBasedir",
    "BmsBinDirectory",
    "BmsDataDirectory",
    "BmsUIArtDirectory",
    "BmsUserDirectory",
    "BmsAcmiDirectory",
    "BmsBriefingsDirectory",
    "BmsConfigDirectory",
    "BmsLogsDirectory",
    "BmsPatchDirectory",
    "BmsPictureDirectory",
    "ThrName",
    "ThrCampaigndir",
    "ThrTerraindir",
    "ThrArtdir",
    "ThrMoviedir",
    "ThrUisounddir",
    "ThrObjectdir",
    "Thr3ddatadir",
    "ThrMisctexdir",
    "ThrSounddir",
    "ThrTacrefdir",
    "ThrSplashdir",
    "ThrCockpitdir",
    "ThrSimdatadir",
    "ThrSubtitlesdir",
    "ThrTacrefpicsdir",
    "AcName",
    "AcNCTR",
    "ButtonsFile",
    "CockpitFile",
    "NavPoint",
    "ThrTerrdatadir",
];

fn f32_at(buf: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn i32_at(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn u32_at(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn display_block_at(buf: &[u8], offset: usize) -> DisplayLines {
    let mut lines = [[0u8; DED_LINE_WIDTH]; DED_LINE_COUNT];
    for (i, line) in lines.iter_mut().enumerate() {
        let start = offset + i * DED_LINE_WIDTH;
        line.copy_from_slice(&buf[start..start + DED_LINE_WIDTH]);
    }
    lines
}

fn ensure_len(region: &str, buf: &[u8], expected: usize) -> Result<()> {
    if buf.len() < expected {
        return Err(BridgeError::TelemetryUnavailable(format!(
            "{} too short: expected {} bytes, got {}",
            region,
            expected,
            buf.len()
        )));
    }
    Ok(())
}

/// Primary flight data record
#[derive(Debug, Clone, PartialEq)]
pub struct FlightData {
    /// Altitude in feet (positive up)
    pub altitude: f32,
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
    pub mach: f32,
    /// Indicated airspeed, knots
    pub kias: f32,
    pub internal_fuel: f32,
    pub external_fuel: f32,
    pub fuel_flow: f32,
    pub rpm: f32,
    pub gear_pos: f32,
    pub light_bits: u32,
    pub light_bits2: u32,
    pub light_bits3: u32,
    pub chaff_count: f32,
    pub flare_count: f32,
    pub current_heading: f32,
    pub hsi_bits: u32,
    /// DED lines, raw bytes
    pub ded_lines: DisplayLines,
    /// DED inverse-video mask
    pub ded_invert: DisplayLines,
    /// PFL lines, raw bytes
    pub pfl_lines: DisplayLines,
    /// PFL inverse-video mask
    pub pfl_invert: DisplayLines,
    pub ufc_tacan_chan: i32,
    pub aux_tacan_chan: i32,
    pub version_num: i32,
    pub main_power: i32,
}

impl FlightData {
    /// Decode the primary record
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::TelemetryUnavailable`] if `buf` is shorter than
    /// [`FLIGHT_DATA_SIZE`]
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        ensure_len(FLIGHT_DATA_AREA, buf, FLIGHT_DATA_SIZE)?;

        Ok(Self {
            altitude: -f32_at(buf, offsets::Z),
            pitch: f32_at(buf, offsets::PITCH),
            roll: f32_at(buf, offsets::ROLL),
            yaw: f32_at(buf, offsets::YAW),
            mach: f32_at(buf, offsets::MACH),
            kias: f32_at(buf, offsets::KIAS),
            internal_fuel: f32_at(buf, offsets::INTERNAL_FUEL),
            external_fuel: f32_at(buf, offsets::EXTERNAL_FUEL),
            fuel_flow: f32_at(buf, offsets::FUEL_FLOW),
            rpm: f32_at(buf, offsets::RPM),
            gear_pos: f32_at(buf, offsets::GEAR_POS),
            light_bits: u32_at(buf, offsets::LIGHT_BITS),
            light_bits2: u32_at(buf, offsets::LIGHT_BITS2),
            light_bits3: u32_at(buf, offsets::LIGHT_BITS3),
            chaff_count: f32_at(buf, offsets::CHAFF_COUNT),
            flare_count: f32_at(buf, offsets::FLARE_COUNT),
            current_heading: f32_at(buf, offsets::CURRENT_HEADING),
            hsi_bits: u32_at(buf, offsets::HSI_BITS),
            ded_lines: display_block_at(buf, offsets::DED_LINES),
            ded_invert: display_block_at(buf, offsets::DED_INVERT),
            pfl_lines: display_block_at(buf, offsets::PFL_LINES),
            pfl_invert: display_block_at(buf, offsets::PFL_INVERT),
            ufc_tacan_chan: i32_at(buf, offsets::UFC_TACAN_CHAN),
            aux_tacan_chan: i32_at(buf, offsets::AUX_TACAN_CHAN),
            version_num: i32_at(buf, offsets::VERSION_NUM),
            main_power: i32_at(buf, offsets::MAIN_POWER),
        })
    }
}

// The DED/PFL blocks sit between the scalar header and the RWR arrays.
const _: () = assert!(offsets::PFL_INVERT + DISPLAY_BLOCK_SIZE == offsets::UFC_TACAN_CHAN);

/// Secondary flight data record
#[derive(Debug, Clone, PartialEq)]
pub struct FlightData2 {
    pub nav_mode: u8,
    pub alt_cal_reading: i32,
    /// Seconds since midnight, simulation time
    pub current_time: i32,
    pub version_num: i32,
    pub latitude: f32,
    pub longitude: f32,
    /// Radar altitude, feet
    pub radar_altitude: f32,
    pub bingo_fuel: f32,
    pub bms_version: (i32, i32, i32),
    pub bms_build: i32,
}

impl FlightData2 {
    /// Decode the secondary record
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        use offsets::area2::*;
        ensure_len(FLIGHT_DATA2_AREA, buf, FLIGHT_DATA2_SIZE)?;

        Ok(Self {
            nav_mode: buf[NAV_MODE],
            alt_cal_reading: i32_at(buf, ALT_CAL_READING),
            current_time: i32_at(buf, CURRENT_TIME),
            version_num: i32_at(buf, VERSION_NUM),
            latitude: f32_at(buf, LATITUDE),
            longitude: f32_at(buf, LONGITUDE),
            radar_altitude: f32_at(buf, RALT),
            bingo_fuel: f32_at(buf, BINGO_FUEL),
            bms_version: (
                i32_at(buf, BMS_VERSION_MAJOR),
                i32_at(buf, BMS_VERSION_MINOR),
                i32_at(buf, BMS_VERSION_MICRO),
            ),
            bms_build: i32_at(buf, BMS_BUILD_NUMBER),
        })
    }
}

/// Event counter record
#[derive(Debug, Clone, PartialEq)]
pub struct IntellivibeData {
    pub aa_missile_fired: u8,
    pub ag_missile_fired: u8,
    pub bomb_dropped: u8,
    pub flare_dropped: u8,
    pub chaff_dropped: u8,
    pub bullets_fired: u8,
    pub collision_counter: i32,
    pub is_firing_gun: bool,
    pub is_end_flight: bool,
    pub is_ejecting: bool,
    pub in_3d: bool,
    pub is_paused: bool,
    pub is_frozen: bool,
    pub is_over_g: bool,
    pub is_on_ground: bool,
    pub is_exit_game: bool,
    pub g_force: f32,
    pub last_damage: i32,
    pub damage_force: f32,
    pub when_damage: u32,
}

impl IntellivibeData {
    /// Decode the event counter record
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        use offsets::intellivibe::*;
        ensure_len(INTELLIVIBE_AREA, buf, INTELLIVIBE_SIZE)?;

        Ok(Self {
            aa_missile_fired: buf[AA_MISSILE_FIRED],
            ag_missile_fired: buf[AG_MISSILE_FIRED],
            bomb_dropped: buf[BOMB_DROPPED],
            flare_dropped: buf[FLARE_DROPPED],
            chaff_dropped: buf[CHAFF_DROPPED],
            bullets_fired: buf[BULLETS_FIRED],
            collision_counter: i32_at(buf, COLLISION_COUNTER),
            is_firing_gun: buf[IS_FIRING_GUN] != 0,
            is_end_flight: buf[IS_END_FLIGHT] != 0,
            is_ejecting: buf[IS_EJECTING] != 0,
            in_3d: buf[IN_3D] != 0,
            is_paused: buf[IS_PAUSED] != 0,
            is_frozen: buf[IS_FROZEN] != 0,
            is_over_g: buf[IS_OVER_G] != 0,
            is_on_ground: buf[IS_ON_GROUND] != 0,
            is_exit_game: buf[IS_EXIT_GAME] != 0,
            g_force: f32_at(buf, G_FORCE),
            last_damage: i32_at(buf, LAST_DAMAGE),
            damage_force: f32_at(buf, DAMAGE_FORCE),
            when_damage: u32_at(buf, WHEN_DAMAGE),
        })
    }
}

/// String table: paths, aircraft name, key file, and friends
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StringArea {
    pub version: u32,
    entries: BTreeMap<&'static str, String>,
}

impl StringArea {
    /// Decode the string table
    ///
    /// Layout: `version, count, data_size` (u32 each) followed by one
    /// `(id: u32, length: u32, bytes[length + 1])` entry per identifier in
    /// [`STRING_IDS`]. The trailing byte of each entry is a NUL terminator.
    ///
    /// Entries whose id is outside [`STRING_IDS`] are skipped.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        ensure_len(STRING_AREA, buf, 12)?;
        let version = u32_at(buf, 0);
        let count = u32_at(buf, 4) as usize;

        let mut entries = BTreeMap::new();
        let mut pos = 12;
        for _ in 0..count.min(STRING_IDS.len()) {
            ensure_len(STRING_AREA, buf, pos + 8)?;
            let id = u32_at(buf, pos) as usize;
            let length = u32_at(buf, pos + 4) as usize;
            pos += 8;

            let end = pos
                .checked_add(length)
                .and_then(|n| n.checked_add(1))
                .ok_or_else(|| {
                    BridgeError::TelemetryUnavailable(format!(
                        "{} entry length {} out of range",
                        STRING_AREA, length
                    ))
                })?;
            ensure_len(STRING_AREA, buf, end)?;
            let text = String::from_utf8_lossy(&buf[pos..end - 1])
                .trim_end_matches('\0')
                .to_string();
            pos = end;

            if let Some(name) = STRING_IDS.get(id) {
                entries.insert(*name, text);
            }
        }

        Ok(Self { version, entries })
    }

    /// Look up an entry by identifier, e.g. `"AcName"`
    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Primary record bytes with the given DED lines and a few scalars set
    pub fn flight_data_bytes(ded: &[&[u8]]) -> Vec<u8> {
        let mut buf = vec![0u8; FLIGHT_DATA_SIZE];
        buf[offsets::KIAS..offsets::KIAS + 4].copy_from_slice(&350.0f32.to_le_bytes());
        buf[offsets::Z..offsets::Z + 4].copy_from_slice(&(-12_000.0f32).to_le_bytes());
        buf[offsets::VERSION_NUM..offsets::VERSION_NUM + 4].copy_from_slice(&119i32.to_le_bytes());
        buf[offsets::MAIN_POWER..offsets::MAIN_POWER + 4].copy_from_slice(&2i32.to_le_bytes());
        for (i, line) in ded.iter().enumerate().take(DED_LINE_COUNT) {
            let start = offsets::DED_LINES + i * DED_LINE_WIDTH;
            let n = line.len().min(DED_LINE_WIDTH);
            buf[start..start + n].copy_from_slice(&line[..n]);
        }
        buf
    }

    /// String table bytes holding `(id, text)` entries
    pub fn string_area_bytes(entries: &[(u32, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&2u32.to_le_bytes());
        buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        for (id, text) in entries {
            buf.extend_from_slice(&id.to_le_bytes());
            buf.extend_from_slice(&(text.len() as u32).to_le_bytes());
            buf.extend_from_slice(text.as_bytes());
            buf.push(0);
        }
        buf
    }
}
