use thiserror::Error;

use crate::types::{Day, Device, HourBlock, DAY_COUNT, DEVICE_COUNT, HOUR_BLOCK_COUNT};

/// Serialized grid size: 8 devices x 5 days x 10 hour blocks, one byte per cell.
pub const GRID_BYTE_LEN: usize = DEVICE_COUNT * DAY_COUNT * HOUR_BLOCK_COUNT;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldParseError {
    #[error("field name does not match pv<code>-<day>-<block>: {0:?}")]
    Malformed(String),
    #[error("unknown device code in field name: {0:?}")]
    UnknownDevice(String),
    #[error("unknown day token in field name: {0:?}")]
    UnknownDay(String),
    #[error("unknown hour-block token in field name: {0:?}")]
    UnknownBlock(String),
}

/// Parses a checkbox field name of the form `pv<code>-<day3>-<from>to<to>`
/// into its typed cell address. Case-sensitive, ASCII only.
pub fn parse_field(name: &str) -> Result<(Device, Day, HourBlock), FieldParseError> {
    let rest = name
        .strip_prefix("pv")
        .ok_or_else(|| FieldParseError::Malformed(name.to_string()))?;

    let mut parts = rest.splitn(3, '-');
    let (Some(code), Some(day), Some(block)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(FieldParseError::Malformed(name.to_string()));
    };

    let device =
        Device::from_code(code).ok_or_else(|| FieldParseError::UnknownDevice(code.to_string()))?;
    let day = Day::from_token(day).ok_or_else(|| FieldParseError::UnknownDay(day.to_string()))?;
    let block = HourBlock::from_token(block)
        .ok_or_else(|| FieldParseError::UnknownBlock(block.to_string()))?;

    Ok((device, day, block))
}

/// Outcome of building a grid from a submitted field set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStats {
    /// Fields that addressed a cell and were applied.
    pub applied: usize,
    /// Fields that did not parse and were ignored.
    pub skipped: usize,
}

/// The complete weekly schedule: every (device, day, hour-block) cell is
/// always defined. Absent cells do not exist; a fresh grid is all-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    cells: [[[bool; HOUR_BLOCK_COUNT]; DAY_COUNT]; DEVICE_COUNT],
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            cells: [[[false; HOUR_BLOCK_COUNT]; DAY_COUNT]; DEVICE_COUNT],
        }
    }
}

impl Grid {
    pub fn get(&self, device: Device, day: Day, block: HourBlock) -> bool {
        self.cells[device.index()][day.index()][block.index()]
    }

    pub fn set(&mut self, device: Device, day: Day, block: HourBlock, on: bool) {
        self.cells[device.index()][day.index()][block.index()] = on;
    }

    pub fn cells_on(&self) -> usize {
        self.cells
            .iter()
            .flatten()
            .flatten()
            .filter(|cell| **cell)
            .count()
    }

    /// Builds a candidate grid from a submitted checkbox field set.
    ///
    /// Checkbox semantics: the field set names exactly the cells that should
    /// become on; every other cell is off. This is a whole-grid replace, so
    /// unchecked boxes never survive from a previous submission. Unparseable
    /// names are counted and skipped, never fatal.
    pub fn from_fields<'a, I>(fields: I) -> (Self, UpdateStats)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut grid = Self::default();
        let mut stats = UpdateStats::default();

        for name in fields {
            match parse_field(name) {
                Ok((device, day, block)) => {
                    grid.set(device, day, block, true);
                    stats.applied += 1;
                }
                Err(_) => stats.skipped += 1,
            }
        }

        (grid, stats)
    }

    /// Fixed-layout record: device-major, then day, then hour-block, one
    /// byte per cell (0 or 1). The ordering is part of the on-disk format.
    pub fn to_bytes(&self) -> [u8; GRID_BYTE_LEN] {
        let mut bytes = [0u8; GRID_BYTE_LEN];
        let mut i = 0;
        for device in &self.cells {
            for day in device {
                for cell in day {
                    bytes[i] = u8::from(*cell);
                    i += 1;
                }
            }
        }
        bytes
    }

    /// Inverse of [`to_bytes`]. Any length or value mismatch yields None so
    /// the caller can fall back to the all-off default.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != GRID_BYTE_LEN {
            return None;
        }

        let mut grid = Self::default();
        let mut i = 0;
        for device in &mut grid.cells {
            for day in device.iter_mut() {
                for cell in day.iter_mut() {
                    *cell = match bytes[i] {
                        0 => false,
                        1 => true,
                        _ => return None,
                    };
                    i += 1;
                }
            }
        }
        Some(grid)
    }
}
