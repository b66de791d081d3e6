use chrono::{DateTime, Datelike, FixedOffset, Timelike, Weekday};
use serde::{Deserialize, Serialize};

/// One controllable outlet, identified by its room code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    Pv104,
    Pv107,
    Pv108,
    Pv110,
    Pv119,
    Pv120,
    Pv147,
    Pv153,
}

pub const DEVICE_COUNT: usize = 8;

impl Device {
    pub const ALL: [Device; DEVICE_COUNT] = [
        Self::Pv104,
        Self::Pv107,
        Self::Pv108,
        Self::Pv110,
        Self::Pv119,
        Self::Pv120,
        Self::Pv147,
        Self::Pv153,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::Pv104 => 0,
            Self::Pv107 => 1,
            Self::Pv108 => 2,
            Self::Pv110 => 3,
            Self::Pv119 => 4,
            Self::Pv120 => 5,
            Self::Pv147 => 6,
            Self::Pv153 => 7,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Pv104 => "104",
            Self::Pv107 => "107",
            Self::Pv108 => "108",
            Self::Pv110 => "110",
            Self::Pv119 => "119",
            Self::Pv120 => "120",
            Self::Pv147 => "147",
            Self::Pv153 => "153",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pv104 => "pv104",
            Self::Pv107 => "pv107",
            Self::Pv108 => "pv108",
            Self::Pv110 => "pv110",
            Self::Pv119 => "pv119",
            Self::Pv120 => "pv120",
            Self::Pv147 => "pv147",
            Self::Pv153 => "pv153",
        }
    }
}

/// Scheduling days. The schedule has no weekend entries at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Day {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
}

pub const DAY_COUNT: usize = 5;

impl Day {
    pub const ALL: [Day; DAY_COUNT] = [Self::Mon, Self::Tue, Self::Wed, Self::Thu, Self::Fri];

    pub fn index(self) -> usize {
        match self {
            Self::Mon => 0,
            Self::Tue => 1,
            Self::Wed => 2,
            Self::Thu => 3,
            Self::Fri => 4,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Saturday and Sunday have no schedule day.
    pub fn from_chrono(weekday: Weekday) -> Option<Self> {
        match weekday {
            Weekday::Mon => Some(Self::Mon),
            Weekday::Tue => Some(Self::Tue),
            Weekday::Wed => Some(Self::Wed),
            Weekday::Thu => Some(Self::Thu),
            Weekday::Fri => Some(Self::Fri),
            Weekday::Sat | Weekday::Sun => None,
        }
    }

    /// Wire token used in form field names ("tues" and "thurs", not ISO).
    pub fn token(self) -> &'static str {
        match self {
            Self::Mon => "mon",
            Self::Tue => "tues",
            Self::Wed => "wed",
            Self::Thu => "thurs",
            Self::Fri => "fri",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.token() == token)
    }
}

/// One of the ten one-hour scheduling windows between 8:00 and 18:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HourBlock {
    H8to9,
    H9to10,
    H10to11,
    H11to12,
    H12to1,
    H1to2,
    H2to3,
    H3to4,
    H4to5,
    H5to6,
}

pub const HOUR_BLOCK_COUNT: usize = 10;

impl HourBlock {
    pub const ALL: [HourBlock; HOUR_BLOCK_COUNT] = [
        Self::H8to9,
        Self::H9to10,
        Self::H10to11,
        Self::H11to12,
        Self::H12to1,
        Self::H1to2,
        Self::H2to3,
        Self::H3to4,
        Self::H4to5,
        Self::H5to6,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// 24h starting hour of the block (8..=17).
    pub fn start_hour(self) -> u32 {
        8 + self.index() as u32
    }

    /// Maps a 24h wall-clock hour into its block; None outside 8:00-18:00.
    pub fn from_hour(hour: u32) -> Option<Self> {
        if (8..18).contains(&hour) {
            Self::from_index(hour as usize - 8)
        } else {
            None
        }
    }

    /// Wire token used in form field names ("8to9" .. "5to6").
    pub fn token(self) -> &'static str {
        match self {
            Self::H8to9 => "8to9",
            Self::H9to10 => "9to10",
            Self::H10to11 => "10to11",
            Self::H11to12 => "11to12",
            Self::H12to1 => "12to1",
            Self::H1to2 => "1to2",
            Self::H2to3 => "2to3",
            Self::H3to4 => "3to4",
            Self::H4to5 => "4to5",
            Self::H5to6 => "5to6",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.token() == token)
    }
}

/// A schedulable moment: a weekday within covered hours. Weekends and
/// out-of-window times have no slot, which the resolver treats as all-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
    pub day: Day,
    pub block: HourBlock,
}

impl TimeSlot {
    pub fn new(day: Day, block: HourBlock) -> Self {
        Self { day, block }
    }

    pub fn from_datetime(now: DateTime<FixedOffset>) -> Option<Self> {
        let day = Day::from_chrono(now.weekday())?;
        let block = HourBlock::from_hour(now.hour())?;
        Some(Self { day, block })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn fixed_time(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::west_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 1, day, hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn device_code_round_trips() {
        for device in Device::ALL {
            assert_eq!(Device::from_code(device.code()), Some(device));
            assert_eq!(Device::from_index(device.index()), Some(device));
        }
        assert_eq!(Device::from_code("105"), None);
    }

    #[test]
    fn day_tokens_match_wire_format() {
        let tokens: Vec<&str> = Day::ALL.iter().map(|d| d.token()).collect();
        assert_eq!(tokens, vec!["mon", "tues", "wed", "thurs", "fri"]);
        assert_eq!(Day::from_token("thurs"), Some(Day::Thu));
        assert_eq!(Day::from_token("thu"), None);
    }

    #[test]
    fn weekend_has_no_day() {
        assert_eq!(Day::from_chrono(Weekday::Sat), None);
        assert_eq!(Day::from_chrono(Weekday::Sun), None);
        assert_eq!(Day::from_chrono(Weekday::Wed), Some(Day::Wed));
    }

    #[test]
    fn hour_block_covers_8_to_18() {
        assert_eq!(HourBlock::from_hour(7), None);
        assert_eq!(HourBlock::from_hour(8), Some(HourBlock::H8to9));
        assert_eq!(HourBlock::from_hour(12), Some(HourBlock::H12to1));
        assert_eq!(HourBlock::from_hour(17), Some(HourBlock::H5to6));
        assert_eq!(HourBlock::from_hour(18), None);
        for block in HourBlock::ALL {
            assert_eq!(HourBlock::from_hour(block.start_hour()), Some(block));
        }
    }

    #[test]
    fn slot_from_datetime() {
        // Jan 5, 2026 is a Monday.
        let slot = TimeSlot::from_datetime(fixed_time(5, 8, 15)).unwrap();
        assert_eq!(slot, TimeSlot::new(Day::Mon, HourBlock::H8to9));

        // Saturday Jan 10 has no slot even inside covered hours.
        assert_eq!(TimeSlot::from_datetime(fixed_time(10, 10, 0)), None);

        // Monday at 18:00 is past the last block.
        assert_eq!(TimeSlot::from_datetime(fixed_time(5, 18, 0)), None);
    }
}
