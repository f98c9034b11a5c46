//! Packed FAT date/time fields and the clock used to stamp entries.
//!
//! A FAT date is `(year - 1980) << 9 | month << 5 | day`, a time is
//! `hour << 11 | minute << 5 | second / 2`, and the creation "tenths" byte
//! carries the odd second plus hundredths (0..=199). Values are treated as
//! UTC.

use spin::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp {
    pub secs: i64,
    pub nanos: u32,
}

impl Timestamp {
    pub const fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }
}

/// 1980-01-01 00:00:00 UTC.
pub const FAT_EPOCH_SECS: i64 = 315_532_800;
const FAT_MIN_YEAR: u64 = 1980;
const FAT_MAX_YEAR: u64 = 2107;

const MONTH_DAYS: [u64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

static CLOCK: Mutex<fn() -> Timestamp> = Mutex::new(default_clock);

#[cfg(feature = "std")]
fn default_clock() -> Timestamp {
    use std::time::{SystemTime, UNIX_EPOCH};
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => Timestamp::new(d.as_secs() as i64, d.subsec_nanos()),
        Err(_) => Timestamp::new(FAT_EPOCH_SECS, 0),
    }
}

#[cfg(not(feature = "std"))]
fn default_clock() -> Timestamp {
    Timestamp::new(FAT_EPOCH_SECS, 0)
}

/// Replace the process-wide clock. Hosts without a wall clock install one
/// here before mounting.
pub fn set_clock(source: fn() -> Timestamp) {
    *CLOCK.lock() = source;
}

pub fn now() -> Timestamp {
    let source = *CLOCK.lock();
    source()
}

fn is_leap_year(year: u64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

fn days_in_year(year: u64) -> u64 {
    if is_leap_year(year) { 366 } else { 365 }
}

fn days_in_month(year: u64, month: u64) -> u64 {
    let mut days = MONTH_DAYS[(month - 1) as usize];
    if month == 2 && is_leap_year(year) {
        days += 1;
    }
    days
}

fn ymd_hms_to_secs(year: u64, month: u64, day: u64, hour: u64, minute: u64, second: u64) -> u64 {
    let mut days = 0u64;
    for y in 1970..year {
        days += days_in_year(y);
    }
    for m in 1..month {
        days += days_in_month(year, m);
    }
    days += day - 1;
    days * 86400 + hour * 3600 + minute * 60 + second
}

fn secs_to_ymd_hms(mut secs: u64) -> (u64, u64, u64, u64, u64, u64) {
    let mut year = 1970u64;
    let mut days = secs / 86400;
    secs %= 86400;

    loop {
        let dy = days_in_year(year);
        if days >= dy {
            days -= dy;
            year += 1;
        } else {
            break;
        }
    }

    let mut month = 1u64;
    loop {
        let dm = days_in_month(year, month);
        if days >= dm {
            days -= dm;
            month += 1;
        } else {
            break;
        }
    }

    (year, month, days + 1, secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn fat_max_secs() -> i64 {
    ymd_hms_to_secs(FAT_MAX_YEAR, 12, 31, 23, 59, 58) as i64
}

/// Pack a timestamp into `(date, time, tenths)`. Out-of-range instants are
/// clamped to the representable 1980..=2107 window.
pub fn encode(ts: Timestamp) -> (u16, u16, u8) {
    let (secs, nanos) = if ts.secs < FAT_EPOCH_SECS {
        (FAT_EPOCH_SECS, 0)
    } else if ts.secs > fat_max_secs() {
        (fat_max_secs(), 0)
    } else {
        (ts.secs, ts.nanos.min(999_999_999))
    };

    let (year, month, day, hour, minute, second) = secs_to_ymd_hms(secs as u64);
    let date = (((year - FAT_MIN_YEAR) as u16) << 9) | ((month as u16) << 5) | day as u16;
    let time = ((hour as u16) << 11) | ((minute as u16) << 5) | (second as u16 / 2);
    let tenths = ((second % 2) * 100) as u8 + (nanos / 10_000_000) as u8;
    (date, time, tenths)
}

pub fn decode(date: u16, time: u16, tenths: u8) -> Timestamp {
    let year = FAT_MIN_YEAR + (date >> 9) as u64;
    let month = (((date >> 5) & 0x0F) as u64).clamp(1, 12);
    let day = ((date & 0x1F) as u64).clamp(1, days_in_month(year, month));
    let hour = ((time >> 11) as u64).min(23);
    let minute = (((time >> 5) & 0x3F) as u64).min(59);
    let second = ((time & 0x1F) as u64 * 2).min(58);
    let tenths = tenths.min(199) as u64;

    let secs = ymd_hms_to_secs(year, month, day, hour, minute, second) + tenths / 100;
    Timestamp::new(secs as i64, ((tenths % 100) * 10_000_000) as u32)
}
