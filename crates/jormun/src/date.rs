//! The Date value: millisecond epoch storage, three-format parsing, and
//! the ISO/HTTP/JS formatters.
//!
//! Internal state is one `f64` of milliseconds since the Unix epoch, NaN
//! for "Invalid Date". String parsing tries three formats in order — ISO
//! 8601 (with extended six-digit years), RFC 2822, and the `Date.toString`
//! output format — each as a linear scan with an explicit cursor; a single
//! miss reverts the whole parse to NaN, with no best-effort recovery.
//!
//! Epoch arithmetic uses Gauss' formula for days-since-epoch (handling BCE
//! years) on the way in and the standard civil-from-days decomposition on
//! the way out. The system clock and the local zone offset come from
//! `chrono`; everything else is integer math here.

use chrono::{Local, Offset, TimeZone};

use crate::{
    error::{JsError, JsResult, Lookup},
    object::{Property, PropertyKey, PropertyMap},
    value::Value,
    vm::{Vm, insert_shared},
};

/// Epoch range limit: ±8.64e15 ms (±100 million days).
const MAX_TIME: f64 = 8.64e15;

const MILLIS_PER_DAY: i64 = 86_400_000;

static WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
static MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

// ----- epoch arithmetic -----------------------------------------------

fn floor_div(a: i64, b: i64) -> i64 {
    a.div_euclid(b)
}

/// TimeClip: out-of-range times are invalid, in-range truncate toward
/// zero with -0 normalized away.
fn timeclip(time: f64) -> f64 {
    if !(-MAX_TIME..=MAX_TIME).contains(&time) {
        return f64::NAN;
    }
    time.trunc() + 0.0
}

fn make_time(hours: i64, minutes: i64, seconds: i64, millis: i64) -> i64 {
    ((hours * 60 + minutes) * 60 + seconds) * 1000 + millis
}

fn days_in_year(year: i64) -> i64 {
    365 + i64::from(year % 4 == 0) - i64::from(year % 100 == 0) + i64::from(year % 400 == 0)
}

fn days_from_year(year: i64) -> i64 {
    365 * (year - 1970) + floor_div(year - 1969, 4) - floor_div(year - 1901, 100) + floor_div(year - 1601, 400)
}

/// Days since the epoch for a calendar date; `month` is 0-based and may be
/// out of range (it normalizes into the year).
fn make_day(year: i64, month: i64, date: i64) -> i64 {
    static MONTH_DAYS: [i64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

    let normalized_month = month.rem_euclid(12);
    let year = year + (month - normalized_month) / 12;

    let mut days = days_from_year(year);
    for (index, &month_days) in MONTH_DAYS.iter().take(normalized_month as usize).enumerate() {
        days += month_days;
        if index == 1 {
            // Leap day.
            days += days_in_year(year) - 365;
        }
    }
    days + date - 1
}

/// A decomposed time, months 0-based, weekday 0 = Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tm {
    year: i64,
    month: i64,
    mday: i64,
    hour: i64,
    min: i64,
    sec: i64,
    ms: i64,
    wday: i64,
}

impl Default for Tm {
    fn default() -> Self {
        Self {
            year: 1970,
            month: 0,
            mday: 1,
            hour: 0,
            min: 0,
            sec: 0,
            ms: 0,
            wday: 4,
        }
    }
}

/// Civil-from-days decomposition of an epoch in milliseconds.
fn destruct(time: f64) -> Tm {
    let millis = time as i64;
    let days = floor_div(millis, MILLIS_PER_DAY);
    let mut rem = millis.rem_euclid(MILLIS_PER_DAY);

    let ms = rem % 1000;
    rem /= 1000;
    let sec = rem % 60;
    rem /= 60;
    let min = rem % 60;
    let hour = rem / 60;

    // Shift the epoch to 0000-03-01 so leap days land at era ends.
    let z = days + 719_468;
    let era = floor_div(z, 146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year_march = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let mday = doy - (153 * mp + 2) / 5 + 1;
    let month_march = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month_march <= 2 { year_march + 1 } else { year_march };

    Tm {
        year,
        month: month_march - 1,
        mday,
        hour,
        min,
        sec,
        ms,
        wday: (days + 4).rem_euclid(7),
    }
}

/// Seconds since the epoch for a civil UTC time. Proleptic Gregorian with
/// floor division throughout, so BCE years need no special casing.
fn timegm(tm: &Tm) -> i64 {
    make_day(tm.year, tm.month, tm.mday) * 86_400 + tm.hour * 3_600 + tm.min * 60 + tm.sec
}

// ----- system clock and local zone ------------------------------------

fn now_ms() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64
}

/// Seconds east of UTC for the local zone at a UTC instant; zero when the
/// instant is outside what the zone database can answer.
fn east_offset_seconds(utc_ms: f64) -> i64 {
    if !utc_ms.is_finite() {
        return 0;
    }
    let Some(clamped) = chrono::DateTime::from_timestamp_millis(utc_ms as i64) else {
        return 0;
    };
    i64::from(Local.offset_from_utc_datetime(&clamped.naive_utc()).fix().local_minus_utc())
}

/// Minutes west of UTC, the `getTimezoneOffset` convention.
fn tz_offset_minutes(utc_ms: f64) -> i64 {
    -east_offset_seconds(utc_ms) / 60
}

fn local_from_utc(utc_ms: f64) -> f64 {
    utc_ms + (east_offset_seconds(utc_ms) * 1000) as f64
}

/// Converts a local wall-clock reading to UTC, estimating the offset at
/// the reading itself (the usual single-pass approximation).
fn utc_from_local(local_ms: f64) -> f64 {
    local_ms - (east_offset_seconds(local_ms) * 1000) as f64
}

// ----- construction ---------------------------------------------------

/// Constructor-argument semantics shared by `new Date(…)` and the
/// embedding API.
pub(crate) fn time_from_args(vm: &mut Vm, args: &[Value]) -> JsResult<f64> {
    match args {
        [] => Ok(now_ms()),
        [single] => {
            if let Some(time) = single.as_date_time(&vm.heap) {
                return Ok(time);
            }
            if single.is_string(&vm.heap) {
                let text = single.display_string(&vm.heap)?;
                return Ok(string_parse(&text));
            }
            let number = vm.to_number(single)?;
            Ok(timeclip(number))
        }
        fields => {
            let mut values = [0.0f64; 7];
            for (slot, value) in values.iter_mut().zip(fields.iter()) {
                *slot = vm.to_number(value)?;
                if !slot.is_finite() {
                    return Ok(f64::NAN);
                }
            }
            // Defaults: day 1, everything after it 0.
            if fields.len() < 3 {
                values[2] = 1.0;
            }
            let mut year = values[0].trunc() as i64;
            if (0..=99).contains(&year) {
                year += 1900;
            }
            let days = make_day(year, values[1].trunc() as i64, values[2].trunc() as i64);
            let time = make_time(
                values[3].trunc() as i64,
                values[4].trunc() as i64,
                values[5].trunc() as i64,
                values[6].trunc() as i64,
            );
            let local = (days * MILLIS_PER_DAY + time) as f64;
            Ok(timeclip(utc_from_local(local)))
        }
    }
}

/// `Date.now()`.
pub(crate) fn date_now() -> f64 {
    now_ms()
}

/// `Date.UTC(year, month, …)`: like the numeric constructor but without
/// the local-zone adjustment.
pub(crate) fn date_utc(vm: &mut Vm, args: &[Value]) -> JsResult<f64> {
    if args.is_empty() {
        return Ok(f64::NAN);
    }
    let mut values = [0.0f64; 7];
    for (slot, value) in values.iter_mut().zip(args.iter()) {
        *slot = vm.to_number(value)?;
        if !slot.is_finite() {
            return Ok(f64::NAN);
        }
    }
    if args.len() < 3 {
        values[2] = 1.0;
    }
    let mut year = values[0].trunc() as i64;
    if (0..=99).contains(&year) {
        year += 1900;
    }
    let days = make_day(year, values[1].trunc() as i64, values[2].trunc() as i64);
    let time = make_time(
        values[3].trunc() as i64,
        values[4].trunc() as i64,
        values[5].trunc() as i64,
        values[6].trunc() as i64,
    );
    Ok(timeclip((days * MILLIS_PER_DAY + time) as f64))
}

// ----- string parsing -------------------------------------------------

/// Cursor over the bytes of a date string.
struct Scan<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scan<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn byte(&self) -> u8 {
        self.bytes.get(self.pos).copied().unwrap_or(0)
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.byte() == byte {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Parses exactly `digits` decimal digits; the cursor does not move on
    /// failure, so format dispatch can fall through to the next attempt.
    fn number(&mut self, digits: usize) -> Option<i64> {
        let start = self.pos;
        let mut value = 0i64;
        for _ in 0..digits {
            let byte = self.byte();
            if !byte.is_ascii_digit() {
                self.pos = start;
                return None;
            }
            value = value * 10 + i64::from(byte - b'0');
            self.pos += 1;
        }
        Some(value)
    }

    /// At least one space.
    fn spaces(&mut self) -> bool {
        if self.byte() != b' ' {
            return false;
        }
        while self.byte() == b' ' {
            self.pos += 1;
        }
        true
    }

    /// A three-letter month name, 0-based.
    fn month_name(&mut self) -> Option<i64> {
        if self.pos + 3 > self.bytes.len() {
            return None;
        }
        let name = &self.bytes[self.pos..self.pos + 3];
        let index = MONTHS.iter().position(|m| m.as_bytes() == name)?;
        self.pos += 3;
        Some(index as i64)
    }

    /// `HH:MM[:SS]`, fields range-checked.
    fn time(&mut self, tm: &mut Tm) -> bool {
        let Some(hour) = self.number(2) else {
            return false;
        };
        if hour > 23 || !self.eat(b':') {
            return false;
        }
        let Some(min) = self.number(2) else {
            return false;
        };
        if min > 59 {
            return false;
        }
        tm.hour = hour;
        tm.min = min;
        if self.eat(b':') {
            let Some(sec) = self.number(2) else {
                return false;
            };
            if sec > 59 {
                return false;
            }
            tm.sec = sec;
        }
        true
    }

    /// `±HHMM` or `±HH:MM`, in minutes east; `None` on malformed input.
    fn gmt_offset(&mut self) -> Option<i64> {
        let sign = match self.byte() {
            b'+' => 1,
            b'-' => -1,
            _ => return None,
        };
        self.pos += 1;
        let hours = self.number(2)?;
        self.eat(b':');
        let minutes = self.number(2)?;
        if minutes > 59 {
            return None;
        }
        Some(sign * (hours * 60 + minutes))
    }

    /// Skips a weekday word and an optional comma.
    fn skip_weekday(&mut self) -> bool {
        let start = self.pos;
        while self.byte().is_ascii_alphabetic() {
            self.pos += 1;
        }
        if self.pos == start {
            return false;
        }
        self.eat(b',');
        true
    }
}

/// Parses the three accepted formats in order; anything else is NaN.
pub(crate) fn string_parse(text: &str) -> f64 {
    let mut scan = Scan::new(text.trim());
    if scan.at_end() {
        return f64::NAN;
    }

    let negative = scan.byte() == b'-';
    let signed = scan.byte() == b'+' || negative;
    if signed {
        scan.pos += 1;
    }

    // ISO 8601 first: it is the only format opening with digits.
    if let Some(year) = scan.number(4) {
        return parse_iso(&mut scan, year, signed, negative);
    }
    if signed {
        return f64::NAN;
    }

    // Either RFC 2822 ("Mon, 28 Sep 1970 …" / "28 Sep 1970 …") or the
    // Date.toString format ("Mon Sep 28 1970 …"). A leading weekday word
    // is skipped once.
    let mut allow_weekday = true;
    loop {
        let rewind = scan.pos;
        if let Some(mday) = scan.number(2) {
            return parse_rfc2822(&mut scan, mday);
        }
        scan.pos = rewind;
        if let Some(month) = scan.month_name() {
            return parse_js_format(&mut scan, month);
        }
        if !allow_weekday || !scan.skip_weekday() || !scan.spaces() {
            return f64::NAN;
        }
        allow_weekday = false;
    }
}

/// `YYYY[-MM[-DD[THH:MM[:SS[.sss]][Z|±HH:MM]]]]` and the `±YYYYYY`
/// extended-year form. Without a zone suffix the time is local.
fn parse_iso(scan: &mut Scan<'_>, year: i64, signed: bool, negative: bool) -> f64 {
    let mut tm = Tm { year, ..Tm::default() };

    if signed {
        // Extended year: two more digits make six.
        let Some(extension) = scan.number(2) else {
            return f64::NAN;
        };
        tm.year = tm.year * 100 + extension;
        if negative {
            if tm.year == 0 {
                return f64::NAN;
            }
            tm.year = -tm.year;
        }
    }

    let mut utc_offset_min: Option<i64> = Some(0);
    let mut ms = 0i64;
    'fields: {
        if scan.at_end() {
            break 'fields;
        }
        if !scan.eat(b'-') {
            return f64::NAN;
        }
        match scan.number(2) {
            Some(month) if (1..=12).contains(&month) => tm.month = month - 1,
            _ => return f64::NAN,
        }
        if scan.at_end() {
            break 'fields;
        }
        if !scan.eat(b'-') {
            return f64::NAN;
        }
        match scan.number(2) {
            Some(mday) if (1..=31).contains(&mday) => tm.mday = mday,
            _ => return f64::NAN,
        }
        if scan.at_end() {
            break 'fields;
        }
        if !scan.eat(b'T') {
            return f64::NAN;
        }
        // A time without an explicit zone is local time.
        utc_offset_min = None;
        if !scan.time(&mut tm) {
            return f64::NAN;
        }
        if scan.eat(b'.') {
            // One to three millisecond digits; extra digits are ignored.
            let digits_start = scan.pos;
            while scan.byte().is_ascii_digit() {
                scan.pos += 1;
            }
            let count = scan.pos - digits_start;
            if count == 0 {
                return f64::NAN;
            }
            let mut value = 0i64;
            for &byte in &scan.bytes[digits_start..digits_start + count.min(3)] {
                value = value * 10 + i64::from(byte - b'0');
            }
            ms = match count.min(3) {
                1 => value * 100,
                2 => value * 10,
                _ => value,
            };
        }
        if scan.eat(b'Z') {
            utc_offset_min = Some(0);
        } else if !scan.at_end() {
            match scan.gmt_offset() {
                Some(offset) => utc_offset_min = Some(offset),
                None => return f64::NAN,
            }
        }
    }
    if !scan.at_end() {
        return f64::NAN;
    }

    let days = make_day(tm.year, tm.month, tm.mday);
    let time = make_time(tm.hour, tm.min, tm.sec, ms);
    let stamp = (days * MILLIS_PER_DAY + time) as f64;
    match utc_offset_min {
        Some(offset) => timeclip(stamp - (offset * 60_000) as f64),
        None => timeclip(utc_from_local(stamp)),
    }
}

/// `DD Mon YYYY [HH:MM:SS [GMT|UTC|±HHMM]]` — the day number (and an
/// optional weekday) has already been consumed by the dispatcher.
fn parse_rfc2822(scan: &mut Scan<'_>, mday: i64) -> f64 {
    let mut tm = Tm { mday, ..Tm::default() };

    if !scan.spaces() {
        return f64::NAN;
    }
    match scan.month_name() {
        Some(month) => tm.month = month,
        None => return f64::NAN,
    }
    if !scan.spaces() {
        return f64::NAN;
    }
    match scan.number(4) {
        Some(year) => tm.year = year,
        None => return f64::NAN,
    }
    if scan.at_end() {
        return (timegm(&tm) * 1000) as f64;
    }
    if !scan.spaces() {
        return f64::NAN;
    }
    if scan.at_end() {
        return (timegm(&tm) * 1000) as f64;
    }
    if !scan.time(&mut tm) {
        return f64::NAN;
    }
    if scan.at_end() {
        return (timegm(&tm) * 1000) as f64;
    }
    if !scan.spaces() || scan.at_end() {
        return f64::NAN;
    }

    let offset_min = if scan.bytes[scan.pos..].starts_with(b"GMT") || scan.bytes[scan.pos..].starts_with(b"UTC") {
        scan.pos += 3;
        0
    } else {
        match scan.gmt_offset() {
            Some(offset) => offset,
            None => return f64::NAN,
        }
    };
    if !scan.at_end() {
        return f64::NAN;
    }
    ((timegm(&tm) - offset_min * 60) * 1000) as f64
}

/// `Mon DD YYYY [HH:MM:SS [GMT±HHMM]]` — the month name has already been
/// consumed.
fn parse_js_format(scan: &mut Scan<'_>, month: i64) -> f64 {
    let mut tm = Tm { month, ..Tm::default() };

    if !scan.spaces() {
        return f64::NAN;
    }
    match scan.number(2) {
        Some(mday) => tm.mday = mday,
        None => return f64::NAN,
    }
    if !scan.spaces() {
        return f64::NAN;
    }
    match scan.number(4) {
        Some(year) => tm.year = year,
        None => return f64::NAN,
    }
    if scan.at_end() {
        return (timegm(&tm) * 1000) as f64;
    }
    if !scan.spaces() {
        return f64::NAN;
    }
    if scan.at_end() {
        return (timegm(&tm) * 1000) as f64;
    }
    if !scan.time(&mut tm) {
        return f64::NAN;
    }
    if scan.at_end() {
        return (timegm(&tm) * 1000) as f64;
    }
    if !scan.spaces() {
        return f64::NAN;
    }
    if !scan.bytes[scan.pos..].starts_with(b"GMT") {
        return f64::NAN;
    }
    scan.pos += 3;
    let offset_min = match scan.gmt_offset() {
        Some(offset) => offset,
        None => return f64::NAN,
    };
    if !scan.at_end() {
        return f64::NAN;
    }
    ((timegm(&tm) - offset_min * 60) * 1000) as f64
}

// ----- formatting -----------------------------------------------------

/// `YYYY-MM-DDTHH:MM:SS.sssZ`, with a signed six-digit year outside
/// 0..=9999. NaN is a RangeError here (alone among the formatters).
pub(crate) fn to_iso_string(time: f64) -> JsResult<String> {
    if time.is_nan() {
        return Err(JsError::range_error("Invalid Date"));
    }
    let tm = destruct(time);
    let year = if (0..=9999).contains(&tm.year) {
        format!("{:04}", tm.year)
    } else {
        format!("{}{:06}", if tm.year < 0 { '-' } else { '+' }, tm.year.abs())
    };
    Ok(format!(
        "{year}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        tm.month + 1,
        tm.mday,
        tm.hour,
        tm.min,
        tm.sec,
        tm.ms
    ))
}

/// `Wkd, DD Mon YYYY HH:MM:SS GMT`.
fn to_utc_string(time: f64) -> String {
    if time.is_nan() {
        return "Invalid Date".to_string();
    }
    let tm = destruct(time);
    format!(
        "{}, {:02} {} {:04} {:02}:{:02}:{:02} GMT",
        WEEKDAYS[tm.wday as usize], tm.mday, MONTHS[tm.month as usize], tm.year, tm.hour, tm.min, tm.sec
    )
}

/// The parts of the local `Date.toString` format.
#[derive(Debug, Clone, Copy)]
enum LocalFormat {
    Full,
    DateOnly,
    TimeOnly,
}

/// `Wkd Mon DD YYYY HH:MM:SS GMT±HHMM` in the local zone.
fn to_local_string(time: f64, format: LocalFormat) -> String {
    if time.is_nan() {
        return "Invalid Date".to_string();
    }
    let east = east_offset_seconds(time);
    let tm = destruct(time + (east * 1000) as f64);
    let date = format!(
        "{} {} {:02} {:04}",
        WEEKDAYS[tm.wday as usize], MONTHS[tm.month as usize], tm.mday, tm.year
    );
    let clock = format!(
        "{:02}:{:02}:{:02} GMT{}{:02}{:02}",
        tm.hour,
        tm.min,
        tm.sec,
        if east < 0 { '-' } else { '+' },
        east.abs() / 3600,
        east.abs() % 3600 / 60
    );
    match format {
        LocalFormat::Full => format!("{date} {clock}"),
        LocalFormat::DateOnly => date,
        LocalFormat::TimeOnly => clock,
    }
}

// ----- natives --------------------------------------------------------

/// Reads `this` as a date object.
fn this_time(vm: &Vm, this: &Value) -> JsResult<f64> {
    this.as_date_time(&vm.heap)
        .ok_or_else(|| JsError::type_error("cannot convert object to date"))
}

fn store_time(vm: &mut Vm, this: &Value, time: f64) -> JsResult<Value> {
    let Value::Ref(id) = this else {
        return Err(JsError::type_error("cannot convert object to date"));
    };
    vm.heap.object_mut(*id).set_date_time(time);
    Ok(Value::Number(time))
}

/// Calendar field positions used by the compound setters.
const FIELD_YEAR: usize = 0;
const FIELD_MONTH: usize = 1;
const FIELD_MDAY: usize = 2;
const FIELD_HOUR: usize = 3;
const FIELD_MIN: usize = 4;
const FIELD_SEC: usize = 5;
const FIELD_MS: usize = 6;

fn field_of(tm: &Tm, field: usize) -> i64 {
    match field {
        FIELD_YEAR => tm.year,
        FIELD_MONTH => tm.month,
        FIELD_MDAY => tm.mday,
        FIELD_HOUR => tm.hour,
        FIELD_MIN => tm.min,
        FIELD_SEC => tm.sec,
        _ => tm.ms,
    }
}

fn set_field(tm: &mut Tm, field: usize, value: i64) {
    match field {
        FIELD_YEAR => tm.year = value,
        FIELD_MONTH => tm.month = value,
        FIELD_MDAY => tm.mday = value,
        FIELD_HOUR => tm.hour = value,
        FIELD_MIN => tm.min = value,
        FIELD_SEC => tm.sec = value,
        _ => tm.ms = value,
    }
}

/// Shared body of the `set*` family: decompose, overwrite `count` fields
/// starting at `first`, recompose. An unrepresentable argument turns the
/// time into NaN.
fn set_fields(vm: &mut Vm, this: &Value, args: &[Value], first: usize, count: usize, utc: bool) -> JsResult<Value> {
    let time = this_time(vm, this)?;
    // Setting year fields on an invalid date starts from the epoch; the
    // narrower setters keep it invalid.
    if time.is_nan() && first != FIELD_YEAR {
        return store_time(vm, this, f64::NAN);
    }
    let base = if time.is_nan() { 0.0 } else { time };
    let mut tm = destruct(if utc { base } else { local_from_utc(base) });

    let mut provided = 0usize;
    for offset in 0..count {
        let Some(argument) = args.get(offset) else {
            break;
        };
        let number = vm.to_number(argument)?;
        if !number.is_finite() {
            return store_time(vm, this, f64::NAN);
        }
        set_field(&mut tm, first + offset, number.trunc() as i64);
        provided += 1;
    }
    if provided == 0 {
        return store_time(vm, this, f64::NAN);
    }

    let days = make_day(tm.year, tm.month, tm.mday);
    let clock = make_time(tm.hour, tm.min, tm.sec, tm.ms);
    let stamp = (days * MILLIS_PER_DAY + clock) as f64;
    let new_time = timeclip(if utc { stamp } else { utc_from_local(stamp) });
    store_time(vm, this, new_time)
}

macro_rules! date_getter {
    ($name:ident, $field:expr, utc) => {
        fn $name(vm: &mut Vm, this: &Value, _args: &[Value]) -> JsResult<Value> {
            let time = this_time(vm, this)?;
            if time.is_nan() {
                return Ok(Value::Number(f64::NAN));
            }
            Ok(Value::Number(field_of(&destruct(time), $field) as f64))
        }
    };
    ($name:ident, $field:expr, local) => {
        fn $name(vm: &mut Vm, this: &Value, _args: &[Value]) -> JsResult<Value> {
            let time = this_time(vm, this)?;
            if time.is_nan() {
                return Ok(Value::Number(f64::NAN));
            }
            Ok(Value::Number(field_of(&destruct(local_from_utc(time)), $field) as f64))
        }
    };
}

macro_rules! date_setter {
    ($name:ident, $first:expr, $count:expr, $utc:expr) => {
        fn $name(vm: &mut Vm, this: &Value, args: &[Value]) -> JsResult<Value> {
            set_fields(vm, this, args, $first, $count, $utc)
        }
    };
}

date_getter!(get_full_year, FIELD_YEAR, local);
date_getter!(get_utc_full_year, FIELD_YEAR, utc);
date_getter!(get_month, FIELD_MONTH, local);
date_getter!(get_utc_month, FIELD_MONTH, utc);
date_getter!(get_date, FIELD_MDAY, local);
date_getter!(get_utc_date, FIELD_MDAY, utc);
date_getter!(get_hours, FIELD_HOUR, local);
date_getter!(get_utc_hours, FIELD_HOUR, utc);
date_getter!(get_minutes, FIELD_MIN, local);
date_getter!(get_utc_minutes, FIELD_MIN, utc);
date_getter!(get_seconds, FIELD_SEC, local);
date_getter!(get_utc_seconds, FIELD_SEC, utc);
date_getter!(get_milliseconds, FIELD_MS, local);
date_getter!(get_utc_milliseconds, FIELD_MS, utc);

date_setter!(set_full_year, FIELD_YEAR, 3, false);
date_setter!(set_utc_full_year, FIELD_YEAR, 3, true);
date_setter!(set_month, FIELD_MONTH, 2, false);
date_setter!(set_utc_month, FIELD_MONTH, 2, true);
date_setter!(set_date, FIELD_MDAY, 1, false);
date_setter!(set_utc_date, FIELD_MDAY, 1, true);
date_setter!(set_hours, FIELD_HOUR, 4, false);
date_setter!(set_utc_hours, FIELD_HOUR, 4, true);
date_setter!(set_minutes, FIELD_MIN, 3, false);
date_setter!(set_utc_minutes, FIELD_MIN, 3, true);
date_setter!(set_seconds, FIELD_SEC, 2, false);
date_setter!(set_utc_seconds, FIELD_SEC, 2, true);
date_setter!(set_milliseconds, FIELD_MS, 1, false);
date_setter!(set_utc_milliseconds, FIELD_MS, 1, true);

fn get_time(vm: &mut Vm, this: &Value, _args: &[Value]) -> JsResult<Value> {
    Ok(Value::Number(this_time(vm, this)?))
}

fn set_time(vm: &mut Vm, this: &Value, args: &[Value]) -> JsResult<Value> {
    this_time(vm, this)?;
    let time = match args.first() {
        Some(value) => timeclip(vm.to_number(value)?),
        None => f64::NAN,
    };
    store_time(vm, this, time)
}

fn get_day(vm: &mut Vm, this: &Value, _args: &[Value]) -> JsResult<Value> {
    let time = this_time(vm, this)?;
    if time.is_nan() {
        return Ok(Value::Number(f64::NAN));
    }
    Ok(Value::Number(destruct(local_from_utc(time)).wday as f64))
}

fn get_utc_day(vm: &mut Vm, this: &Value, _args: &[Value]) -> JsResult<Value> {
    let time = this_time(vm, this)?;
    if time.is_nan() {
        return Ok(Value::Number(f64::NAN));
    }
    Ok(Value::Number(destruct(time).wday as f64))
}

fn get_timezone_offset(vm: &mut Vm, this: &Value, _args: &[Value]) -> JsResult<Value> {
    let time = this_time(vm, this)?;
    if time.is_nan() {
        return Ok(Value::Number(f64::NAN));
    }
    Ok(Value::Number(tz_offset_minutes(time) as f64))
}

fn to_iso_string_native(vm: &mut Vm, this: &Value, _args: &[Value]) -> JsResult<Value> {
    let time = this_time(vm, this)?;
    let text = to_iso_string(time)?;
    Value::from_text(&mut vm.heap, &text)
}

fn to_utc_string_native(vm: &mut Vm, this: &Value, _args: &[Value]) -> JsResult<Value> {
    let time = this_time(vm, this)?;
    let text = to_utc_string(time);
    Value::from_text(&mut vm.heap, &text)
}

fn to_string_native(vm: &mut Vm, this: &Value, _args: &[Value]) -> JsResult<Value> {
    let time = this_time(vm, this)?;
    let text = to_local_string(time, LocalFormat::Full);
    Value::from_text(&mut vm.heap, &text)
}

fn to_date_string_native(vm: &mut Vm, this: &Value, _args: &[Value]) -> JsResult<Value> {
    let time = this_time(vm, this)?;
    let text = to_local_string(time, LocalFormat::DateOnly);
    Value::from_text(&mut vm.heap, &text)
}

fn to_time_string_native(vm: &mut Vm, this: &Value, _args: &[Value]) -> JsResult<Value> {
    let time = this_time(vm, this)?;
    let text = to_local_string(time, LocalFormat::TimeOnly);
    Value::from_text(&mut vm.heap, &text)
}

/// `toJSON` goes through the property protocol: whatever `toISOString`
/// the object exposes is the one called.
fn to_json_native(vm: &mut Vm, this: &Value, _args: &[Value]) -> JsResult<Value> {
    if !this.is_object_like(&vm.heap) {
        return Err(JsError::type_error("Date.prototype.toJSON called on a non-object"));
    }
    let time = vm.to_number(this)?;
    if !time.is_finite() {
        return Ok(Value::Null);
    }
    match vm.property_get(this, &PropertyKey::name("toISOString"))? {
        Lookup::Found(to_iso) if vm.is_callable(&to_iso) => vm.call(&to_iso, this, &[]),
        _ => Err(JsError::type_error("toISOString is not a function")),
    }
}

fn date_now_native(_vm: &mut Vm, _this: &Value, _args: &[Value]) -> JsResult<Value> {
    Ok(Value::Number(date_now()))
}

fn date_parse_native(vm: &mut Vm, _this: &Value, args: &[Value]) -> JsResult<Value> {
    match args.first() {
        Some(value) => {
            let text = value.display_string(&vm.heap)?;
            Ok(Value::Number(string_parse(&text)))
        }
        None => Ok(Value::Number(f64::NAN)),
    }
}

fn date_utc_native(vm: &mut Vm, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::Number(date_utc(vm, args)?))
}

/// Builds `Date.prototype`'s shared method table.
pub(crate) fn prototype_entries(vm: &mut Vm) -> PropertyMap {
    let mut map = PropertyMap::new();
    let entries: &[(&'static str, u32, crate::object::NativeFn)] = &[
        ("valueOf", 0, get_time),
        ("getTime", 0, get_time),
        ("setTime", 1, set_time),
        ("toISOString", 0, to_iso_string_native),
        ("toJSON", 1, to_json_native),
        ("toUTCString", 0, to_utc_string_native),
        ("toString", 0, to_string_native),
        ("toDateString", 0, to_date_string_native),
        ("toTimeString", 0, to_time_string_native),
        ("toLocaleString", 0, to_string_native),
        ("toLocaleDateString", 0, to_date_string_native),
        ("toLocaleTimeString", 0, to_time_string_native),
        ("getFullYear", 0, get_full_year),
        ("getUTCFullYear", 0, get_utc_full_year),
        ("getMonth", 0, get_month),
        ("getUTCMonth", 0, get_utc_month),
        ("getDate", 0, get_date),
        ("getUTCDate", 0, get_utc_date),
        ("getDay", 0, get_day),
        ("getUTCDay", 0, get_utc_day),
        ("getHours", 0, get_hours),
        ("getUTCHours", 0, get_utc_hours),
        ("getMinutes", 0, get_minutes),
        ("getUTCMinutes", 0, get_utc_minutes),
        ("getSeconds", 0, get_seconds),
        ("getUTCSeconds", 0, get_utc_seconds),
        ("getMilliseconds", 0, get_milliseconds),
        ("getUTCMilliseconds", 0, get_utc_milliseconds),
        ("getTimezoneOffset", 0, get_timezone_offset),
        ("setFullYear", 3, set_full_year),
        ("setUTCFullYear", 3, set_utc_full_year),
        ("setMonth", 2, set_month),
        ("setUTCMonth", 2, set_utc_month),
        ("setDate", 1, set_date),
        ("setUTCDate", 1, set_utc_date),
        ("setHours", 4, set_hours),
        ("setUTCHours", 4, set_utc_hours),
        ("setMinutes", 3, set_minutes),
        ("setUTCMinutes", 3, set_utc_minutes),
        ("setSeconds", 2, set_seconds),
        ("setUTCSeconds", 2, set_utc_seconds),
        ("setMilliseconds", 1, set_milliseconds),
        ("setUTCMilliseconds", 1, set_utc_milliseconds),
        ("now", 0, date_now_native),
        ("parse", 1, date_parse_native),
        ("UTC", 7, date_utc_native),
    ];
    for (name, arity, func) in entries {
        let value = vm.alloc_native(name, *arity, *func).expect("init allocation");
        insert_shared(&mut map, name, Property::method(value));
    }
    map
}
