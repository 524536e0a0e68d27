//! APRS position reports, both the human readable and the Base91 compressed forms.
//!
//! ```text
//! !4903.50N/07201.75W-comment        uncompressed, no timestamp
//! @092345z4903.50N/07201.75W>        uncompressed, timestamped
//! =/5L!!<*e7OS]S                     compressed
//! ```
//!
//! Decoding never treats "this isn't my format" as an error. A report that doesn't
//! fit returns the zero [`Point`], [`Symbol::BLANK`] and the whole input as the
//! remainder so the caller can hand it to the next decoder.

use std::ops::Range;

use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeDelta, TimeZone, Utc};
use log::{debug, trace};
use thiserror::Error;

use crate::base91::{self, Base91Error};
use crate::geospatial::{self, Point};

/// Compression type byte: current fix, GGA source, software generated.
const TYPE_GGA_ALTITUDE: u8 = 0x32;
/// Compression type byte: current fix, RMC source, software generated.
const TYPE_RMC_COURSE: u8 = 0x3A;
/// Compression type byte: current fix, other source, software generated.
const TYPE_RANGE: u8 = 0x22;

const NMEA_SOURCE_MASK: u8 = 0x18;
const NMEA_SOURCE_GGA: u8 = 0x10;
const RANGE_MARKER: u8 = b'{';

/// `[=!] table lat(4) lon(4) code c s T`
const COMPRESSED_LEN: usize = 14;

// Offsets inside the `DDMM.mmN/DDDMM.mmW-` block shared by both uncompressed forms.
const LAT: Range<usize> = 0..7;
const LAT_HEMISPHERE: usize = 7;
const TABLE: usize = 8;
const LON: Range<usize> = 9..17;
const LON_HEMISPHERE: usize = 17;
const CODE: usize = 18;
const BLOCK_LEN: usize = 19;

/// Where the lat/lon block starts for each uncompressed report kind.
struct Layout {
    timestamped: bool,
    header: usize,
}

impl Layout {
    const fn min_len(&self) -> usize {
        self.header + BLOCK_LEN
    }
}

/// `!` or `=`
const REAL_TIME: Layout = Layout {
    timestamped: false,
    header: 1,
};

/// `/` or `@`, then `DDHHMM` and a format code
const TIMESTAMPED: Layout = Layout {
    timestamped: true,
    header: 8,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositionError {
    #[error("latitude is > +/- 90 degrees: {0}")]
    LatitudeOutOfRange(f64),
    #[error("longitude is > +/- 180 degrees: {0}")]
    LongitudeOutOfRange(f64),
    #[error("could not parse {field}")]
    DecodeField { field: &'static str, symbol: Symbol },
    #[error("could not decode compressed position: {0}")]
    InvalidDigit(#[from] Base91Error),
}

/// Symbol table selector and symbol code.
///
/// For more info : http://www.aprs.org/symbols/symbols-new.txt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol {
    pub table: char,
    pub code: char,
}

impl Symbol {
    pub const BLANK: Symbol = Symbol::new(' ', ' ');
    pub const BALLOON: Symbol = Symbol::new('/', 'O');

    pub const fn new(table: char, code: char) -> Self {
        Self { table, code }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionReportKind {
    /// `!`
    RealTime,
    /// `=`
    RealTimeMessaging,
    /// `/`
    Timestamped,
    /// `@`
    TimestampedMessaging,
}

impl PositionReportKind {
    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            b'!' => Some(Self::RealTime),
            b'=' => Some(Self::RealTimeMessaging),
            b'/' => Some(Self::Timestamped),
            b'@' => Some(Self::TimestampedMessaging),
            _ => None,
        }
    }

    fn new(timestamped: bool, messaging: bool) -> Self {
        match (timestamped, messaging) {
            (false, false) => Self::RealTime,
            (false, true) => Self::RealTimeMessaging,
            (true, false) => Self::Timestamped,
            (true, true) => Self::TimestampedMessaging,
        }
    }

    pub fn marker(self) -> char {
        match self {
            Self::RealTime => '!',
            Self::RealTimeMessaging => '=',
            Self::Timestamped => '/',
            Self::TimestampedMessaging => '@',
        }
    }

    pub fn has_timestamp(self) -> bool {
        matches!(self, Self::Timestamped | Self::TimestampedMessaging)
    }

    pub fn message_capable(self) -> bool {
        matches!(self, Self::RealTimeMessaging | Self::TimestampedMessaging)
    }
}

/// The result of decoding a position report.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionReport<'a> {
    /// `None` when the input wasn't a report this decoder understands
    pub kind: Option<PositionReportKind>,
    pub point: Point,
    pub symbol: Symbol,
    /// Bytes after the position fields, usually a comment or telemetry
    pub remainder: &'a str,
}

impl<'a> PositionReport<'a> {
    fn unmatched(input: &'a str) -> Self {
        Self {
            kind: None,
            point: Point::default(),
            symbol: Symbol::BLANK,
            remainder: input,
        }
    }

    pub fn is_match(&self) -> bool {
        self.kind.is_some()
    }
}

/// Which optional field to pack into the `csT` bytes of a compressed report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressedField {
    None,
    #[default]
    Altitude,
    CourseSpeed,
    RadioRange,
}

/// The decoded meaning of the `csT` bytes of a compressed report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompressedExtra {
    None,
    /// Feet
    Altitude(f64),
    /// Degrees and knots
    CourseSpeed { course: f64, speed: f64 },
    /// Miles
    RadioRange(f64),
}

impl CompressedExtra {
    /// Works out what the `cs` bytes hold, see APRS 1.0 p.38.
    ///
    /// The type byte only decides between altitude and "something else", so the
    /// bit test has to be checked before looking at `c` itself.
    pub fn classify(cs: [u8; 2], ty: u8) -> Result<Self, Base91Error> {
        let [c, s] = cs;

        if c == b' ' {
            return Ok(Self::None);
        }

        if ty.wrapping_sub(base91::MIN_DIGIT) & NMEA_SOURCE_MASK == NMEA_SOURCE_GGA {
            return Ok(Self::Altitude(base91::decode_altitude(&cs)?));
        }

        if c.wrapping_sub(base91::MIN_DIGIT) <= 89 {
            let (course, speed) = base91::decode_course_speed(&cs)?;
            return Ok(Self::CourseSpeed { course, speed });
        }

        if c == RANGE_MARKER {
            return Ok(Self::RadioRange(base91::decode_radio_range(s)?));
        }

        Ok(Self::None)
    }

    fn apply(self, point: &mut Point) {
        match self {
            Self::None => {}
            Self::Altitude(altitude) => point.altitude = altitude,
            Self::CourseSpeed { course, speed } => {
                point.heading = course;
                point.speed = speed;
            }
            Self::RadioRange(range) => point.radio_range = range,
        }
    }
}

fn validate(point: &Point) -> Result<(), PositionError> {
    if !(point.lat.abs() <= 90.0) {
        return Err(PositionError::LatitudeOutOfRange(point.lat));
    }

    if !(point.lon.abs() <= 180.0) {
        return Err(PositionError::LongitudeOutOfRange(point.lon));
    }

    Ok(())
}

/// Creates an uncompressed position report without a timestamp, e.g. `!4903.50N/07201.75W-`.
pub fn encode_uncompressed(
    point: &Point,
    symbol: Symbol,
    messaging: bool,
) -> Result<String, PositionError> {
    validate(point)?;

    let mut report = String::with_capacity(REAL_TIME.min_len());
    report.push(PositionReportKind::new(false, messaging).marker());
    push_lat_lon(&mut report, point, symbol);

    Ok(report)
}

/// Creates an uncompressed position report stamped with the point's time in
/// `DDHHMMz` form, e.g. `@092345z4903.50N/07201.75W>`.
pub fn encode_uncompressed_with_timestamp(
    point: &Point,
    symbol: Symbol,
    messaging: bool,
) -> Result<String, PositionError> {
    validate(point)?;

    let time = point.time.unwrap_or_else(Utc::now);

    let mut report = String::with_capacity(TIMESTAMPED.min_len());
    report.push(PositionReportKind::new(true, messaging).marker());
    report.push_str(&time.format("%d%H%Mz").to_string());
    push_lat_lon(&mut report, point, symbol);

    Ok(report)
}

fn push_lat_lon(report: &mut String, point: &Point, symbol: Symbol) {
    report.push_str(&geospatial::lat_to_ddm(point.lat));
    report.push(if point.lat >= 0.0 { 'N' } else { 'S' });
    report.push(symbol.table);
    report.push_str(&geospatial::lon_to_ddm(point.lon));
    report.push(if point.lon >= 0.0 { 'E' } else { 'W' });
    report.push(symbol.code);
}

/// Creates a compressed position report carrying the point's altitude.
pub fn encode_compressed(point: &Point, symbol: Symbol) -> Result<String, PositionError> {
    encode_compressed_with(point, symbol, CompressedField::Altitude)
}

pub fn encode_compressed_with(
    point: &Point,
    symbol: Symbol,
    field: CompressedField,
) -> Result<String, PositionError> {
    validate(point)?;

    let (cs, ty) = match field {
        CompressedField::None => ([b' ', b' '], b' '),
        CompressedField::Altitude => (
            base91::altitude_compress(point.altitude),
            TYPE_GGA_ALTITUDE + base91::MIN_DIGIT,
        ),
        CompressedField::CourseSpeed => (
            base91::course_speed_compress(point.heading, point.speed),
            TYPE_RMC_COURSE + base91::MIN_DIGIT,
        ),
        CompressedField::RadioRange => (
            [RANGE_MARKER, base91::radio_range_compress(point.radio_range)],
            TYPE_RANGE + base91::MIN_DIGIT,
        ),
    };

    let mut report = String::with_capacity(COMPRESSED_LEN);
    report.push(PositionReportKind::RealTime.marker());
    report.push(symbol.table);
    report.extend(base91::encode_lat(point.lat).map(char::from));
    report.extend(base91::encode_lon(point.lon).map(char::from));
    report.push(symbol.code);
    report.extend(cs.map(char::from));
    report.push(char::from(ty));

    trace!("compressed report {report}");

    Ok(report)
}

/// Picks a decoder from the first byte or two of the report.
pub fn decode(input: &str) -> Result<PositionReport<'_>, PositionError> {
    let bytes = input.as_bytes();

    match bytes.first().copied().and_then(PositionReportKind::from_marker) {
        Some(kind) if kind.has_timestamp() => decode_uncompressed_with_timestamp(input),
        Some(_) if matches!(bytes.get(1), Some(b'/' | b'\\')) => decode_compressed(input),
        Some(_) => decode_uncompressed(input),
        None => {
            debug!("not a position report: {input:?}");
            Ok(PositionReport::unmatched(input))
        }
    }
}

/// Matches `.` in a position report: any ASCII byte but a newline.
fn is_field_byte(byte: u8) -> bool {
    byte.is_ascii() && byte != b'\n'
}

fn array<const N: usize>(bytes: &[u8], at: usize) -> [u8; N] {
    let mut out = [0; N];
    out.copy_from_slice(&bytes[at..at + N]);
    out
}

/// Decodes a compressed position report such as `=/5L!!<*e7OS]S`.
pub fn decode_compressed(input: &str) -> Result<PositionReport<'_>, PositionError> {
    let bytes = input.as_bytes();

    let kind = match bytes.first().copied().and_then(PositionReportKind::from_marker) {
        Some(kind) if !kind.has_timestamp() => kind,
        _ => return Ok(PositionReport::unmatched(input)),
    };

    if bytes.len() < COMPRESSED_LEN
        || !matches!(bytes[1], b'/' | b'\\')
        || !bytes[..COMPRESSED_LEN].iter().copied().all(is_field_byte)
    {
        debug!("not a compressed position report: {input:?}");
        return Ok(PositionReport::unmatched(input));
    }

    let symbol = Symbol::new(char::from(bytes[1]), char::from(bytes[10]));

    let mut point = Point {
        lat: base91::decode_lat(&array(bytes, 2))?,
        lon: base91::decode_lon(&array(bytes, 6))?,
        time: Some(Utc::now()),
        message_capable: kind.message_capable(),
        ..Default::default()
    };

    CompressedExtra::classify(array(bytes, 11), bytes[13])?.apply(&mut point);

    Ok(PositionReport {
        kind: Some(kind),
        point,
        symbol,
        remainder: &input[COMPRESSED_LEN..],
    })
}

/// Decodes an uncompressed report without a timestamp such as `!4903.50N/07201.75W-`.
pub fn decode_uncompressed(input: &str) -> Result<PositionReport<'_>, PositionError> {
    decode_with_layout(input, &REAL_TIME)
}

/// Decodes an uncompressed report with a timestamp such as `@092345z4903.50N/07201.75W>`.
pub fn decode_uncompressed_with_timestamp(
    input: &str,
) -> Result<PositionReport<'_>, PositionError> {
    decode_with_layout(input, &TIMESTAMPED)
}

fn decode_with_layout<'a>(
    input: &'a str,
    layout: &Layout,
) -> Result<PositionReport<'a>, PositionError> {
    let bytes = input.as_bytes();

    if bytes.len() < layout.min_len() {
        return Ok(PositionReport::unmatched(input));
    }

    let kind = match PositionReportKind::from_marker(bytes[0]) {
        Some(kind) if kind.has_timestamp() == layout.timestamped => kind,
        _ => return Ok(PositionReport::unmatched(input)),
    };

    let header = &bytes[1..layout.header];
    let block = &bytes[layout.header..layout.min_len()];

    if !header_matches(header) || !block_matches(block) {
        debug!("not an uncompressed position report: {input:?}");
        return Ok(PositionReport::unmatched(input));
    }

    let now = Utc::now();
    let time = match header {
        [digits @ .., format] if layout.timestamped => decode_timestamp(digits, *format, now),
        _ => now,
    };

    let symbol = Symbol::new(char::from(block[TABLE]), char::from(block[CODE]));

    // every byte up to min_len is ASCII, so these slices land on char boundaries
    let fields = &input[layout.header..layout.min_len()];

    let mut lat = parse_coordinate(
        &fields[LAT],
        2,
        ("latitude degrees", "latitude minutes"),
        symbol,
    )?;
    if matches!(block[LAT_HEMISPHERE], b'S' | b's') {
        lat = -lat;
    }

    let mut lon = parse_coordinate(
        &fields[LON],
        3,
        ("longitude degrees", "longitude minutes"),
        symbol,
    )?;
    if matches!(block[LON_HEMISPHERE], b'W' | b'w') {
        lon = -lon;
    }

    Ok(PositionReport {
        kind: Some(kind),
        point: Point {
            lat,
            lon,
            time: Some(time),
            message_capable: kind.message_capable(),
            ..Default::default()
        },
        symbol,
        remainder: &input[layout.min_len()..],
    })
}

fn header_matches(header: &[u8]) -> bool {
    match header {
        [] => true,
        [digits @ .., format] => {
            digits.len() == 6 && digits.iter().all(u8::is_ascii_digit) && is_field_byte(*format)
        }
    }
}

fn block_matches(block: &[u8]) -> bool {
    let coordinate = |b: &u8| b.is_ascii_digit() || *b == b'.' || b.is_ascii_whitespace();

    block[LAT].iter().all(coordinate)
        && matches!(block[LAT_HEMISPHERE], b'N' | b'S' | b'n' | b's')
        && is_field_byte(block[TABLE])
        && block[LON].iter().all(coordinate)
        && matches!(block[LON_HEMISPHERE], b'E' | b'W' | b'e' | b'w')
        && is_field_byte(block[CODE])
}

/// Parses `DDMM.mm` (or `DDDMM.mm`) into decimal degrees.
fn parse_coordinate(
    field: &str,
    degree_digits: usize,
    (degrees_name, minutes_name): (&'static str, &'static str),
    symbol: Symbol,
) -> Result<f64, PositionError> {
    let degrees: f64 = field[..degree_digits]
        .parse()
        .map_err(|_| PositionError::DecodeField {
            field: degrees_name,
            symbol,
        })?;

    let minutes: f64 = field[degree_digits..]
        .parse()
        .map_err(|_| PositionError::DecodeField {
            field: minutes_name,
            symbol,
        })?;

    Ok(degrees + minutes / 60.0)
}

/// Turns `DDHHMM` + `z`/`/` or `HHMMSS` + `h` into a time near `now`.
///
/// Components past their range carry into the next unit, so day 0 is the last
/// day of the previous month. Unknown format codes give `now`.
fn decode_timestamp(digits: &[u8], format: u8, now: DateTime<Utc>) -> DateTime<Utc> {
    let pair = |i: usize| i64::from((digits[i] - b'0') * 10 + (digits[i + 1] - b'0'));
    let (a, b, c) = (pair(0), pair(2), pair(4));

    let time = match format {
        b'z' => month_start(now.year(), now.month())
            .map(|start| (start + day_hour_minute(a, b, c)).and_utc()),
        b'/' => {
            let local = now.with_timezone(&Local);
            month_start(local.year(), local.month())
                .map(|start| start + day_hour_minute(a, b, c))
                .and_then(|naive| Local.from_local_datetime(&naive).earliest())
                .map(|time| time.with_timezone(&Utc))
        }
        b'h' => now.date_naive().and_hms_opt(0, 0, 0).map(|midnight| {
            (midnight + TimeDelta::hours(a) + TimeDelta::minutes(b) + TimeDelta::seconds(c))
                .and_utc()
        }),
        _ => None,
    };

    time.unwrap_or_else(|| {
        debug!("unrecognised timestamp format {:?}", char::from(format));
        now
    })
}

fn month_start(year: i32, month: u32) -> Option<NaiveDateTime> {
    chrono::NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

fn day_hour_minute(day: i64, hour: i64, minute: i64) -> TimeDelta {
    TimeDelta::days(day - 1) + TimeDelta::hours(hour) + TimeDelta::minutes(minute)
}
