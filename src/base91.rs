//! Base91 arithmetic used by APRS compressed position reports.
//!
//! Every digit is a printable character from `!` (33) to `{` (123).
//! See the APRS Protocol Reference v1.0, chapter 9.

use thiserror::Error;

pub const MIN_DIGIT: u8 = b'!';
pub const MAX_DIGIT: u8 = b'{';

const RADIX: u32 = 91;

/// 91^4 - 1, the largest value a 4 digit position field can carry.
pub const MAX_POSITION: u32 = RADIX * RADIX * RADIX * RADIX - 1;
const MAX_PAIR: u32 = RADIX * RADIX - 1;

const LAT_SCALE: f64 = 380926.0;
const LON_SCALE: f64 = 190463.0;
const ALTITUDE_BASE: f64 = 1.002;
const SPEED_BASE: f64 = 1.08;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Base91Error {
    #[error("invalid base91 digit {byte:#04x} in {field}")]
    InvalidDigit { byte: u8, field: &'static str },
}

pub fn lat_precompress(lat: f64) -> u32 {
    (LAT_SCALE * (90.0 - lat)).round().clamp(0.0, MAX_POSITION as f64) as u32
}

pub fn lon_precompress(lon: f64) -> u32 {
    (LON_SCALE * (180.0 + lon)).round().clamp(0.0, MAX_POSITION as f64) as u32
}

/// Encodes a precompressed latitude or longitude as 4 digits, most significant first.
pub fn encode_position(value: u32) -> [u8; 4] {
    encode_digits(value.min(MAX_POSITION))
}

pub fn encode_lat(lat: f64) -> [u8; 4] {
    encode_position(lat_precompress(lat))
}

pub fn encode_lon(lon: f64) -> [u8; 4] {
    encode_position(lon_precompress(lon))
}

fn encode_digits<const N: usize>(mut value: u32) -> [u8; N] {
    let mut out = [MIN_DIGIT; N];

    for digit in out.iter_mut().rev() {
        *digit = MIN_DIGIT + (value % RADIX) as u8;
        value /= RADIX;
    }

    out
}

/// Decodes a run of base91 digits back into the integer it was built from.
pub fn decode_value(bytes: &[u8], field: &'static str) -> Result<u32, Base91Error> {
    bytes.iter().try_fold(0u32, |acc, &byte| {
        let digit = digit(byte, field)?;
        Ok(acc * RADIX + digit)
    })
}

fn digit(byte: u8, field: &'static str) -> Result<u32, Base91Error> {
    if !(MIN_DIGIT..=MAX_DIGIT).contains(&byte) {
        return Err(Base91Error::InvalidDigit { byte, field });
    }

    Ok((byte - MIN_DIGIT) as u32)
}

pub fn decode_lat(bytes: &[u8; 4]) -> Result<f64, Base91Error> {
    let value = decode_value(bytes, "latitude")?;
    Ok(90.0 - value as f64 / LAT_SCALE)
}

pub fn decode_lon(bytes: &[u8; 4]) -> Result<f64, Base91Error> {
    let value = decode_value(bytes, "longitude")?;
    Ok(value as f64 / LON_SCALE - 180.0)
}

/// Packs an altitude in feet as `log1.002(altitude)`.
///
/// Anything below one foot has no logarithm worth sending and maps to `!!`.
pub fn altitude_compress(altitude: f64) -> [u8; 2] {
    if !(altitude >= 1.0) {
        return encode_digits(0);
    }

    let code = (altitude.ln() / ALTITUDE_BASE.ln()).round();
    encode_digits(code.min(MAX_PAIR as f64) as u32)
}

pub fn decode_altitude(bytes: &[u8; 2]) -> Result<f64, Base91Error> {
    let value = decode_value(bytes, "altitude")?;
    Ok(ALTITUDE_BASE.powi(value as i32))
}

/// Packs course (degrees) and speed (knots) into the `cs` bytes.
pub fn course_speed_compress(course: f64, speed: f64) -> [u8; 2] {
    // course digit tops out at 89 so it can't collide with the `{` range marker
    let course = (course.rem_euclid(360.0) / 4.0).round().min(89.0) as u8;

    let speed = if speed > 0.0 {
        ((speed + 1.0).ln() / SPEED_BASE.ln()).round().min(90.0) as u8
    } else {
        0
    };

    [MIN_DIGIT + course, MIN_DIGIT + speed]
}

/// Returns `(course, speed)` in degrees and knots.
pub fn decode_course_speed(bytes: &[u8; 2]) -> Result<(f64, f64), Base91Error> {
    let course = digit(bytes[0], "course")? as f64 * 4.0;
    let speed = SPEED_BASE.powi(digit(bytes[1], "speed")? as i32) - 1.0;

    Ok((course, speed))
}

/// Packs a radio range in miles into the `s` byte.
pub fn radio_range_compress(range: f64) -> u8 {
    if !(range > 2.0) {
        return MIN_DIGIT;
    }

    let code = ((range / 2.0).ln() / SPEED_BASE.ln()).round().min(90.0) as u8;
    MIN_DIGIT + code
}

pub fn decode_radio_range(byte: u8) -> Result<f64, Base91Error> {
    let value = digit(byte, "radio range")?;
    Ok(2.0 * SPEED_BASE.powi(value as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_digits_round_trip() {
        for value in [0, 1, 90, 91, 8280, 8281, 753570, 12345678, MAX_POSITION] {
            let digits = encode_position(value);
            assert!(digits.iter().all(|b| (MIN_DIGIT..=MAX_DIGIT).contains(b)));
            assert_eq!(decode_value(&digits, "test").unwrap(), value);
        }
    }

    #[test]
    fn test_reference_position() {
        // APRS 1.0 p.38: 49°30'N 72°45'W. The reference truncates to `<*e7`, we round.
        assert_eq!(&encode_lat(49.5), b"5L!!");
        assert_eq!(&encode_lon(-72.75), b"<*e8");
        assert_eq!(lon_precompress(-72.75), 20427157);

        let lat = decode_lat(b"5L!!").unwrap();
        let lon = decode_lon(b"<*e7").unwrap();
        assert!((lat - 49.5).abs() < 0.0001);
        assert!((lon + 72.75).abs() < 0.0001);
    }

    #[test]
    fn test_precompress_extremes() {
        assert_eq!(lat_precompress(90.0), 0);
        assert_eq!(lat_precompress(-90.0), 68566680);
        assert_eq!(lon_precompress(-180.0), 0);
        assert_eq!(lon_precompress(180.0), 68566680);
    }

    #[test]
    fn test_invalid_digit() {
        let err = decode_lat(b"5L! ").unwrap_err();
        assert_eq!(
            err,
            Base91Error::InvalidDigit {
                byte: b' ',
                field: "latitude"
            }
        );

        assert!(decode_lon(b"|aaa").is_err());
        assert!(decode_radio_range(0x7f).is_err());
    }

    #[test]
    fn test_altitude_accuracy() {
        let mut altitude = 1.0;
        while altitude <= 100_000.0 {
            let decoded = decode_altitude(&altitude_compress(altitude)).unwrap();
            assert!(
                (decoded - altitude).abs() <= altitude * 0.005,
                "{altitude} decoded as {decoded}"
            );
            altitude *= 1.37;
        }
    }

    #[test]
    fn test_altitude_reference() {
        // APRS 1.0 p.40: "S]" is 10004 feet
        let decoded = decode_altitude(b"S]").unwrap();
        assert!((decoded - 10004.0).abs() < 1.0);
        assert_eq!(&altitude_compress(10004.0), b"S]");
    }

    #[test]
    fn test_altitude_clamps_below_one() {
        assert_eq!(&altitude_compress(0.0), b"!!");
        assert_eq!(&altitude_compress(-250.0), b"!!");
        assert_eq!(&altitude_compress(0.5), b"!!");
        assert_eq!(&altitude_compress(f64::NAN), b"!!");
    }

    #[test]
    fn test_course_speed() {
        // APRS 1.0 p.39: "7P" is course 88°, speed 36.2 knots
        let (course, speed) = decode_course_speed(b"7P").unwrap();
        assert_eq!(course, 88.0);
        assert!((speed - 36.2).abs() < 0.1);

        assert_eq!(&course_speed_compress(88.0, 36.2), b"7P");
        assert_eq!(&course_speed_compress(0.0, 0.0), b"!!");
    }

    #[test]
    fn test_radio_range() {
        // APRS 1.0 p.39: "{?" is 20.12 miles
        let range = decode_radio_range(b'?').unwrap();
        assert!((range - 20.12).abs() < 0.01);
        assert_eq!(radio_range_compress(20.12), b'?');
        assert_eq!(radio_range_compress(0.0), MIN_DIGIT);
    }
}
