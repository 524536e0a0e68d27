use chrono::{DateTime, NaiveDateTime, Utc};
use nmea::Nmea;

const FEET_PER_METER: f64 = 3.28084;

/// A position fix shared by the encoders and decoders.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// Decimal degrees, positive north
    pub lat: f64,
    /// Decimal degrees, positive east
    pub lon: f64,
    /// Feet
    pub altitude: f64,
    /// Degrees, 0-360
    pub heading: f64,
    /// Knots
    pub speed: f64,
    /// Miles
    pub radio_range: f64,
    pub time: Option<DateTime<Utc>>,
    pub message_capable: bool,
}

impl Point {
    pub fn new(lat: f64, lon: f64, altitude: f64) -> Self {
        Self {
            lat,
            lon,
            altitude,
            time: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Builds a point from the fix held by an NMEA parser.
    ///
    /// Returns `None` until the parser has seen a latitude and a longitude.
    pub fn from_nmea(nmea: &Nmea) -> Option<Self> {
        let lat = nmea.latitude?;
        let lon = nmea.longitude?;

        let time = nmea.fix_time.map(|time| {
            let date = nmea.fix_date.unwrap_or_else(|| Utc::now().date_naive());
            NaiveDateTime::new(date, time).and_utc()
        });

        Some(Self {
            lat,
            lon,
            altitude: nmea.altitude.map_or(0.0, |meters| meters as f64 * FEET_PER_METER),
            heading: nmea.true_course.map_or(0.0, f64::from),
            speed: nmea.speed_over_ground.map_or(0.0, f64::from),
            radio_range: 0.0,
            time: time.or_else(|| Some(Utc::now())),
            message_capable: false,
        })
    }
}

/// Formats an absolute latitude as `DDMM.mm`.
pub fn lat_to_ddm(lat: f64) -> String {
    let (degrees, minutes) = split_degrees(lat);
    format!("{degrees:02}{minutes:05.2}")
}

/// Formats an absolute longitude as `DDDMM.mm`.
pub fn lon_to_ddm(lon: f64) -> String {
    let (degrees, minutes) = split_degrees(lon);
    format!("{degrees:03}{minutes:05.2}")
}

fn split_degrees(value: f64) -> (u32, f64) {
    // work in hundredths of a minute so 59.999 rolls into the next degree
    let hundredths = (value.abs() * 6000.0).round() as u32;
    (hundredths / 6000, (hundredths % 6000) as f64 / 100.0)
}
