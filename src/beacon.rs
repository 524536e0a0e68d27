//! Station settings and the Point -> report -> frame pipeline, plus its mirror.

use log::debug;
use thiserror::Error;

use crate::aprs::{self, CompressedField, PositionError, Symbol};
use crate::ax25::{Address, Ax25Error, Frame};
use crate::geospatial::Point;

/// Experimental tocall, see http://www.aprs.org/aprs11/tocalls.txt
pub const DESTINATION: &str = "APZ001";
pub const PATH: &str = "WIDE2-1";

#[derive(Debug, Error)]
pub enum BeaconError {
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error(transparent)]
    Ax25(#[from] Ax25Error),
    #[error("payload is not a position report: {0:?}")]
    NotAPosition(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReportFormat {
    Uncompressed,
    UncompressedWithTimestamp,
    #[default]
    Compressed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BeaconConfig {
    pub source: Address,
    pub destination: Address,
    pub path: Vec<Address>,
    pub symbol: Symbol,
    pub format: ReportFormat,
    /// What the `csT` bytes carry when `format` is compressed
    pub compressed_field: CompressedField,
    pub message_capable: bool,
    /// Appended after the position fields
    pub comment: String,
}

impl BeaconConfig {
    pub fn new(source: Address) -> Result<Self, BeaconError> {
        Ok(Self {
            source,
            destination: DESTINATION.parse()?,
            path: vec![PATH.parse()?],
            symbol: Symbol::BALLOON,
            format: ReportFormat::default(),
            compressed_field: CompressedField::default(),
            message_capable: false,
            comment: String::new(),
        })
    }

    /// The APRS information field for `point`.
    pub fn payload(&self, point: &Point) -> Result<String, BeaconError> {
        let mut payload = match self.format {
            ReportFormat::Uncompressed => {
                aprs::encode_uncompressed(point, self.symbol, self.message_capable)?
            }
            ReportFormat::UncompressedWithTimestamp => {
                aprs::encode_uncompressed_with_timestamp(point, self.symbol, self.message_capable)?
            }
            ReportFormat::Compressed => {
                aprs::encode_compressed_with(point, self.symbol, self.compressed_field)?
            }
        };

        payload.push_str(&self.comment);
        Ok(payload)
    }

    pub fn frame(&self, point: &Point) -> Result<Frame, BeaconError> {
        let payload = self.payload(point)?;

        Ok(Frame::ui(
            self.destination.clone(),
            self.source.clone(),
            self.path.clone(),
            payload,
        ))
    }

    /// Frame bytes ready to hand to the KISS layer.
    pub fn encode(&self, point: &Point) -> Result<Vec<u8>, BeaconError> {
        let frame = self.frame(point)?;
        debug!("beacon {frame}");
        Ok(frame.encode())
    }
}

/// A received frame with its position report pulled apart.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBeacon {
    pub frame: Frame,
    pub point: Point,
    pub symbol: Symbol,
    pub comment: String,
}

pub fn decode_beacon(bytes: &[u8]) -> Result<DecodedBeacon, BeaconError> {
    let frame = Frame::decode(bytes)?;
    let info = String::from_utf8_lossy(&frame.info).into_owned();

    let report = aprs::decode(&info)?;
    if !report.is_match() {
        return Err(BeaconError::NotAPosition(info));
    }

    let (point, symbol, comment) = (report.point, report.symbol, report.remainder.to_owned());

    Ok(DecodedBeacon {
        frame,
        point,
        symbol,
        comment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BeaconConfig {
        BeaconConfig::new("NW5W-11".parse().unwrap()).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config();
        assert_eq!(config.destination.to_string(), "APZ001");
        assert_eq!(config.path.len(), 1);
        assert_eq!(config.path[0].to_string(), "WIDE2-1");
        assert_eq!(config.symbol, Symbol::BALLOON);
        assert_eq!(config.format, ReportFormat::Compressed);
    }

    #[test]
    fn test_payload_formats() {
        let point = Point::new(35.9, -79.1, 1000.0);
        let mut config = config();

        config.format = ReportFormat::Uncompressed;
        config.comment = " HAB".into();
        assert_eq!(config.payload(&point).unwrap(), "!3554.00N/07906.00WO HAB");

        config.message_capable = true;
        assert!(config.payload(&point).unwrap().starts_with('='));

        config.format = ReportFormat::UncompressedWithTimestamp;
        assert!(config.payload(&point).unwrap().starts_with('@'));

        config.format = ReportFormat::Compressed;
        let payload = config.payload(&point).unwrap();
        assert!(payload.starts_with("!/"));
        assert!(payload.ends_with("S HAB"));
    }

    #[test]
    fn test_invalid_point() {
        let err = config().encode(&Point::new(91.0, 0.0, 0.0)).unwrap_err();
        assert!(matches!(
            err,
            BeaconError::Position(PositionError::LatitudeOutOfRange(_))
        ));
    }

    #[test]
    fn test_round_trip() {
        let mut config = config();
        config.comment = "balloon".into();

        let bytes = config.encode(&Point::new(35.9, -79.1, 30000.0)).unwrap();
        let beacon = decode_beacon(&bytes).unwrap();

        assert_eq!(beacon.frame.source, config.source);
        assert_eq!(beacon.symbol, Symbol::BALLOON);
        assert!((beacon.point.lat - 35.9).abs() < 0.0001);
        assert!((beacon.point.lon + 79.1).abs() < 0.0001);
        assert!((beacon.point.altitude - 30000.0).abs() < 60.0);
        assert_eq!(beacon.comment, "balloon");
    }

    #[test]
    fn test_not_a_position() {
        let frame = Frame::ui(
            "APZ001".parse().unwrap(),
            "NW5W-11".parse().unwrap(),
            vec![],
            ">status",
        );

        assert!(matches!(
            decode_beacon(&frame.encode()),
            Err(BeaconError::NotAPosition(info)) if info == ">status"
        ));
    }
}
