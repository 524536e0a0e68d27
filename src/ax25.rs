//! AX.25 UI frames, the link layer APRS reports ride on.
//!
//! ```text
//! | Dest (7) | Source (7) | Path (0-56) | Control (1) | PID (1) | Info (N) |
//! ```
//!
//! Each address is the callsign shifted left one bit and space padded to six
//! bytes, then an SSID byte `CRRSSSSL`: C is the command bit (has-been-repeated
//! on path entries), RR the reserved bits, SSSS the SSID and L the last-address
//! marker. Flags and FCS are added by the KISS/HDLC layer, not here.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use log::trace;
use thiserror::Error;
use tinyvec::ArrayVec;

/// Unnumbered information frame
pub const CONTROL_UI: u8 = 0x03;
/// No layer 3 protocol
pub const PID_NO_LAYER3: u8 = 0xF0;

const ADDRESS_LEN: usize = 7;
const CALLSIGN_LEN: usize = 6;
const MAX_SSID: u8 = 15;

const RESERVED_BITS: u8 = 0x60;
const HIGH_BIT: u8 = 0x80;
const LAST_ADDRESS: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Ax25Error {
    #[error("callsign {0:?} is longer than 6 characters")]
    AddressTooLong(String),
    #[error("SSID {0} is out of range (0-15)")]
    SsidOutOfRange(u8),
    #[error("SSID {0:?} is not a number")]
    InvalidSsid(String),
    #[error("invalid character {0:?} in callsign")]
    InvalidCallsign(char),
    #[error("callsign is empty")]
    EmptyCallsign,
    #[error("frame truncated: needed {needed} bytes, got {actual}")]
    TruncatedFrame { needed: usize, actual: usize },
    #[error("address field has no source address")]
    MissingSource,
}

/// One to six upper-case ASCII letters and digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Callsign(ArrayVec<[u8; CALLSIGN_LEN]>);

impl Callsign {
    pub fn new(callsign: &str) -> Result<Self, Ax25Error> {
        if callsign.chars().count() > CALLSIGN_LEN {
            return Err(Ax25Error::AddressTooLong(callsign.to_owned()));
        }

        if callsign.is_empty() {
            return Err(Ax25Error::EmptyCallsign);
        }

        let mut bytes = ArrayVec::new();
        for c in callsign.chars() {
            if !c.is_ascii_alphanumeric() {
                return Err(Ax25Error::InvalidCallsign(c));
            }
            bytes.push(c.to_ascii_uppercase() as u8);
        }

        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // only ever holds ASCII alphanumerics
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// The six on-air bytes: space padded and shifted left one bit.
    fn shifted(&self) -> [u8; CALLSIGN_LEN] {
        let mut out = [b' ' << 1; CALLSIGN_LEN];
        for (slot, byte) in out.iter_mut().zip(self.as_bytes()) {
            *slot = byte << 1;
        }
        out
    }
}

impl Display for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A station address: callsign plus SSID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Address {
    callsign: Callsign,
    ssid: u8,
    /// Command/response bit, only meaningful on destination and source
    pub command: bool,
    /// Has-been-repeated bit, only meaningful on path entries
    pub repeated: bool,
}

impl Address {
    pub fn new(callsign: &str, ssid: u8) -> Result<Self, Ax25Error> {
        if ssid > MAX_SSID {
            return Err(Ax25Error::SsidOutOfRange(ssid));
        }

        Ok(Self {
            callsign: Callsign::new(callsign)?,
            ssid,
            command: false,
            repeated: false,
        })
    }

    pub fn callsign(&self) -> &Callsign {
        &self.callsign
    }

    pub fn ssid(&self) -> u8 {
        self.ssid
    }

    fn encode_into(&self, out: &mut Vec<u8>, high_bit: bool, last: bool) {
        out.extend_from_slice(&self.callsign.shifted());

        let mut ssid = RESERVED_BITS | (self.ssid << 1);
        if high_bit {
            ssid |= HIGH_BIT;
        }
        if last {
            ssid |= LAST_ADDRESS;
        }
        out.push(ssid);
    }

    /// Returns the address, its high bit and its last-address bit.
    fn decode(bytes: &[u8]) -> Result<(Self, bool, bool), Ax25Error> {
        let callsign: String = bytes[..CALLSIGN_LEN]
            .iter()
            .map(|&b| char::from(b >> 1))
            .collect();
        let ssid = bytes[CALLSIGN_LEN];

        let address = Self::new(callsign.trim_end(), (ssid >> 1) & MAX_SSID)?;
        Ok((address, ssid & HIGH_BIT != 0, ssid & LAST_ADDRESS != 0))
    }
}

impl FromStr for Address {
    type Err = Ax25Error;

    /// Parses `CALL` or `CALL-SSID`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('-') {
            Some((callsign, ssid)) => {
                let ssid = ssid
                    .parse()
                    .map_err(|_| Ax25Error::InvalidSsid(ssid.to_owned()))?;
                Self::new(callsign, ssid)
            }
            None => Self::new(s, 0),
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ssid > 0 {
            write!(f, "{}-{}", self.callsign, self.ssid)
        } else {
            write!(f, "{}", self.callsign)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub destination: Address,
    pub source: Address,
    /// Digipeater path, in order
    pub path: Vec<Address>,
    pub control: u8,
    pub pid: u8,
    /// Information field, the APRS payload
    pub info: Vec<u8>,
}

impl Frame {
    /// Builds an AX.25 v2 UI command frame.
    pub fn ui(
        mut destination: Address,
        mut source: Address,
        path: Vec<Address>,
        info: impl Into<Vec<u8>>,
    ) -> Self {
        destination.command = true;
        source.command = false;

        Self {
            destination,
            source,
            path,
            control: CONTROL_UI,
            pid: PID_NO_LAYER3,
            info: info.into(),
        }
    }

    pub fn is_ui(&self) -> bool {
        self.control == CONTROL_UI && self.pid == PID_NO_LAYER3
    }

    pub fn encode(&self) -> Vec<u8> {
        let addresses = 2 + self.path.len();
        let mut out = Vec::with_capacity(addresses * ADDRESS_LEN + 2 + self.info.len());

        self.destination
            .encode_into(&mut out, self.destination.command, false);
        self.source
            .encode_into(&mut out, self.source.command, self.path.is_empty());

        for (i, hop) in self.path.iter().enumerate() {
            hop.encode_into(&mut out, hop.repeated, i + 1 == self.path.len());
        }

        out.push(self.control);
        out.push(self.pid);
        out.extend_from_slice(&self.info);

        trace!("encoded {} into {} bytes", self, out.len());

        out
    }

    /// Decodes an un-stuffed frame without flags or FCS.
    pub fn decode(bytes: &[u8]) -> Result<Self, Ax25Error> {
        let mut addresses = Vec::with_capacity(2);
        let mut offset = 0;

        loop {
            let end = offset + ADDRESS_LEN;
            let Some(chunk) = bytes.get(offset..end) else {
                return Err(Ax25Error::TruncatedFrame {
                    needed: end,
                    actual: bytes.len(),
                });
            };

            let (mut address, high_bit, last) = Address::decode(chunk)?;
            if addresses.len() < 2 {
                address.command = high_bit;
            } else {
                address.repeated = high_bit;
            }

            addresses.push(address);
            offset = end;

            if last {
                break;
            }
        }

        if addresses.len() < 2 {
            return Err(Ax25Error::MissingSource);
        }

        let [control, pid] = match bytes.get(offset..offset + 2) {
            Some(&[control, pid]) => [control, pid],
            _ => {
                return Err(Ax25Error::TruncatedFrame {
                    needed: offset + 2,
                    actual: bytes.len(),
                })
            }
        };

        let mut addresses = addresses.into_iter();
        let (Some(destination), Some(source)) = (addresses.next(), addresses.next()) else {
            return Err(Ax25Error::MissingSource);
        };

        Ok(Self {
            destination,
            source,
            path: addresses.collect(),
            control,
            pid,
            info: bytes[offset + 2..].to_vec(),
        })
    }
}

/// TNC2 monitor format, `SRC>DST,PATH*:info`.
impl Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}>{}", self.source, self.destination)?;

        for hop in &self.path {
            write!(f, ",{hop}")?;
            if hop.repeated {
                f.write_str("*")?;
            }
        }

        write!(f, ":{}", String::from_utf8_lossy(&self.info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn beacon_frame() -> Frame {
        Frame::ui(
            address("APZ001"),
            address("NW5W-7"),
            vec![address("WIDE2-2")],
            "!3554.00N/07906.00WO",
        )
    }

    #[test]
    fn test_source_address_bytes() {
        let bytes = beacon_frame().encode();

        let source = &bytes[7..14];
        assert_eq!(&source[..4], &[b'N' << 1, b'W' << 1, b'5' << 1, b'W' << 1]);
        assert_eq!(&source[4..6], &[b' ' << 1, b' ' << 1]);
        assert_eq!((source[6] >> 1) & 0x0F, 7);
        assert_eq!(source[6], 0x6E);
    }

    #[test]
    fn test_encode_layout() {
        let bytes = beacon_frame().encode();

        assert_eq!(bytes.len(), 3 * 7 + 2 + 20);
        // destination carries the command bit
        assert_eq!(bytes[6], 0xE0);
        // path entry is the last address
        assert_eq!(bytes[20], 0x65);
        assert_eq!(&bytes[21..23], &[CONTROL_UI, PID_NO_LAYER3]);
        assert_eq!(&bytes[23..], b"!3554.00N/07906.00WO");
    }

    #[test]
    fn test_source_is_last_without_path() {
        let frame = Frame::ui(address("APZ001"), address("NW5W-7"), vec![], "x");
        let bytes = frame.encode();

        assert_eq!(bytes[6] & LAST_ADDRESS, 0);
        assert_eq!(bytes[13], 0x6F);
        assert_eq!(bytes[14], CONTROL_UI);
    }

    #[test]
    fn test_decode_known_bytes() {
        let mut raw = Vec::new();
        // "APRS  " shifted left 1
        raw.extend_from_slice(&[0x82, 0xA0, 0xA4, 0xA6, 0x40, 0x40, 0x60]);
        // "N0CALL" shifted left 1, last address bit set
        raw.extend_from_slice(&[0x9C, 0x60, 0x86, 0x82, 0x98, 0x98, 0xE1]);
        raw.extend_from_slice(&[0x03, 0xF0]);
        raw.extend_from_slice(b"Hello APRS!");

        let frame = Frame::decode(&raw).unwrap();
        assert_eq!(frame.destination.callsign().as_str(), "APRS");
        assert_eq!(frame.source.callsign().as_str(), "N0CALL");
        assert!(frame.source.command);
        assert!(frame.path.is_empty());
        assert!(frame.is_ui());
        assert_eq!(frame.info, b"Hello APRS!");
    }

    #[test]
    fn test_round_trip_with_path() {
        let mut first = address("WIDE1-1");
        first.repeated = true;
        let frame = Frame::ui(
            address("APZ001"),
            address("NW5W-7"),
            vec![first, address("WIDE2-1")],
            ":`283lA+j/`\"4g}http://nw5w.com_",
        );

        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded, frame);
        assert!(decoded.destination.command);
        assert!(decoded.path[0].repeated);
        assert!(!decoded.path[1].repeated);
    }

    #[test]
    fn test_display() {
        let mut frame = beacon_frame();
        assert_eq!(frame.to_string(), "NW5W-7>APZ001,WIDE2-2:!3554.00N/07906.00WO");

        frame.path[0].repeated = true;
        assert_eq!(frame.to_string(), "NW5W-7>APZ001,WIDE2-2*:!3554.00N/07906.00WO");
    }

    #[test]
    fn test_address_errors() {
        assert_eq!(
            Address::new("ABCDEFG", 0),
            Err(Ax25Error::AddressTooLong("ABCDEFG".into()))
        );
        assert_eq!(Address::new("NW5W", 16), Err(Ax25Error::SsidOutOfRange(16)));
        assert_eq!(
            "NW5W-16".parse::<Address>(),
            Err(Ax25Error::SsidOutOfRange(16))
        );
        assert_eq!(
            "NW5W-x".parse::<Address>(),
            Err(Ax25Error::InvalidSsid("x".into()))
        );
        assert_eq!(Address::new("N W", 0), Err(Ax25Error::InvalidCallsign(' ')));
        assert_eq!(Address::new("", 0), Err(Ax25Error::EmptyCallsign));
        assert_eq!("-7".parse::<Address>(), Err(Ax25Error::EmptyCallsign));
    }

    #[test]
    fn test_address_parsing() {
        let addr = address("nw5w-15");
        assert_eq!(addr.callsign().as_str(), "NW5W");
        assert_eq!(addr.ssid(), 15);
        assert_eq!(addr.to_string(), "NW5W-15");
        assert_eq!(address("APZ001").to_string(), "APZ001");
    }

    #[test]
    fn test_truncated() {
        assert_eq!(
            Frame::decode(&[0; 5]),
            Err(Ax25Error::TruncatedFrame {
                needed: 7,
                actual: 5
            })
        );

        // no last-address bit anywhere
        let bytes = beacon_frame().encode();
        let mut unterminated = bytes[..14].to_vec();
        unterminated[13] &= !LAST_ADDRESS;
        assert!(matches!(
            Frame::decode(&unterminated),
            Err(Ax25Error::TruncatedFrame { needed: 21, .. })
        ));

        // addresses but no control/PID
        assert!(matches!(
            Frame::decode(&bytes[..21]),
            Err(Ax25Error::TruncatedFrame { needed: 23, .. })
        ));
    }

    #[test]
    fn test_blank_callsign_on_air() {
        let mut bytes = beacon_frame().encode();
        bytes[..6].fill(b' ' << 1);
        assert_eq!(Frame::decode(&bytes), Err(Ax25Error::EmptyCallsign));
    }

    #[test]
    fn test_missing_source() {
        let mut bytes = beacon_frame().encode();
        bytes[6] |= LAST_ADDRESS;
        assert_eq!(Frame::decode(&bytes), Err(Ax25Error::MissingSource));
    }
}
