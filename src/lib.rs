//! APRS position reports and AX.25 framing for a high-altitude balloon tracker.
//!
//! A GPS fix becomes a [`geospatial::Point`], [`aprs`] turns it into a position
//! report, and [`ax25`] wraps the report in a UI frame for the KISS layer.
//! [`beacon`] strings those steps together and runs them in reverse for received frames.

pub mod aprs;
pub mod ax25;
pub mod base91;
pub mod beacon;
pub mod geospatial;
