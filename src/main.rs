use std::{env, process};

use balloon_aprs::{
    aprs::Symbol,
    ax25::Address,
    beacon::{self, BeaconConfig},
    geospatial::Point,
};
use ftail::Ftail;
use log::{error, info, LevelFilter};
use nmea::{Nmea, SentenceType};

// TODO: set to the licensed flight callsign before launch
const CALLSIGN: &str = "NOCALL";
/// [Balloon SSID](http://www.aprs.org/aprs11/SSIDs.txt)
const SSID: u8 = 11;
/// 'O' for balloon.
/// For more info : http://www.aprs.org/symbols/symbols-new.txt
const SYMBOL: Symbol = Symbol::BALLOON;

/// Used when no sentence is given on the command line.
const SAMPLE_GGA: &str = "$GPGGA,092750.000,5321.6802,N,00630.3372,W,1,8,1.03,61.7,M,55.2,M,,*76";

fn main() {
    let level = env::var("APRS_LOG")
        .ok()
        .and_then(|level| level.parse().ok())
        .unwrap_or(LevelFilter::Info);

    if let Err(err) = Ftail::new().console(level).init() {
        println!("failed to initialise logging: {err:?}");
        process::exit(1);
    }

    let sentence = env::args().nth(1).unwrap_or_else(|| SAMPLE_GGA.to_owned());

    let point = match read_fix(&sentence) {
        Some(point) => point,
        None => {
            error!("no position fix in {sentence:?}");
            process::exit(1);
        }
    };

    let config = match Address::new(CALLSIGN, SSID)
        .map_err(beacon::BeaconError::from)
        .and_then(BeaconConfig::new)
    {
        Ok(config) => BeaconConfig {
            symbol: SYMBOL,
            ..config
        },
        Err(err) => {
            error!("bad station address: {err}");
            process::exit(1);
        }
    };

    let packet = match config.encode(&point) {
        Ok(packet) => packet,
        Err(err) => {
            error!("unable to create packet: {err}");
            process::exit(1);
        }
    };

    info!("--> {}", String::from_utf8_lossy(&packet));

    println!("Byte#\tHexVal\tChar\tChar>>1\tBinary");
    println!("-----\t------\t----\t-------\t------");
    for (i, byte) in packet.iter().enumerate() {
        println!(
            "{i:4} \t{byte:#04x} \t{} \t{}\t{byte:08b}",
            printable(*byte),
            printable(byte >> 1)
        );
    }

    match beacon::decode_beacon(&packet) {
        Ok(beacon) => info!(
            "<-- {} at {:.5}, {:.5}, {:.0} ft",
            beacon.frame, beacon.point.lat, beacon.point.lon, beacon.point.altitude
        ),
        Err(err) => error!("unable to decode our own packet: {err}"),
    }
}

fn read_fix(sentence: &str) -> Option<Point> {
    let mut nmea = match Nmea::create_for_navigation(&[SentenceType::GGA]) {
        Ok(nmea) => nmea,
        Err(err) => {
            error!("failed to set up NMEA parser: {err:?}");
            return None;
        }
    };

    if let Err(err) = nmea.parse(sentence) {
        error!("failed to parse NMEA sentence: {err:?}");
        return None;
    }

    Point::from_nmea(&nmea)
}

fn printable(byte: u8) -> char {
    if byte.is_ascii_graphic() || byte == b' ' {
        char::from(byte)
    } else {
        '.'
    }
}
