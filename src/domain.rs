use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::FirmsError;

pub const NOISE: i32 = -1;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn parse_date(value: &str) -> Result<NaiveDate, FirmsError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| FirmsError::InvalidDate(value.to_string()))
}

/// Axis-aligned rectangle in degrees, written `min_lon,min_lat,max_lon,max_lat` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self, FirmsError> {
        let bbox = Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        };
        let in_range = (-180.0..=180.0).contains(&min_lon)
            && (-180.0..=180.0).contains(&max_lon)
            && (-90.0..=90.0).contains(&min_lat)
            && (-90.0..=90.0).contains(&max_lat);
        if !in_range || min_lon > max_lon || min_lat > max_lat {
            return Err(FirmsError::InvalidBoundingBox(bbox.to_string()));
        }
        Ok(bbox)
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_lon: self.min_lon.min(other.min_lon),
            min_lat: self.min_lat.min(other.min_lat),
            max_lon: self.max_lon.max(other.max_lon),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }
}

// `{:?}` keeps the trailing ".0" of integral coordinates, which is how the region tables spell them
impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?},{:?},{:?},{:?}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

impl FromStr for BoundingBox {
    type Err = FirmsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let coords = value
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| FirmsError::InvalidBoundingBox(value.to_string()))?;
        match coords.as_slice() {
            [min_lon, min_lat, max_lon, max_lat] => {
                BoundingBox::new(*min_lon, *min_lat, *max_lon, *max_lat)
                    .map_err(|_| FirmsError::InvalidBoundingBox(value.to_string()))
            }
            _ => Err(FirmsError::InvalidBoundingBox(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub latitude: f64,
    pub longitude: f64,
    pub acq_date: NaiveDate,
    /// sensor-local `HHMM`, kept as delivered
    pub acq_time: String,
    /// fire radiative power in MW
    pub frp: f64,
    /// `bright_ti4` for VIIRS, `brightness` for MODIS
    pub brightness: Option<f64>,
    pub confidence: Option<String>,
    pub satellite: Option<String>,
    pub daynight: Option<String>,
    pub cluster: i32,
}

impl Detection {
    pub fn new(latitude: f64, longitude: f64, acq_date: NaiveDate, frp: f64) -> Self {
        Self {
            latitude,
            longitude,
            acq_date,
            acq_time: String::new(),
            frp,
            brightness: None,
            confidence: None,
            satellite: None,
            daynight: None,
            cluster: NOISE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateChunk {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateChunk {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn days(&self) -> u32 {
        ((self.end - self.start).num_days() + 1) as u32
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

impl fmt::Display for DateChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}
