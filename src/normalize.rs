//! Maps the column spellings of the various FIRMS products onto the single
//! [`Detection`] schema used by the geofence and clustering stages.

use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, warn};

use crate::domain::{Detection, NOISE, parse_date};
use crate::error::FirmsError;

const LATITUDE: &[&str] = &["latitude", "lat"];
const LONGITUDE: &[&str] = &["longitude", "lon", "lng"];
const ACQ_DATE: &[&str] = &["acq_date", "date"];
const ACQ_TIME: &[&str] = &["acq_time", "time"];
const FRP: &[&str] = &["frp"];
// VIIRS reports the I4 channel, MODIS the 21/22 channel
const BRIGHTNESS: &[&str] = &["bright_ti4", "brightness"];
const CONFIDENCE: &[&str] = &["confidence"];
const SATELLITE: &[&str] = &["satellite"];
const DAYNIGHT: &[&str] = &["daynight"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    latitude: usize,
    longitude: usize,
    acq_date: usize,
    acq_time: usize,
    frp: Option<usize>,
    brightness: Option<usize>,
    confidence: Option<usize>,
    satellite: Option<usize>,
    daynight: Option<usize>,
    brightness_column: Option<String>,
}

fn find(headers: &[String], candidates: &[&str]) -> Option<usize> {
    candidates
        .iter()
        .find_map(|candidate| headers.iter().position(|header| header == candidate))
}

fn require(headers: &[String], candidates: &[&str]) -> Result<usize, FirmsError> {
    find(headers, candidates).ok_or_else(|| FirmsError::CsvSchema(candidates[0].to_string()))
}

impl ColumnMap {
    pub fn from_headers(headers: &StringRecord) -> Result<Self, FirmsError> {
        let headers = headers
            .iter()
            .map(|header| header.trim().to_ascii_lowercase())
            .collect::<Vec<_>>();
        let brightness = find(&headers, BRIGHTNESS);
        Ok(Self {
            latitude: require(&headers, LATITUDE)?,
            longitude: require(&headers, LONGITUDE)?,
            acq_date: require(&headers, ACQ_DATE)?,
            acq_time: require(&headers, ACQ_TIME)?,
            frp: find(&headers, FRP),
            brightness,
            confidence: find(&headers, CONFIDENCE),
            satellite: find(&headers, SATELLITE),
            daynight: find(&headers, DAYNIGHT),
            brightness_column: brightness.map(|idx| headers[idx].clone()),
        })
    }

    pub fn detection(&self, record: &StringRecord) -> Option<Detection> {
        let text = move |idx: usize| record.get(idx).map(str::trim).filter(|v| !v.is_empty());
        let number = |idx: usize| text(idx).and_then(|v| v.parse::<f64>().ok());
        let optional = |idx: Option<usize>| idx.and_then(text).map(str::to_string);

        let latitude = number(self.latitude).filter(|lat| (-90.0..=90.0).contains(lat))?;
        let longitude = number(self.longitude).filter(|lon| (-180.0..=180.0).contains(lon))?;
        // some exports carry a time component after the date
        let acq_date = text(self.acq_date)
            .and_then(|v| v.get(..10))
            .and_then(|v| parse_date(v).ok())?;
        // Landsat products carry no radiative power
        let frp = match self.frp {
            Some(idx) => number(idx).map(|frp| frp.max(0.0))?,
            None => 0.0,
        };

        Some(Detection {
            latitude,
            longitude,
            acq_date,
            acq_time: format!("{:0>4}", text(self.acq_time).unwrap_or_default()),
            frp,
            brightness: self.brightness.and_then(number),
            confidence: optional(self.confidence),
            satellite: optional(self.satellite),
            daynight: optional(self.daynight),
            cluster: NOISE,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionTable {
    pub detections: Vec<Detection>,
    /// upstream column the brightness values came from
    pub brightness_column: Option<String>,
}

pub fn parse_detections(body: &str) -> Result<DetectionTable, FirmsError> {
    if body.trim().is_empty() {
        return Ok(DetectionTable::default());
    }
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());
    let columns = ColumnMap::from_headers(reader.headers()?)?;

    let mut detections = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record?;
        match columns.detection(&record) {
            Some(detection) => detections.push(detection),
            None => {
                debug!(row = ?record, "dropping unparsable row");
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        warn!(skipped, kept = detections.len(), "dropped FIRMS rows with invalid fields");
    }
    Ok(DetectionTable {
        detections,
        brightness_column: columns.brightness_column,
    })
}
