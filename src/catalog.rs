use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::parse_date;
use crate::error::FirmsError;

pub const STALENESS_DAYS: i64 = 30;

pub const LONG_HISTORY_FALLBACK: &str = "VIIRS_SNPP_SP";

const NRT_SUFFIX: &str = "_NRT";
const SP_SUFFIX: &str = "_SP";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingLevel {
    NearRealTime,
    StandardProcessing,
}

impl fmt::Display for ProcessingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingLevel::NearRealTime => write!(f, "NRT"),
            ProcessingLevel::StandardProcessing => write!(f, "SP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub id: String,
    pub min_date: NaiveDate,
    /// `None` for rolling datasets that are current up to today
    pub max_date: Option<NaiveDate>,
    pub level: ProcessingLevel,
}

impl DatasetDescriptor {
    fn builtin(id: &str, min_date: &str, max_date: Option<&str>) -> Result<Self, FirmsError> {
        let level = if id.ends_with(NRT_SUFFIX) {
            ProcessingLevel::NearRealTime
        } else {
            ProcessingLevel::StandardProcessing
        };
        Ok(Self {
            id: id.to_string(),
            min_date: parse_date(min_date)?,
            max_date: max_date.map(parse_date).transpose()?,
            level,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetResolution {
    pub requested_id: String,
    pub effective_id: String,
    pub needs_historical: bool,
}

impl DatasetResolution {
    pub fn substituted(&self) -> bool {
        self.requested_id != self.effective_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClampedRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub clamped: bool,
}

impl ClampedRange {
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

#[derive(Debug, Clone)]
pub struct DatasetCatalog {
    datasets: Vec<DatasetDescriptor>,
    fallback_id: String,
}

impl DatasetCatalog {
    pub fn new(datasets: Vec<DatasetDescriptor>, fallback_id: impl Into<String>) -> Self {
        Self {
            datasets,
            fallback_id: fallback_id.into(),
        }
    }

    pub fn builtin() -> Result<Self, FirmsError> {
        let datasets = vec![
            DatasetDescriptor::builtin("MODIS_NRT", "2024-12-01", None)?,
            DatasetDescriptor::builtin("MODIS_SP", "2000-11-01", Some("2024-12-31"))?,
            DatasetDescriptor::builtin("VIIRS_NOAA20_NRT", "2024-12-01", None)?,
            DatasetDescriptor::builtin("VIIRS_NOAA20_SP", "2018-04-01", Some("2025-03-24"))?,
            DatasetDescriptor::builtin("VIIRS_NOAA21_NRT", "2024-01-17", None)?,
            DatasetDescriptor::builtin("VIIRS_SNPP_NRT", "2025-01-01", None)?,
            DatasetDescriptor::builtin("VIIRS_SNPP_SP", "2012-01-20", Some("2025-03-24"))?,
            DatasetDescriptor::builtin("LANDSAT_NRT", "2022-06-20", None)?,
        ];
        Ok(Self::new(datasets, LONG_HISTORY_FALLBACK))
    }

    pub fn datasets(&self) -> &[DatasetDescriptor] {
        &self.datasets
    }

    pub fn get(&self, id: &str) -> Option<&DatasetDescriptor> {
        self.datasets.iter().find(|dataset| dataset.id == id)
    }

    pub fn sp_counterpart(&self, id: &str) -> Option<&DatasetDescriptor> {
        let family = id.strip_suffix(NRT_SUFFIX)?;
        self.get(&format!("{family}{SP_SUFFIX}"))
    }

    pub fn needs_historical(start_date: NaiveDate, today: NaiveDate) -> bool {
        (today - start_date).num_days() > STALENESS_DAYS
    }

    pub fn resolve(
        &self,
        requested_id: &str,
        start_date: NaiveDate,
        today: NaiveDate,
    ) -> Result<DatasetResolution, FirmsError> {
        let needs_historical = Self::needs_historical(start_date, today);
        let mut effective_id = requested_id.to_string();

        if needs_historical && requested_id.ends_with(NRT_SUFFIX) {
            effective_id = match self.sp_counterpart(requested_id) {
                Some(sp) => sp.id.clone(),
                None => {
                    warn!(
                        dataset = requested_id,
                        fallback = %self.fallback_id,
                        "no standard-processing variant registered, using long-history fallback"
                    );
                    self.fallback_id.clone()
                }
            };
            info!(dataset = %effective_id, "fetching historical data");
        }

        if self.get(&effective_id).is_none() {
            return Err(FirmsError::UnknownDataset(effective_id));
        }

        Ok(DatasetResolution {
            requested_id: requested_id.to_string(),
            effective_id,
            needs_historical,
        })
    }

    pub fn clamp_range(
        &self,
        id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<ClampedRange, FirmsError> {
        let dataset = self
            .get(id)
            .ok_or_else(|| FirmsError::UnknownDataset(id.to_string()))?;

        let mut range = ClampedRange {
            start: start_date,
            end: end_date,
            clamped: false,
        };
        if range.start < dataset.min_date {
            warn!(dataset = id, requested = %range.start, earliest = %dataset.min_date,
                "start date before earliest available date");
            range.start = dataset.min_date;
            range.clamped = true;
        }
        if let Some(max_date) = dataset.max_date {
            if range.end > max_date {
                warn!(dataset = id, requested = %range.end, latest = %max_date,
                    "end date after latest available date");
                range.end = max_date;
                range.clamped = true;
            }
        }
        Ok(range)
    }

    /// Whether an empty probe against a substituted dataset should be retried with the
    /// dataset the caller originally asked for. The requested window must end less than
    /// `STALENESS_DAYS` before `today` and overlap the original dataset's availability.
    pub fn should_retry_original(
        &self,
        resolution: &DatasetResolution,
        start_date: NaiveDate,
        end_date: NaiveDate,
        today: NaiveDate,
    ) -> bool {
        if !resolution.needs_historical || !resolution.substituted() {
            return false;
        }
        let Some(original) = self.get(&resolution.requested_id) else {
            return false;
        };
        let recent_window = (today - end_date).num_days() < STALENESS_DAYS;
        let overlaps = end_date >= original.min_date
            && original.max_date.is_none_or(|max| max >= start_date);
        recent_window && overlaps
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn date(value: &str) -> NaiveDate {
        parse_date(value).unwrap()
    }

    #[test]
    fn recent_start_keeps_nrt() {
        let catalog = DatasetCatalog::builtin().unwrap();
        let res = catalog
            .resolve("VIIRS_NOAA20_NRT", date("2025-03-10"), date("2025-03-24"))
            .unwrap();
        assert!(!res.needs_historical);
        assert_eq!(res.effective_id, "VIIRS_NOAA20_NRT");
        assert!(!res.substituted());
    }

    #[test]
    fn staleness_boundary_is_exclusive() {
        let today = date("2025-03-31");
        assert!(!DatasetCatalog::needs_historical(date("2025-03-01"), today));
        assert!(DatasetCatalog::needs_historical(date("2025-02-28"), today));
    }

    #[test]
    fn historical_without_sp_uses_fallback() {
        let catalog = DatasetCatalog::builtin().unwrap();
        let res = catalog
            .resolve("VIIRS_NOAA21_NRT", date("2024-06-01"), date("2025-03-24"))
            .unwrap();
        assert_eq!(res.effective_id, LONG_HISTORY_FALLBACK);
    }

    #[test]
    fn unknown_dataset_fails() {
        let catalog = DatasetCatalog::builtin().unwrap();
        let err = catalog
            .resolve("GOES_NRT", date("2025-03-20"), date("2025-03-24"))
            .unwrap_err();
        assert_matches!(err, FirmsError::UnknownDataset(id) if id == "GOES_NRT");
    }

    #[test]
    fn clamp_signals_adjustment() {
        let catalog = DatasetCatalog::builtin().unwrap();
        let range = catalog
            .clamp_range("VIIRS_SNPP_SP", date("2010-01-01"), date("2026-01-01"))
            .unwrap();
        assert!(range.clamped);
        assert_eq!(range.start, date("2012-01-20"));
        assert_eq!(range.end, date("2025-03-24"));

        let untouched = catalog
            .clamp_range("VIIRS_SNPP_NRT", date("2025-02-01"), date("2026-01-01"))
            .unwrap();
        assert!(!untouched.clamped);
    }

    #[test]
    fn retry_original_only_for_recent_windows() {
        let catalog = DatasetCatalog::builtin().unwrap();
        let today = date("2025-03-24");
        let res = catalog
            .resolve("VIIRS_NOAA20_NRT", date("2025-01-01"), today)
            .unwrap();
        assert_eq!(res.effective_id, "VIIRS_NOAA20_SP");
        assert!(catalog.should_retry_original(&res, date("2025-01-01"), date("2025-03-20"), today));
        assert!(!catalog.should_retry_original(&res, date("2025-01-01"), date("2025-01-31"), today));

        let plain = catalog
            .resolve("VIIRS_NOAA20_NRT", date("2025-03-20"), today)
            .unwrap();
        assert!(!catalog.should_retry_original(&plain, date("2025-03-20"), date("2025-03-24"), today));
    }
}
