use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{BoundingBox, DATE_FORMAT, DateChunk, Detection};
use crate::error::FirmsError;
use crate::normalize::{DetectionTable, parse_detections};
use crate::pipeline::{ChunkStatus, ProgressEvent, ProgressSink};
use crate::region::RegionBoxes;

pub const DEFAULT_BASE_URL: &str = "https://firms.modaps.eosdis.nasa.gov/api/area/csv";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const RECENT_WINDOW_DAYS: u32 = 7;

const REJECTION_MARKERS: &[&str] = &["Invalid", "Error"];

pub trait FirmsClient: Send + Sync {
    fn get_text(&self, url: &str, timeout: Duration) -> Result<String, FirmsError>;
}

#[derive(Clone)]
pub struct FirmsHttpClient {
    client: Client,
}

impl FirmsHttpClient {
    pub fn new() -> Result<Self, FirmsError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("firms-incidents/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| FirmsError::FirmsHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| FirmsError::FirmsHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl FirmsClient for FirmsHttpClient {
    fn get_text(&self, url: &str, timeout: Duration) -> Result<String, FirmsError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|err| FirmsError::FirmsHttp(err.without_url().to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "FIRMS request failed".to_string());
            return Err(FirmsError::FirmsStatus { status, message });
        }
        response
            .text()
            .map_err(|err| FirmsError::FirmsHttp(err.without_url().to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestWindow {
    /// the most recent `days` days, up to today
    Recent { days: u32 },
    /// `days` days starting at `start`
    Dated { days: u32, start: NaiveDate },
}

impl RequestWindow {
    pub fn for_chunk(chunk: &DateChunk) -> Self {
        RequestWindow::Dated {
            days: chunk.days(),
            start: chunk.start,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// double the default timeout, used for large regions
    pub extended_timeout: bool,
    /// allow the dateless "most recent N days" request for a chunk ending today
    pub recent_window: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkFailure {
    pub region_index: usize,
    pub bbox: BoundingBox,
    pub chunk: DateChunk,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    Fetched {
        region_index: usize,
        chunk: DateChunk,
        table: DetectionTable,
    },
    Failed(ChunkFailure),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchReport {
    #[serde(skip)]
    pub detections: Vec<Detection>,
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<ChunkFailure>,
    /// rows seen by more than one region box, dropped from `detections`
    pub duplicates: usize,
    pub brightness_column: Option<String>,
}

impl FetchReport {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    // adjacent boxes share their edges, a row on the seam comes back twice
    fn dedupe(&mut self) {
        let before = self.detections.len();
        let mut seen = HashSet::new();
        self.detections.retain(|d| {
            seen.insert((
                d.latitude.to_bits(),
                d.longitude.to_bits(),
                d.acq_date,
                d.acq_time.clone(),
            ))
        });
        self.duplicates = before - self.detections.len();
    }

    fn record(&mut self, outcome: ChunkOutcome) {
        self.attempted += 1;
        match outcome {
            ChunkOutcome::Fetched { table, .. } => {
                self.succeeded += 1;
                if self.brightness_column.is_none() {
                    self.brightness_column = table.brightness_column;
                }
                self.detections.extend(table.detections);
            }
            ChunkOutcome::Failed(failure) => self.failures.push(failure),
        }
    }
}

pub struct ArchiveFetcher<C: FirmsClient> {
    client: C,
    base_url: String,
    map_key: String,
    default_timeout: Duration,
}

impl<C: FirmsClient> ArchiveFetcher<C> {
    pub fn new(client: C, base_url: &str, map_key: &str, default_timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            map_key: map_key.to_string(),
            default_timeout,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn timeout(&self, options: &FetchOptions) -> Duration {
        if options.extended_timeout {
            self.default_timeout * 2
        } else {
            self.default_timeout
        }
    }

    pub fn request_url(&self, dataset_id: &str, bbox: &BoundingBox, window: RequestWindow) -> String {
        match window {
            RequestWindow::Recent { days } => format!(
                "{}/{}/{}/{}/{}",
                self.base_url, self.map_key, dataset_id, bbox, days
            ),
            RequestWindow::Dated { days, start } => format!(
                "{}/{}/{}/{}/{}/{}",
                self.base_url,
                self.map_key,
                dataset_id,
                bbox,
                days,
                start.format(DATE_FORMAT)
            ),
        }
    }

    fn window(&self, chunk: &DateChunk, options: &FetchOptions) -> RequestWindow {
        if options.recent_window && chunk.days() <= RECENT_WINDOW_DAYS {
            RequestWindow::Recent { days: chunk.days() }
        } else {
            RequestWindow::for_chunk(chunk)
        }
    }

    /// Fetch one (bbox, chunk) cell. Rows outside the chunk are discarded since the
    /// archive may return neighbouring days.
    pub fn fetch_chunk(
        &self,
        dataset_id: &str,
        bbox: &BoundingBox,
        chunk: &DateChunk,
        options: &FetchOptions,
    ) -> Result<DetectionTable, FirmsError> {
        let url = self.request_url(dataset_id, bbox, self.window(chunk, options));
        debug!(dataset = dataset_id, %bbox, %chunk, "FIRMS request");

        let start = Instant::now();
        let body = self.client.get_text(&url, self.timeout(options))?;
        if let Some(marker) = REJECTION_MARKERS.iter().find(|marker| body.contains(*marker)) {
            let excerpt: String = body.chars().take(100).collect();
            debug!(marker, "FIRMS response carries rejection marker");
            return Err(FirmsError::FirmsRejected(excerpt.trim().to_string()));
        }

        let mut table = parse_detections(&body)?;
        let returned = table.detections.len();
        table
            .detections
            .retain(|detection| chunk.contains(detection.acq_date));
        debug!(
            returned,
            kept = table.detections.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "FIRMS response"
        );
        Ok(table)
    }

    pub fn probe(
        &self,
        dataset_id: &str,
        bbox: &BoundingBox,
        chunk: &DateChunk,
        options: &FetchOptions,
    ) -> Result<usize, FirmsError> {
        let count = self.fetch_chunk(dataset_id, bbox, chunk, options)?.detections.len();
        info!(dataset = dataset_id, %chunk, count, "probe finished");
        Ok(count)
    }

    pub fn fetch_all(
        &self,
        dataset_id: &str,
        regions: &RegionBoxes,
        chunks: &[DateChunk],
        options: &FetchOptions,
        sink: &dyn ProgressSink,
    ) -> FetchReport {
        let total = regions.len() * chunks.len();
        let mut report = FetchReport::default();

        for (region_index, bbox) in regions.boxes().iter().enumerate() {
            if regions.len() > 1 {
                info!(region = region_index + 1, of = regions.len(), %bbox, "processing sub-region");
            }
            for (chunk_index, chunk) in chunks.iter().enumerate() {
                let index = region_index * chunks.len() + chunk_index;
                // the dateless form only makes sense for a run that is a single window
                let cell_options = FetchOptions {
                    recent_window: options.recent_window && total == 1,
                    ..*options
                };
                let outcome = match self.fetch_chunk(dataset_id, bbox, chunk, &cell_options) {
                    Ok(table) => ChunkOutcome::Fetched {
                        region_index,
                        chunk: *chunk,
                        table,
                    },
                    Err(err) => {
                        warn!(chunk = index + 1, total, %chunk, error = %err, "chunk failed, skipping");
                        ChunkOutcome::Failed(ChunkFailure {
                            region_index,
                            bbox: *bbox,
                            chunk: *chunk,
                            reason: err.to_string(),
                        })
                    }
                };
                let status = match &outcome {
                    ChunkOutcome::Fetched { table, .. } => ChunkStatus::Fetched {
                        rows: table.detections.len(),
                    },
                    ChunkOutcome::Failed(failure) => ChunkStatus::Failed {
                        reason: failure.reason.clone(),
                    },
                };
                sink.event(ProgressEvent::Chunk {
                    index,
                    total,
                    chunk: *chunk,
                    status,
                });
                report.record(outcome);
            }
        }

        if regions.len() > 1 {
            report.dedupe();
        }
        info!(
            attempted = report.attempted,
            failed = report.failures.len(),
            rows = report.detections.len(),
            "fetch finished"
        );
        report
    }
}
