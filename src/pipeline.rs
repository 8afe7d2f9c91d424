use std::fmt;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{ClampedRange, DatasetCatalog, DatasetResolution};
use crate::chunk::{self, DEFAULT_CHUNK_DAYS};
use crate::cluster::{self, ClusterParams, ClusterSummary};
use crate::domain::{DateChunk, Detection, NOISE};
use crate::error::FirmsError;
use crate::firms::{ArchiveFetcher, FetchOptions, FetchReport, FirmsClient, RECENT_WINDOW_DAYS};
use crate::geofence::{BorderProvider, Geofence, GeofenceOutcome};
use crate::region::{BuiltinRegions, RegionBoxes, RegionRequest, RegionResolver, RegionTables};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    ResolvingRegion,
    PlanningChunks,
    Probing,
    Fetching,
    Geofencing,
    Clustering,
    Done,
    Aborted,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::ResolvingRegion => "resolving region",
            PipelineStage::PlanningChunks => "planning chunks",
            PipelineStage::Probing => "probing",
            PipelineStage::Fetching => "fetching",
            PipelineStage::Geofencing => "geofencing",
            PipelineStage::Clustering => "clustering",
            PipelineStage::Done => "done",
            PipelineStage::Aborted => "aborted",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChunkStatus {
    Fetched { rows: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Stage(PipelineStage),
    Chunk {
        index: usize,
        total: usize,
        chunk: DateChunk,
        status: ChunkStatus,
    },
    Notice(String),
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub region: RegionRequest,
    pub dataset: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub chunk_days: u32,
    /// `None` leaves every detection unclustered
    pub clustering: Option<ClusterParams>,
    pub strict: bool,
    pub multi_day_only: bool,
}

impl RunRequest {
    pub fn new(region: RegionRequest, dataset: &str, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            region,
            dataset: dataset.to_string(),
            start_date,
            end_date,
            chunk_days: DEFAULT_CHUNK_DAYS,
            clustering: Some(ClusterParams::default()),
            strict: false,
            multi_day_only: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoDataReason {
    /// requested window lies outside the dataset's availability
    OutsideDatasetRange,
    /// the probe found no coverage for the area and window
    NoCoverage,
    /// every chunk was attempted and none produced rows
    NoRecords,
    /// rows were fetched but none lie inside the bounding box
    OutsideBoundingBox,
    /// clusters exist but none spans more than one date
    NoMultiDayClusters,
}

impl fmt::Display for NoDataReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NoDataReason::OutsideDatasetRange => "requested dates are outside the dataset's availability",
            NoDataReason::NoCoverage => "no data available for the region in the selected date range",
            NoDataReason::NoRecords => "no records found for the region in the selected date range",
            NoDataReason::OutsideBoundingBox => "no points found within the bounding box",
            NoDataReason::NoMultiDayClusters => "no clusters span more than one day",
        };
        write!(f, "{text}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NoDataReport {
    pub reason: NoDataReason,
    pub dataset: DatasetResolution,
    pub fetch: Option<FetchReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncidentReport {
    pub dataset: DatasetResolution,
    pub range: ClampedRange,
    pub regions: RegionBoxes,
    pub chunks: usize,
    pub fetch: FetchReport,
    pub geofence: GeofenceOutcome,
    pub clustered: bool,
    pub cluster_count: usize,
    pub noise_count: usize,
    pub clusters: Vec<ClusterSummary>,
    #[serde(skip)]
    pub detections: Vec<Detection>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed(IncidentReport),
    NoData(NoDataReport),
}

impl RunOutcome {
    pub fn detections(&self) -> &[Detection] {
        match self {
            RunOutcome::Completed(report) => &report.detections,
            RunOutcome::NoData(_) => &[],
        }
    }
}

pub struct Pipeline<C: FirmsClient, B: BorderProvider, T: RegionTables = BuiltinRegions> {
    catalog: DatasetCatalog,
    regions: RegionResolver<T>,
    fetcher: ArchiveFetcher<C>,
    geofence: Geofence<B>,
}

impl<C: FirmsClient, B: BorderProvider, T: RegionTables> Pipeline<C, B, T> {
    pub fn new(
        catalog: DatasetCatalog,
        regions: RegionResolver<T>,
        fetcher: ArchiveFetcher<C>,
        geofence: Geofence<B>,
    ) -> Self {
        Self {
            catalog,
            regions,
            fetcher,
            geofence,
        }
    }

    pub fn catalog(&self) -> &DatasetCatalog {
        &self.catalog
    }

    pub fn fetcher(&self) -> &ArchiveFetcher<C> {
        &self.fetcher
    }

    pub fn run_today(&self, request: &RunRequest, sink: &dyn ProgressSink) -> Result<RunOutcome, FirmsError> {
        self.run(request, Local::now().date_naive(), sink)
    }

    /// Resolve, plan, probe, fetch, geofence and cluster one request.
    ///
    /// `Err` means the request is invalid, `RunOutcome::NoData` that nothing usable was
    /// found after every chunk and fallback was tried.
    pub fn run(
        &self,
        request: &RunRequest,
        today: NaiveDate,
        sink: &dyn ProgressSink,
    ) -> Result<RunOutcome, FirmsError> {
        let result = self.run_stages(request, today, sink);
        let last = match &result {
            Ok(RunOutcome::Completed(_)) => PipelineStage::Done,
            _ => PipelineStage::Aborted,
        };
        sink.event(ProgressEvent::Stage(last));
        result
    }

    fn run_stages(
        &self,
        request: &RunRequest,
        today: NaiveDate,
        sink: &dyn ProgressSink,
    ) -> Result<RunOutcome, FirmsError> {
        sink.event(ProgressEvent::Stage(PipelineStage::ResolvingRegion));
        let (start_date, end_date) = if request.start_date > request.end_date {
            sink.event(ProgressEvent::Notice(
                "start date was after end date, dates have been swapped".to_string(),
            ));
            (request.end_date, request.start_date)
        } else {
            (request.start_date, request.end_date)
        };
        let resolution = self.catalog.resolve(&request.dataset, start_date, today)?;
        let regions = self.regions.resolve(&request.region)?;
        let mut dataset = resolution.effective_id.clone();

        sink.event(ProgressEvent::Stage(PipelineStage::PlanningChunks));
        let mut range = self.clamp(&dataset, start_date, end_date, sink)?;
        if range.is_empty() {
            return Ok(no_data(NoDataReason::OutsideDatasetRange, &resolution, None));
        }
        let mut chunks = chunk::plan(range.start, range.end, request.chunk_days);
        info!(
            dataset = %dataset,
            start = %range.start,
            end = %range.end,
            chunks = chunks.len(),
            regions = regions.len(),
            "planned fetch"
        );

        sink.event(ProgressEvent::Stage(PipelineStage::Probing));
        let options = FetchOptions {
            extended_timeout: regions.large,
            recent_window: !resolution.needs_historical
                && chunks.len() == 1
                && regions.len() == 1
                && chunks[0].end == today
                && chunks[0].days() <= RECENT_WINDOW_DAYS,
        };
        let single_cell = chunks.len() == 1 && regions.len() == 1;
        match self.probe(&dataset, &regions, &chunks, &options) {
            Some(0) if resolution.substituted()
                && self.catalog.should_retry_original(&resolution, start_date, end_date, today) =>
            {
                let original = resolution.requested_id.clone();
                sink.event(ProgressEvent::Notice(format!(
                    "no data found in historical dataset {dataset}, trying {original}"
                )));
                range = self.clamp(&original, start_date, end_date, sink)?;
                if range.is_empty() {
                    return Ok(no_data(NoDataReason::NoCoverage, &resolution, None));
                }
                chunks = chunk::plan(range.start, range.end, request.chunk_days);
                dataset = original;
                if self.probe(&dataset, &regions, &chunks, &options) == Some(0) {
                    return Ok(no_data(NoDataReason::NoCoverage, &resolution, None));
                }
            }
            Some(0) if single_cell => {
                return Ok(no_data(NoDataReason::NoCoverage, &resolution, None));
            }
            _ => {}
        }

        sink.event(ProgressEvent::Stage(PipelineStage::Fetching));
        let report = self.fetcher.fetch_all(&dataset, &regions, &chunks, &options, sink);
        if report.is_empty() {
            return Ok(no_data(NoDataReason::NoRecords, &resolution, Some(report)));
        }
        let mut fetch = report;
        let fetched = std::mem::take(&mut fetch.detections);

        sink.event(ProgressEvent::Stage(PipelineStage::Geofencing));
        let country = match request.region.bbox {
            Some(_) => None,
            None => request.region.country.as_deref(),
        };
        let mut geofence = self
            .geofence
            .apply(fetched, &regions.envelope(), country, request.strict);
        if geofence.is_empty() {
            return Ok(no_data(NoDataReason::OutsideBoundingBox, &resolution, Some(fetch)));
        }
        let mut detections = std::mem::take(&mut geofence.detections);

        sink.event(ProgressEvent::Stage(PipelineStage::Clustering));
        let clustered = match &request.clustering {
            Some(params) => {
                cluster::cluster(&detections, params).apply(&mut detections);
                true
            }
            None => {
                sink.event(ProgressEvent::Notice(
                    "showing raw data without clustering".to_string(),
                ));
                false
            }
        };
        if request.multi_day_only && clustered {
            detections = cluster::filter_multi_day(&detections);
            if detections.is_empty() {
                warn!("no multi-day clusters found");
                return Ok(no_data(NoDataReason::NoMultiDayClusters, &resolution, Some(fetch)));
            }
        }
        let clusters = cluster::summarize(&detections);
        let noise_count = detections.iter().filter(|d| d.cluster == NOISE).count();

        Ok(RunOutcome::Completed(IncidentReport {
            dataset: DatasetResolution {
                effective_id: dataset,
                ..resolution
            },
            range,
            regions,
            chunks: chunks.len(),
            fetch,
            geofence,
            clustered,
            cluster_count: clusters.len(),
            noise_count,
            clusters,
            detections,
        }))
    }

    fn clamp(
        &self,
        dataset: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        sink: &dyn ProgressSink,
    ) -> Result<ClampedRange, FirmsError> {
        let range = self.catalog.clamp_range(dataset, start_date, end_date)?;
        if range.clamped {
            sink.event(ProgressEvent::Notice(format!(
                "date range adjusted to {} .. {} for {dataset}",
                range.start, range.end
            )));
        }
        Ok(range)
    }

    fn probe(
        &self,
        dataset: &str,
        regions: &RegionBoxes,
        chunks: &[DateChunk],
        options: &FetchOptions,
    ) -> Option<usize> {
        let (bbox, chunk) = (regions.boxes().first()?, chunks.first()?);
        match self.fetcher.probe(dataset, bbox, chunk, options) {
            Ok(count) => Some(count),
            Err(err) => {
                warn!(dataset, error = %err, "probe failed, continuing with full fetch");
                None
            }
        }
    }
}

fn no_data(reason: NoDataReason, dataset: &DatasetResolution, fetch: Option<FetchReport>) -> RunOutcome {
    warn!(%reason, "run produced no data");
    RunOutcome::NoData(NoDataReport {
        reason,
        dataset: dataset.clone(),
        fetch,
    })
}
