//! Report service: request in, document or error out
//!
//! Every request runs the whole pipeline (validate, lay out, render) on a
//! bounded rayon pool. The asset store, themes and page setup live in one
//! immutable [`RenderContext`] shared by all workers. This module is the only
//! place pipeline errors are turned into [`ErrorResponse`]s.

use crossbeam_channel::{bounded, Receiver};
use log::{debug, error, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::assets::AssetStore;
use crate::config::ServiceConfig;
use crate::error::{LayoutError, ReportError, StartupError};
use crate::layout::{LayoutEngine, PageSetup, PageTree};
use crate::render::{render, RenderOptions, RenderedDocument};
use crate::request::{ReportRequest, ValidationContext};
use crate::theme::ThemeSet;

/// Read-only state shared by every request
pub struct RenderContext {
    pub assets: AssetStore,
    pub themes: ThemeSet,
    pub setup: PageSetup,
    pub max_payload_bytes: usize,
    pub debug_dump_dir: Option<PathBuf>,
    pub compress: bool,
}

impl RenderContext {
    /// Context with default limits and the standard themes for `assets`
    pub fn new(assets: AssetStore, setup: PageSetup) -> Self {
        let themes = ThemeSet::standard(&assets);
        let defaults = ServiceConfig::default();
        Self {
            assets,
            themes,
            setup,
            max_payload_bytes: defaults.max_payload_bytes,
            debug_dump_dir: None,
            compress: defaults.compress,
        }
    }

    /// Validate `config` and load everything it points at
    pub fn from_config(config: &ServiceConfig) -> Result<Self, StartupError> {
        config.validate()?;
        let assets = AssetStore::load(&config.asset_sources())?;
        let themes = match &config.theme_file {
            Some(path) => ThemeSet::load_file(path, &assets)?,
            None => ThemeSet::standard(&assets),
        };
        Ok(Self {
            assets,
            themes,
            setup: config.page_setup(),
            max_payload_bytes: config.max_payload_bytes,
            debug_dump_dir: config.debug_dump_dir.clone(),
            compress: config.compress,
        })
    }

    /// Run one payload through the whole pipeline on the calling thread
    pub fn process(&self, payload: &[u8]) -> Result<RenderedDocument, ErrorResponse> {
        let mut tracker = RequestTracker::new(0);
        let result = self.run(payload, &mut tracker, &AtomicBool::new(false));
        tracker.conclude(result)
    }

    fn run(
        &self,
        payload: &[u8],
        tracker: &mut RequestTracker,
        cancel: &AtomicBool,
    ) -> Result<RenderedDocument, ReportError> {
        let check_cancel = || {
            if cancel.load(Ordering::Relaxed) {
                Err(ReportError::Cancelled)
            } else {
                Ok(())
            }
        };

        check_cancel()?;
        let request = ReportRequest::from_json(payload, self.max_payload_bytes)?;
        let model = request.into_model(&ValidationContext {
            assets: &self.assets,
            themes: &self.themes,
        })?;
        tracker.advance(RequestStage::Validated);

        check_cancel()?;
        let tree = LayoutEngine::new(&self.assets, &self.themes, self.setup).layout(&model)?;
        tracker.advance(RequestStage::LaidOut);
        if let Some(dir) = &self.debug_dump_dir {
            dump_page_tree(dir, tracker.id, &tree);
        }

        check_cancel()?;
        let options = RenderOptions {
            title: model.title.clone(),
            compress: self.compress,
        };
        let document = render(&tree, &options)?;
        tracker.advance(RequestStage::Rendered);
        Ok(document)
    }
}

fn dump_page_tree(dir: &Path, id: u64, tree: &PageTree) {
    let path = dir.join(format!("report-{}.json", id));
    let written = tree
        .to_json()
        .map_err(|e| e.to_string())
        .and_then(|json| {
            std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;
            std::fs::write(&path, json).map_err(|e| e.to_string())
        });
    match written {
        Ok(()) => debug!("Request #{}: page tree written to {}", id, path.display()),
        Err(reason) => warn!(
            "Request #{}: failed to write page tree to {}: {}",
            id,
            path.display(),
            reason
        ),
    }
}

/// Pipeline stages of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStage {
    Received,
    Validated,
    LaidOut,
    Rendered,
    Responded,
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestStage::Received => "received",
            RequestStage::Validated => "validated",
            RequestStage::LaidOut => "laid_out",
            RequestStage::Rendered => "rendered",
            RequestStage::Responded => "responded",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    At(RequestStage),
    /// Terminal; `stage` is the last stage reached before the failure
    Failed { stage: RequestStage },
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::At(RequestStage::Responded) | RequestState::Failed { .. }
        )
    }
}

/// Tracks and logs the state of one request
#[derive(Debug)]
pub struct RequestTracker {
    id: u64,
    state: RequestState,
}

impl RequestTracker {
    pub fn new(id: u64) -> Self {
        debug!("Request #{}: received", id);
        Self {
            id,
            state: RequestState::At(RequestStage::Received),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn advance(&mut self, stage: RequestStage) {
        if self.state.is_terminal() {
            return;
        }
        if let RequestState::At(current) = self.state {
            debug!("Request #{}: {} -> {}", self.id, current, stage);
            self.state = RequestState::At(stage);
        }
    }

    pub fn fail(&mut self, err: &ReportError) -> RequestStage {
        let stage = match self.state {
            RequestState::At(stage) | RequestState::Failed { stage } => stage,
        };
        self.state = RequestState::Failed { stage };
        info!("Request #{}: failed after {}: {}", self.id, stage, err);
        stage
    }

    /// Move to a terminal state and build the caller's answer
    pub fn conclude(
        &mut self,
        result: Result<RenderedDocument, ReportError>,
    ) -> Result<RenderedDocument, ErrorResponse> {
        match result {
            Ok(document) => {
                self.advance(RequestStage::Responded);
                info!(
                    "Request #{}: responded with {} pages ({} bytes)",
                    self.id,
                    document.page_count,
                    document.len()
                );
                Ok(document)
            }
            Err(err) => {
                let stage = self.fail(&err);
                Err(ErrorResponse::from_error(&err, stage, self.id))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Client,
    Server,
}

/// The external shape of a failed request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub category: ErrorCategory,
    /// Machine-readable error kind
    pub error: &'static str,
    /// Last stage the request reached
    pub stage: RequestStage,
    pub message: String,
    pub request_id: u64,
}

impl ErrorResponse {
    pub fn from_error(err: &ReportError, stage: RequestStage, request_id: u64) -> Self {
        let (status, error, message) = match err {
            ReportError::Validation(e) => (400, "validation", e.to_string()),
            ReportError::Layout(LayoutError::UnresolvedAsset(e)) => {
                (422, "asset_not_found", e.to_string())
            }
            ReportError::Layout(e) => (422, "layout", e.to_string()),
            ReportError::Render(e) => {
                error!("Request #{}: render failed: {}", request_id, e);
                (500, "render", "the document could not be rendered".to_string())
            }
            ReportError::Busy { .. } => (503, "busy", err.to_string()),
            ReportError::Cancelled => (500, "cancelled", err.to_string()),
            ReportError::WorkerLost => {
                error!("Request #{}: worker stopped without a result", request_id);
                (500, "internal", "the report could not be produced".to_string())
            }
        };
        let category = if status < 500 {
            ErrorCategory::Client
        } else {
            ErrorCategory::Server
        };
        Self {
            status,
            category,
            error,
            stage,
            message,
            request_id,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.category == ErrorCategory::Client
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"status\":{},\"error\":\"{}\"}}",
                self.status, self.error
            )
        })
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.status, self.error, self.message)
    }
}

type Outcome = Result<RenderedDocument, ErrorResponse>;

/// Releases a queue slot when the worker is done with it
struct SlotGuard(Arc<AtomicUsize>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A submitted request. Dropping it before the result arrives cancels the
/// work at the next stage boundary.
pub struct PendingReport {
    id: u64,
    receiver: Receiver<Outcome>,
    cancel: Arc<AtomicBool>,
}

impl PendingReport {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the worker answers
    pub fn wait(self) -> Outcome {
        match self.receiver.recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(ErrorResponse::from_error(
                &ReportError::WorkerLost,
                RequestStage::Received,
                self.id,
            )),
        }
    }

    pub fn cancel(self) {
        self.cancel.store(true, Ordering::Relaxed);
        debug!("Request #{}: cancelled by caller", self.id);
    }
}

impl Drop for PendingReport {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

pub struct ReportService {
    context: Arc<RenderContext>,
    pool: ThreadPool,
    in_flight: Arc<AtomicUsize>,
    queue_depth: usize,
    next_id: AtomicU64,
}

impl ReportService {
    /// `workers == 0` uses one thread per CPU
    pub fn new(context: RenderContext, workers: usize, queue_depth: usize) -> Result<Self, StartupError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("report-worker-{}", index))
            .panic_handler(|_| error!("Report worker panicked"))
            .build()
            .map_err(|e| StartupError::WorkerPool(e.to_string()))?;
        info!(
            "Report service started: {} workers, queue depth {}",
            pool.current_num_threads(),
            queue_depth
        );
        Ok(Self {
            context: Arc::new(context),
            pool,
            in_flight: Arc::new(AtomicUsize::new(0)),
            queue_depth: queue_depth.max(1),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, StartupError> {
        let context = RenderContext::from_config(config)?;
        Self::new(context, config.workers, config.queue_depth)
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Queue a request. Fails immediately with `503 busy` when `queue_depth`
    /// requests are already queued or running.
    pub fn submit(&self, payload: Vec<u8>) -> Result<PendingReport, ErrorResponse> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let depth = self.queue_depth;
        if let Err(in_flight) =
            self.in_flight
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    (n < depth).then_some(n + 1)
                })
        {
            let err = ReportError::Busy { in_flight };
            let stage = RequestTracker::new(id).fail(&err);
            return Err(ErrorResponse::from_error(&err, stage, id));
        }
        let slot = SlotGuard(Arc::clone(&self.in_flight));

        let (sender, receiver) = bounded(1);
        let cancel = Arc::new(AtomicBool::new(false));
        let context = Arc::clone(&self.context);
        let worker_cancel = Arc::clone(&cancel);
        self.pool.spawn(move || {
            let mut tracker = RequestTracker::new(id);
            let result = context.run(&payload, &mut tracker, &worker_cancel);
            let outcome = tracker.conclude(result);
            // free the slot before the caller can observe the result
            drop(slot);
            if sender.send(outcome).is_err() {
                debug!("Request #{}: caller went away, result discarded", id);
            }
        });

        Ok(PendingReport {
            id,
            receiver,
            cancel,
        })
    }

    /// Submit and wait for the result
    pub fn handle_request(&self, payload: &[u8]) -> Outcome {
        self.submit(payload.to_vec())?.wait()
    }
}
