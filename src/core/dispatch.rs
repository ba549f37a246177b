//! Per-line parallel dispatch of pixel inversions
//!
//! Each scan line is cut into contiguous column ranges, one per worker. A
//! worker owns the `ChunkResult` for its range exclusively and hands it back
//! when it finishes; once every worker of the line has joined, the chunks are
//! merged into the line buffers and the line is passed to the sink.

use crate::core::design::NetworkDesign;
use crate::core::jackknife::{JackknifeEstimator, JackknifeSummary};
use crate::core::reduction::{reduce_pixel, SkipReason};
use crate::io::stack::{LineSink, LineSource};
use crate::io::weights::EpochWeights;
use crate::types::{InversionConfig, Matrix, NsbasError, NsbasResult, NO_DATA};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use std::ops::Range;

/// Split `width` columns into `min(workers, width)` contiguous ranges
///
/// Range `k` starts at `floor(k * width / n)`, so the ranges cover
/// `[0, width)` exactly with no overlap.
pub fn partition(width: usize, workers: usize) -> Vec<Range<usize>> {
    let n = workers.min(width);
    (0..n)
        .map(|k| (k * width / n)..((k + 1) * width / n))
        .collect()
}

/// Progress of one scan line through the dispatch layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    NotStarted,
    Dispatched,
    AllWorkersJoined,
    Written,
}

impl LineState {
    /// Move to the next state of the line
    pub fn advance(self, line: usize) -> LineState {
        let next = match self {
            LineState::NotStarted => LineState::Dispatched,
            LineState::Dispatched => LineState::AllWorkersJoined,
            LineState::AllWorkersJoined | LineState::Written => LineState::Written,
        };
        log::trace!("Line {}: {:?} -> {:?}", line, self, next);
        next
    }
}

/// Result of inverting a single pixel
#[derive(Debug, Clone)]
pub enum PixelOutcome {
    /// Pixel left at no-data
    Skipped(SkipReason),
    /// Pixel inverted from `ifg_count` interferograms
    Estimated {
        ifg_count: usize,
        summary: JackknifeSummary,
    },
}

/// Per-line output buffers (columns x parameters)
#[derive(Debug, Clone)]
pub struct LineBuffers {
    pub params: Matrix,
    pub errors: Matrix,
    pub counts: Array1<usize>,
}

impl LineBuffers {
    pub fn new(width: usize, num_params: usize) -> Self {
        Self {
            params: Array2::from_elem((width, num_params), NO_DATA),
            errors: Array2::from_elem((width, num_params), NO_DATA),
            counts: Array1::zeros(width),
        }
    }

    pub fn width(&self) -> usize {
        self.counts.len()
    }

    pub fn num_params(&self) -> usize {
        self.params.ncols()
    }

    /// Restore the no-data sentinel everywhere
    pub fn reset(&mut self) {
        self.params.fill(NO_DATA);
        self.errors.fill(NO_DATA);
        self.counts.fill(0);
    }

    fn merge(&mut self, chunk: &ChunkResult) {
        let range = chunk.range.clone();
        self.params.slice_mut(s![range.clone(), ..]).assign(&chunk.params);
        self.errors.slice_mut(s![range.clone(), ..]).assign(&chunk.errors);
        self.counts.slice_mut(s![range]).assign(&chunk.counts);
    }
}

/// Output of one worker for its column range
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub range: Range<usize>,
    pub params: Matrix,
    pub errors: Matrix,
    pub counts: Array1<usize>,
    pub skipped: usize,
}

impl ChunkResult {
    fn new(range: Range<usize>, num_params: usize) -> Self {
        let len = range.len();
        Self {
            range,
            params: Array2::from_elem((len, num_params), NO_DATA),
            errors: Array2::from_elem((len, num_params), NO_DATA),
            counts: Array1::zeros(len),
            skipped: 0,
        }
    }
}

/// Runs reduction and jackknife for single pixels against shared, read-only inputs
#[derive(Debug, Clone, Copy)]
pub struct PixelInverter<'a> {
    design: &'a NetworkDesign,
    weights: &'a EpochWeights,
    min_valid: usize,
    estimator: JackknifeEstimator,
}

impl<'a> PixelInverter<'a> {
    /// Fails when there is not exactly one weight per epoch
    pub fn new(
        design: &'a NetworkDesign,
        weights: &'a EpochWeights,
        config: &InversionConfig,
    ) -> NsbasResult<Self> {
        if weights.len() != design.num_epochs() {
            return Err(NsbasError::Config(format!(
                "Expected {} epoch weights, got {}",
                design.num_epochs(),
                weights.len()
            )));
        }
        Ok(Self {
            design,
            weights,
            min_valid: config.min_valid,
            estimator: JackknifeEstimator::from_config(config),
        })
    }

    pub fn invert(&self, obs: ArrayView1<f64>) -> PixelOutcome {
        match reduce_pixel(self.design, obs, self.min_valid) {
            Err(reason) => PixelOutcome::Skipped(reason),
            Ok(problem) => {
                let summary = self
                    .estimator
                    .estimate(self.design, &problem, self.weights.view(), obs);
                PixelOutcome::Estimated {
                    ifg_count: problem.num_observations(),
                    summary,
                }
            }
        }
    }

    /// Invert the pixels of `range`; `data` holds the whole line (interferograms x columns)
    fn invert_chunk(&self, data: ArrayView2<f64>, range: Range<usize>) -> ChunkResult {
        let mut chunk = ChunkResult::new(range.clone(), self.design.num_params());
        for (offset, column) in range.enumerate() {
            match self.invert(data.column(column)) {
                PixelOutcome::Skipped(_) => chunk.skipped += 1,
                PixelOutcome::Estimated { ifg_count, summary } => {
                    chunk.params.row_mut(offset).assign(&summary.mean);
                    chunk.errors.row_mut(offset).assign(&summary.std);
                    chunk.counts[offset] = ifg_count;
                }
            }
        }
        chunk
    }
}

/// Totals of a completed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub lines: usize,
    pub pixels_inverted: usize,
    pub pixels_skipped: usize,
}

/// Worker threads for lines of one width, at most one per column
struct WorkerPool {
    threads: usize,
    #[cfg(feature = "parallel")]
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    fn new(workers: usize, width: usize) -> NsbasResult<Self> {
        let threads = workers.min(width).max(1);

        #[cfg(feature = "parallel")]
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("nsbas-worker-{}", i))
            .build()
            .map_err(|e| {
                NsbasError::Processing(format!("Failed to start {} workers: {}", threads, e))
            })?;

        Ok(Self {
            threads,
            #[cfg(feature = "parallel")]
            pool,
        })
    }

    fn threads(&self) -> usize {
        self.threads
    }
}

/// Line-by-line driver distributing pixels over a fixed set of workers
///
/// Worker threads are started per run, sized to the line width.
pub struct NsbasInverter {
    design: NetworkDesign,
    weights: EpochWeights,
    config: InversionConfig,
}

impl NsbasInverter {
    pub fn new(design: NetworkDesign, weights: EpochWeights, config: InversionConfig) -> NsbasResult<Self> {
        config.validate()?;
        PixelInverter::new(&design, &weights, &config)?;

        Ok(Self {
            design,
            weights,
            config,
        })
    }

    pub fn design(&self) -> &NetworkDesign {
        &self.design
    }

    pub fn config(&self) -> &InversionConfig {
        &self.config
    }

    fn pixel_inverter(&self) -> NsbasResult<PixelInverter<'_>> {
        PixelInverter::new(&self.design, &self.weights, &self.config)
    }

    /// Run every worker of one line and wait for all of them
    #[cfg(feature = "parallel")]
    fn run_workers(
        &self,
        workers: &WorkerPool,
        line: usize,
        data: ArrayView2<f64>,
        ranges: Vec<Range<usize>>,
    ) -> NsbasResult<Vec<ChunkResult>> {
        use rayon::prelude::*;

        let inverter = self.pixel_inverter()?;
        workers.pool.install(|| {
            ranges
                .into_par_iter()
                .enumerate()
                .map(|(chunk, range)| guarded_chunk(&inverter, data, line, chunk, range))
                .collect()
        })
    }

    #[cfg(not(feature = "parallel"))]
    fn run_workers(
        &self,
        _workers: &WorkerPool,
        line: usize,
        data: ArrayView2<f64>,
        ranges: Vec<Range<usize>>,
    ) -> NsbasResult<Vec<ChunkResult>> {
        let inverter = self.pixel_inverter()?;
        ranges
            .into_iter()
            .enumerate()
            .map(|(chunk, range)| guarded_chunk(&inverter, data, line, chunk, range))
            .collect()
    }

    /// Invert one line of observations (interferograms x columns) into `buffers`
    ///
    /// The buffers are reset first. Returns the number of skipped pixels.
    pub fn invert_line(
        &self,
        line: usize,
        data: ArrayView2<f64>,
        buffers: &mut LineBuffers,
    ) -> NsbasResult<usize> {
        let workers = WorkerPool::new(self.config.workers, data.ncols())?;
        self.invert_line_with(&workers, line, data, buffers)
    }

    fn invert_line_with(
        &self,
        workers: &WorkerPool,
        line: usize,
        data: ArrayView2<f64>,
        buffers: &mut LineBuffers,
    ) -> NsbasResult<usize> {
        let (num_ifg, width) = data.dim();
        if num_ifg != self.design.num_interferograms() {
            return Err(NsbasError::InvalidFormat(format!(
                "Line {} has {} interferograms, network has {}",
                line,
                num_ifg,
                self.design.num_interferograms()
            )));
        }
        if buffers.width() != width || buffers.num_params() != self.design.num_params() {
            return Err(NsbasError::Processing(format!(
                "Line buffers of width {} do not match line width {}",
                buffers.width(),
                width
            )));
        }

        buffers.reset();
        let ranges = partition(width, self.config.workers);
        log::trace!("Line {}: {} chunks over {} columns", line, ranges.len(), width);
        let chunks = self.run_workers(workers, line, data, ranges)?;

        let mut skipped = 0;
        for chunk in &chunks {
            buffers.merge(chunk);
            skipped += chunk.skipped;
        }
        Ok(skipped)
    }

    /// Invert every line of `source`, writing each completed line to `sink`
    pub fn run<S: LineSource, K: LineSink>(&self, source: &mut S, sink: &mut K) -> NsbasResult<RunSummary> {
        let (num_ifg, lines, width) = source.dims();
        if num_ifg != self.design.num_interferograms() {
            return Err(NsbasError::InvalidFormat(format!(
                "Stack has {} interferograms, network has {}",
                num_ifg,
                self.design.num_interferograms()
            )));
        }

        let workers = WorkerPool::new(self.config.workers, width)?;
        log::info!("Number of parallel workers: {}", workers.threads());
        log::info!("Relative weight of polynomial constraint: {:e}", self.config.gamma);

        let mut buffers = LineBuffers::new(width, self.design.num_params());
        let mut summary = RunSummary::default();
        let report_every = (lines / 20).max(1);

        for line in 0..lines {
            let state = LineState::NotStarted.advance(line);
            let data = source.read_line(line)?;
            let skipped = self.invert_line_with(&workers, line, data.view(), &mut buffers)?;
            let state = state.advance(line);
            sink.write_line(line, &buffers)?;
            let state = state.advance(line);
            debug_assert_eq!(state, LineState::Written);

            summary.lines += 1;
            summary.pixels_skipped += skipped;
            summary.pixels_inverted += width - skipped;
            log::debug!("Line {}: {} of {} pixels skipped", line, skipped, width);

            if skipped == width && width > 0 {
                log::warn!("No pixel of line {} could be inverted", line);
            }
            if (line + 1) % report_every == 0 || line + 1 == lines {
                log::info!("Processed line {}/{}", line + 1, lines);
            }
        }

        log::info!(
            "Inverted {} pixels, skipped {} over {} lines",
            summary.pixels_inverted,
            summary.pixels_skipped,
            summary.lines
        );
        Ok(summary)
    }
}

/// Run one worker, turning a panic into a run-level error
fn guarded_chunk(
    inverter: &PixelInverter<'_>,
    data: ArrayView2<f64>,
    line: usize,
    chunk: usize,
    range: Range<usize>,
) -> NsbasResult<ChunkResult> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| inverter.invert_chunk(data, range)))
        .map_err(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked".to_string());
            NsbasError::Worker {
                line,
                chunk,
                message,
            }
        })
}
