//! Single and batch compositing over a pluggable backend.
//!
//! A [`Compositor`] owns three things for its whole lifetime: the pixel
//! backend, the image fetcher (and with it the HTTP client), and a bounded
//! rayon pool. Nothing is process-global; dropping the compositor releases
//! the pool and the client.
//!
//! ## Batches
//!
//! [`Compositor::composite_batch`] fetches the design once, uploads it to the
//! backend once, and then runs one unit per `(mockup, area)` pair on the pool:
//!
//! ```text
//! fetch mockup → resolve placement → transform design → blend → encode
//! ```
//!
//! A failing unit (bad URL, bad geometry, encoder error, even a panic)
//! becomes a failed [`CompositeResult`] and its siblings carry on. Results
//! come back in input order.

use crate::config::{CompositorConfig, effective_concurrency};
use crate::fetch::{HttpFetcher, ImageFetcher, LoadError};
use crate::imaging::{
    CompositeBackend, EncodeError, EncodeParams, GeometryError, Layer, composite_area,
    composite_layers, composite_onto, encode, validate_area,
};
use crate::types::{BatchJob, CompositeOptions, DesignArea};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompositeError {
    #[error("image load failed: {0}")]
    Load(#[from] LoadError),
    #[error("invalid geometry: {0}")]
    Geometry(#[from] GeometryError),
    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("compositor setup failed: {0}")]
    Setup(String),
    #[error("unit panicked: {0}")]
    Panicked(String),
}

/// Outcome of one batch unit.
#[derive(Debug)]
pub struct CompositeResult {
    /// Position of the unit in the request.
    pub index: usize,
    pub mockup: String,
    /// Encoded image bytes, or why the unit failed.
    pub outcome: Result<Vec<u8>, CompositeError>,
}

impl CompositeResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// All unit results of a batch, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<CompositeResult>,
    pub succeeded: usize,
}

impl BatchReport {
    fn from_results(results: Vec<CompositeResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        Self { results, succeeded }
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded
    }
}

/// Progress notifications sent while a batch runs.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// The shared design was fetched and decoded.
    DesignLoaded {
        reference: String,
        width: u32,
        height: u32,
    },
    /// One unit completed, successfully or not.
    UnitFinished {
        index: usize,
        mockup: String,
        ok: bool,
        error: Option<String>,
        bytes: usize,
    },
}

impl BatchEvent {
    fn finished(result: &CompositeResult) -> Self {
        let (ok, error, bytes) = match &result.outcome {
            Ok(bytes) => (true, None, bytes.len()),
            Err(e) => (false, Some(e.to_string()), 0),
        };
        BatchEvent::UnitFinished {
            index: result.index,
            mockup: result.mockup.clone(),
            ok,
            error,
            bytes,
        }
    }
}

/// Compositing engine: backend + fetcher + worker pool.
pub struct Compositor<B: CompositeBackend, F: ImageFetcher = HttpFetcher> {
    backend: B,
    fetcher: F,
    pool: ThreadPool,
}

impl<B: CompositeBackend> Compositor<B, HttpFetcher> {
    /// Build a compositor with an HTTP fetcher and pool sized from `config`.
    pub fn from_config(backend: B, config: &CompositorConfig) -> Result<Self, CompositeError> {
        let fetcher = HttpFetcher::new(&config.fetch)
            .map_err(|e| CompositeError::Setup(format!("HTTP client: {e}")))?;
        Self::new(backend, fetcher, config.batch.concurrency)
    }
}

impl<B: CompositeBackend, F: ImageFetcher> Compositor<B, F> {
    /// `concurrency` of `None` sizes the pool automatically; see
    /// [`effective_concurrency`].
    pub fn new(backend: B, fetcher: F, concurrency: Option<usize>) -> Result<Self, CompositeError> {
        let pool = build_pool(effective_concurrency(concurrency))?;
        Ok(Self {
            backend,
            fetcher,
            pool,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Worker count of the owned pool.
    pub fn concurrency(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Composite one design onto one mockup and encode the result.
    ///
    /// Geometry is checked before anything is fetched. Both images are
    /// fetched concurrently.
    pub fn composite(
        &self,
        mockup: &str,
        design: &str,
        area: &DesignArea,
        options: &CompositeOptions,
    ) -> Result<Vec<u8>, CompositeError> {
        validate_area(area)?;
        let (base, overlay) = self.pool.install(|| {
            rayon::join(|| self.fetcher.fetch(mockup), || self.fetcher.fetch(design))
        });
        let (base, overlay) = (base?, overlay?);

        let image = self
            .pool
            .install(|| composite_area(&self.backend, &base, &overlay, area, options))?;
        Ok(encode(&image, &EncodeParams::from(options))?)
    }

    /// Stack several designs onto one mockup, in order.
    pub fn composite_layers(
        &self,
        mockup: &str,
        layers: &[(String, DesignArea)],
        options: &CompositeOptions,
    ) -> Result<Vec<u8>, CompositeError> {
        for (_, area) in layers {
            validate_area(area)?;
        }
        let base = self.fetcher.fetch(mockup)?;
        let designs = self.pool.install(|| {
            layers
                .par_iter()
                .map(|(reference, _)| self.fetcher.fetch(reference))
                .collect::<Result<Vec<_>, _>>()
        })?;

        let stack: Vec<Layer<'_>> = designs
            .iter()
            .zip(layers)
            .map(|(image, (_, area))| Layer { image, area: *area })
            .collect();
        let image = self
            .pool
            .install(|| composite_layers(&self.backend, &base, &stack, options))?;
        Ok(encode(&image, &EncodeParams::from(options))?)
    }

    /// Composite `design` onto every mockup, one area per mockup.
    ///
    /// Request-level problems (mismatched lengths, empty design reference)
    /// are returned as `Err` before any work starts. Everything that goes
    /// wrong inside a unit is reported in that unit's result.
    pub fn composite_batch(
        &self,
        mockups: &[String],
        design: &str,
        areas: &[DesignArea],
        options: &CompositeOptions,
        events: Option<Sender<BatchEvent>>,
    ) -> Result<BatchReport, CompositeError> {
        if mockups.len() != areas.len() {
            return Err(CompositeError::InvalidRequest(format!(
                "{} mockups but {} design areas",
                mockups.len(),
                areas.len()
            )));
        }
        if design.trim().is_empty() {
            return Err(CompositeError::InvalidRequest(
                "design reference is empty".into(),
            ));
        }
        if mockups.is_empty() {
            return Ok(BatchReport::default());
        }

        // Scoped pool for this call only; dropped when the batch returns.
        let scoped = match options.concurrency {
            Some(n) => Some(build_pool(effective_concurrency(Some(n)))?),
            None => None,
        };
        let pool = scoped.as_ref().unwrap_or(&self.pool);
        log::info!(
            "batch: {} units on {} workers ({} backend)",
            mockups.len(),
            pool.current_num_threads(),
            self.backend.name()
        );

        let design_image = match self.fetcher.fetch(design) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("batch: design unavailable, failing all units: {e}");
                let results: Vec<CompositeResult> = mockups
                    .iter()
                    .enumerate()
                    .map(|(index, mockup)| CompositeResult {
                        index,
                        mockup: mockup.clone(),
                        outcome: Err(CompositeError::Load(e.clone())),
                    })
                    .collect();
                if let Some(tx) = &events {
                    for result in &results {
                        tx.send(BatchEvent::finished(result)).ok();
                    }
                }
                return Ok(BatchReport::from_results(results));
            }
        };
        if let Some(tx) = &events {
            tx.send(BatchEvent::DesignLoaded {
                reference: design.to_string(),
                width: design_image.width(),
                height: design_image.height(),
            })
            .ok();
        }

        let results = pool.install(|| {
            let overlay = self.backend.upload(&design_image);
            mockups
                .par_iter()
                .zip(areas.par_iter())
                .enumerate()
                .map_with(events, |events, (index, (mockup, area))| {
                    let result = CompositeResult {
                        index,
                        mockup: mockup.clone(),
                        outcome: self.run_unit(mockup, &overlay, area, options),
                    };
                    if let Err(e) = &result.outcome {
                        log::warn!("unit {index} ({mockup}) failed: {e}");
                    }
                    if let Some(tx) = events {
                        tx.send(BatchEvent::finished(&result)).ok();
                    }
                    result
                })
                .collect::<Vec<_>>()
        });

        let report = BatchReport::from_results(results);
        log::info!(
            "batch: {} succeeded, {} failed",
            report.succeeded,
            report.failed()
        );
        Ok(report)
    }

    /// Run every unit of `job`.
    pub fn run_job(
        &self,
        job: &BatchJob,
        events: Option<Sender<BatchEvent>>,
    ) -> Result<BatchReport, CompositeError> {
        self.composite_batch(
            &job.mockups(),
            &job.design,
            &job.areas(),
            &job.options,
            events,
        )
    }

    /// One unit, with panics turned into failed outcomes.
    fn run_unit(
        &self,
        mockup: &str,
        overlay: &B::Buffer,
        area: &DesignArea,
        options: &CompositeOptions,
    ) -> Result<Vec<u8>, CompositeError> {
        panic::catch_unwind(AssertUnwindSafe(|| -> Result<Vec<u8>, CompositeError> {
            validate_area(area)?;
            let base = self.fetcher.fetch(mockup)?;
            let image = composite_onto(&self.backend, &base, overlay, area, options)?;
            Ok(encode(&image, &EncodeParams::from(options))?)
        }))
        .unwrap_or_else(|payload| Err(CompositeError::Panicked(panic_message(payload.as_ref()))))
    }
}

fn build_pool(threads: usize) -> Result<ThreadPool, CompositeError> {
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("mockup-press-{i}"))
        .build()
        .map_err(|e| CompositeError::Setup(format!("worker pool: {e}")))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::LoadReason;
    use crate::imaging::{SoftwareBackend, TensorBackend};
    use crate::test_helpers::{InMemoryFetcher, RED, WHITE, solid};
    use crate::types::{BatchUnit, OutputFormat};
    use std::sync::mpsc;

    fn compositor(fetcher: InMemoryFetcher) -> Compositor<SoftwareBackend, InMemoryFetcher> {
        Compositor::new(SoftwareBackend::new(), fetcher, Some(4)).unwrap()
    }

    fn stock_fetcher() -> InMemoryFetcher {
        InMemoryFetcher::new()
            .with_image("mockup-a", solid(80, 60, WHITE))
            .with_image("mockup-b", solid(40, 40, WHITE))
            .with_image("mockup-c", solid(100, 50, WHITE))
            .with_image("design", solid(20, 20, RED))
    }

    fn area() -> DesignArea {
        DesignArea::new(10.0, 10.0, 20.0, 20.0)
    }

    fn decode(bytes: &[u8]) -> image::RgbaImage {
        image::load_from_memory(bytes).unwrap().to_rgba8()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    // =========================================================================
    // Construction
    // =========================================================================

    #[test]
    fn pool_size_follows_request() {
        let c = Compositor::new(SoftwareBackend::new(), InMemoryFetcher::new(), Some(2)).unwrap();
        assert_eq!(c.concurrency(), 2);
        assert_eq!(c.backend().name(), "software");
    }

    #[test]
    fn from_config_builds_http_fetcher() {
        let c = Compositor::from_config(SoftwareBackend::new(), &CompositorConfig::default())
            .unwrap();
        assert!((4..=8).contains(&c.concurrency()));
    }

    // =========================================================================
    // composite
    // =========================================================================

    #[test]
    fn composite_returns_encoded_png() {
        let c = compositor(stock_fetcher());
        let bytes = c
            .composite("mockup-a", "design", &area(), &CompositeOptions::default())
            .unwrap();

        let out = decode(&bytes);
        assert_eq!(out.dimensions(), (80, 60));
        assert_eq!(*out.get_pixel(15, 15), RED);
        assert_eq!(*out.get_pixel(5, 5), WHITE);
    }

    #[test]
    fn composite_honours_jpeg_option() {
        let c = compositor(stock_fetcher());
        let options = CompositeOptions {
            output_format: OutputFormat::Jpeg,
            ..CompositeOptions::default()
        };
        let bytes = c.composite("mockup-a", "design", &area(), &options).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn composite_rejects_bad_area_before_fetching() {
        let c = compositor(stock_fetcher());
        let bad = DesignArea::new(0.0, 0.0, -1.0, 5.0);
        let err = c
            .composite("mockup-a", "design", &bad, &CompositeOptions::default())
            .unwrap_err();

        assert!(matches!(err, CompositeError::Geometry(_)));
        assert_eq!(c.fetcher.calls_for("mockup-a"), 0);
    }

    #[test]
    fn composite_propagates_load_error() {
        let c = compositor(stock_fetcher());
        let err = c
            .composite("missing", "design", &area(), &CompositeOptions::default())
            .unwrap_err();
        match err {
            CompositeError::Load(e) => assert_eq!(e.reason(), LoadReason::Network),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn composite_layers_stacks_in_order() {
        let fetcher = stock_fetcher().with_image("blue", solid(10, 10, image::Rgba([0, 0, 255, 255])));
        let c = compositor(fetcher);
        let layers = vec![
            ("design".to_string(), DesignArea::new(0.0, 0.0, 20.0, 20.0)),
            ("blue".to_string(), DesignArea::new(10.0, 10.0, 10.0, 10.0)),
        ];
        let out = decode(
            &c.composite_layers("mockup-b", &layers, &CompositeOptions::default())
                .unwrap(),
        );
        assert_eq!(*out.get_pixel(5, 5), RED);
        assert_eq!(*out.get_pixel(15, 15), image::Rgba([0, 0, 255, 255]));
        assert_eq!(*out.get_pixel(30, 30), WHITE);
    }

    // =========================================================================
    // composite_batch: request validation
    // =========================================================================

    #[test]
    fn batch_rejects_length_mismatch() {
        let c = compositor(stock_fetcher());
        let err = c
            .composite_batch(
                &strings(&["mockup-a", "mockup-b"]),
                "design",
                &[area()],
                &CompositeOptions::default(),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, CompositeError::InvalidRequest(_)));
    }

    #[test]
    fn batch_rejects_empty_design() {
        let c = compositor(stock_fetcher());
        let err = c
            .composite_batch(
                &strings(&["mockup-a"]),
                "  ",
                &[area()],
                &CompositeOptions::default(),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, CompositeError::InvalidRequest(_)));
    }

    #[test]
    fn empty_batch_does_no_work() {
        let c = compositor(stock_fetcher());
        let report = c
            .composite_batch(&[], "design", &[], &CompositeOptions::default(), None)
            .unwrap();
        assert!(report.results.is_empty());
        assert_eq!(report.succeeded, 0);
        assert_eq!(c.fetcher.calls_for("design"), 0);
    }

    // =========================================================================
    // composite_batch: execution
    // =========================================================================

    #[test]
    fn batch_isolates_failed_unit_and_keeps_order() {
        let c = compositor(stock_fetcher().with_failure("mockup-bad", LoadReason::Timeout));
        let mockups = strings(&["mockup-a", "mockup-bad", "mockup-c"]);
        let report = c
            .composite_batch(
                &mockups,
                "design",
                &[area(), area(), area()],
                &CompositeOptions::default(),
                None,
            )
            .unwrap();

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed(), 1);
        for (i, result) in report.results.iter().enumerate() {
            assert_eq!(result.index, i);
            assert_eq!(result.mockup, mockups[i]);
        }
        assert!(report.results[0].is_ok());
        assert!(matches!(
            &report.results[1].outcome,
            Err(CompositeError::Load(e)) if e.reason() == LoadReason::Timeout
        ));
        assert_eq!(decode(report.results[2].outcome.as_ref().unwrap()).dimensions(), (100, 50));
    }

    #[test]
    fn tensor_backend_batch_isolates_failure() {
        let fetcher = stock_fetcher().with_failure("mockup-bad", LoadReason::Network);
        let c = Compositor::new(TensorBackend::new(), fetcher, Some(4)).unwrap();
        let mockups = strings(&["mockup-a", "mockup-b", "mockup-bad", "mockup-c"]);
        let areas = vec![area().with_rotation(90.0).with_opacity(0.5); 4];
        let report = c
            .composite_batch(&mockups, "design", &areas, &CompositeOptions::default(), None)
            .unwrap();

        assert_eq!(report.results.len(), 4);
        assert_eq!(report.succeeded, 3);
        let indices: Vec<usize> = report.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(matches!(
            &report.results[2].outcome,
            Err(CompositeError::Load(e)) if e.reason() == LoadReason::Network
        ));

        // Half-opacity red over white.
        let out = decode(report.results[1].outcome.as_ref().unwrap());
        assert_eq!(out.dimensions(), (40, 40));
        let p = out.get_pixel(20, 20);
        assert!(p[0] == 255 && (126..=129).contains(&p[1]) && p[1] == p[2], "{p:?}");
        assert_eq!(p[3], 255);
        assert_eq!(*out.get_pixel(2, 2), WHITE);
    }

    #[test]
    fn batch_fetches_design_once() {
        let c = compositor(stock_fetcher());
        c.composite_batch(
            &strings(&["mockup-a", "mockup-b", "mockup-c", "mockup-a"]),
            "design",
            &[area(); 4],
            &CompositeOptions::default(),
            None,
        )
        .unwrap();
        assert_eq!(c.fetcher.calls_for("design"), 1);
        assert_eq!(c.fetcher.calls_for("mockup-a"), 2);
    }

    #[test]
    fn batch_reports_bad_geometry_per_unit() {
        let c = compositor(stock_fetcher());
        let report = c
            .composite_batch(
                &strings(&["mockup-a", "mockup-b"]),
                "design",
                &[DesignArea::new(0.0, 0.0, 0.0, 0.0), area()],
                &CompositeOptions::default(),
                None,
            )
            .unwrap();
        assert!(matches!(
            report.results[0].outcome,
            Err(CompositeError::Geometry(_))
        ));
        assert!(report.results[1].is_ok());
        assert_eq!(c.fetcher.calls_for("mockup-a"), 0);
    }

    #[test]
    fn batch_survives_panicking_unit() {
        let c = compositor(stock_fetcher().with_panic("mockup-boom"));
        let report = c
            .composite_batch(
                &strings(&["mockup-a", "mockup-boom", "mockup-b"]),
                "design",
                &[area(); 3],
                &CompositeOptions::default(),
                None,
            )
            .unwrap();

        assert_eq!(report.succeeded, 2);
        match &report.results[1].outcome {
            Err(CompositeError::Panicked(msg)) => assert!(msg.contains("mockup-boom")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unavailable_design_fails_every_unit() {
        let c = compositor(stock_fetcher().with_failure("bad-design", LoadReason::Decode));
        let report = c
            .composite_batch(
                &strings(&["mockup-a", "mockup-b"]),
                "bad-design",
                &[area(), area()],
                &CompositeOptions::default(),
                None,
            )
            .unwrap();

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.succeeded, 0);
        assert!(report.results.iter().all(|r| matches!(
            &r.outcome,
            Err(CompositeError::Load(e)) if e.reason() == LoadReason::Decode
        )));
        assert_eq!(c.fetcher.calls_for("mockup-a"), 0);
    }

    #[test]
    fn per_call_concurrency_uses_scoped_pool() {
        let c = compositor(stock_fetcher());
        let options = CompositeOptions {
            concurrency: Some(1),
            ..CompositeOptions::default()
        };
        let report = c
            .composite_batch(
                &strings(&["mockup-c", "mockup-b", "mockup-a"]),
                "design",
                &[area(); 3],
                &options,
                None,
            )
            .unwrap();
        assert_eq!(report.succeeded, 3);
        let sizes: Vec<_> = report
            .results
            .iter()
            .map(|r| decode(r.outcome.as_ref().unwrap()).dimensions())
            .collect();
        assert_eq!(sizes, vec![(100, 50), (40, 40), (80, 60)]);
    }

    #[test]
    fn batch_emits_progress_events() {
        let c = compositor(stock_fetcher());
        let (tx, rx) = mpsc::channel();
        c.composite_batch(
            &strings(&["mockup-a", "missing"]),
            "design",
            &[area(), area()],
            &CompositeOptions::default(),
            Some(tx),
        )
        .unwrap();

        let events: Vec<BatchEvent> = rx.into_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0],
            BatchEvent::DesignLoaded { width: 20, height: 20, .. }
        ));
        let failed: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, BatchEvent::UnitFinished { ok: false, .. }))
            .collect();
        assert_eq!(failed.len(), 1);
        assert!(matches!(
            failed[0],
            BatchEvent::UnitFinished { index: 1, error: Some(_), bytes: 0, .. }
        ));
    }

    #[test]
    fn run_job_covers_all_units() {
        let c = compositor(stock_fetcher());
        let job = BatchJob {
            design: "design".into(),
            units: vec![
                BatchUnit {
                    mockup: "mockup-a".into(),
                    area: area(),
                },
                BatchUnit {
                    mockup: "mockup-b".into(),
                    area: area().centered(),
                },
            ],
            options: CompositeOptions::default(),
        };
        let report = c.run_job(&job, None).unwrap();
        assert_eq!(report.succeeded, 2);
    }
}
