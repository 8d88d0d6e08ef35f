//! The motion detector: stages, throttling, and result delivery.
//!
//! Frames are pushed in by a single producer through
//! [`MotionDetector::process_frame`], which runs the whole pipeline
//! synchronously on the caller's thread:
//!
//! ```text
//! frame ─▶ LowPassFilter ─▶ FrameDifference(frame, average) ─▶ AverageColorReducer ─▶ handler
//! ```
//!
//! Configuration, the handler slot, the error sink, and the stage state all
//! sit behind one mutex shared with the control side, so a strength or
//! interval change never lands halfway through a frame. Handlers and the
//! error sink are called after that lock is released; they may reconfigure
//! the detector from inside the callback. [`MotionDetector::teardown`],
//! [`MotionDetector::clear_handler`] and [`HandlerRegistration::cancel`]
//! wait for callbacks already in flight on other threads before returning.

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use framewatch_common::clock::{SampleThrottle, TimestampNs};
use framewatch_common::config::{
    validate_unit, DetectorDefaults, DifferenceMetric, IntensityMode, SkipPolicy,
};
use framewatch_common::error::{FramewatchError, FramewatchResult};
use framewatch_frame_model::frame::{Dimensions, Frame};
use framewatch_frame_model::motion::MotionResult;
use framewatch_frame_model::source::FrameSource;

use crate::average_color::AverageColorReducer;
use crate::frame_difference::FrameDifference;
use crate::low_pass::{LowPassFilter, DEFAULT_STRENGTH};
use crate::stage::FrameStage;

type MotionHandler = Arc<dyn Fn(&MotionResult) + Send + Sync>;
type ErrorSink = Arc<dyn Fn(&FramewatchError) + Send + Sync>;

thread_local! {
    /// Detectors whose callbacks are running on this thread, innermost last.
    static DISPATCHING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Lifecycle of a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// No handler has ever been registered. Frames still update state.
    Idle,
    /// A handler has been registered; results are delivered while one is present.
    Armed,
    /// A configuration error stopped processing until [`MotionDetector::reset`].
    Paused,
    /// Terminal. Buffers are released and every call is a no-op or an error.
    TornDown,
}

/// What happened to one frame handed to [`MotionDetector::process_frame`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// Sampled, and the result went to the registered handler.
    Delivered(MotionResult),
    /// Sampled, but no handler was registered.
    Processed(MotionResult),
    /// Inside the sample interval of the previous sample.
    Skipped,
    /// Malformed or out-of-order frame; state left unchanged.
    Dropped,
    /// The detector is paused after a configuration error.
    Paused,
    /// The detector has been torn down.
    TornDown,
}

impl FrameOutcome {
    /// The motion result, if this frame was sampled.
    pub fn result(&self) -> Option<&MotionResult> {
        match self {
            FrameOutcome::Delivered(result) | FrameOutcome::Processed(result) => Some(result),
            _ => None,
        }
    }
}

/// Runtime counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectorStats {
    /// Frames accepted for processing (not paused or torn down).
    pub frames_received: u64,
    /// Frames that went through the full pipeline.
    pub frames_sampled: u64,
    /// Frames inside a sample interval.
    pub frames_skipped: u64,
    /// Malformed or out-of-order frames.
    pub frames_dropped: u64,
    /// Results handed to a handler.
    pub results_delivered: u64,
    /// Configuration errors that paused the detector.
    pub configuration_errors: u64,
}

/// Everything a caller can tune on a detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    /// Low-pass blend weight in `[0.0, 1.0]`.
    pub strength: f64,
    /// Minimum spacing between sampled frames. Zero samples every frame.
    pub sample_interval: Duration,
    pub metric: DifferenceMetric,
    pub noise_threshold: f64,
    pub intensity_mode: IntensityMode,
    pub skip_policy: SkipPolicy,
    /// When set, frames of any other size are a configuration error.
    pub expected_dimensions: Option<Dimensions>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            strength: DEFAULT_STRENGTH,
            sample_interval: Duration::ZERO,
            metric: DifferenceMetric::default(),
            noise_threshold: 0.0,
            intensity_mode: IntensityMode::default(),
            skip_policy: SkipPolicy::default(),
            expected_dimensions: None,
        }
    }
}

impl DetectorSettings {
    /// Build settings from persisted defaults.
    pub fn from_defaults(defaults: &DetectorDefaults) -> FramewatchResult<Self> {
        let settings = Self {
            strength: defaults.strength,
            sample_interval: defaults.sample_interval(),
            metric: defaults.metric,
            noise_threshold: defaults.noise_threshold,
            intensity_mode: defaults.intensity_mode,
            skip_policy: defaults.skip_policy,
            expected_dimensions: None,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> FramewatchResult<()> {
        validate_unit("low-pass strength", self.strength)?;
        validate_unit("noise threshold", self.noise_threshold)?;
        if let Some(dims) = self.expected_dimensions {
            if dims.is_empty() {
                return Err(FramewatchError::configuration(format!(
                    "expected dimensions {dims} are empty"
                )));
            }
        }
        Ok(())
    }
}

/// The three stages, owned together so teardown drops them at once.
struct Stages {
    low_pass: LowPassFilter,
    difference: FrameDifference,
    reducer: AverageColorReducer,
}

impl Stages {
    fn new(settings: &DetectorSettings) -> FramewatchResult<Self> {
        let mut difference = FrameDifference::new(settings.metric);
        difference.set_noise_threshold(settings.noise_threshold)?;
        Ok(Self {
            low_pass: LowPassFilter::new(settings.strength)?,
            difference,
            reducer: AverageColorReducer::new(settings.intensity_mode),
        })
    }

    fn apply(&mut self, settings: &DetectorSettings) -> FramewatchResult<()> {
        self.low_pass.set_strength(settings.strength)?;
        self.difference.set_metric(settings.metric);
        self.difference.set_noise_threshold(settings.noise_threshold)?;
        self.reducer.set_mode(settings.intensity_mode);
        Ok(())
    }

    /// Run one frame through all three stages.
    fn evaluate(&mut self, frame: &Frame) -> FramewatchResult<MotionResult> {
        let average = self.low_pass.consume(frame)?;
        let diff = self.difference.compare(frame, average)?;
        let reduction = self.reducer.reduce(&diff);
        Ok(MotionResult {
            centroid: reduction.centroid,
            intensity: reduction.intensity,
            timestamp_ns: frame.timestamp_ns,
        })
    }

    fn reset(&mut self) {
        let stages: [&mut dyn FrameStage; 3] =
            [&mut self.low_pass, &mut self.difference, &mut self.reducer];
        for stage in stages {
            stage.reset();
            tracing::trace!(stage = stage.name(), "Stage reset");
        }
    }
}

/// Work left for after the lock is released.
enum Dispatch {
    Result(MotionHandler, MotionResult),
    Error(ErrorSink, FramewatchError),
}

struct Inner {
    settings: DetectorSettings,
    /// `None` once torn down.
    stages: Option<Stages>,
    throttle: SampleThrottle,
    last_timestamp_ns: Option<TimestampNs>,
    handler: Option<(u64, MotionHandler)>,
    next_handler_id: u64,
    error_sink: Option<ErrorSink>,
    has_been_armed: bool,
    state: DetectorState,
    stats: DetectorStats,
    /// Callbacks handed out by `process` that have not returned yet.
    in_flight: usize,
}

struct Shared {
    inner: Mutex<Inner>,
    /// Signalled each time a callback returns.
    dispatch_done: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Callbacks never run under the lock, so poisoning can only come
        // from a bug in the stages themselves; the state is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(&self) -> usize {
        self as *const Shared as usize
    }

    /// Block until every callback in flight has returned, except those
    /// running further up this thread's own stack.
    fn wait_for_dispatch<'a>(
        &'a self,
        mut inner: MutexGuard<'a, Inner>,
    ) -> MutexGuard<'a, Inner> {
        let key = self.key();
        let own = DISPATCHING.with(|d| d.borrow().iter().filter(|&&k| k == key).count());
        while inner.in_flight > own {
            inner = self
                .dispatch_done
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        inner
    }

    /// Run a callback outside the lock and mark it finished.
    fn dispatch(&self, dispatch: Dispatch) {
        let key = self.key();
        DISPATCHING.with(|d| d.borrow_mut().push(key));
        match dispatch {
            Dispatch::Result(handler, result) => {
                let call = panic::catch_unwind(AssertUnwindSafe(|| handler(&result)));
                if call.is_err() {
                    tracing::error!(t = result.timestamp_ns, "Motion handler panicked");
                }
            }
            Dispatch::Error(sink, error) => {
                let call = panic::catch_unwind(AssertUnwindSafe(|| sink(&error)));
                if call.is_err() {
                    tracing::error!("Error sink panicked");
                }
            }
        }
        DISPATCHING.with(|d| {
            d.borrow_mut().pop();
        });

        let mut inner = self.lock();
        inner.in_flight -= 1;
        drop(inner);
        self.dispatch_done.notify_all();
    }
}

impl Inner {
    fn ensure_live(&self) -> FramewatchResult<()> {
        if self.state == DetectorState::TornDown {
            Err(FramewatchError::TornDown)
        } else {
            Ok(())
        }
    }

    fn stages_mut(&mut self) -> FramewatchResult<&mut Stages> {
        self.stages.as_mut().ok_or(FramewatchError::TornDown)
    }

    fn process(&mut self, frame: &Frame) -> (FrameOutcome, Option<Dispatch>) {
        match self.state {
            DetectorState::TornDown => return (FrameOutcome::TornDown, None),
            DetectorState::Paused => return (FrameOutcome::Paused, None),
            DetectorState::Idle | DetectorState::Armed => {}
        }
        self.stats.frames_received += 1;

        if let Err(e) = frame.validate() {
            return self.fail(e);
        }
        if let Some(last) = self.last_timestamp_ns {
            if frame.timestamp_ns < last {
                return self.fail(FramewatchError::transient_frame(format!(
                    "frame at {}ns arrived after frame at {}ns",
                    frame.timestamp_ns, last
                )));
            }
        }
        self.last_timestamp_ns = Some(frame.timestamp_ns);

        if let Some(expected) = self.settings.expected_dimensions {
            if frame.dimensions != expected {
                return self.fail(FramewatchError::configuration(format!(
                    "frame dimensions {} do not match configured {}",
                    frame.dimensions, expected
                )));
            }
        }

        if !self.throttle.should_sample(frame.timestamp_ns) {
            self.stats.frames_skipped += 1;
            if self.settings.skip_policy == SkipPolicy::TrackBaseline {
                let tracked = match self.stages.as_mut() {
                    Some(stages) => stages.low_pass.consume(frame).map(|_| ()),
                    None => Err(FramewatchError::TornDown),
                };
                if let Err(e) = tracked {
                    return self.fail(e);
                }
            }
            return (FrameOutcome::Skipped, None);
        }

        let evaluated = match self.stages.as_mut() {
            Some(stages) => stages.evaluate(frame),
            None => Err(FramewatchError::TornDown),
        };
        let result = match evaluated {
            Ok(result) => result,
            Err(e) => return self.fail(e),
        };
        self.stats.frames_sampled += 1;

        tracing::debug!(
            t = result.timestamp_ns,
            x = result.centroid.x,
            y = result.centroid.y,
            intensity = result.intensity,
            "Motion sampled"
        );

        match &self.handler {
            Some((_, handler)) => {
                self.stats.results_delivered += 1;
                (
                    FrameOutcome::Delivered(result),
                    Some(Dispatch::Result(Arc::clone(handler), result)),
                )
            }
            None => (FrameOutcome::Processed(result), None),
        }
    }

    /// Route a stage error: configuration errors pause the detector and go
    /// to the error sink once; anything else drops just this frame.
    fn fail(&mut self, error: FramewatchError) -> (FrameOutcome, Option<Dispatch>) {
        match error {
            FramewatchError::TornDown => (FrameOutcome::TornDown, None),
            error if error.is_configuration() => {
                self.state = DetectorState::Paused;
                self.stats.configuration_errors += 1;
                tracing::warn!(%error, "Motion detector paused");
                let dispatch = self
                    .error_sink
                    .as_ref()
                    .map(|sink| Dispatch::Error(Arc::clone(sink), error));
                (FrameOutcome::Paused, dispatch)
            }
            error => {
                self.stats.frames_dropped += 1;
                tracing::warn!(%error, "Dropping frame");
                (FrameOutcome::Dropped, None)
            }
        }
    }
}

/// Motion detection pipeline.
///
/// Cloning yields another handle to the same detector, so the producer
/// thread and a control thread can each hold one.
///
/// With the default [`IntensityMode::Mean`] a single changed pixel reports
/// its magnitude divided by the pixel count. Use [`IntensityMode::Weighted`]
/// when intensity should equal the magnitude of a lone hotspot.
#[derive(Clone)]
pub struct MotionDetector {
    shared: Arc<Shared>,
}

/// Handle returned by [`MotionDetector::set_handler`].
///
/// Dropping it leaves the handler registered; call
/// [`cancel`](HandlerRegistration::cancel) to remove it.
#[derive(Debug, Clone)]
pub struct HandlerRegistration {
    id: u64,
    detector: Weak<Shared>,
}

impl HandlerRegistration {
    /// Unregister the handler this handle was issued for.
    ///
    /// Returns `false` if it was already replaced, cleared, or the
    /// detector is gone. The detector stays armed either way. Once this
    /// returns `true` the handler is not running and will not run again.
    pub fn cancel(self) -> bool {
        let Some(shared) = self.detector.upgrade() else {
            return false;
        };
        let mut inner = shared.lock();
        if !matches!(inner.handler, Some((id, _)) if id == self.id) {
            return false;
        }
        inner.handler = None;
        drop(shared.wait_for_dispatch(inner));
        tracing::info!(handler = self.id, "Motion handler cancelled");
        true
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl MotionDetector {
    /// Create a detector with the given settings.
    pub fn new(settings: DetectorSettings) -> FramewatchResult<Self> {
        settings.validate()?;
        let stages = Stages::new(&settings)?;
        Ok(Self::from_parts(settings, stages))
    }

    /// Create a detector with strength 0.5 and no throttling.
    pub fn with_defaults() -> Self {
        let stages = Stages {
            low_pass: LowPassFilter::default(),
            difference: FrameDifference::default(),
            reducer: AverageColorReducer::default(),
        };
        Self::from_parts(DetectorSettings::default(), stages)
    }

    fn from_parts(settings: DetectorSettings, stages: Stages) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    throttle: SampleThrottle::new(settings.sample_interval),
                    settings,
                    stages: Some(stages),
                    last_timestamp_ns: None,
                    handler: None,
                    next_handler_id: 1,
                    error_sink: None,
                    has_been_armed: false,
                    state: DetectorState::Idle,
                    stats: DetectorStats::default(),
                    in_flight: 0,
                }),
                dispatch_done: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared.lock()
    }

    fn with_live<R>(
        &self,
        f: impl FnOnce(&mut Inner) -> FramewatchResult<R>,
    ) -> FramewatchResult<R> {
        let mut inner = self.lock();
        inner.ensure_live()?;
        f(&mut inner)
    }

    /// Run one frame through the pipeline.
    ///
    /// Never fails: errors are absorbed into the returned outcome, logged,
    /// and (for configuration errors) sent to the error sink. The handler
    /// runs on this thread before the call returns.
    pub fn process_frame(&self, frame: &Frame) -> FrameOutcome {
        let (outcome, dispatch) = {
            let mut inner = self.lock();
            let (outcome, dispatch) = inner.process(frame);
            if dispatch.is_some() {
                inner.in_flight += 1;
            }
            (outcome, dispatch)
        };

        if let Some(dispatch) = dispatch {
            self.shared.dispatch(dispatch);
        }
        outcome
    }

    /// Pull frames from `source` until it ends or the detector is torn down.
    ///
    /// Returns the number of frames pulled.
    pub fn run<S>(&self, source: &mut S) -> u64
    where
        S: FrameSource + ?Sized,
    {
        let mut pulled = 0;
        while self.state() != DetectorState::TornDown {
            let Some(frame) = source.next_frame() else {
                break;
            };
            pulled += 1;
            if self.process_frame(&frame) == FrameOutcome::TornDown {
                break;
            }
        }
        tracing::debug!(frames = pulled, "Frame source drained");
        pulled
    }

    /// Register the motion handler, replacing any previous one.
    pub fn set_handler<F>(&self, handler: F) -> FramewatchResult<HandlerRegistration>
    where
        F: Fn(&MotionResult) + Send + Sync + 'static,
    {
        self.with_live(|inner| {
            let id = inner.next_handler_id;
            inner.next_handler_id += 1;
            inner.handler = Some((id, Arc::new(handler)));
            inner.has_been_armed = true;
            if inner.state == DetectorState::Idle {
                inner.state = DetectorState::Armed;
            }
            tracing::info!(handler = id, state = ?inner.state, "Motion handler registered");
            Ok(HandlerRegistration {
                id,
                detector: Arc::downgrade(&self.shared),
            })
        })
    }

    /// Remove the handler. Frames keep updating the running average.
    ///
    /// Returns once no call to the removed handler is still running on
    /// another thread.
    pub fn clear_handler(&self) -> FramewatchResult<()> {
        let mut inner = self.lock();
        inner.ensure_live()?;
        inner.handler = None;
        drop(self.shared.wait_for_dispatch(inner));
        Ok(())
    }

    pub fn has_handler(&self) -> bool {
        self.lock().handler.is_some()
    }

    /// Register the sink that receives configuration errors.
    pub fn set_error_sink<F>(&self, sink: F) -> FramewatchResult<()>
    where
        F: Fn(&FramewatchError) + Send + Sync + 'static,
    {
        self.with_live(|inner| {
            inner.error_sink = Some(Arc::new(sink));
            Ok(())
        })
    }

    pub fn clear_error_sink(&self) -> FramewatchResult<()> {
        self.with_live(|inner| {
            inner.error_sink = None;
            Ok(())
        })
    }

    /// Set the low-pass strength. Rejects values outside `[0.0, 1.0]`.
    pub fn set_strength(&self, strength: f64) -> FramewatchResult<()> {
        self.with_live(|inner| {
            inner.stages_mut()?.low_pass.set_strength(strength)?;
            inner.settings.strength = strength;
            Ok(())
        })
    }

    /// Set the minimum spacing between sampled frames.
    pub fn set_sample_interval(&self, interval: Duration) -> FramewatchResult<()> {
        self.with_live(|inner| {
            inner.settings.sample_interval = interval;
            inner.throttle.set_interval(interval);
            Ok(())
        })
    }

    pub fn set_metric(&self, metric: DifferenceMetric) -> FramewatchResult<()> {
        self.with_live(|inner| {
            inner.stages_mut()?.difference.set_metric(metric);
            inner.settings.metric = metric;
            Ok(())
        })
    }

    pub fn set_noise_threshold(&self, threshold: f64) -> FramewatchResult<()> {
        self.with_live(|inner| {
            inner.stages_mut()?.difference.set_noise_threshold(threshold)?;
            inner.settings.noise_threshold = threshold;
            Ok(())
        })
    }

    pub fn set_intensity_mode(&self, mode: IntensityMode) -> FramewatchResult<()> {
        self.with_live(|inner| {
            inner.stages_mut()?.reducer.set_mode(mode);
            inner.settings.intensity_mode = mode;
            Ok(())
        })
    }

    pub fn set_skip_policy(&self, policy: SkipPolicy) -> FramewatchResult<()> {
        self.with_live(|inner| {
            inner.settings.skip_policy = policy;
            Ok(())
        })
    }

    /// Require frames of exactly `dimensions`, or accept any size with `None`.
    ///
    /// Does not clear the running average; after a resolution change call
    /// [`reset`](Self::reset) as well.
    pub fn set_expected_dimensions(&self, dimensions: Option<Dimensions>) -> FramewatchResult<()> {
        self.with_live(|inner| {
            let mut settings = inner.settings.clone();
            settings.expected_dimensions = dimensions;
            settings.validate()?;
            inner.settings = settings;
            Ok(())
        })
    }

    /// Replace all settings at once. Nothing changes if validation fails.
    pub fn apply_settings(&self, settings: DetectorSettings) -> FramewatchResult<()> {
        self.with_live(|inner| {
            settings.validate()?;
            inner.stages_mut()?.apply(&settings)?;
            inner.throttle.set_interval(settings.sample_interval);
            inner.settings = settings;
            Ok(())
        })
    }

    pub fn settings(&self) -> DetectorSettings {
        self.lock().settings.clone()
    }

    /// Clear the running average and throttle bookkeeping, and resume a
    /// paused detector.
    pub fn reset(&self) -> FramewatchResult<()> {
        self.with_live(|inner| {
            inner.stages_mut()?.reset();
            inner.throttle.reset();
            inner.last_timestamp_ns = None;
            inner.state = if inner.has_been_armed {
                DetectorState::Armed
            } else {
                DetectorState::Idle
            };
            tracing::info!(state = ?inner.state, "Motion detector reset");
            Ok(())
        })
    }

    /// Release all buffers and callbacks. Blocks until a frame being
    /// processed on another thread, handler call included, has finished.
    /// Idempotent.
    ///
    /// Called from inside a handler, it does not wait for that handler.
    pub fn teardown(&self) {
        let mut inner = self.lock();
        if inner.state == DetectorState::TornDown {
            drop(self.shared.wait_for_dispatch(inner));
            return;
        }
        inner.state = DetectorState::TornDown;
        inner.stages = None;
        inner.handler = None;
        inner.error_sink = None;
        let inner = self.shared.wait_for_dispatch(inner);
        tracing::info!(
            frames = inner.stats.frames_received,
            sampled = inner.stats.frames_sampled,
            "Motion detector torn down"
        );
    }

    pub fn state(&self) -> DetectorState {
        self.lock().state
    }

    pub fn stats(&self) -> DetectorStats {
        self.lock().stats.clone()
    }

    /// Timestamp of the last sampled frame.
    pub fn last_sample_ns(&self) -> Option<TimestampNs> {
        self.lock().throttle.last_sample_ns()
    }
}

impl Default for MotionDetector {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for MotionDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("MotionDetector")
            .field("state", &inner.state)
            .field("settings", &inner.settings)
            .field("has_handler", &inner.handler.is_some())
            .field("stats", &inner.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use framewatch_frame_model::frame::PixelFormat;
    use framewatch_frame_model::geometry::Point2D;

    use super::*;

    const DIMS: Dimensions = Dimensions::new(8, 8);

    fn gray(ts: u64, value: u8) -> Frame {
        Frame::filled(DIMS, PixelFormat::Luma8, ts, value)
    }

    fn collecting(detector: &MotionDetector) -> Arc<Mutex<Vec<MotionResult>>> {
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        detector
            .set_handler(move |r| sink.lock().unwrap().push(*r))
            .unwrap();
        results
    }

    #[test]
    fn starts_idle_and_arms_on_handler() {
        let detector = MotionDetector::with_defaults();
        assert_eq!(detector.state(), DetectorState::Idle);

        let outcome = detector.process_frame(&gray(0, 10));
        assert!(matches!(outcome, FrameOutcome::Processed(_)));

        let _results = collecting(&detector);
        assert_eq!(detector.state(), DetectorState::Armed);
    }

    #[test]
    fn first_frame_reports_no_motion() {
        let detector = MotionDetector::with_defaults();
        let results = collecting(&detector);
        detector.process_frame(&gray(0, 200));

        let results = results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0], MotionResult::still(0));
    }

    #[test]
    fn hotspot_moves_centroid() {
        let detector = MotionDetector::with_defaults();
        let results = collecting(&detector);
        detector.process_frame(&gray(0, 0));

        let mut frame = gray(1, 0);
        frame.pixel_mut(6, 1).unwrap()[0] = 255;
        detector.process_frame(&frame);

        let results = results.lock().unwrap();
        let last = results.last().unwrap();
        assert!((last.centroid.x - 6.5 / 8.0).abs() < 1e-9);
        assert!((last.centroid.y - 1.5 / 8.0).abs() < 1e-9);
        // Strength 0.5: the average sits halfway, so the change is 0.5 on one of 64 pixels.
        assert!((last.intensity - 0.5 / 64.0).abs() < 1e-6);
    }

    #[test]
    fn weighted_mode_reports_hotspot_magnitude() {
        let mut frame = gray(1, 0);
        frame.pixel_mut(2, 5).unwrap()[0] = 255;

        for (mode, expected) in [
            (IntensityMode::Mean, 1.0 / 64.0),
            (IntensityMode::Weighted, 1.0),
        ] {
            // Strength 0 keeps the baseline black, so the hotspot's change is 1.0.
            let detector = MotionDetector::new(DetectorSettings {
                strength: 0.0,
                intensity_mode: mode,
                ..Default::default()
            })
            .unwrap();
            detector.process_frame(&gray(0, 0));
            let outcome = detector.process_frame(&frame);
            let result = outcome.result().unwrap();
            assert!((result.intensity - expected).abs() < 1e-6, "{mode:?}");
            assert!((result.centroid.x - 2.5 / 8.0).abs() < 1e-9);
        }
    }

    #[test]
    fn throttle_skips_frames_inside_interval() {
        let detector = MotionDetector::with_defaults();
        detector
            .set_sample_interval(Duration::from_millis(100))
            .unwrap();
        let results = collecting(&detector);

        for i in 0..10u64 {
            detector.process_frame(&gray(i * 40_000_000, 0));
        }
        let times: Vec<u64> = results
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.timestamp_ns)
            .collect();
        assert_eq!(times, vec![0, 120_000_000, 240_000_000, 360_000_000]);
        assert_eq!(detector.stats().frames_skipped, 6);
    }

    #[test]
    fn freeze_policy_ignores_skipped_frames() {
        let detector = MotionDetector::with_defaults();
        detector.set_sample_interval(Duration::from_secs(1)).unwrap();

        detector.process_frame(&gray(0, 0));
        assert_eq!(
            detector.process_frame(&gray(500_000_000, 255)),
            FrameOutcome::Skipped
        );
        // Baseline is still 0, so blending 255 at strength 0.5 leaves it at 127.5.
        let outcome = detector.process_frame(&gray(1_000_000_000, 255));
        assert!((outcome.result().unwrap().intensity - 0.5).abs() < 1e-6);
    }

    #[test]
    fn track_policy_feeds_skipped_frames() {
        let detector = MotionDetector::with_defaults();
        detector.set_skip_policy(SkipPolicy::TrackBaseline).unwrap();
        detector.set_sample_interval(Duration::from_secs(1)).unwrap();

        detector.process_frame(&gray(0, 0));
        assert_eq!(
            detector.process_frame(&gray(500_000_000, 255)),
            FrameOutcome::Skipped
        );
        // The skipped frame moved the baseline to 127.5, the sampled one to 191.25.
        let outcome = detector.process_frame(&gray(1_000_000_000, 255));
        assert!((outcome.result().unwrap().intensity - 0.25).abs() < 1e-6);
    }

    #[test]
    fn dimension_change_pauses_and_reports_once() {
        let detector = MotionDetector::with_defaults();
        let results = collecting(&detector);
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&errors);
        detector
            .set_error_sink(move |e| {
                assert!(e.is_configuration());
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        detector.process_frame(&gray(0, 0));
        let small = Frame::filled(Dimensions::new(4, 4), PixelFormat::Luma8, 1, 0);
        assert_eq!(detector.process_frame(&small), FrameOutcome::Paused);
        assert_eq!(detector.process_frame(&small), FrameOutcome::Paused);
        assert_eq!(detector.process_frame(&gray(3, 0)), FrameOutcome::Paused);

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(detector.state(), DetectorState::Paused);
        assert_eq!(results.lock().unwrap().len(), 1);

        detector.reset().unwrap();
        assert_eq!(detector.state(), DetectorState::Armed);
        assert!(matches!(
            detector.process_frame(&small.clone().with_timestamp(4)),
            FrameOutcome::Delivered(_)
        ));
        assert_eq!(detector.stats().configuration_errors, 1);
    }

    #[test]
    fn expected_dimensions_are_enforced() {
        let detector = MotionDetector::with_defaults();
        detector
            .set_expected_dimensions(Some(Dimensions::new(16, 16)))
            .unwrap();
        assert_eq!(detector.process_frame(&gray(0, 0)), FrameOutcome::Paused);

        detector.set_expected_dimensions(Some(DIMS)).unwrap();
        detector.reset().unwrap();
        assert_eq!(detector.state(), DetectorState::Idle);
        assert!(detector.process_frame(&gray(1, 0)).result().is_some());

        assert!(detector
            .set_expected_dimensions(Some(Dimensions::new(0, 3)))
            .is_err());
    }

    #[test]
    fn malformed_frame_is_dropped_without_touching_state() {
        let detector = MotionDetector::with_defaults();
        detector.process_frame(&gray(0, 0));

        let mut broken = gray(5, 255);
        broken.data.truncate(10);
        assert_eq!(detector.process_frame(&broken), FrameOutcome::Dropped);
        assert_eq!(detector.state(), DetectorState::Idle);
        assert_eq!(detector.last_sample_ns(), Some(0));

        // An earlier timestamp than the dropped frame is still in order, and
        // a baseline still at 0 reports no change.
        let outcome = detector.process_frame(&gray(2, 0));
        assert_eq!(outcome.result().unwrap().intensity, 0.0);
        assert_eq!(detector.stats().frames_dropped, 1);
    }

    #[test]
    fn out_of_order_frame_is_dropped() {
        let detector = MotionDetector::with_defaults();
        detector.process_frame(&gray(100, 0));
        assert_eq!(detector.process_frame(&gray(50, 255)), FrameOutcome::Dropped);

        // Had 255 been blended the baseline would sit at 127.5 and this
        // frame would report 0.25.
        let outcome = detector.process_frame(&gray(100, 0));
        assert_eq!(outcome.result().unwrap().intensity, 0.0);
        assert_eq!(detector.stats().frames_dropped, 1);
    }

    #[test]
    fn cancelled_handler_stops_delivery_but_keeps_state() {
        let detector = MotionDetector::with_defaults();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registration = detector
            .set_handler(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        detector.process_frame(&gray(0, 0));
        assert!(registration.clone().cancel());
        assert!(!registration.cancel());

        let outcome = detector.process_frame(&gray(1, 0));
        assert!(matches!(outcome, FrameOutcome::Processed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(detector.state(), DetectorState::Armed);
        assert_eq!(detector.stats().frames_sampled, 2);
    }

    #[test]
    fn stale_registration_does_not_remove_newer_handler() {
        let detector = MotionDetector::with_defaults();
        let first = detector.set_handler(|_| {}).unwrap();
        let second = detector.set_handler(|_| {}).unwrap();
        assert_ne!(first.id(), second.id());
        assert!(!first.cancel());
        assert!(detector.has_handler());
    }

    #[test]
    fn handler_may_reconfigure_detector() {
        let detector = MotionDetector::with_defaults();
        let handle = detector.clone();
        detector
            .set_handler(move |_| {
                handle.set_strength(0.9).unwrap();
            })
            .unwrap();
        detector.process_frame(&gray(0, 0));
        assert_eq!(detector.settings().strength, 0.9);
    }

    #[test]
    fn panicking_handler_does_not_escape() {
        let detector = MotionDetector::with_defaults();
        detector.set_handler(|_| panic!("handler bug")).unwrap();
        assert!(matches!(
            detector.process_frame(&gray(0, 0)),
            FrameOutcome::Delivered(_)
        ));
        assert!(matches!(
            detector.process_frame(&gray(1, 0)),
            FrameOutcome::Delivered(_)
        ));
    }

    #[test]
    fn invalid_strength_is_rejected_without_pausing() {
        let detector = MotionDetector::with_defaults();
        assert!(detector.set_strength(1.5).unwrap_err().is_configuration());
        assert_eq!(detector.settings().strength, 0.5);
        assert_eq!(detector.state(), DetectorState::Idle);
    }

    #[test]
    fn apply_settings_is_all_or_nothing() {
        let detector = MotionDetector::with_defaults();
        let bad = DetectorSettings {
            strength: 0.2,
            noise_threshold: 3.0,
            ..Default::default()
        };
        assert!(detector.apply_settings(bad).is_err());
        assert_eq!(detector.settings(), DetectorSettings::default());

        let good = DetectorSettings {
            strength: 0.2,
            sample_interval: Duration::from_millis(33),
            intensity_mode: IntensityMode::Weighted,
            ..Default::default()
        };
        detector.apply_settings(good.clone()).unwrap();
        assert_eq!(detector.settings(), good);
    }

    #[test]
    fn teardown_is_terminal() {
        let detector = MotionDetector::with_defaults();
        let _results = collecting(&detector);
        detector.process_frame(&gray(0, 0));
        detector.teardown();
        detector.teardown();

        assert_eq!(detector.state(), DetectorState::TornDown);
        assert_eq!(detector.process_frame(&gray(1, 0)), FrameOutcome::TornDown);
        assert!(matches!(
            detector.set_strength(0.1),
            Err(FramewatchError::TornDown)
        ));
        assert!(detector.set_handler(|_| {}).is_err());
        assert!(detector.reset().is_err());
        assert!(!detector.has_handler());
    }

    #[test]
    fn settings_from_defaults_validates() {
        let defaults = DetectorDefaults {
            strength: 0.75,
            sample_interval_ms: 250,
            ..Default::default()
        };
        let settings = DetectorSettings::from_defaults(&defaults).unwrap();
        assert_eq!(settings.sample_interval, Duration::from_millis(250));
        assert_eq!(settings.strength, 0.75);

        let defaults = DetectorDefaults {
            strength: -1.0,
            ..Default::default()
        };
        assert!(DetectorSettings::from_defaults(&defaults).is_err());
        assert!(MotionDetector::new(DetectorSettings {
            strength: 2.0,
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn still_scene_reports_center() {
        let detector = MotionDetector::with_defaults();
        for i in 0..5 {
            let outcome = detector.process_frame(&gray(i, 77));
            let result = outcome.result().unwrap();
            assert_eq!(result.centroid, Point2D::CENTER);
            assert_eq!(result.intensity, 0.0);
        }
    }
}
