//! Diagnostics: severity levels, verbosity gating and "correct and warn"
//!
//! Every message the engine prints goes through a [`Reporter`], which gates it
//! on the configured verbosity and forwards it to `tracing`. Fatal messages are
//! emitted whatever the threshold.
//!
//! Parameter checks that can be repaired return a [`Corrected`] value carrying
//! the repaired value plus the warning to print; checks that cannot be repaired
//! return an [`EngineError`].

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// Number of recent diagnostics kept for end-of-run inspection
const RECENT_CAPACITY: usize = 256;

thread_local! {
    /// Corrections from [`Corrected::logged`] waiting for the reporter that
    /// opened the current [`Reporter::collecting`] scope on this thread
    static COLLECTED: RefCell<Option<Vec<(String, String)>>> = RefCell::new(None);
}

/// Restores the enclosing collection scope, even if the body unwinds
struct CollectScope {
    outer: Option<Vec<(String, String)>>,
}

impl CollectScope {
    fn enter() -> Self {
        let outer = COLLECTED.with(|c| c.replace(Some(Vec::new())));
        Self { outer }
    }

    fn drain(&self) -> Vec<(String, String)> {
        COLLECTED.with(|c| c.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
    }
}

impl Drop for CollectScope {
    fn drop(&mut self) {
        let outer = self.outer.take();
        COLLECTED.with(|c| *c.borrow_mut() = outer);
    }
}

/// Diagnostic severity, ordered from chattiest to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Advise,
    Warn,
    Fatal,
}

impl Severity {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Severity::Debug,
            1 => Severity::Advise,
            2 => Severity::Warn,
            _ => Severity::Fatal,
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    /// Matching `tracing` level, used when installing a subscriber
    pub fn tracing_level(self) -> tracing::Level {
        match self {
            Severity::Debug => tracing::Level::DEBUG,
            Severity::Advise => tracing::Level::INFO,
            Severity::Warn => tracing::Level::WARN,
            Severity::Fatal => tracing::Level::ERROR,
        }
    }
}

/// One emitted (or suppressed) message
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub source: Option<String>,
    pub message: String,
}

/// Thread-safe diagnostic sink with a global verbosity threshold
pub struct Reporter {
    threshold: AtomicU8,
    counts: [AtomicUsize; 4],
    recent: Mutex<Vec<Diagnostic>>,
}

impl Reporter {
    pub fn new(threshold: Severity) -> Self {
        Self {
            threshold: AtomicU8::new(threshold as u8),
            counts: Default::default(),
            recent: Mutex::new(Vec::new()),
        }
    }

    pub fn threshold(&self) -> Severity {
        Severity::from_u8(self.threshold.load(Ordering::Relaxed))
    }

    pub fn set_threshold(&self, threshold: Severity) {
        self.threshold.store(threshold as u8, Ordering::Relaxed);
    }

    /// Report a message. Returns true if it passed the threshold.
    pub fn report(&self, severity: Severity, source: Option<&str>, message: impl Into<String>) -> bool {
        let message = message.into();
        self.counts[severity.index()].fetch_add(1, Ordering::Relaxed);

        let emitted = severity == Severity::Fatal || severity >= self.threshold();
        if emitted {
            let who = source.unwrap_or("rtmix");
            match severity {
                Severity::Debug => debug!(source = who, "{}", message),
                Severity::Advise => info!(source = who, "{}", message),
                Severity::Warn => warn!(source = who, "{}", message),
                Severity::Fatal => error!(source = who, "FATAL ERROR: {}", message),
            }
        }

        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        if recent.len() == RECENT_CAPACITY {
            recent.remove(0);
        }
        recent.push(Diagnostic {
            severity,
            source: source.map(str::to_owned),
            message,
        });

        emitted
    }

    pub fn debug(&self, source: Option<&str>, message: impl Into<String>) {
        self.report(Severity::Debug, source, message);
    }

    pub fn advise(&self, source: Option<&str>, message: impl Into<String>) {
        self.report(Severity::Advise, source, message);
    }

    pub fn warn(&self, source: Option<&str>, message: impl Into<String>) {
        self.report(Severity::Warn, source, message);
    }

    pub fn fatal(&self, source: Option<&str>, message: impl Into<String>) {
        self.report(Severity::Fatal, source, message);
    }

    /// Report an engine error at fatal level
    pub fn fatal_error(&self, source: Option<&str>, err: &EngineError) {
        self.report(Severity::Fatal, source, err.to_string());
    }

    /// Unwrap a corrected value, emitting its warning if there is one
    pub fn take<T>(&self, source: &str, corrected: Corrected<T>) -> T {
        if let Some(warning) = &corrected.warning {
            self.warn(Some(source), warning.clone());
        }
        corrected.value
    }

    /// Run `f`, reporting as warnings any corrections unit generators make
    /// on this thread while it runs
    pub fn collecting<R, F: FnOnce() -> R>(&self, f: F) -> R {
        let scope = CollectScope::enter();
        let result = f();
        for (source, warning) in scope.drain() {
            self.warn(Some(&source), warning);
        }
        result
    }

    /// How many messages of this severity have been reported (emitted or not)
    pub fn count(&self, severity: Severity) -> usize {
        self.counts[severity.index()].load(Ordering::Relaxed)
    }

    /// Most recent diagnostics, oldest first
    pub fn recent(&self) -> Vec<Diagnostic> {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(Severity::Advise)
    }
}

/// Install a `tracing` fmt subscriber at the level matching `verbosity`.
///
/// Fatal messages map to ERROR, which every level lets through. Returns false
/// if a global subscriber was already installed.
pub fn init_logging(verbosity: Severity) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(verbosity.tracing_level())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

/// A value that passed validation, possibly after being repaired
#[derive(Debug, Clone, PartialEq)]
pub struct Corrected<T> {
    pub value: T,
    pub warning: Option<String>,
}

impl<T> Corrected<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value,
            warning: None,
        }
    }

    pub fn fixed(value: T, warning: impl Into<String>) -> Self {
        Self {
            value,
            warning: Some(warning.into()),
        }
    }

    pub fn was_corrected(&self) -> bool {
        self.warning.is_some()
    }

    /// Take the value, handing the warning to the reporter collecting on
    /// this thread, or straight to `tracing` when none is.
    ///
    /// For unit generators, which have no reporter of their own.
    pub fn logged(self, source: &str) -> T {
        if let Some(warning) = self.warning {
            let unclaimed = COLLECTED.with(|c| match c.borrow_mut().as_mut() {
                Some(pending) => {
                    pending.push((source.to_owned(), warning));
                    None
                }
                None => Some(warning),
            });
            if let Some(warning) = unclaimed {
                warn!(source = source, "{}", warning);
            }
        }
        self.value
    }
}

/// Negative rates and times are negated
pub fn non_negative(what: &str, value: f32) -> Corrected<f32> {
    if value < 0.0 {
        Corrected::fixed(-value, format!("Negative {what} not allowed! Correcting..."))
    } else {
        Corrected::ok(value)
    }
}

/// Clamp into `[lo, hi]`
pub fn clamp_range(what: &str, value: f32, lo: f32, hi: f32) -> Corrected<f32> {
    if value < lo {
        Corrected::fixed(lo, format!("{what} {value} out of range, using {lo}"))
    } else if value > hi {
        Corrected::fixed(hi, format!("{what} {value} out of range, using {hi}"))
    } else {
        Corrected::ok(value)
    }
}

/// Frequencies above Nyquist are pulled down to Nyquist
pub fn below_nyquist(what: &str, freq: f32, sample_rate: f32) -> Corrected<f32> {
    let nyquist = sample_rate * 0.5;
    if freq > nyquist {
        Corrected::fixed(nyquist, format!("{what} was above Nyquist. Correcting..."))
    } else {
        Corrected::ok(freq)
    }
}

/// Must be strictly positive; anything else is fatal
pub fn positive(who: &str, what: &str, value: f32) -> Result<f32> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(EngineError::Parameter {
            who: who.to_owned(),
            message: format!("{what} must be greater than 0 (got {value})"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_gates_but_fatal_always_emits() {
        let reporter = Reporter::new(Severity::Fatal);

        assert!(!reporter.report(Severity::Warn, Some("TEST"), "quiet"));
        assert!(reporter.report(Severity::Fatal, Some("TEST"), "loud"));

        assert_eq!(reporter.count(Severity::Warn), 1);
        assert_eq!(reporter.count(Severity::Fatal), 1);
    }

    #[test]
    fn test_threshold_can_change() {
        let reporter = Reporter::new(Severity::Warn);
        assert!(!reporter.report(Severity::Advise, None, "hidden"));
        reporter.set_threshold(Severity::Debug);
        assert!(reporter.report(Severity::Advise, None, "shown"));
        assert_eq!(reporter.threshold(), Severity::Debug);
    }

    #[test]
    fn test_recent_is_bounded() {
        let reporter = Reporter::new(Severity::Fatal);
        for i in 0..(RECENT_CAPACITY + 10) {
            reporter.debug(None, format!("msg {i}"));
        }
        let recent = reporter.recent();
        assert_eq!(recent.len(), RECENT_CAPACITY);
        assert_eq!(recent[0].message, "msg 10");
    }

    #[test]
    fn test_non_negative_negates() {
        let c = non_negative("rate", -0.25);
        assert_eq!(c.value, 0.25);
        assert!(c.was_corrected());

        let c = non_negative("rate", 0.25);
        assert_eq!(c.value, 0.25);
        assert!(!c.was_corrected());
    }

    #[test]
    fn test_take_emits_warning() {
        let reporter = Reporter::new(Severity::Debug);
        let v = reporter.take("TEST", clamp_range("pan", 1.5, 0.0, 1.0));
        assert_eq!(v, 1.0);
        assert_eq!(reporter.count(Severity::Warn), 1);
    }

    #[test]
    fn test_collecting_counts_unit_generator_corrections() {
        let reporter = Reporter::new(Severity::Fatal);
        let v = reporter.collecting(|| below_nyquist("cf", 900.0, 1000.0).logged("Butter"));
        assert_eq!(v, 500.0);
        assert_eq!(reporter.count(Severity::Warn), 1);
        assert_eq!(reporter.recent()[0].source.as_deref(), Some("Butter"));

        // outside a scope the warning only goes to tracing
        below_nyquist("cf", 900.0, 1000.0).logged("Butter");
        assert_eq!(reporter.count(Severity::Warn), 1);
    }

    #[test]
    fn test_collecting_scope_survives_a_panic() {
        let reporter = Reporter::new(Severity::Fatal);
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            reporter.collecting::<(), _>(|| panic!("boom"))
        }));
        assert!(caught.is_err());
        assert!(COLLECTED.with(|c| c.borrow().is_none()));
    }

    #[test]
    fn test_positive_is_fatal_for_zero() {
        assert!(positive("FILT", "bandwidth", 0.0).is_err());
        assert!(positive("FILT", "bandwidth", -1.0).is_err());
        assert_eq!(positive("FILT", "bandwidth", 2.0).unwrap(), 2.0);
    }

    #[test]
    fn test_below_nyquist() {
        let c = below_nyquist("cf", 30000.0, 44100.0);
        assert_eq!(c.value, 22050.0);
        assert!(c.was_corrected());
    }
}
