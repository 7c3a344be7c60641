//! The operation lifecycle state machine.
//!
//! A [`Meter`] moves through `CREATED -> STARTED -> {OK | REJECTED | FAILED}`.
//! Each successful transition emits a message/data event pair to the
//! factory's sink. Every public transition is guarded:
//!
//! - caller misuse is reported as one INCONSISTENT_* / ILLEGAL_ARGUMENT event
//!   and leaves the meter unchanged
//! - a defect inside the transition (an internal error or a panic) is reported
//!   once as a BUG event and absorbed
//!
//! Either way the method returns `&mut Meter` normally.

use std::any::type_name;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use opmeter_core::format::readable_message;
use opmeter_core::{
    position_key, EventKind, Level, LogRecord, MeterData, MeterState, Outcome, SystemStatus,
};
use parking_lot::Mutex;

use crate::context::{self, FALLBACK_CATEGORY};
use crate::error::{panic_message, MeterError, UsageViolation};
use crate::factory::{MeterEnv, MeterFactory};
use crate::validator::{log_bug, log_violation, Transition};

/// Fail path recorded when a meter is closed or dropped while still running.
pub const UNTERMINATED_PATH: &str = "unterminated";

/// Fail path recorded when work wrapped by [`Meter::call`] panics.
pub const PANIC_PATH: &str = "panic";

// ---------------------------------------------------------------------------
// MeterIdentity
// ---------------------------------------------------------------------------

/// Part of a meter shared with the thread's current-operation slot.
///
/// Besides the naming it carries the terminated flag and the identity that
/// was current when the meter started, so the slot can skip meters that
/// finished out of order.
pub(crate) struct MeterIdentity {
    pub(crate) env: Arc<MeterEnv>,
    pub(crate) category: String,
    pub(crate) operation: Option<String>,
    pub(crate) parent: Option<String>,
    pub(crate) position: i64,
    terminated: AtomicBool,
    previous: Mutex<Option<Arc<MeterIdentity>>>,
}

impl MeterIdentity {
    fn new(
        env: Arc<MeterEnv>,
        category: String,
        operation: Option<String>,
        parent: Option<String>,
        position: i64,
    ) -> Self {
        Self {
            env,
            category,
            operation,
            parent,
            position,
            terminated: AtomicBool::new(false),
            previous: Mutex::new(None),
        }
    }

    /// Placeholder standing in for "no operation running".
    pub(crate) fn fallback(env: Arc<MeterEnv>) -> Self {
        Self::new(env, FALLBACK_CATEGORY.to_string(), None, None, 0)
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Identity that was current when this one started.
    pub(crate) fn previous(&self) -> Option<Arc<MeterIdentity>> {
        self.previous.lock().clone()
    }

    pub(crate) fn full_id(&self) -> String {
        match &self.operation {
            Some(op) => format!("{}/{op}#{}", self.category, self.position),
            None => format!("{}#{}", self.category, self.position),
        }
    }
}

// ---------------------------------------------------------------------------
// Meter
// ---------------------------------------------------------------------------

/// Lifecycle tracker for one execution of an operation.
///
/// Owned by the thread running the operation. Dropping a meter that was
/// started but never terminated behaves like [`close`](Meter::close).
pub struct Meter {
    identity: Arc<MeterIdentity>,
    description: Option<String>,
    create_time: u64,
    start_time: u64,
    stop_time: u64,
    last_current_time: u64,
    last_progress_time: u64,
    current_iteration: i64,
    expected_iterations: i64,
    time_limit: u64,
    outcome: Outcome,
    result: Option<String>,
    context: BTreeMap<String, String>,
    status: SystemStatus,
}

impl Meter {
    /// Meter for `category`, equivalent to [`MeterFactory::meter`].
    #[must_use]
    pub fn new(factory: &MeterFactory, category: impl Into<String>) -> Self {
        factory.meter(category)
    }

    /// Meter for `category` measuring `operation`, equivalent to
    /// [`MeterFactory::operation_meter`].
    #[must_use]
    pub fn with_operation(
        factory: &MeterFactory,
        category: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        factory.operation_meter(category, operation)
    }

    pub(crate) fn create(
        env: Arc<MeterEnv>,
        category: String,
        operation: Option<String>,
        parent: Option<String>,
    ) -> Self {
        let position = env
            .positions
            .next_position(&position_key(&category, operation.as_deref()));
        let now = env.clock.now();
        Self {
            identity: Arc::new(MeterIdentity::new(
                env, category, operation, parent, position,
            )),
            description: None,
            create_time: now,
            start_time: 0,
            stop_time: 0,
            last_current_time: now,
            last_progress_time: 0,
            current_iteration: 0,
            expected_iterations: 0,
            time_limit: 0,
            outcome: Outcome::Pending,
            result: None,
            context: BTreeMap::new(),
            status: SystemStatus::default(),
        }
    }

    /// Child of `parent` sharing its category, with operation
    /// `parent_op/name` (or `name` when the parent has none).
    pub(crate) fn derive(parent: &Arc<MeterIdentity>, name: &str) -> Self {
        let operation = match &parent.operation {
            Some(op) => format!("{op}/{name}"),
            None => name.to_string(),
        };
        let parent_id = (parent.position != 0).then(|| parent.full_id());
        Self::create(
            Arc::clone(&parent.env),
            parent.category.clone(),
            Some(operation),
            parent_id,
        )
    }

    /// Derives a sub-operation meter whose parent is this meter.
    #[must_use]
    pub fn sub(&self, name: &str) -> Meter {
        Self::derive(&self.identity, name)
    }

    // -- identity -----------------------------------------------------------

    #[must_use]
    pub fn category(&self) -> &str {
        &self.identity.category
    }

    #[must_use]
    pub fn operation(&self) -> Option<&str> {
        self.identity.operation.as_deref()
    }

    /// Full id of the operation this one was derived from.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.identity.parent.as_deref()
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.identity.env.session_id
    }

    #[must_use]
    pub fn position(&self) -> i64 {
        self.identity.position
    }

    /// `category[/operation]#position`.
    #[must_use]
    pub fn full_id(&self) -> String {
        self.identity.full_id()
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    // -- timing -------------------------------------------------------------

    #[must_use]
    pub fn create_time(&self) -> u64 {
        self.create_time
    }

    /// Zero until `start()` succeeds.
    #[must_use]
    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    /// Zero until a terminal transition succeeds.
    #[must_use]
    pub fn stop_time(&self) -> u64 {
        self.stop_time
    }

    #[must_use]
    pub fn last_current_time(&self) -> u64 {
        self.last_current_time
    }

    /// Advisory limit in nanoseconds; zero when unused.
    #[must_use]
    pub fn time_limit(&self) -> u64 {
        self.time_limit
    }

    /// Time between start and stop, or until now while running.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos())
    }

    fn elapsed_nanos(&self) -> u64 {
        if self.start_time == 0 {
            return 0;
        }
        let end = if self.stop_time == 0 {
            self.now()
        } else {
            self.stop_time
        };
        end.saturating_sub(self.start_time)
    }

    /// True when a time limit is set and the elapsed time exceeds it.
    #[must_use]
    pub fn is_slow(&self) -> bool {
        self.time_limit != 0 && self.elapsed_nanos() > self.time_limit
    }

    // -- progress -----------------------------------------------------------

    #[must_use]
    pub fn current_iteration(&self) -> i64 {
        self.current_iteration
    }

    #[must_use]
    pub fn expected_iterations(&self) -> i64 {
        self.expected_iterations
    }

    // -- outcome ------------------------------------------------------------

    #[must_use]
    pub fn state(&self) -> MeterState {
        match (&self.outcome, self.start_time) {
            (Outcome::Ok { .. }, _) => MeterState::Ok,
            (Outcome::Rejected { .. }, _) => MeterState::Rejected,
            (Outcome::Failed { .. }, _) => MeterState::Failed,
            (Outcome::Pending, 0) => MeterState::Created,
            (Outcome::Pending, _) => MeterState::Started,
        }
    }

    #[must_use]
    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    #[must_use]
    pub fn ok_path(&self) -> Option<&str> {
        self.outcome.ok_path()
    }

    #[must_use]
    pub fn reject_path(&self) -> Option<&str> {
        self.outcome.reject_path()
    }

    #[must_use]
    pub fn fail_path(&self) -> Option<&str> {
        self.outcome.fail_path()
    }

    #[must_use]
    pub fn fail_message(&self) -> Option<&str> {
        self.outcome.fail_message()
    }

    /// Rendering of the value returned by work wrapped in [`call`](Meter::call).
    #[must_use]
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    #[must_use]
    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    #[must_use]
    pub fn status(&self) -> &SystemStatus {
        &self.status
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.start_time != 0 && self.stop_time == 0
    }

    // -- attributes ---------------------------------------------------------

    /// Human-readable description printed with every message.
    pub fn describe(&mut self, text: impl Into<String>) -> &mut Self {
        self.description = Some(text.into());
        self
    }

    /// Adds a context attribute.
    pub fn ctx(&mut self, key: impl Into<String>, value: impl fmt::Display) -> &mut Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Adds a context attribute without value.
    pub fn ctx_flag(&mut self, key: impl Into<String>) -> &mut Self {
        self.context.insert(key.into(), String::new());
        self
    }

    pub fn unctx(&mut self, key: &str) -> &mut Self {
        self.context.remove(key);
        self
    }

    /// Number of iterations the operation expects to perform.
    pub fn iterations(&mut self, expected: i64) -> &mut Self {
        self.guarded(Transition::Configure, "iterations(n)", |m| {
            if expected <= 0 {
                return Err(UsageViolation::NonPositive {
                    method: "iterations(n)",
                    value: expected,
                }
                .into());
            }
            m.expected_iterations = expected;
            Ok(())
        })
    }

    /// Elapsed time above which a successful outcome is reported as slow.
    pub fn limit(&mut self, limit: Duration) -> &mut Self {
        self.time_limit = u64::try_from(limit.as_nanos()).unwrap_or(u64::MAX);
        self
    }

    // -- transitions --------------------------------------------------------

    /// `CREATED -> STARTED`. Makes this meter the thread's current operation.
    pub fn start(&mut self) -> &mut Self {
        self.guarded(Transition::Start, "start()", |m| {
            m.env().validator.validate_start(m)?;
            let now = m.now();
            m.start_time = now;
            m.last_current_time = now;
            m.last_progress_time = now;
            *m.identity.previous.lock() = context::set_current(Arc::clone(&m.identity));
            m.sample_status();
            m.emit(EventKind::Start)
        })
    }

    /// Advances the iteration counter by one.
    pub fn inc(&mut self) -> &mut Self {
        self.guarded(Transition::Increment, "inc()", |m| {
            m.env().validator.validate_progress(m, "inc()")?;
            m.current_iteration = m.current_iteration.saturating_add(1);
            Ok(())
        })
    }

    /// Advances the iteration counter by `count`.
    pub fn inc_by(&mut self, count: i64) -> &mut Self {
        self.guarded(Transition::Increment, "inc_by(n)", |m| {
            m.env().validator.validate_progress(m, "inc_by(n)")?;
            if count <= 0 {
                return Err(UsageViolation::NonPositive {
                    method: "inc_by(n)",
                    value: count,
                }
                .into());
            }
            m.current_iteration = m.current_iteration.saturating_add(count);
            Ok(())
        })
    }

    /// Moves the iteration counter forward to `iteration`.
    pub fn inc_to(&mut self, iteration: i64) -> &mut Self {
        self.guarded(Transition::Increment, "inc_to(n)", |m| {
            m.env().validator.validate_progress(m, "inc_to(n)")?;
            m.set_iteration("inc_to(n)", iteration)?;
            Ok(())
        })
    }

    /// Reports progress, unless the previous progress event is more recent
    /// than the configured period.
    pub fn progress(&mut self) -> &mut Self {
        self.guarded(Transition::Progress, "progress()", |m| {
            m.env().validator.validate_progress(m, "progress()")?;
            m.report_progress()
        })
    }

    /// Sets the iteration counter to `iteration`, then reports progress as
    /// [`progress`](Meter::progress) does.
    pub fn progress_to(&mut self, iteration: i64) -> &mut Self {
        self.guarded(Transition::Progress, "progress(n)", |m| {
            m.env().validator.validate_progress(m, "progress(n)")?;
            m.set_iteration("progress(n)", iteration)?;
            m.report_progress()
        })
    }

    /// `STARTED -> OK`.
    pub fn ok(&mut self) -> &mut Self {
        self.guarded(Transition::Ok, "ok()", |m| {
            m.env().validator.validate_stop(m, "ok()")?;
            m.finish(Outcome::Ok { path: None })
        })
    }

    /// `STARTED -> OK`, recording which success branch was taken.
    pub fn ok_with(&mut self, path: impl fmt::Display) -> &mut Self {
        self.guarded(Transition::Ok, "ok(path)", |m| {
            let path = path.to_string();
            let validator = Arc::clone(&m.env().validator);
            validator.validate_stop(m, "ok(path)")?;
            validator.validate_path("ok(path)", &path)?;
            m.finish(Outcome::Ok { path: Some(path) })
        })
    }

    /// `STARTED -> REJECTED`: an expected negative outcome, not an error.
    pub fn reject(&mut self, path: impl fmt::Display) -> &mut Self {
        self.guarded(Transition::Reject, "reject(path)", |m| {
            let path = path.to_string();
            let validator = Arc::clone(&m.env().validator);
            validator.validate_stop(m, "reject(path)")?;
            validator.validate_path("reject(path)", &path)?;
            m.finish(Outcome::Rejected { path })
        })
    }

    /// `STARTED -> FAILED` with a caller-chosen path.
    pub fn fail(&mut self, path: impl fmt::Display) -> &mut Self {
        self.guarded(Transition::Fail, "fail(path)", |m| {
            let path = path.to_string();
            let validator = Arc::clone(&m.env().validator);
            validator.validate_stop(m, "fail(path)")?;
            validator.validate_path("fail(path)", &path)?;
            m.finish(Outcome::Failed {
                path,
                message: None,
            })
        })
    }

    /// `STARTED -> FAILED` caused by `error`: the path is the error's type
    /// name and the message its `Display` text.
    pub fn fail_error<E>(&mut self, error: &E) -> &mut Self
    where
        E: fmt::Display + ?Sized,
    {
        self.guarded(Transition::Fail, "fail(error)", |m| {
            m.env().validator.validate_stop(m, "fail(error)")?;
            m.finish(Outcome::Failed {
                path: type_name::<E>().to_string(),
                message: Some(error.to_string()),
            })
        })
    }

    pub(crate) fn fail_panic(&mut self, message: String) -> &mut Self {
        self.guarded(Transition::Fail, "fail(panic)", |m| {
            m.env().validator.validate_stop(m, "fail(panic)")?;
            m.finish(Outcome::Failed {
                path: PANIC_PATH.to_string(),
                message: Some(message),
            })
        })
    }

    /// Safety net for scoped use. Terminated or never-started meters only
    /// release the current-operation slot; a meter still running is failed
    /// with path [`UNTERMINATED_PATH`].
    pub fn close(&mut self) -> &mut Self {
        self.guarded(Transition::Close, "close()", |m| {
            m.env().validator.validate_close(m)?;
            if !m.is_running() {
                m.leave_context();
                return Ok(());
            }
            m.finish(Outcome::Failed {
                path: UNTERMINATED_PATH.to_string(),
                message: None,
            })
        })
    }

    /// Attaches the rendering of a returned value to the next terminal event.
    pub(crate) fn set_result(&mut self, result: Option<String>) {
        self.result = result;
    }

    /// Machine-readable view of the meter as it is now.
    #[must_use]
    pub fn snapshot(&self) -> MeterData {
        MeterData {
            session: self.identity.env.session_id.clone(),
            position: self.identity.position,
            category: self.identity.category.clone(),
            operation: self.identity.operation.clone(),
            parent: self.identity.parent.clone(),
            description: self.description.clone(),
            create_time: self.create_time,
            start_time: self.start_time,
            stop_time: self.stop_time,
            last_current_time: self.last_current_time,
            iteration: self.current_iteration,
            expected_iterations: self.expected_iterations,
            time_limit: self.time_limit,
            ok_path: self.outcome.ok_path().map(str::to_string),
            reject_path: self.outcome.reject_path().map(str::to_string),
            fail_path: self.outcome.fail_path().map(str::to_string),
            fail_message: self.outcome.fail_message().map(str::to_string),
            result: self.result.clone(),
            slow: self.is_slow(),
            context: self.context.clone(),
            status: (!self.status.is_empty()).then_some(self.status),
        }
    }

    // -- internals ----------------------------------------------------------

    pub(crate) fn env(&self) -> &MeterEnv {
        &self.identity.env
    }

    pub(crate) fn identity(&self) -> &Arc<MeterIdentity> {
        &self.identity
    }

    fn now(&self) -> u64 {
        self.identity.env.clock.now()
    }

    /// Runs `body` as the transition `method`, converting misuse and defects
    /// into diagnostic events.
    fn guarded<F>(&mut self, transition: Transition, method: &'static str, body: F) -> &mut Self
    where
        F: FnOnce(&mut Self) -> Result<(), MeterError>,
    {
        match panic::catch_unwind(AssertUnwindSafe(|| body(&mut *self))) {
            Ok(Ok(())) => {}
            Ok(Err(MeterError::Usage(violation))) => {
                log_violation(self, transition.marker_for(&violation), &violation);
            }
            Ok(Err(MeterError::Internal(cause))) => log_bug(self, method, &cause),
            Err(payload) => log_bug(self, method, &panic_message(payload.as_ref())),
        }
        self
    }

    fn set_iteration(&mut self, method: &'static str, iteration: i64) -> Result<(), MeterError> {
        if iteration < self.current_iteration {
            return Err(UsageViolation::IterationBackwards {
                method,
                current: self.current_iteration,
                requested: iteration,
            }
            .into());
        }
        self.current_iteration = iteration;
        Ok(())
    }

    fn report_progress(&mut self) -> Result<(), MeterError> {
        let now = self.now();
        self.last_current_time = now;
        let period = self.env().config.load().progress_period;
        let period = u64::try_from(period.as_nanos()).unwrap_or(u64::MAX);
        if period != 0 && now.saturating_sub(self.last_progress_time) < period {
            return Ok(());
        }
        self.last_progress_time = now;
        self.sample_status();
        self.emit(EventKind::Progress)
    }

    fn finish(&mut self, outcome: Outcome) -> Result<(), MeterError> {
        let now = self.now();
        self.stop_time = now;
        self.last_current_time = now;
        let kind = match &outcome {
            Outcome::Ok { .. } if self.is_slow() => EventKind::SlowOk,
            Outcome::Ok { .. } | Outcome::Pending => EventKind::Ok,
            Outcome::Rejected { .. } => EventKind::Reject,
            Outcome::Failed { .. } => EventKind::Fail,
        };
        self.outcome = outcome;
        self.identity.terminated.store(true, Ordering::Release);
        self.leave_context();
        self.sample_status();
        self.emit(kind)
    }

    /// Hands the current-operation slot back to whatever was current before
    /// this meter started, if this meter still holds it. A meter left behind
    /// by one that finished later keeps its link, so the slot can step past it.
    fn leave_context(&self) {
        if context::is_current(&self.identity) {
            let previous = self.identity.previous.lock().take();
            context::restore(previous);
        }
    }

    fn sample_status(&mut self) {
        if let Some(sampler) = &self.identity.env.sampler {
            sampler.sample(&mut self.status);
        }
    }

    fn emit(&self, kind: EventKind) -> Result<(), MeterError> {
        let env = self.env();
        let config = env.config.load();
        let data = self.snapshot();

        let message_level = kind.message_level();
        let message_logger = config.message_logger(&self.identity.category);
        if env.sink.is_enabled(message_level, &message_logger) {
            env.sink.emit(LogRecord {
                level: message_level,
                marker: kind.message_marker(),
                logger: message_logger,
                message: readable_message(&data, kind, &config, self.last_current_time),
            });
        }

        let data_logger = config.data_logger(&self.identity.category);
        if env.sink.is_enabled(Level::TRACE, &data_logger) {
            let body = data
                .to_json()
                .map_err(|err: serde_json::Error| {
                    anyhow::Error::new(err).context("serializing data record")
                })?;
            env.sink.emit(LogRecord {
                level: Level::TRACE,
                marker: kind.data_marker(),
                logger: data_logger,
                message: body,
            });
        }
        Ok(())
    }
}

impl Drop for Meter {
    fn drop(&mut self) {
        if self.is_running() {
            self.close();
        }
    }
}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meter")
            .field("id", &self.identity.full_id())
            .field("state", &self.state())
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}
