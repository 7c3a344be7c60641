use std::any::type_name;
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;
use opmeter_core::{
    session_id, ClockSource, LogSink, MeterConfig, MonotonicClock, PositionRegistry,
    StatusSampler, TracingSink,
};

use crate::context::CurrentMeter;
use crate::meter::Meter;
use crate::validator::{StandardValidator, Validator};

// ---------------------------------------------------------------------------
// MeterEnv
// ---------------------------------------------------------------------------

/// Collaborators shared by every meter of one factory.
pub struct MeterEnv {
    pub(crate) config: ArcSwap<MeterConfig>,
    pub(crate) positions: PositionRegistry,
    pub(crate) sink: Arc<dyn LogSink>,
    pub(crate) clock: Arc<dyn ClockSource>,
    pub(crate) validator: Arc<dyn Validator>,
    pub(crate) sampler: Option<Arc<dyn StatusSampler>>,
    pub(crate) session_id: String,
}

// ---------------------------------------------------------------------------
// MeterFactory
// ---------------------------------------------------------------------------

/// Creates meters bound to one sink, clock, configuration and position registry.
///
/// Cheap to clone; clones share everything, including position counters.
#[derive(Clone)]
pub struct MeterFactory {
    env: Arc<MeterEnv>,
}

impl MeterFactory {
    /// Factory with default collaborators writing to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self::builder(sink).build()
    }

    #[must_use]
    pub fn builder(sink: Arc<dyn LogSink>) -> MeterFactoryBuilder {
        MeterFactoryBuilder::new(sink)
    }

    /// Process-wide factory forwarding to `tracing`, configured from the
    /// `OPMETER_*` environment on first use.
    pub fn global() -> &'static MeterFactory {
        static GLOBAL: OnceLock<MeterFactory> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let config = MeterConfig::from_env().unwrap_or_else(|err| {
                tracing::warn!(error = %err, "invalid meter configuration, using defaults");
                MeterConfig::default()
            });
            MeterFactory::builder(Arc::new(TracingSink))
                .config(config)
                .build()
        })
    }

    /// Meter for `category` without an operation name.
    #[must_use]
    pub fn meter(&self, category: impl Into<String>) -> Meter {
        Meter::create(Arc::clone(&self.env), category.into(), None, None)
    }

    /// Meter for `category` measuring `operation`.
    #[must_use]
    pub fn operation_meter(&self, category: impl Into<String>, operation: impl Into<String>) -> Meter {
        Meter::create(
            Arc::clone(&self.env),
            category.into(),
            Some(operation.into()),
            None,
        )
    }

    /// Meter whose category is the type name of `T`.
    #[must_use]
    pub fn meter_for<T: ?Sized>(&self) -> Meter {
        self.meter(type_name::<T>())
    }

    /// Meter whose category is the type name of `T`, measuring `operation`.
    #[must_use]
    pub fn operation_meter_for<T: ?Sized>(&self, operation: impl Into<String>) -> Meter {
        self.operation_meter(type_name::<T>(), operation)
    }

    /// The operation running on this thread, or a `"???"` placeholder.
    #[must_use]
    pub fn current_meter(&self) -> CurrentMeter {
        CurrentMeter::active().unwrap_or_else(|| CurrentMeter::fallback(Arc::clone(&self.env)))
    }

    /// Child of the operation running on this thread, see [`Meter::sub`].
    #[must_use]
    pub fn current_sub_meter(&self, name: &str) -> Meter {
        self.current_meter().sub(name)
    }

    /// Snapshot of the live configuration.
    #[must_use]
    pub fn config(&self) -> Arc<MeterConfig> {
        self.env.config.load_full()
    }

    /// Replaces the configuration; meters pick it up on their next event.
    pub fn set_config(&self, config: MeterConfig) {
        self.env.config.store(Arc::new(config));
    }

    /// Applies `change` to a copy of the configuration and installs the result.
    pub fn update_config<F>(&self, change: F)
    where
        F: Fn(&mut MeterConfig),
    {
        self.env.config.rcu(|current| {
            let mut next = MeterConfig::clone(current);
            change(&mut next);
            next
        });
    }

    #[must_use]
    pub fn positions(&self) -> &PositionRegistry {
        &self.env.positions
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.env.session_id
    }
}

impl std::fmt::Debug for MeterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeterFactory")
            .field("session_id", &self.env.session_id)
            .field("config", &self.env.config.load_full())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// MeterFactoryBuilder
// ---------------------------------------------------------------------------

/// Builder replacing individual collaborators of a [`MeterFactory`].
pub struct MeterFactoryBuilder {
    sink: Arc<dyn LogSink>,
    config: MeterConfig,
    clock: Arc<dyn ClockSource>,
    validator: Arc<dyn Validator>,
    sampler: Option<Arc<dyn StatusSampler>>,
    session_id: Option<String>,
}

impl MeterFactoryBuilder {
    fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            config: MeterConfig::default(),
            clock: Arc::new(MonotonicClock),
            validator: Arc::new(StandardValidator),
            sampler: None,
            session_id: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: MeterConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    #[must_use]
    pub fn sampler(mut self, sampler: Arc<dyn StatusSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Overrides the process session id (defaults to [`session_id()`]).
    #[must_use]
    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn build(self) -> MeterFactory {
        MeterFactory {
            env: Arc::new(MeterEnv {
                config: ArcSwap::from_pointee(self.config),
                positions: PositionRegistry::new(),
                sink: self.sink,
                clock: self.clock,
                validator: self.validator,
                sampler: self.sampler,
                session_id: self
                    .session_id
                    .unwrap_or_else(|| session_id().to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use opmeter_core::Marker;

    use super::*;
    use crate::context::FALLBACK_CATEGORY;
    use crate::testing::fixture;

    struct Billing;

    #[test]
    fn meter_resolves_category() {
        let (factory, _sink, _clock) = fixture();
        let meter = factory.meter("billing");
        assert_eq!(meter.category(), "billing");
        assert_eq!(meter.operation(), None);
        assert_eq!(meter.session_id(), "test-session");
    }

    #[test]
    fn meter_for_uses_type_name() {
        let (factory, _sink, _clock) = fixture();
        let meter = factory.operation_meter_for::<Billing>("invoice");
        assert!(meter.category().ends_with("Billing"));
        assert_eq!(meter.operation(), Some("invoice"));
    }

    #[test]
    fn clones_share_position_counters() {
        let (factory, _sink, _clock) = fixture();
        let other = factory.clone();
        assert_eq!(factory.meter("k").position(), 1);
        assert_eq!(other.meter("k").position(), 2);
    }

    #[test]
    fn current_meter_without_active_operation_is_fallback() {
        let (factory, _sink, _clock) = fixture();
        let current = factory.current_meter();
        assert!(current.is_fallback());
        assert_eq!(current.category(), FALLBACK_CATEGORY);
    }

    #[test]
    fn current_sub_meter_extends_active_operation() {
        let (factory, _sink, _clock) = fixture();
        let mut parent = factory.operation_meter("svc", "op");
        parent.start();
        let sub = factory.current_sub_meter("s");
        assert_eq!(sub.category(), "svc");
        assert_eq!(sub.operation(), Some("op/s"));
        assert_eq!(sub.parent(), Some("svc/op#1"));
        parent.ok();
    }

    #[test]
    fn current_sub_meter_of_category_only_parent() {
        let (factory, _sink, _clock) = fixture();
        let mut parent = factory.meter("svc");
        parent.start();
        let sub = factory.current_sub_meter("s");
        assert_eq!(sub.operation(), Some("s"));
        parent.ok();
    }

    #[test]
    fn current_sub_meter_without_active_operation() {
        let (factory, _sink, _clock) = fixture();
        let sub = factory.current_sub_meter("s");
        assert_eq!(sub.category(), FALLBACK_CATEGORY);
        assert_eq!(sub.operation(), Some("s"));
        assert_eq!(sub.parent(), None);
    }

    #[test]
    fn config_changes_apply_to_live_meters() {
        let (factory, sink, _clock) = fixture();
        let mut meter = factory.meter("live");
        factory.update_config(|config| config.message_prefix = "msg.".to_string());
        meter.start();
        let start = &sink.with_marker(Marker::MsgStart)[0];
        assert_eq!(start.logger, "msg.live");
        assert_eq!(factory.config().progress_period, Duration::ZERO);
        meter.ok();
    }

    #[test]
    fn global_factory_is_shared() {
        let a = MeterFactory::global();
        let b = MeterFactory::global();
        assert!(std::ptr::eq(a, b));
    }
}
