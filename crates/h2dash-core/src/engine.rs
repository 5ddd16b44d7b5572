//! Engine facade
//!
//! Ties the classifier, metric store and gauge model together and exposes
//! the narrow interface the presentation layer works against:
//! [`Engine::snapshot`], [`Engine::connection_state`],
//! [`Engine::select_gradient`] and [`Engine::subscribe`].

use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::classifier::LineClassifier;
use crate::config::{ConfigError, EngineConfig};
use crate::gauge::{GaugeError, GaugeModel, GaugeReading, Gradient, GradientSelector, Rgb};
use crate::metric::Metric;
use crate::protocol::ConnectionState;
use crate::store::MetricStore;

/// Capacity of the event channel; slow subscribers miss old events
const EVENT_CAPACITY: usize = 64;

/// Errors raised while building an engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// A built-in line pattern failed to compile
    #[error("Pattern compile error: {0}")]
    Pattern(#[from] regex::Error),

    /// Configuration could not be used
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The configured gradient does not exist
    #[error(transparent)]
    Gauge(#[from] GaugeError),
}

/// Notifications for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// At least one metric changed during the last poll tick
    Updated,
    /// The active gradient was replaced; re-render with current values
    GradientChanged,
    /// A poll tick hit a read failure; stored values are unchanged
    ReadFailed {
        /// Error text of the failed read
        reason: String,
    },
    /// The poll loop has stopped and the channel is closed
    Stopped,
}

/// Consistent, display-ready view of every gauge
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Serial channel state at the time of the snapshot
    pub connection: ConnectionState,
    /// Name of the active gradient
    pub gradient: String,
    /// Accent color of the active gradient
    pub base_color: Rgb,
    /// Degraded-mode text to show in place of readings, if any
    pub status: Option<String>,
    /// One reading per metric, in display order
    pub gauges: Vec<GaugeReading>,
}

impl Snapshot {
    /// Reading for one metric
    pub fn gauge(&self, metric: Metric) -> Option<&GaugeReading> {
        self.gauges.iter().find(|g| g.metric == metric)
    }
}

/// Result of feeding one line through the engine
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LineOutcome {
    /// Values stored
    pub applied: usize,
    /// Values that matched a pattern but did not parse
    pub rejected: usize,
}

/// Telemetry engine shared between the poll task and renderers
pub struct Engine {
    classifier: LineClassifier,
    store: MetricStore,
    gauges: GaugeModel,
    connection: RwLock<ConnectionState>,
    tick_error: RwLock<Option<String>>,
    events: broadcast::Sender<EngineEvent>,
}

impl Engine {
    /// Engine with the default gradient and no connection yet
    pub fn new() -> Result<Self, EngineError> {
        Self::with_gradient(Gradient::default())
    }

    /// Engine starting with a specific gradient
    pub fn with_gradient(gradient: Gradient) -> Result<Self, EngineError> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            classifier: LineClassifier::new()?,
            store: MetricStore::new(),
            gauges: GaugeModel::new(gradient),
            connection: RwLock::new(ConnectionState::Unopened),
            tick_error: RwLock::new(None),
            events,
        })
    }

    /// Engine using the configured initial gradient
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let preset = config.gradient_selector()?.resolve()?;
        Self::with_gradient(preset.into())
    }

    /// Latest metric values
    pub fn store(&self) -> &MetricStore {
        &self.store
    }

    /// Gauge mapping and the active gradient
    pub fn gauges(&self) -> &GaugeModel {
        &self.gauges
    }

    /// Subscribe to engine notifications
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Classify one line and store every value it carries
    pub fn ingest_line(&self, line: &str) -> LineOutcome {
        let mut outcome = LineOutcome::default();
        for update in self.classifier.classify(line) {
            match self.store.update(update.metric, update.raw) {
                Ok(value) => {
                    tracing::debug!("{} = {}", update.metric, value);
                    outcome.applied += 1;
                }
                Err(e) => {
                    tracing::warn!("Skipping value: {e}");
                    outcome.rejected += 1;
                }
            }
        }
        outcome
    }

    /// State of the serial channel as last reported by the poll loop
    pub fn connection_state(&self) -> ConnectionState {
        self.connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_connection_state(&self, state: ConnectionState) {
        *self.connection.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Record how the last poll tick went and notify subscribers
    pub(crate) fn finish_tick(&self, updates: usize, error: Option<String>) {
        *self.tick_error.write().unwrap_or_else(PoisonError::into_inner) = error.clone();
        if updates > 0 {
            self.emit(EngineEvent::Updated);
        }
        if let Some(reason) = error {
            self.emit(EngineEvent::ReadFailed { reason });
        }
    }

    pub(crate) fn notify_stopped(&self) {
        self.emit(EngineEvent::Stopped);
    }

    /// Degraded-mode text: persistent for a failed open, one tick for a
    /// read failure
    pub fn status(&self) -> Option<String> {
        if let ConnectionState::Failed(reason) = self.connection_state() {
            return Some(format!("Serial error: {reason}"));
        }
        self.tick_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|reason| format!("Read error: {reason}"))
    }

    /// Switch the gradient for every gauge and request a re-render
    pub fn select_gradient(&self, selector: &GradientSelector) -> Result<Arc<Gradient>, GaugeError> {
        let gradient = self.gauges.select_gradient(selector)?;
        self.emit(EngineEvent::GradientChanged);
        Ok(gradient)
    }

    /// Install a custom gradient for every gauge
    pub fn install_gradient(&self, gradient: Gradient) -> Arc<Gradient> {
        let gradient = self.gauges.install(gradient);
        self.emit(EngineEvent::GradientChanged);
        gradient
    }

    /// Display-ready state of every gauge
    pub fn snapshot(&self) -> Snapshot {
        let values = self.store.snapshot();
        let (gradient, gauges) = self.gauges.readings(&values);
        Snapshot {
            connection: self.connection_state(),
            gradient: gradient.name().to_string(),
            base_color: gradient.base_color(),
            status: self.status(),
            gauges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gauge::GradientPreset;

    #[test]
    fn test_ingest_combined_line() {
        let engine = Engine::new().unwrap();
        let outcome =
            engine.ingest_line("| Sensor Ratio (RS/R0): 0.42 | Hydrogen Estimate (ppm): 135");
        assert_eq!(outcome, LineOutcome { applied: 2, rejected: 0 });

        let snap = engine.snapshot();
        assert_eq!(snap.gauge(Metric::SensorRatio).unwrap().value, Some(0.42));
        assert_eq!(snap.gauge(Metric::HydrogenPpm).unwrap().value, Some(135.0));
        assert_eq!(snap.gauge(Metric::HydrogenPpm).unwrap().label, "135");
    }

    #[test]
    fn test_ingest_noise() {
        let engine = Engine::new().unwrap();
        assert_eq!(engine.ingest_line("MQ-8 sensor initializing..."), LineOutcome::default());
        assert!(engine.store().snapshot().is_unset());
    }

    #[test]
    fn test_ingest_malformed_literal() {
        let engine = Engine::new().unwrap();
        engine.ingest_line("C = 20.5");
        let outcome = engine.ingest_line("C = 2..5");
        assert_eq!(outcome, LineOutcome { applied: 0, rejected: 1 });
        assert_eq!(engine.store().get(Metric::Temperature), Some(20.5));
    }

    #[test]
    fn test_placeholder_snapshot() {
        let engine = Engine::new().unwrap();
        let snap = engine.snapshot();
        assert_eq!(snap.connection, ConnectionState::Unopened);
        assert_eq!(snap.gauges.len(), Metric::COUNT);
        assert!(snap.gauges.iter().all(|g| g.label == "--"));
        assert_eq!(snap.status, None);
    }

    #[test]
    fn test_failed_status_is_persistent() {
        let engine = Engine::new().unwrap();
        engine.set_connection_state(ConnectionState::Failed("No such file".into()));
        engine.finish_tick(0, None);
        assert_eq!(engine.status().as_deref(), Some("Serial error: No such file"));
    }

    #[test]
    fn test_read_error_status_lasts_one_tick() {
        let engine = Engine::new().unwrap();
        engine.set_connection_state(ConnectionState::Open);
        engine.finish_tick(0, Some("Read timeout".into()));
        assert_eq!(engine.status().as_deref(), Some("Read error: Read timeout"));
        engine.finish_tick(1, None);
        assert_eq!(engine.status(), None);
    }

    #[test]
    fn test_gradient_change_event() {
        let engine = Engine::new().unwrap();
        let mut rx = engine.subscribe();
        engine
            .select_gradient(&GradientSelector::Index(1))
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), EngineEvent::GradientChanged);
        assert_eq!(engine.snapshot().gradient, "Red-Orange");
        assert_eq!(
            engine.snapshot().base_color,
            GradientPreset::RedOrange.base_color()
        );
    }

    #[test]
    fn test_install_custom_gradient() {
        let engine = Engine::new().unwrap();
        engine.ingest_line("C = 50.000");
        let mut rx = engine.subscribe();

        let base = Rgb::new(0, 200, 100);
        engine.install_gradient(Gradient::ramp(base));
        assert_eq!(rx.try_recv().unwrap(), EngineEvent::GradientChanged);

        let snap = engine.snapshot();
        assert_eq!(snap.gradient, "#00c864");
        assert_eq!(snap.base_color, base);
        let temperature = snap.gauge(Metric::Temperature).unwrap();
        assert_eq!(temperature.fraction, 0.5);
        assert_eq!(temperature.color, Gradient::ramp(base).color_at(0.5));
        assert_eq!(
            snap.gauge(Metric::Speed).unwrap().color,
            Gradient::ramp(base).color_at(0.0)
        );
    }

    #[test]
    fn test_rejected_gradient_emits_nothing() {
        let engine = Engine::new().unwrap();
        let mut rx = engine.subscribe();
        assert!(engine.select_gradient(&GradientSelector::Index(9)).is_err());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_from_config_gradient() {
        let config = EngineConfig {
            gradient: "purple pink".to_string(),
            ..EngineConfig::default()
        };
        let engine = Engine::from_config(&config).unwrap();
        assert_eq!(engine.gauges().active().name(), "Purple-Pink");
    }
}
