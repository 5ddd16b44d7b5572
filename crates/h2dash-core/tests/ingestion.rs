//! End-to-end ingestion tests
//!
//! These drive the poll loop over an in-memory channel the same way the
//! dashboard drives it over a real serial port.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use h2dash_core::demo::DemoSimulator;
use h2dash_core::engine::{Engine, EngineEvent};
use h2dash_core::gauge::{GradientPreset, GradientSelector, PLACEHOLDER};
use h2dash_core::metric::Metric;
use h2dash_core::poller::{PollLoop, PollOutcome};
use h2dash_core::protocol::{ChannelReader, ConnectionState, MemoryChannel};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

/// Route engine logs to the test harness; set RUST_LOG to see them
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn poller_over(device: &MemoryChannel) -> (Arc<Engine>, PollLoop) {
    init_tracing();
    let engine = Arc::new(Engine::new().unwrap());
    let reader = ChannelReader::from_channel(Box::new(device.clone()));
    (Arc::clone(&engine), PollLoop::new(engine, reader))
}

#[test]
fn test_burst_with_undecodable_line_in_the_middle() {
    let device = MemoryChannel::new();
    device.push_line("C = 21.500");
    device.push_line("| Hydrogen Estimate (ppm): 12");
    device.push_bytes(b"C = \xff\xfe\r\n");
    device.push_line("| Sensor Ratio (RS/R0): 1.75 | Hydrogen Estimate (ppm): 66");
    device.push_line("88 km/h");
    let (engine, mut poller) = poller_over(&device);

    let outcome = poller.poll_once();
    assert_eq!(outcome.lines, 5);
    assert_eq!(outcome.updates, 5);
    assert_eq!(outcome.error, None);

    let store = engine.store();
    assert_eq!(store.get(Metric::Temperature), Some(21.5));
    assert_eq!(store.get(Metric::HydrogenPpm), Some(66.0));
    assert_eq!(store.get(Metric::SensorRatio), Some(1.75));
    assert_eq!(store.get(Metric::Speed), Some(88.0));
}

#[test]
fn test_burst_with_malformed_number_in_the_middle() {
    let device = MemoryChannel::new();
    device.push_line("C = 19.000");
    device.push_line("40 km/h");
    device.push_line("C = 1.2.3");
    device.push_line("| Hydrogen Estimate (ppm): 7");
    device.push_line("41 km/h");
    let (engine, mut poller) = poller_over(&device);

    let outcome = poller.poll_once();
    assert_eq!(outcome.lines, 5);
    assert_eq!(outcome.updates, 4);
    assert_eq!(outcome.skipped, 1);

    assert_eq!(engine.store().get(Metric::Temperature), Some(19.0));
    assert_eq!(engine.store().get(Metric::HydrogenPpm), Some(7.0));
    assert_eq!(engine.store().get(Metric::Speed), Some(41.0));
}

#[test]
fn test_combined_line_updates_both_metrics() {
    let device = MemoryChannel::new();
    device.push_line("| Sensor Ratio (RS/R0): 0.42 | Hydrogen Estimate (ppm): 135");
    let (engine, mut poller) = poller_over(&device);
    poller.poll_once();

    let snap = engine.snapshot();
    assert_eq!(snap.gauge(Metric::SensorRatio).unwrap().label, "0.42");
    assert_eq!(snap.gauge(Metric::HydrogenPpm).unwrap().label, "135");
    // Above the gauge span: label keeps the value, the needle pins
    assert_eq!(snap.gauge(Metric::HydrogenPpm).unwrap().fraction, 1.0);
}

#[test]
fn test_open_failure_degrades_to_placeholders() {
    init_tracing();
    let engine = Arc::new(Engine::new().unwrap());
    let reader = ChannelReader::open("/dev/h2dash-missing", 9600, Duration::from_millis(50));
    let mut poller = PollLoop::new(Arc::clone(&engine), reader);

    for _ in 0..5 {
        assert_eq!(poller.poll_once(), PollOutcome::default());
    }

    let snap = engine.snapshot();
    assert!(matches!(snap.connection, ConnectionState::Failed(_)));
    assert!(snap.status.unwrap().starts_with("Serial error: "));
    assert!(snap.gauges.iter().all(|g| g.label == PLACEHOLDER));
}

#[test]
fn test_gradient_switch_recolors_without_new_data() {
    let device = MemoryChannel::new();
    device.push_line("C = 50.000");
    let (engine, mut poller) = poller_over(&device);
    poller.poll_once();

    let before = engine.snapshot();
    engine
        .select_gradient(&"green yellow".parse::<GradientSelector>().unwrap())
        .unwrap();
    let after = engine.snapshot();

    assert_eq!(after.gradient, "Green-Yellow");
    assert_eq!(after.base_color, GradientPreset::GreenYellow.base_color());
    for (old, new) in before.gauges.iter().zip(&after.gauges) {
        assert_eq!(old.value, new.value);
        assert_eq!(old.label, new.label);
        assert_eq!(new.color, GradientPreset::GreenYellow.color_at(new.fraction));
    }
}

#[test]
fn test_repeated_line_is_idempotent() {
    let device = MemoryChannel::new();
    let (engine, mut poller) = poller_over(&device);

    device.push_line("120 km/h");
    poller.poll_once();
    let first = engine.store().snapshot();

    device.push_line("120 km/h");
    poller.poll_once();
    assert_eq!(engine.store().snapshot(), first);
}

#[test]
fn test_read_error_mid_tick_keeps_applied_lines() {
    let device = MemoryChannel::new();
    device.push_line("C = 30.000");
    device.push_line("50 km/h");
    let (engine, mut poller) = poller_over(&device);
    assert_eq!(poller.poll_once().updates, 2);

    // The device sends two more lines, then the read path fails
    device.push_line("C = 31.500");
    device.push_line("| Hydrogen Estimate (ppm): 9");
    device.fail_when_drained(io::ErrorKind::Other);
    let outcome = poller.poll_once();
    assert_eq!(outcome.lines, 2);
    assert_eq!(outcome.updates, 2);
    assert!(outcome.error.is_some());

    let snap = engine.snapshot();
    assert!(snap.status.as_deref().unwrap().starts_with("Read error: "));
    assert_eq!(snap.gauge(Metric::Temperature).unwrap().label, "31.50");
    assert_eq!(snap.gauge(Metric::HydrogenPpm).unwrap().label, "9");
    assert_eq!(snap.gauge(Metric::Speed).unwrap().label, "50");

    // A failing read before any new line changes nothing
    device.push_line("C = 99.000");
    device.fail_next(io::ErrorKind::Other);
    assert!(poller.poll_once().error.is_some());
    assert_eq!(engine.store().get(Metric::Temperature), Some(31.5));

    // The indicator lasts one tick; values stay
    let outcome = poller.poll_once();
    assert_eq!(outcome.error, None);
    assert_eq!(engine.status(), None);
    assert_eq!(engine.store().get(Metric::Temperature), Some(99.0));
    assert_eq!(engine.store().get(Metric::Speed), Some(50.0));
}

#[test]
fn test_negative_zero_temperature_reads_as_zero() {
    let device = MemoryChannel::new();
    device.push_line("C = -0");
    let (engine, mut poller) = poller_over(&device);
    poller.poll_once();

    let snap = engine.snapshot();
    let temperature = snap.gauge(Metric::Temperature).unwrap();
    assert_eq!(temperature.label, "0.00");
    assert!(temperature.fraction.is_sign_positive());
}

#[test]
fn test_disconnect_mid_session_keeps_values() {
    let device = MemoryChannel::new();
    device.push_line("C = 33.250");
    let (engine, mut poller) = poller_over(&device);
    poller.poll_once();

    device.disconnect();
    let outcome = poller.poll_once();
    assert!(outcome.error.is_some());
    assert_eq!(engine.store().get(Metric::Temperature), Some(33.25));
    assert!(engine.status().unwrap().starts_with("Read error: "));
}

#[tokio::test(start_paused = true)]
async fn test_demo_feed_fills_every_gauge() {
    let device = MemoryChannel::new();
    let (engine, poller) = poller_over(&device);
    let mut events = engine.subscribe();

    let cancel = CancellationToken::new();
    let feed = tokio::spawn(DemoSimulator::with_seed(42).feed(
        device.clone(),
        Duration::from_millis(250),
        cancel.clone(),
    ));
    let handle = poller.spawn(Duration::from_millis(500));

    tokio::time::sleep(Duration::from_millis(1600)).await;
    let snap = engine.snapshot();
    assert_eq!(snap.status, None);
    assert!(snap.gauges.iter().all(|g| g.value.is_some()), "{snap:?}");
    assert_eq!(events.recv().await.unwrap(), EngineEvent::Updated);

    cancel.cancel();
    feed.await.unwrap();
    handle.stop().await.unwrap();
    assert_eq!(engine.connection_state(), ConnectionState::Unopened);
}
