//! Demo Mode - Simulated vehicle telemetry for testing
//!
//! Produces the same text lines the vehicle firmware prints, so the whole
//! ingestion pipeline can run without hardware attached. Simulates a
//! thermocouple warming up, an MQ-8 hydrogen sensor with occasional leak
//! spikes, and a GPS speed trace from a simple stop-and-go drive cycle.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::protocol::MemoryChannel;

/// MQ-8 power-law curve: ppm = A * ratio^B
const MQ8_A: f64 = 976.97;
const MQ8_B: f64 = -0.688;

/// Start-up chatter printed before any readings
const BOOT_BANNER: [&str; 5] = [
    "MAX6675 test",
    "MQ-8 sensor initializing...",
    "Calibrating please wait..........  done!.",
    "SparkFun Ublox Example",
    "UBX-AID-INI (time/position aiding) sent.",
];

/// Demo simulator generating firmware-format telemetry lines
pub struct DemoSimulator {
    /// Time when simulation started (ms)
    start_time_ms: Option<u64>,
    /// Last update time (ms)
    last_update_ms: u64,
    /// Current drive phase
    drive: DrivePhase,
    /// Current speed (smoothed, km/h)
    speed: f64,
    /// Cruise speed for the current leg
    cruise_speed: f64,
    /// Hydrogen leak currently decaying (ppm above baseline)
    leak_ppm: f64,
    /// Random number generator
    rng: StdRng,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DrivePhase {
    /// Standing still
    Stopped { until_ms: u64 },
    /// Accelerating toward cruise speed
    Accelerating,
    /// Holding speed
    Cruising { until_ms: u64 },
    /// Braking to a stop
    Braking,
}

impl Default for DemoSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoSimulator {
    /// Create a new demo simulator
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Deterministic simulator for tests
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            start_time_ms: None,
            last_update_ms: 0,
            drive: DrivePhase::Stopped { until_ms: 3000 },
            speed: 0.0,
            cruise_speed: 0.0,
            leak_ppm: 0.0,
            rng,
        }
    }

    /// Lines the firmware prints while booting
    pub fn boot_banner() -> impl Iterator<Item = &'static str> {
        BOOT_BANNER.into_iter()
    }

    /// Advance the simulation and return the lines printed this step
    ///
    /// # Arguments
    /// * `elapsed_ms` - Milliseconds since simulation started
    pub fn update(&mut self, elapsed_ms: u64) -> Vec<String> {
        let start = *self.start_time_ms.get_or_insert(elapsed_ms);
        let sim_time = elapsed_ms.saturating_sub(start);
        let delta_ms = elapsed_ms.saturating_sub(self.last_update_ms.max(start));
        self.last_update_ms = elapsed_ms;
        let t = sim_time as f64 / 1000.0;
        let dt = delta_ms as f64 / 1000.0;

        // Thermocouple: warm-up curve with a little jitter
        let temperature = 20.0 + 60.0 * (1.0 - (-t / 120.0).exp()) + self.rng.gen_range(-0.25..0.25);

        // Hydrogen: clean-air baseline plus occasional decaying leak spikes
        if self.rng.gen_bool(0.03) {
            self.leak_ppm += self.rng.gen_range(10.0..40.0);
        }
        self.leak_ppm *= (-dt / 8.0).exp();
        let ppm = (50.0 + 3.0 * (t * 0.2).sin() + self.leak_ppm).max(1.0);
        let ratio = (ppm / MQ8_A).powf(1.0 / MQ8_B);

        self.update_drive(sim_time, dt);

        vec![
            format!("C = {:.3}", temperature),
            format!(
                "| Sensor Ratio (RS/R0): {:.2} | Hydrogen Estimate (ppm): {:.0}",
                ratio, ppm
            ),
            format!("{} km/h", self.speed.max(0.0) as i64),
        ]
    }

    /// Drive cycle state machine
    fn update_drive(&mut self, sim_time: u64, dt: f64) {
        const ACCEL_KMH_PER_S: f64 = 12.0;
        const BRAKE_KMH_PER_S: f64 = 18.0;

        match self.drive {
            DrivePhase::Stopped { until_ms } => {
                self.speed = 0.0;
                if sim_time >= until_ms {
                    self.cruise_speed = self.rng.gen_range(40.0..130.0);
                    self.drive = DrivePhase::Accelerating;
                }
            }
            DrivePhase::Accelerating => {
                self.speed = (self.speed + ACCEL_KMH_PER_S * dt).min(self.cruise_speed);
                if self.speed >= self.cruise_speed {
                    let hold = self.rng.gen_range(5000..20000);
                    self.drive = DrivePhase::Cruising {
                        until_ms: sim_time + hold,
                    };
                }
            }
            DrivePhase::Cruising { until_ms } => {
                self.speed = self.cruise_speed + self.rng.gen_range(-1.5..1.5);
                if sim_time >= until_ms {
                    self.drive = DrivePhase::Braking;
                }
            }
            DrivePhase::Braking => {
                self.speed = (self.speed - BRAKE_KMH_PER_S * dt).max(0.0);
                if self.speed <= 0.0 {
                    let wait = self.rng.gen_range(2000..6000);
                    self.drive = DrivePhase::Stopped {
                        until_ms: sim_time + wait,
                    };
                }
            }
        }
    }

    /// Write simulated output into `channel` every `period` until cancelled.
    ///
    /// Every twentieth step also emits a line of line noise with invalid
    /// UTF-8, the way a flaky USB cable does.
    pub async fn feed(mut self, channel: MemoryChannel, period: Duration, cancel: CancellationToken) {
        for line in Self::boot_banner() {
            channel.push_line(line);
        }

        let start = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval(period);
        let mut step: u64 = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let elapsed_ms = start.elapsed().as_millis() as u64;
                    for line in self.update(elapsed_ms) {
                        channel.push_line(&line);
                    }
                    step += 1;
                    if step % 20 == 0 {
                        channel.push_bytes(b"\xff\xfe| Sens\xc3or R\r\n");
                    }
                }
            }
        }
        tracing::debug!("Demo feed stopped after {step} steps");
    }
}
