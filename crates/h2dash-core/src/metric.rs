//! Tracked telemetry metrics
//!
//! The fixed catalogue of quantities the vehicle reports, together with the
//! gauge span, units and label format each one is displayed with.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a metric's current value is rendered as text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelFormat {
    /// Continuous quantity shown with a fixed number of decimals
    Decimal(u8),
    /// Count quantity shown as a whole number
    Integer,
}

/// One tracked telemetry quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Thermocouple temperature (MAX6675)
    Temperature,
    /// Hydrogen concentration estimate (MQ-8)
    HydrogenPpm,
    /// MQ-8 sensing resistance ratio RS/R0
    SensorRatio,
    /// GPS ground speed (SAM-M10Q)
    Speed,
}

impl Metric {
    /// Number of tracked metrics
    pub const COUNT: usize = 4;

    /// Every metric, in display order
    pub const ALL: [Metric; Metric::COUNT] = [
        Metric::Temperature,
        Metric::HydrogenPpm,
        Metric::SensorRatio,
        Metric::Speed,
    ];

    /// Stable position of this metric in [`Metric::ALL`]
    pub const fn index(self) -> usize {
        match self {
            Metric::Temperature => 0,
            Metric::HydrogenPpm => 1,
            Metric::SensorRatio => 2,
            Metric::Speed => 3,
        }
    }

    /// Lower end of the gauge span
    pub const fn min_value(self) -> f64 {
        0.0
    }

    /// Upper end of the gauge span
    pub const fn max_value(self) -> f64 {
        match self {
            Metric::Speed => 200.0,
            _ => 100.0,
        }
    }

    /// Display suffix
    pub const fn units(self) -> &'static str {
        match self {
            Metric::Temperature => "°C",
            Metric::HydrogenPpm => "ppm",
            Metric::SensorRatio => "",
            Metric::Speed => "km/h",
        }
    }

    /// Card/gauge title
    pub const fn title(self) -> &'static str {
        match self {
            Metric::Temperature => "Temperature",
            Metric::HydrogenPpm => "Hydrogen",
            Metric::SensorRatio => "Sensor Ratio",
            Metric::Speed => "Speed",
        }
    }

    /// Label format: ppm and km/h are counts, the rest are continuous
    pub const fn label_format(self) -> LabelFormat {
        match self {
            Metric::HydrogenPpm | Metric::Speed => LabelFormat::Integer,
            Metric::Temperature | Metric::SensorRatio => LabelFormat::Decimal(2),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_matches_all_order() {
        for (i, metric) in Metric::ALL.iter().enumerate() {
            assert_eq!(metric.index(), i);
        }
    }

    #[test]
    fn test_ranges() {
        assert_eq!(Metric::Temperature.max_value(), 100.0);
        assert_eq!(Metric::Speed.max_value(), 200.0);
        for metric in Metric::ALL {
            assert!(metric.max_value() > metric.min_value());
        }
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Metric::HydrogenPpm).unwrap();
        assert_eq!(json, "\"hydrogen_ppm\"");
    }
}
