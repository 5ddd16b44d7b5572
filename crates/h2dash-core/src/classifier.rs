//! Telemetry line classifier
//!
//! Maps one line of firmware output to the metric updates it carries.
//! Matching is deliberately loose: each pattern only has to match at the
//! start of the trimmed line, anything after the recognised prefix is
//! ignored, and lines nobody recognises are simply dropped.
//!
//! Recognised shapes (as printed by the vehicle firmware):
//!
//! | Line | Updates |
//! |---|---|
//! | `C = 23.500` | Temperature |
//! | `\| Sensor Ratio (RS/R0): 0.42 \| Hydrogen Estimate (ppm): 135` | SensorRatio, HydrogenPpm |
//! | `\| Hydrogen Estimate (ppm): 135` | HydrogenPpm |
//! | `88 km/h` | Speed |

use regex::Regex;

use crate::metric::Metric;

/// One recognised value, borrowed from the classified line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricUpdate<'a> {
    /// Metric the value belongs to
    pub metric: Metric,
    /// Numeric literal exactly as it appeared on the wire
    pub raw: &'a str,
}

/// A single line pattern and which capture group feeds which metric
struct Rule {
    regex: Regex,
    captures: Vec<(Metric, usize)>,
}

impl Rule {
    fn new(pattern: &str, captures: &[(Metric, usize)]) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            captures: captures.to_vec(),
        })
    }
}

/// Rules competing for the same metrics; the first that matches wins
struct PatternGroup {
    name: &'static str,
    rules: Vec<Rule>,
}

/// Line classifier holding the compiled pattern groups
pub struct LineClassifier {
    groups: Vec<PatternGroup>,
}

impl LineClassifier {
    /// Build the classifier for the standard firmware line shapes
    pub fn new() -> Result<Self, regex::Error> {
        let groups = vec![
            PatternGroup {
                name: "temperature",
                rules: vec![Rule::new(r"^C = (-?[\d.]+)", &[(Metric::Temperature, 1)])?],
            },
            PatternGroup {
                name: "hydrogen",
                rules: vec![
                    // The combined MQ-8 line supersedes the ppm-only variant
                    Rule::new(
                        r"^\| Sensor Ratio \(RS/R0\): ([\d.]+) \| Hydrogen Estimate \(ppm\): (\d+)",
                        &[(Metric::SensorRatio, 1), (Metric::HydrogenPpm, 2)],
                    )?,
                    Rule::new(
                        r"^\| Hydrogen Estimate \(ppm\): (\d+)",
                        &[(Metric::HydrogenPpm, 1)],
                    )?,
                ],
            },
            PatternGroup {
                name: "speed",
                rules: vec![Rule::new(r"^(\d+) km/h", &[(Metric::Speed, 1)])?],
            },
        ];
        Ok(Self { groups })
    }

    /// Classify a line into zero or more metric updates.
    ///
    /// Every group is tried against the line, so a single line may feed
    /// several metrics.
    pub fn classify<'a>(&self, line: &'a str) -> Vec<MetricUpdate<'a>> {
        let line = line.trim();
        let mut updates = Vec::new();

        for group in &self.groups {
            let Some((rule, caps)) = group
                .rules
                .iter()
                .find_map(|rule| rule.regex.captures(line).map(|caps| (rule, caps)))
            else {
                continue;
            };

            tracing::trace!("Line matched {} pattern: {line:?}", group.name);
            for &(metric, index) in &rule.captures {
                if let Some(m) = caps.get(index) {
                    updates.push(MetricUpdate {
                        metric,
                        raw: m.as_str(),
                    });
                }
            }
        }

        updates
    }
}
