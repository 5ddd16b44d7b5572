//! Gauge model
//!
//! Turns raw metric values into what a gauge shows: a fraction of the
//! gauge span, a color from the active gradient, and a text label.
//!
//! One gradient is active for all gauges at a time. It is owned by
//! [`GaugeModel`] and only changes through [`GaugeModel::select_gradient`]
//! (or [`GaugeModel::install`] for custom gradients), which swaps the
//! gradient and its base color together.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

use crate::metric::{LabelFormat, Metric};
use crate::store::MetricValues;

/// Label shown for a metric that has never been read
pub const PLACEHOLDER: &str = "--";

/// Errors from gauge configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GaugeError {
    /// No preset matches the requested index or name
    #[error("Unknown gradient: {0}")]
    UnknownGradient(String),

    /// Not a `#rrggbb` color
    #[error("Invalid color: {0}")]
    InvalidColor(String),
}

/// 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    /// Red channel
    pub red: u8,
    /// Green channel
    pub green: u8,
    /// Blue channel
    pub blue: u8,
}

impl Rgb {
    /// Color from its three channels
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Convert to CSS hex color
    pub fn to_css_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }

    /// Create from CSS hex color (`#rrggbb`)
    pub fn from_css_hex(hex: &str) -> Result<Self, GaugeError> {
        let digits = hex.trim_start_matches('#');
        let component = |range: std::ops::Range<usize>| {
            digits
                .get(range)
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| GaugeError::InvalidColor(hex.to_string()))
        };
        if digits.len() != 6 {
            return Err(GaugeError::InvalidColor(hex.to_string()));
        }
        Ok(Self::new(component(0..2)?, component(2..4)?, component(4..6)?))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_css_hex())
    }
}

/// Truncate a computed component the way the gradient formulas expect
fn component(v: f64) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

/// Built-in gradients offered by the dashboard selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GradientPreset {
    /// Blue shading toward teal; the default
    BlueBlack,
    /// Red warming to orange
    RedOrange,
    /// Green warming to yellow
    GreenYellow,
    /// Purple warming to pink
    PurplePink,
}

impl GradientPreset {
    /// Presets in selector order
    pub const ALL: [GradientPreset; 4] = [
        GradientPreset::BlueBlack,
        GradientPreset::RedOrange,
        GradientPreset::GreenYellow,
        GradientPreset::PurplePink,
    ];

    /// Display name, as listed in the selector
    pub const fn name(self) -> &'static str {
        match self {
            GradientPreset::BlueBlack => "Blue-Black",
            GradientPreset::RedOrange => "Red-Orange",
            GradientPreset::GreenYellow => "Green-Yellow",
            GradientPreset::PurplePink => "Purple-Pink",
        }
    }

    /// Accent color used for titles, units and needles
    pub const fn base_color(self) -> Rgb {
        match self {
            GradientPreset::BlueBlack => Rgb::new(0x1e, 0x90, 0xff),
            GradientPreset::RedOrange => Rgb::new(0xff, 0x66, 0x00),
            GradientPreset::GreenYellow => Rgb::new(0x66, 0xff, 0x33),
            GradientPreset::PurplePink => Rgb::new(0xcc, 0x66, 0xff),
        }
    }

    /// Color at fraction `f` of the gauge span
    pub fn color_at(self, f: f64) -> Rgb {
        match self {
            GradientPreset::BlueBlack => Rgb::new(
                component(30.0 + f * 20.0),
                component(144.0 + f * 40.0),
                component(255.0 - f * 80.0),
            ),
            GradientPreset::RedOrange => Rgb::new(
                255,
                component(100.0 + f * 100.0),
                component(30.0 + f * 30.0),
            ),
            GradientPreset::GreenYellow => Rgb::new(
                component(50.0 + f * 100.0),
                255,
                component(50.0 + f * 50.0),
            ),
            GradientPreset::PurplePink => Rgb::new(
                component(150.0 + f * 80.0),
                component(50.0 + f * 100.0),
                255,
            ),
        }
    }

    /// Preset at a selector position
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Case-insensitive lookup; spaces, hyphens and underscores are equivalent
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = normalize_name(name);
        Self::ALL
            .into_iter()
            .find(|p| normalize_name(p.name()) == wanted)
    }
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// How the presentation layer asks for a gradient
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradientSelector {
    /// Position in [`GradientPreset::ALL`]
    Index(usize),
    /// Preset name, matched loosely
    Name(String),
}

impl GradientSelector {
    /// The preset this selector refers to
    pub fn resolve(&self) -> Result<GradientPreset, GaugeError> {
        match self {
            GradientSelector::Index(i) => GradientPreset::from_index(*i)
                .ok_or_else(|| GaugeError::UnknownGradient(i.to_string())),
            GradientSelector::Name(name) => GradientPreset::from_name(name)
                .ok_or_else(|| GaugeError::UnknownGradient(name.clone())),
        }
    }
}

impl FromStr for GradientSelector {
    type Err = GaugeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(GaugeError::UnknownGradient(String::new()));
        }
        Ok(match s.parse::<usize>() {
            Ok(i) => GradientSelector::Index(i),
            Err(_) => GradientSelector::Name(s.to_string()),
        })
    }
}

impl From<GradientPreset> for GradientSelector {
    fn from(preset: GradientPreset) -> Self {
        GradientSelector::Name(preset.name().to_string())
    }
}

type GradientFn = dyn Fn(f64) -> Rgb + Send + Sync;

/// A named fraction-to-color mapping plus its base color
#[derive(Clone)]
pub struct Gradient {
    name: String,
    base_color: Rgb,
    func: Arc<GradientFn>,
}

impl Gradient {
    /// Build a custom gradient from any color function
    pub fn new(
        name: impl Into<String>,
        base_color: Rgb,
        func: impl Fn(f64) -> Rgb + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            base_color,
            func: Arc::new(func),
        }
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accent color paired with this gradient
    pub fn base_color(&self) -> Rgb {
        self.base_color
    }

    /// Color for a fraction; the input is clamped to [0, 1] first
    pub fn color_at(&self, fraction: f64) -> Rgb {
        let f = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        (self.func)(f)
    }

    /// Single-hue gradient running from a dimmed `base` up to `base`
    /// itself, named after its hex code
    pub fn ramp(base: Rgb) -> Self {
        let scale = |channel: u8, f: f64| component(channel as f64 * (2.0 + 3.0 * f) / 5.0);
        Gradient::new(base.to_css_hex(), base, move |f| {
            Rgb::new(
                scale(base.red, f),
                scale(base.green, f),
                scale(base.blue, f),
            )
        })
    }
}

impl From<GradientPreset> for Gradient {
    fn from(preset: GradientPreset) -> Self {
        Gradient::new(preset.name(), preset.base_color(), move |f| {
            preset.color_at(f)
        })
    }
}

impl Default for Gradient {
    fn default() -> Self {
        GradientPreset::BlueBlack.into()
    }
}

impl fmt::Debug for Gradient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gradient")
            .field("name", &self.name)
            .field("base_color", &self.base_color)
            .finish_non_exhaustive()
    }
}

/// Position of `value` within `[min, max]`, clamped to [0, 1]
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    // Fold -0.0 into 0.0
    let value = value + 0.0;
    let span = max - min;
    if span.is_nan() || span <= 0.0 || !value.is_finite() {
        return 0.0;
    }
    ((value - min) / span).clamp(0.0, 1.0)
}

/// Text shown on a gauge for the given value
pub fn format_label(metric: Metric, value: Option<f64>) -> String {
    match (value.map(|v| v + 0.0), metric.label_format()) {
        (None, _) => PLACEHOLDER.to_string(),
        (Some(v), LabelFormat::Integer) => format!("{:.0}", v),
        (Some(v), LabelFormat::Decimal(places)) => format!("{:.*}", places as usize, v),
    }
}

/// Display-ready state of one gauge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeReading {
    /// Metric shown on this gauge
    pub metric: Metric,
    /// Gauge title
    pub title: &'static str,
    /// Stored value, `None` before the first reading
    pub value: Option<f64>,
    /// Needle position in [0, 1]
    pub fraction: f64,
    /// Formatted value or [`PLACEHOLDER`]
    pub label: String,
    /// Units suffix, possibly empty
    pub units: &'static str,
    /// Gradient color at `fraction`
    pub color: Rgb,
}

/// Owner of the active gradient and the value-to-display mapping
#[derive(Debug)]
pub struct GaugeModel {
    active: RwLock<Arc<Gradient>>,
}

impl Default for GaugeModel {
    fn default() -> Self {
        Self::new(Gradient::default())
    }
}

impl GaugeModel {
    /// Model starting with `gradient` active
    pub fn new(gradient: Gradient) -> Self {
        Self {
            active: RwLock::new(Arc::new(gradient)),
        }
    }

    /// The gradient currently in effect
    pub fn active(&self) -> Arc<Gradient> {
        Arc::clone(&self.active.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Switch every gauge to a preset gradient
    pub fn select_gradient(
        &self,
        selector: &GradientSelector,
    ) -> Result<Arc<Gradient>, GaugeError> {
        let preset = selector.resolve()?;
        Ok(self.install(preset.into()))
    }

    /// Replace the active gradient wholesale
    pub fn install(&self, gradient: Gradient) -> Arc<Gradient> {
        let gradient = Arc::new(gradient);
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&gradient);
        tracing::info!("Gauge gradient set to {}", gradient.name());
        gradient
    }

    /// Fraction of the metric's span; unset metrics sit at the bottom
    pub fn normalize(&self, metric: Metric, value: Option<f64>) -> f64 {
        value.map_or(0.0, |v| normalize(v, metric.min_value(), metric.max_value()))
    }

    /// Color for a fraction under the active gradient
    pub fn color_for(&self, fraction: f64) -> Rgb {
        self.active().color_at(fraction)
    }

    /// Label for a value of `metric`
    pub fn label(&self, metric: Metric, value: Option<f64>) -> String {
        format_label(metric, value)
    }

    fn reading_with(gradient: &Gradient, metric: Metric, value: Option<f64>) -> GaugeReading {
        let fraction = value.map_or(0.0, |v| normalize(v, metric.min_value(), metric.max_value()));
        GaugeReading {
            metric,
            title: metric.title(),
            value,
            fraction,
            label: format_label(metric, value),
            units: metric.units(),
            color: gradient.color_at(fraction),
        }
    }

    /// Display state for one metric
    pub fn reading(&self, metric: Metric, value: Option<f64>) -> GaugeReading {
        Self::reading_with(&self.active(), metric, value)
    }

    /// Display state for every metric, all colored by the same gradient
    pub fn readings(&self, values: &MetricValues) -> (Arc<Gradient>, Vec<GaugeReading>) {
        let gradient = self.active();
        let readings = values
            .iter()
            .map(|(metric, value)| Self::reading_with(&gradient, metric, value))
            .collect();
        (gradient, readings)
    }
}
