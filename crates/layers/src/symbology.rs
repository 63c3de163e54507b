//! Color scales and legends.

use map::style::{Expr, StepBoundary};
use serde::Serialize;
use serde_json::Value;

pub const GOOD: &str = "#22C55E";
pub const MODERATE: &str = "#EAB308";
pub const UNHEALTHY_SENSITIVE: &str = "#F97316";
pub const UNHEALTHY: &str = "#EF4444";
pub const VERY_UNHEALTHY: &str = "#A855F7";
pub const HAZARDOUS: &str = "#7F1D1D";

pub const STATION_ACTIVE: &str = "#22C55E";
pub const STATION_INACTIVE: &str = "#9CA3AF";
pub const NO_DATA: &str = "#9CA3AF";

pub const CLUSTER_COLORS: [&str; 3] = ["#60A5FA", "#3B82F6", "#1D4ED8"];
pub const CLUSTER_RADII: [f64; 3] = [18.0, 24.0, 32.0];
pub const CLUSTER_BREAKS: [f64; 2] = [10.0, 50.0];

const BAND_COLORS: [&str; 6] = [
    GOOD,
    MODERATE,
    UNHEALTHY_SENSITIVE,
    UNHEALTHY,
    VERY_UNHEALTHY,
    HAZARDOUS,
];

const BAND_LABELS: [&str; 6] = [
    "Good",
    "Moderate",
    "Unhealthy for Sensitive Groups",
    "Unhealthy",
    "Very Unhealthy",
    "Hazardous",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub label: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub title: String,
    pub entries: Vec<LegendEntry>,
}

/// A stepped color scale over one numeric feature property.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ColorRamp {
    pub property: &'static str,
    pub title: &'static str,
    /// One fewer than `colors`.
    pub breaks: &'static [f64],
    pub colors: &'static [&'static str],
    pub labels: &'static [&'static str],
}

pub const AQI_RAMP: ColorRamp = ColorRamp {
    property: "mean_aqi",
    title: "Air Quality Index",
    breaks: &[50.0, 100.0, 150.0, 200.0, 300.0],
    colors: &BAND_COLORS,
    labels: &BAND_LABELS,
};

pub const PM25_RAMP: ColorRamp = ColorRamp {
    property: "pm25",
    title: "PM2.5 (µg/m³)",
    breaks: &[12.0, 35.4, 55.4, 150.4, 250.4],
    colors: &BAND_COLORS,
    labels: &BAND_LABELS,
};

impl ColorRamp {
    /// Band index of `v`. A value on a breakpoint stays in the lower band.
    pub fn band(&self, v: f64) -> usize {
        self.breaks.iter().take_while(|b| v > **b).count()
    }

    pub fn color_for(&self, v: f64) -> &'static str {
        self.colors[self.band(v).min(self.colors.len() - 1)]
    }

    pub fn label_for(&self, v: f64) -> &'static str {
        self.labels[self.band(v).min(self.labels.len() - 1)]
    }

    /// Step expression over the ramp's property, evaluated on the host.
    pub fn expr(&self) -> Expr {
        Expr::step(
            Expr::get(self.property),
            self.colors[0],
            self.breaks
                .iter()
                .zip(&self.colors[1..])
                .map(|(b, c)| (*b, Value::from(*c)))
                .collect(),
            StepBoundary::LowerInclusive,
        )
    }

    /// Ramp color when the property is present, `fallback` otherwise.
    pub fn expr_or(&self, fallback: Expr) -> Expr {
        Expr::case(vec![(Expr::has(self.property), self.expr())], fallback)
    }

    pub fn legend(&self) -> Legend {
        let mut entries = Vec::with_capacity(self.colors.len());
        let mut lower = 0.0;
        for (i, color) in self.colors.iter().enumerate() {
            let range = match self.breaks.get(i) {
                Some(upper) => format!("{lower}–{upper}"),
                None => format!("> {lower}"),
            };
            entries.push(LegendEntry {
                label: format!("{} ({range})", self.labels[i]),
                color: color.to_string(),
            });
            if let Some(upper) = self.breaks.get(i) {
                lower = *upper;
            }
        }
        Legend {
            title: self.title.to_string(),
            entries,
        }
    }
}

/// Cluster circle paint keyed on `point_count`: under 10, 10 to 49, 50 up.
pub fn cluster_color() -> Expr {
    cluster_step(CLUSTER_COLORS.map(Value::from))
}

pub fn cluster_radius() -> Expr {
    cluster_step(CLUSTER_RADII.map(Value::from))
}

fn cluster_step(values: [Value; 3]) -> Expr {
    let [small, mid, large] = values;
    Expr::step(
        Expr::get("point_count"),
        small,
        vec![(CLUSTER_BREAKS[0], mid), (CLUSTER_BREAKS[1], large)],
        StepBoundary::UpperInclusive,
    )
}

/// Legend for a continuous raster palette spread over `min..max`.
pub fn palette_legend(title: &str, palette: &[String], min: f64, max: f64) -> Option<Legend> {
    if palette.is_empty() {
        return None;
    }
    let steps = palette.len().saturating_sub(1).max(1) as f64;
    let entries = palette
        .iter()
        .enumerate()
        .map(|(i, color)| LegendEntry {
            label: format!("{:.3}", min + (max - min) * i as f64 / steps),
            color: color.clone(),
        })
        .collect();
    Some(Legend {
        title: title.to_string(),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use map::feature::Properties;
    use map::style::EvalContext;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn eval(e: &Expr, key: &str, v: Value) -> Value {
        let mut props = Properties::new();
        props.insert(key.to_string(), v);
        e.evaluate(&EvalContext {
            properties: &props,
            state: None,
            zoom: 8.0,
        })
    }

    #[test]
    fn aqi_boundaries() {
        let cases = [
            (0.0, GOOD),
            (50.0, GOOD),
            (50.5, MODERATE),
            (75.0, MODERATE),
            (100.0, MODERATE),
            (150.0, UNHEALTHY_SENSITIVE),
            (200.0, UNHEALTHY),
            (201.0, VERY_UNHEALTHY),
            (300.0, VERY_UNHEALTHY),
            (301.0, HAZARDOUS),
        ];
        let expr = AQI_RAMP.expr();
        for (v, color) in cases {
            assert_eq!(AQI_RAMP.color_for(v), color, "aqi {v}");
            assert_eq!(eval(&expr, "mean_aqi", json!(v)), json!(color), "expr at {v}");
        }
        assert_eq!(AQI_RAMP.label_for(75.0), "Moderate");
    }

    #[test]
    fn pm25_boundaries() {
        assert_eq!(PM25_RAMP.color_for(12.0), GOOD);
        assert_eq!(PM25_RAMP.color_for(12.1), MODERATE);
        assert_eq!(PM25_RAMP.color_for(35.4), MODERATE);
        assert_eq!(PM25_RAMP.color_for(250.5), HAZARDOUS);
    }

    #[test]
    fn fallback_applies_only_without_the_property() {
        let e = PM25_RAMP.expr_or(Expr::lit(STATION_INACTIVE));
        assert_eq!(eval(&e, "pm25", json!(40.0)), json!(UNHEALTHY_SENSITIVE));
        assert_eq!(eval(&e, "pm25", Value::Null), json!(STATION_INACTIVE));
    }

    #[test]
    fn cluster_steps() {
        let e = cluster_color();
        assert_eq!(eval(&e, "point_count", json!(9)), json!(CLUSTER_COLORS[0]));
        assert_eq!(eval(&e, "point_count", json!(10)), json!(CLUSTER_COLORS[1]));
        assert_eq!(eval(&e, "point_count", json!(49)), json!(CLUSTER_COLORS[1]));
        assert_eq!(eval(&e, "point_count", json!(50)), json!(CLUSTER_COLORS[2]));
    }

    #[test]
    fn legend_lists_every_band() {
        let legend = AQI_RAMP.legend();
        assert_eq!(legend.entries.len(), 6);
        assert_eq!(legend.entries[0].label, "Good (0–50)");
        assert_eq!(legend.entries[5].label, "Hazardous (> 300)");
    }
}
