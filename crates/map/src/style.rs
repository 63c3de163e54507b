//! Layer specifications and data-driven style expressions.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::feature::Properties;

pub const VISIBILITY: &str = "visibility";
pub const VISIBLE: &str = "visible";
pub const NONE: &str = "none";

/// Which side of a step breakpoint a value exactly on the breakpoint falls.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum StepBoundary {
    /// `x == stop` stays in the lower band; the band starts above the stop.
    LowerInclusive,
    /// `x == stop` moves to the upper band.
    UpperInclusive,
}

/// Style expression evaluated per feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Expr {
    Literal(Value),
    /// Feature property, `null` when absent.
    Get(String),
    /// True when the property is present and not `null`.
    Has(String),
    /// Feature state value, `null` when unset.
    FeatureState(String),
    Not(Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Zoom,
    Step {
        input: Box<Expr>,
        base: Value,
        stops: Vec<(f64, Value)>,
        boundary: StepBoundary,
    },
    Case {
        branches: Vec<(Expr, Expr)>,
        fallback: Box<Expr>,
    },
}

/// Inputs for evaluating an expression against one feature.
#[derive(Debug, Copy, Clone)]
pub struct EvalContext<'a> {
    pub properties: &'a Properties,
    pub state: Option<&'a Properties>,
    pub zoom: f64,
}

pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        _ => true,
    }
}

impl Expr {
    pub fn lit(v: impl Into<Value>) -> Self {
        Expr::Literal(v.into())
    }

    pub fn get(key: impl Into<String>) -> Self {
        Expr::Get(key.into())
    }

    pub fn has(key: impl Into<String>) -> Self {
        Expr::Has(key.into())
    }

    pub fn not(e: Expr) -> Self {
        Expr::Not(Box::new(e))
    }

    pub fn feature_state(key: impl Into<String>) -> Self {
        Expr::FeatureState(key.into())
    }

    pub fn step(
        input: Expr,
        base: impl Into<Value>,
        stops: Vec<(f64, Value)>,
        boundary: StepBoundary,
    ) -> Self {
        Expr::Step {
            input: Box::new(input),
            base: base.into(),
            stops,
            boundary,
        }
    }

    pub fn case(branches: Vec<(Expr, Expr)>, fallback: Expr) -> Self {
        Expr::Case {
            branches,
            fallback: Box::new(fallback),
        }
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Expr::Literal(v) => Some(v),
            _ => None,
        }
    }

    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Get(k) => ctx.properties.get(k).cloned().unwrap_or(Value::Null),
            Expr::Has(k) => Value::Bool(ctx.properties.get(k).is_some_and(|v| !v.is_null())),
            Expr::FeatureState(k) => ctx
                .state
                .and_then(|s| s.get(k))
                .cloned()
                .unwrap_or(Value::Null),
            Expr::Not(e) => Value::Bool(!truthy(&e.evaluate(ctx))),
            Expr::Eq(a, b) => Value::Bool(a.evaluate(ctx) == b.evaluate(ctx)),
            Expr::Zoom => Value::from(ctx.zoom),
            Expr::Step {
                input,
                base,
                stops,
                boundary,
            } => {
                let Some(x) = input.evaluate(ctx).as_f64() else {
                    return base.clone();
                };
                let mut out = base;
                for (stop, value) in stops {
                    let past = match boundary {
                        StepBoundary::LowerInclusive => x > *stop,
                        StepBoundary::UpperInclusive => x >= *stop,
                    };
                    if !past {
                        break;
                    }
                    out = value;
                }
                out.clone()
            }
            Expr::Case { branches, fallback } => {
                for (cond, value) in branches {
                    if truthy(&cond.evaluate(ctx)) {
                        return value.evaluate(ctx);
                    }
                }
                fallback.evaluate(ctx)
            }
        }
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::lit(s)
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::lit(v)
    }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        Expr::lit(v)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Fill,
    Line,
    Circle,
    Symbol,
    Raster,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSpec {
    pub id: String,
    pub source: String,
    pub kind: LayerKind,
    pub paint: BTreeMap<String, Expr>,
    pub layout: BTreeMap<String, Expr>,
    pub filter: Option<Expr>,
    pub min_zoom: Option<f64>,
    pub max_zoom: Option<f64>,
    /// Insert below this layer instead of on top.
    pub before: Option<String>,
}

impl LayerSpec {
    pub fn new(id: impl Into<String>, source: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            kind,
            paint: BTreeMap::new(),
            layout: BTreeMap::new(),
            filter: None,
            min_zoom: None,
            max_zoom: None,
            before: None,
        }
    }

    pub fn paint(mut self, prop: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.paint.insert(prop.into(), value.into());
        self
    }

    pub fn layout(mut self, prop: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.layout.insert(prop.into(), value.into());
        self
    }

    pub fn filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn max_zoom(mut self, z: f64) -> Self {
        self.max_zoom = Some(z);
        self
    }

    pub fn before(mut self, layer: Option<String>) -> Self {
        self.before = layer;
        self
    }

    pub fn visible(self, visible: bool) -> Self {
        self.layout(VISIBILITY, visibility_value(visible))
    }

    pub fn is_visible(&self) -> bool {
        self.layout
            .get(VISIBILITY)
            .and_then(|e| e.as_literal())
            .and_then(|v| v.as_str())
            != Some(NONE)
    }

    pub fn zoom_in_range(&self, zoom: f64) -> bool {
        self.min_zoom.is_none_or(|z| zoom >= z) && self.max_zoom.is_none_or(|z| zoom < z)
    }
}

pub fn visibility_value(visible: bool) -> &'static str {
    if visible { VISIBLE } else { NONE }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(v: Value) -> Properties {
        match v {
            Value::Object(m) => m,
            _ => Properties::new(),
        }
    }

    fn eval(e: &Expr, p: &Properties, state: Option<&Properties>) -> Value {
        e.evaluate(&EvalContext {
            properties: p,
            state,
            zoom: 5.0,
        })
    }

    #[test]
    fn step_boundaries() {
        let stops = vec![(10.0, json!("b")), (20.0, json!("c"))];
        let lower = Expr::step(Expr::get("v"), "a", stops.clone(), StepBoundary::LowerInclusive);
        let upper = Expr::step(Expr::get("v"), "a", stops, StepBoundary::UpperInclusive);

        let at = |v: f64| props(json!({ "v": v }));
        assert_eq!(eval(&lower, &at(10.0), None), json!("a"));
        assert_eq!(eval(&upper, &at(10.0), None), json!("b"));
        assert_eq!(eval(&lower, &at(10.5), None), json!("b"));
        assert_eq!(eval(&lower, &at(25.0), None), json!("c"));
        assert_eq!(eval(&lower, &props(json!({})), None), json!("a"));
    }

    #[test]
    fn case_has_and_feature_state() {
        let e = Expr::case(
            vec![(Expr::has("pm25"), Expr::lit("measured"))],
            Expr::lit("fallback"),
        );
        assert_eq!(eval(&e, &props(json!({ "pm25": 3.0 })), None), json!("measured"));
        assert_eq!(eval(&e, &props(json!({ "pm25": null })), None), json!("fallback"));

        let hover = Expr::case(
            vec![(Expr::feature_state("hover"), Expr::lit(0.9))],
            Expr::lit(0.6),
        );
        let state = props(json!({ "hover": true }));
        assert_eq!(eval(&hover, &Properties::new(), Some(&state)), json!(0.9));
        assert_eq!(eval(&hover, &Properties::new(), None), json!(0.6));
    }

    #[test]
    fn visibility_defaults_to_visible() {
        let spec = LayerSpec::new("l", "s", LayerKind::Fill);
        assert!(spec.is_visible());
        assert!(!spec.clone().visible(false).is_visible());
        assert!(spec.max_zoom(10.0).zoom_in_range(9.9));
    }
}
