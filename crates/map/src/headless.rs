//! In-memory map host.
//!
//! `HeadlessMap` keeps the same bookkeeping a browser map widget does
//! (sources, z-ordered layers, paint/layout properties, feature state and
//! event handlers) and renders nothing. Pointer input is simulated with
//! [`HeadlessMap::click`] and [`HeadlessMap::hover`], which return the events
//! the registered handlers would have received, topmost layer first.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use foundation::geo::{LngLat, ScreenPoint, Viewport};
use serde_json::Value;

use crate::cluster::{self, ClusterNode};
use crate::events::{EventKind, HandlerId, MapEvent, QueriedFeature};
use crate::feature::{Geometry, MapFeature, Properties};
use crate::host::{MapError, MapHost};
use crate::picking::{self, DEFAULT_CIRCLE_RADIUS_PX, LINE_HIT_PX, SYMBOL_HIT_PX};
use crate::source::{SourceSpec, TileCoord, fill_template};
use crate::style::{EvalContext, Expr, LayerKind, LayerSpec, VISIBILITY, truthy};

/// Set on the ids of virtual cluster features so they never collide with
/// source feature ids.
pub const CLUSTER_FEATURE_BIT: u64 = 1 << 63;

pub const DEFAULT_WIDTH: f64 = 1024.0;
pub const DEFAULT_HEIGHT: f64 = 768.0;
pub const MAX_ZOOM: f64 = 22.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Ready,
    Destroyed,
}

#[derive(Debug, Clone)]
struct Handler {
    kind: EventKind,
    layer: String,
}

type ReadyCallback = Box<dyn FnOnce(&mut HeadlessMap)>;

pub struct HeadlessMap {
    container: String,
    base_style: String,
    viewport: Viewport,
    phase: Phase,
    sources: Vec<(String, SourceSpec)>,
    /// Bottom to top.
    layers: Vec<LayerSpec>,
    feature_state: HashMap<String, HashMap<u64, Properties>>,
    handlers: BTreeMap<HandlerId, Handler>,
    next_handler: u64,
    hovered: BTreeSet<String>,
    on_ready: Vec<ReadyCallback>,
}

impl std::fmt::Debug for HeadlessMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessMap")
            .field("container", &self.container)
            .field("phase", &self.phase)
            .field("viewport", &self.viewport)
            .field("sources", &self.source_ids())
            .field("layers", &self.layer_ids())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl HeadlessMap {
    /// Creates the widget. It accepts no mutations until [`load`](Self::load).
    pub fn initialize(
        container: impl Into<String>,
        base_style: impl Into<String>,
        center: LngLat,
        zoom: f64,
    ) -> Self {
        Self {
            container: container.into(),
            base_style: base_style.into(),
            viewport: Viewport::new(center, zoom, DEFAULT_WIDTH, DEFAULT_HEIGHT),
            phase: Phase::Loading,
            sources: Vec::new(),
            layers: Vec::new(),
            feature_state: HashMap::new(),
            handlers: BTreeMap::new(),
            next_handler: 1,
            hovered: BTreeSet::new(),
            on_ready: Vec::new(),
        }
    }

    /// Convenience for tests: initialized and loaded.
    pub fn ready(center: LngLat, zoom: f64) -> Self {
        let mut map = Self::initialize("map", "base", center, zoom);
        map.load();
        map
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn base_style(&self) -> &str {
        &self.base_style
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.viewport.width = width;
        self.viewport.height = height;
    }

    /// Marks the map ready and runs queued `on_ready` callbacks.
    pub fn load(&mut self) {
        if self.phase != Phase::Loading {
            return;
        }
        self.phase = Phase::Ready;
        tracing::debug!(container = %self.container, "map loaded");
        for cb in std::mem::take(&mut self.on_ready) {
            cb(self);
        }
    }

    /// Runs `cb` once the map is ready; immediately if it already is.
    pub fn on_ready(&mut self, cb: impl FnOnce(&mut HeadlessMap) + 'static) {
        match self.phase {
            Phase::Ready => cb(self),
            Phase::Loading => self.on_ready.push(Box::new(cb)),
            Phase::Destroyed => {}
        }
    }

    pub fn destroy(&mut self) {
        self.phase = Phase::Destroyed;
        self.sources.clear();
        self.layers.clear();
        self.feature_state.clear();
        self.handlers.clear();
        self.hovered.clear();
        self.on_ready.clear();
        tracing::debug!(container = %self.container, "map destroyed");
    }

    fn ensure_ready(&self) -> Result<(), MapError> {
        if self.phase == Phase::Ready {
            Ok(())
        } else {
            Err(MapError::NotReady)
        }
    }

    fn source(&self, id: &str) -> Option<&SourceSpec> {
        self.sources.iter().find(|(sid, _)| sid == id).map(|(_, s)| s)
    }

    fn layer(&self, id: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.id == id)
    }

    fn layer_mut(&mut self, id: &str) -> Result<&mut LayerSpec, MapError> {
        self.layers
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| MapError::UnknownLayer(id.to_string()))
    }

    pub fn layer_spec(&self, id: &str) -> Option<&LayerSpec> {
        self.layer(id)
    }

    pub fn layer_visibility(&self, id: &str) -> Option<bool> {
        self.layer(id).map(LayerSpec::is_visible)
    }

    pub fn source_spec(&self, id: &str) -> Option<&SourceSpec> {
        self.source(id)
    }

    pub fn feature_state(&self, source: &str, feature_id: u64) -> Option<&Properties> {
        self.feature_state.get(source)?.get(&feature_id)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn handlers_for(&self, layer: &str) -> Vec<(HandlerId, EventKind)> {
        self.handlers
            .iter()
            .filter(|(_, h)| h.layer == layer)
            .map(|(id, h)| (*id, h.kind))
            .collect()
    }

    /// URL of the tile covering `coord` on a raster source, overzoomed past
    /// the source's max zoom.
    pub fn tile_url(&self, source: &str, coord: TileCoord) -> Option<String> {
        match self.source(source)? {
            SourceSpec::Raster {
                tiles, max_zoom, ..
            } => {
                let coord = max_zoom.map_or(coord, |z| coord.at_most(z));
                tiles.first().map(|t| fill_template(t, coord))
            }
            SourceSpec::GeoJson { .. } => None,
        }
    }

    /// Features of `source` as displayed at the current zoom: clustered
    /// sources yield cluster features in place of their members.
    fn source_features(&self, source: &str) -> Vec<MapFeature> {
        let Some(SourceSpec::GeoJson {
            features,
            cluster: clustering,
        }) = self.source(source)
        else {
            return Vec::new();
        };
        let Some(opts) = clustering else {
            return features.clone();
        };

        let (points, idx) = cluster_input(features);
        let mut out: Vec<MapFeature> = features
            .iter()
            .enumerate()
            .filter(|(i, _)| idx.binary_search(i).is_err())
            .map(|(_, f)| f.clone())
            .collect();
        for node in cluster::cluster_points(&points, self.viewport.zoom, opts) {
            match node {
                ClusterNode::Point(i) => out.push(features[idx[i]].clone()),
                ClusterNode::Cluster(c) => {
                    let mut props = Properties::new();
                    props.insert("cluster".into(), Value::Bool(true));
                    props.insert("cluster_id".into(), Value::from(c.id));
                    props.insert("point_count".into(), Value::from(c.point_count()));
                    props.insert(
                        "point_count_abbreviated".into(),
                        Value::from(abbreviate_count(c.point_count())),
                    );
                    out.push(MapFeature::new(
                        CLUSTER_FEATURE_BIT | c.id,
                        Geometry::point(c.center),
                        props,
                    ));
                }
            }
        }
        out
    }

    fn is_rendered(&self, layer: &LayerSpec) -> bool {
        layer.is_visible() && layer.zoom_in_range(self.viewport.zoom)
    }

    fn passes_filter(&self, layer: &LayerSpec, source: &str, f: &MapFeature) -> bool {
        layer.filter.as_ref().is_none_or(|filter| {
            truthy(&filter.evaluate(&self.context(source, f)))
        })
    }

    fn context<'a>(&'a self, source: &str, f: &'a MapFeature) -> EvalContext<'a> {
        EvalContext {
            properties: &f.properties,
            state: self.feature_state(source, f.id),
            zoom: self.viewport.zoom,
        }
    }

    /// Features a layer currently draws: visible, in zoom range, filtered.
    pub fn rendered_features(&self, layer_id: &str) -> Vec<MapFeature> {
        let Some(layer) = self.layer(layer_id) else {
            return Vec::new();
        };
        if !self.is_rendered(layer) {
            return Vec::new();
        }
        self.source_features(&layer.source)
            .into_iter()
            .filter(|f| self.passes_filter(layer, &layer.source, f))
            .collect()
    }

    /// Paint property of `layer` evaluated for one rendered feature.
    pub fn rendered_paint(&self, layer_id: &str, feature_id: u64, prop: &str) -> Option<Value> {
        let layer = self.layer(layer_id)?;
        let expr = layer.paint.get(prop)?;
        let feature = self
            .source_features(&layer.source)
            .into_iter()
            .find(|f| f.id == feature_id)?;
        Some(expr.evaluate(&self.context(&layer.source, &feature)))
    }

    /// Paint property evaluated without feature input (raster layers).
    pub fn paint_value(&self, layer_id: &str, prop: &str) -> Option<Value> {
        let layer = self.layer(layer_id)?;
        let empty = Properties::new();
        Some(layer.paint.get(prop)?.evaluate(&EvalContext {
            properties: &empty,
            state: None,
            zoom: self.viewport.zoom,
        }))
    }

    fn hit_radius(&self, layer: &LayerSpec, f: &MapFeature) -> f64 {
        let eval = |prop: &str| {
            layer
                .paint
                .get(prop)
                .and_then(|e| e.evaluate(&self.context(&layer.source, f)).as_f64())
        };
        match layer.kind {
            LayerKind::Circle => eval("circle-radius").unwrap_or(DEFAULT_CIRCLE_RADIUS_PX),
            LayerKind::Symbol => SYMBOL_HIT_PX,
            LayerKind::Line => eval("line-width").unwrap_or(1.0) / 2.0 + LINE_HIT_PX,
            LayerKind::Fill | LayerKind::Raster => 0.0,
        }
    }

    fn top_feature(&self, layer: &LayerSpec, point: ScreenPoint) -> Option<QueriedFeature> {
        self.source_features(&layer.source)
            .into_iter()
            .rev()
            .filter(|f| self.passes_filter(layer, &layer.source, f))
            .find(|f| {
                picking::hits(
                    layer.kind,
                    &f.geometry,
                    &self.viewport,
                    point,
                    self.hit_radius(layer, f),
                )
            })
            .map(|f| self.queried(layer, f))
    }

    fn queried(&self, layer: &LayerSpec, feature: MapFeature) -> QueriedFeature {
        let state = self
            .feature_state(&layer.source, feature.id)
            .cloned()
            .unwrap_or_default();
        QueriedFeature {
            layer_id: layer.id.clone(),
            source_id: layer.source.clone(),
            feature,
            state,
        }
    }

    /// Layers with a handler of `kind`, topmost first, that are rendered.
    fn listening_layers(&self, kinds: &[EventKind]) -> Vec<&LayerSpec> {
        let listening: BTreeSet<&str> = self
            .handlers
            .values()
            .filter(|h| kinds.contains(&h.kind))
            .map(|h| h.layer.as_str())
            .collect();
        self.layers
            .iter()
            .rev()
            .filter(|l| listening.contains(l.id.as_str()) && self.is_rendered(l))
            .collect()
    }

    fn events_for(
        &self,
        layer: &str,
        kind: EventKind,
        point: ScreenPoint,
        feature: Option<&QueriedFeature>,
    ) -> Vec<MapEvent> {
        let lnglat = self.viewport.to_lnglat(point);
        self.handlers
            .iter()
            .filter(|(_, h)| h.kind == kind && h.layer == layer)
            .map(|(id, _)| MapEvent {
                kind,
                handler: *id,
                layer_id: layer.to_string(),
                point,
                lnglat,
                feature: feature.cloned(),
            })
            .collect()
    }

    /// Simulates a click at `point`.
    pub fn click(&self, point: ScreenPoint) -> Vec<MapEvent> {
        if self.phase != Phase::Ready {
            return Vec::new();
        }
        let mut out = Vec::new();
        for layer in self.listening_layers(&[EventKind::Click]) {
            if layer.kind == LayerKind::Raster {
                out.extend(self.events_for(&layer.id, EventKind::Click, point, None));
            } else if let Some(hit) = self.top_feature(layer, point) {
                out.extend(self.events_for(&layer.id, EventKind::Click, point, Some(&hit)));
            }
        }
        out
    }

    pub fn click_at(&self, at: LngLat) -> Vec<MapEvent> {
        self.click(self.viewport.to_screen(at))
    }

    /// Simulates the pointer moving to `point`. Layers the pointer left since
    /// the previous move receive a mouse-leave.
    pub fn hover(&mut self, point: ScreenPoint) -> Vec<MapEvent> {
        if self.phase != Phase::Ready {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut now_hovered = BTreeSet::new();
        for layer in self.listening_layers(&[EventKind::MouseMove, EventKind::MouseLeave]) {
            let hit = if layer.kind == LayerKind::Raster {
                None
            } else {
                self.top_feature(layer, point)
            };
            if let Some(hit) = hit {
                now_hovered.insert(layer.id.clone());
                out.extend(self.events_for(&layer.id, EventKind::MouseMove, point, Some(&hit)));
            }
        }
        for left in self.hovered.difference(&now_hovered) {
            out.extend(self.events_for(left, EventKind::MouseLeave, point, None));
        }
        self.hovered = now_hovered;
        out
    }

    pub fn hover_at(&mut self, at: LngLat) -> Vec<MapEvent> {
        let point = self.viewport.to_screen(at);
        self.hover(point)
    }

    /// Pointer leaves the map canvas.
    pub fn pointer_out(&mut self) -> Vec<MapEvent> {
        let outside = ScreenPoint::new(-1.0, -1.0);
        let left = std::mem::take(&mut self.hovered);
        left.iter()
            .flat_map(|l| self.events_for(l, EventKind::MouseLeave, outside, None))
            .collect()
    }
}

impl MapHost for HeadlessMap {
    fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    fn add_source(&mut self, id: &str, source: SourceSpec) -> Result<(), MapError> {
        self.ensure_ready()?;
        if self.source(id).is_some() {
            return Err(MapError::DuplicateSource(id.to_string()));
        }
        tracing::debug!(source = id, "add source");
        self.sources.push((id.to_string(), source));
        Ok(())
    }

    fn set_source_data(&mut self, id: &str, features: Vec<MapFeature>) -> Result<(), MapError> {
        self.ensure_ready()?;
        let entry = self
            .sources
            .iter_mut()
            .find(|(sid, _)| sid == id)
            .ok_or_else(|| MapError::UnknownSource(id.to_string()))?;
        match &mut entry.1 {
            SourceSpec::GeoJson { features: f, .. } => {
                tracing::trace!(source = id, count = features.len(), "set source data");
                *f = features;
                Ok(())
            }
            SourceSpec::Raster { .. } => Err(MapError::WrongSourceKind(id.to_string())),
        }
    }

    fn remove_source(&mut self, id: &str) -> Result<bool, MapError> {
        self.ensure_ready()?;
        let users: Vec<String> = self
            .layers
            .iter()
            .filter(|l| l.source == id)
            .map(|l| l.id.clone())
            .collect();
        if !users.is_empty() {
            return Err(MapError::SourceInUse {
                source: id.to_string(),
                layers: users,
            });
        }
        let before = self.sources.len();
        self.sources.retain(|(sid, _)| sid != id);
        self.feature_state.remove(id);
        let removed = self.sources.len() != before;
        if removed {
            tracing::debug!(source = id, "remove source");
        }
        Ok(removed)
    }

    fn has_source(&self, id: &str) -> bool {
        self.source(id).is_some()
    }

    fn add_layer(&mut self, spec: LayerSpec) -> Result<(), MapError> {
        self.ensure_ready()?;
        if self.layer(&spec.id).is_some() {
            return Err(MapError::DuplicateLayer(spec.id));
        }
        if self.source(&spec.source).is_none() {
            return Err(MapError::UnknownSource(spec.source));
        }
        let at = spec
            .before
            .as_deref()
            .and_then(|b| self.layers.iter().position(|l| l.id == b));
        if spec.before.is_some() && at.is_none() {
            tracing::debug!(layer = %spec.id, before = ?spec.before, "before-layer missing, adding on top");
        }
        tracing::debug!(layer = %spec.id, source = %spec.source, "add layer");
        match at {
            Some(i) => self.layers.insert(i, spec),
            None => self.layers.push(spec),
        }
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<bool, MapError> {
        self.ensure_ready()?;
        let before = self.layers.len();
        self.layers.retain(|l| l.id != id);
        self.hovered.remove(id);
        let removed = self.layers.len() != before;
        if removed {
            tracing::debug!(layer = id, "remove layer");
        }
        Ok(removed)
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layer(id).is_some()
    }

    fn set_paint_property(&mut self, layer: &str, prop: &str, value: Expr) -> Result<(), MapError> {
        self.ensure_ready()?;
        self.layer_mut(layer)?.paint.insert(prop.to_string(), value);
        Ok(())
    }

    fn set_layout_property(
        &mut self,
        layer: &str,
        prop: &str,
        value: Expr,
    ) -> Result<(), MapError> {
        self.ensure_ready()?;
        self.layer_mut(layer)?.layout.insert(prop.to_string(), value);
        if prop == VISIBILITY {
            self.hovered.remove(layer);
        }
        Ok(())
    }

    fn set_feature_state(
        &mut self,
        source: &str,
        feature_id: u64,
        key: &str,
        value: Value,
    ) -> Result<(), MapError> {
        self.ensure_ready()?;
        if self.source(source).is_none() {
            return Err(MapError::UnknownSource(source.to_string()));
        }
        self.feature_state
            .entry(source.to_string())
            .or_default()
            .entry(feature_id)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn query_features_at_point(
        &self,
        point: ScreenPoint,
        layer_ids: &[&str],
    ) -> Vec<QueriedFeature> {
        if self.phase != Phase::Ready {
            return Vec::new();
        }
        self.layers
            .iter()
            .rev()
            .filter(|l| layer_ids.is_empty() || layer_ids.contains(&l.id.as_str()))
            .filter(|l| l.kind != LayerKind::Raster && self.is_rendered(l))
            .filter_map(|l| self.top_feature(l, point))
            .collect()
    }

    fn cluster_expansion_zoom(&self, source: &str, cluster_id: u64) -> Result<f64, MapError> {
        self.ensure_ready()?;
        let Some(spec) = self.source(source) else {
            return Err(MapError::UnknownSource(source.to_string()));
        };
        let SourceSpec::GeoJson {
            features,
            cluster: Some(opts),
        } = spec
        else {
            return Err(MapError::WrongSourceKind(source.to_string()));
        };
        let (points, _) = cluster_input(features);
        cluster::expansion_zoom(&points, cluster_id, opts)
            .map(f64::from)
            .ok_or(MapError::UnknownCluster(cluster_id))
    }

    fn ease_to(&mut self, center: LngLat, zoom: f64) -> Result<(), MapError> {
        self.ensure_ready()?;
        self.viewport.center = center;
        self.viewport.zoom = zoom.clamp(0.0, MAX_ZOOM);
        self.hovered.clear();
        Ok(())
    }

    fn on(&mut self, kind: EventKind, layer: &str) -> Result<HandlerId, MapError> {
        self.ensure_ready()?;
        let id = HandlerId(self.next_handler);
        self.next_handler += 1;
        self.handlers.insert(
            id,
            Handler {
                kind,
                layer: layer.to_string(),
            },
        );
        Ok(id)
    }

    fn off(&mut self, handler: HandlerId) -> bool {
        self.handlers.remove(&handler).is_some()
    }

    fn source_ids(&self) -> Vec<String> {
        self.sources.iter().map(|(id, _)| id.clone()).collect()
    }

    fn layer_ids(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.id.clone()).collect()
    }
}

/// Point features of a source and their indices into `features`, in order.
fn cluster_input(features: &[MapFeature]) -> (Vec<LngLat>, Vec<usize>) {
    features
        .iter()
        .enumerate()
        .filter_map(|(i, f)| match &f.geometry {
            Geometry::Point(p) => Some((p.0, i)),
            _ => None,
        })
        .unzip()
}

fn abbreviate_count(n: usize) -> String {
    match n {
        0..1_000 => n.to_string(),
        1_000..10_000 => format!("{:.1}k", n as f64 / 1_000.0),
        _ => format!("{}k", (n as f64 / 1_000.0).round()),
    }
}
