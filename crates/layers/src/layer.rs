//! Source/layer lifecycle shared by every layer component.
//!
//! A component owns one source and a small fixed group of layers on the map
//! host. [`LayerBinding`] adds them on first data, replaces GeoJSON payloads
//! in place, flips only `visibility` on toggles and removes everything
//! (handlers, then layers, then the source) on teardown.

use api::{DistrictProperties, StationProperties};
use foundation::geo::LngLat;
use map::events::{EventKind, HandlerId, MapEvent};
use map::feature::{FeatureCollection, MapFeature};
use map::host::{MapError, MapHost};
use map::source::SourceSpec;
use map::style::{Expr, LayerSpec, VISIBILITY, visibility_value};
use map::ClusterOptions;
use runtime::{MountGuard, MountToken};
use serde::Serialize;

use crate::symbology::Legend;

/// What a layer component reports to the view after a map event.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerAction {
    /// Properties of the clicked district, as fetched.
    DistrictSelected(DistrictProperties),
    ProvinceSelected(String),
    StationSelected {
        properties: StationProperties,
        at: LngLat,
    },
    /// A satellite raster was clicked; the view samples the product there.
    SatelliteSample { at: LngLat },
}

/// Payload of a component's source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceData {
    GeoJson {
        features: Vec<MapFeature>,
        cluster: Option<ClusterOptions>,
    },
    Raster {
        template: String,
        tile_size: u32,
        max_zoom: Option<u8>,
    },
}

impl SourceData {
    fn to_spec(&self) -> SourceSpec {
        match self {
            SourceData::GeoJson { features, cluster } => SourceSpec::GeoJson {
                features: features.clone(),
                cluster: *cluster,
            },
            SourceData::Raster {
                template,
                tile_size,
                max_zoom,
            } => SourceSpec::raster(template.clone(), *tile_size, *max_zoom),
        }
    }

    /// GeoJSON payloads with the same clustering can be swapped in place.
    fn replaceable_by(&self, next: &SourceData) -> bool {
        match (self, next) {
            (
                SourceData::GeoJson { cluster: a, .. },
                SourceData::GeoJson { cluster: b, .. },
            ) => a == b,
            _ => false,
        }
    }
}

/// Converts a typed collection for the host. Feature ids are positions in
/// `fc`, so a clicked id indexes straight back into it.
pub fn features_of<P: Serialize>(fc: &FeatureCollection<P>) -> Vec<MapFeature> {
    fc.features
        .iter()
        .enumerate()
        .filter_map(|(i, f)| match MapFeature::from_feature(i as u64, f) {
            Ok(mf) => Some(mf),
            Err(e) => {
                tracing::warn!(index = i, error = %e, "dropping unencodable feature");
                None
            }
        })
        .collect()
}

enum Step {
    Mount,
    Keep,
    Replace,
    Remount,
}

#[derive(Debug)]
pub struct LayerBinding {
    source_id: String,
    handler_specs: Vec<(EventKind, String)>,
    below: Vec<String>,
    layers: Vec<String>,
    handlers: Vec<HandlerId>,
    data: Option<SourceData>,
    visible: bool,
    guard: MountGuard,
}

impl LayerBinding {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            handler_specs: Vec::new(),
            below: Vec::new(),
            layers: Vec::new(),
            handlers: Vec::new(),
            data: None,
            visible: true,
            guard: MountGuard::new(),
        }
    }

    /// Registers a handler to attach while the layers are visible.
    pub fn handle(mut self, kind: EventKind, layer: impl Into<String>) -> Self {
        self.handler_specs.push((kind, layer.into()));
        self
    }

    /// Layers to insert beneath, nearest first. The first one present on the
    /// host at mount time wins; with none present the layers go on top.
    pub fn below(mut self, layers: &[&str]) -> Self {
        self.below = layers.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn layer_ids(&self) -> &[String] {
        &self.layers
    }

    pub fn is_mounted(&self) -> bool {
        self.data.is_some()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn data(&self) -> Option<&SourceData> {
        self.data.as_ref()
    }

    pub fn owns_handler(&self, id: HandlerId) -> bool {
        self.handlers.contains(&id)
    }

    /// Token for results of async work started on behalf of this binding.
    pub fn mount_token(&self) -> MountToken {
        self.guard.token()
    }

    /// Shows `data`: mounts on first call, updates GeoJSON in place, and
    /// remounts when the source itself changes (raster template, clustering).
    pub fn set_data(
        &mut self,
        host: &mut dyn MapHost,
        data: SourceData,
        visible: bool,
        layers: impl FnOnce() -> Vec<LayerSpec>,
    ) -> Result<(), MapError> {
        if !host.is_ready() {
            return Err(MapError::NotReady);
        }
        let step = match &self.data {
            None => Step::Mount,
            Some(current) if *current == data => Step::Keep,
            Some(current) if current.replaceable_by(&data) => Step::Replace,
            Some(_) => Step::Remount,
        };
        match step {
            Step::Keep => {}
            Step::Replace => {
                if let SourceData::GeoJson { features, .. } = &data {
                    host.set_source_data(&self.source_id, features.clone())?;
                }
                self.data = Some(data);
            }
            Step::Remount => {
                self.teardown(host)?;
                return self.mount(host, data, visible, layers);
            }
            Step::Mount => return self.mount(host, data, visible, layers),
        }
        self.set_visible(host, visible)
    }

    fn mount(
        &mut self,
        host: &mut dyn MapHost,
        data: SourceData,
        visible: bool,
        layers: impl FnOnce() -> Vec<LayerSpec>,
    ) -> Result<(), MapError> {
        host.add_source(&self.source_id, data.to_spec())?;
        self.data = Some(data);
        self.visible = visible;
        let anchor = self.below.iter().find(|id| host.has_layer(id)).cloned();
        for spec in layers() {
            let spec = match spec.before {
                Some(_) => spec,
                None => spec.before(anchor.clone()),
            };
            let id = spec.id.clone();
            host.add_layer(spec.visible(visible))?;
            self.layers.push(id);
        }
        tracing::debug!(source = %self.source_id, layers = ?self.layers, "mounted");
        if visible {
            self.attach(host)?;
        }
        Ok(())
    }

    /// Flips `visibility` on every layer; the host's id set is unchanged.
    pub fn set_visible(&mut self, host: &mut dyn MapHost, visible: bool) -> Result<(), MapError> {
        if !self.is_mounted() || self.visible == visible {
            return Ok(());
        }
        if !visible {
            self.detach(host);
        }
        for id in &self.layers {
            host.set_layout_property(id, VISIBILITY, Expr::lit(visibility_value(visible)))?;
        }
        self.visible = visible;
        if visible {
            self.attach(host)?;
        }
        Ok(())
    }

    pub fn set_paint(
        &mut self,
        host: &mut dyn MapHost,
        layer: &str,
        prop: &str,
        value: Expr,
    ) -> Result<(), MapError> {
        if !self.is_mounted() {
            return Ok(());
        }
        host.set_paint_property(layer, prop, value)
    }

    fn attach(&mut self, host: &mut dyn MapHost) -> Result<(), MapError> {
        if !self.handlers.is_empty() {
            return Ok(());
        }
        for (kind, layer) in &self.handler_specs {
            self.handlers.push(host.on(*kind, layer)?);
        }
        Ok(())
    }

    fn detach(&mut self, host: &mut dyn MapHost) {
        for h in self.handlers.drain(..) {
            host.off(h);
        }
    }

    /// Removes handlers, layers and the source, and expires mount tokens.
    /// Safe to call when nothing is mounted or the map is gone.
    pub fn teardown(&mut self, host: &mut dyn MapHost) -> Result<(), MapError> {
        self.guard.invalidate();
        self.detach(host);
        let layers = std::mem::take(&mut self.layers);
        let was_mounted = self.data.take().is_some();
        if !was_mounted || !host.is_ready() {
            return Ok(());
        }
        for id in layers.iter().rev() {
            host.remove_layer(id)?;
        }
        host.remove_source(&self.source_id)?;
        tracing::debug!(source = %self.source_id, "unmounted");
        Ok(())
    }
}

/// A per-dataset layer component.
pub trait Layer {
    fn binding(&self) -> &LayerBinding;

    fn binding_mut(&mut self) -> &mut LayerBinding;

    /// Handles an event for one of this component's handlers.
    fn on_event(&mut self, host: &mut dyn MapHost, event: &MapEvent) -> Option<LayerAction>;

    /// Color scale shown while the component is visible.
    fn legend(&self) -> Option<Legend> {
        None
    }

    fn owns(&self, event: &MapEvent) -> bool {
        self.binding().owns_handler(event.handler)
    }

    fn is_shown(&self) -> bool {
        self.binding().is_mounted() && self.binding().is_visible()
    }

    fn unmount(&mut self, host: &mut dyn MapHost) {
        let source = self.binding().source_id().to_string();
        if let Err(e) = self.binding_mut().teardown(host) {
            tracing::warn!(%source, error = %e, "teardown failed");
        }
    }
}

/// Logs and swallows a host failure from a component update.
pub fn log_map_error(component: &str, result: Result<(), MapError>) {
    match result {
        Ok(()) => {}
        Err(MapError::NotReady) => tracing::debug!(component, "map not ready, skipped"),
        Err(e) => tracing::warn!(component, error = %e, "map update failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use map::feature::{Geometry, Properties};
    use map::headless::HeadlessMap;
    use map::source::TileCoord;
    use map::style::LayerKind;
    use pretty_assertions::assert_eq;

    fn data(n: u64) -> SourceData {
        SourceData::GeoJson {
            features: (0..n)
                .map(|i| {
                    MapFeature::new(
                        i,
                        Geometry::point(LngLat::new(i as f64, 0.0)),
                        Properties::new(),
                    )
                })
                .collect(),
            cluster: None,
        }
    }

    fn specs() -> Vec<LayerSpec> {
        vec![
            LayerSpec::new("a-fill", "a", LayerKind::Circle),
            LayerSpec::new("a-label", "a", LayerKind::Symbol),
        ]
    }

    fn ids(map: &HeadlessMap) -> (Vec<String>, Vec<String>) {
        (map.source_ids(), map.layer_ids())
    }

    #[test]
    fn toggles_only_change_visibility() {
        let mut map = HeadlessMap::ready(LngLat::new(0.0, 0.0), 4.0);
        let mut b = LayerBinding::new("a").handle(EventKind::Click, "a-fill");
        b.set_data(&mut map, data(2), true, specs).expect("mount");
        let before = ids(&map);
        assert_eq!(map.handler_count(), 1);

        b.set_visible(&mut map, false).expect("hide");
        assert_eq!(ids(&map), before);
        assert_eq!(map.layer_visibility("a-fill"), Some(false));
        assert_eq!(map.handler_count(), 0);

        b.set_visible(&mut map, true).expect("show");
        assert_eq!(ids(&map), before);
        assert_eq!(map.layer_visibility("a-label"), Some(true));
        assert_eq!(map.handler_count(), 1);
    }

    #[test]
    fn new_data_replaces_payload_in_place() {
        let mut map = HeadlessMap::ready(LngLat::new(0.0, 0.0), 4.0);
        let mut b = LayerBinding::new("a");
        b.set_data(&mut map, data(1), true, specs).expect("mount");
        b.set_data(&mut map, data(3), true, || panic!("must not remount"))
            .expect("update");
        assert_eq!(map.rendered_features("a-fill").len(), 3);
    }

    #[test]
    fn teardown_removes_everything_and_expires_tokens() {
        let mut map = HeadlessMap::ready(LngLat::new(0.0, 0.0), 4.0);
        let mut b = LayerBinding::new("a").handle(EventKind::Click, "a-fill");
        b.set_data(&mut map, data(1), true, specs).expect("mount");
        let token = b.mount_token();

        b.teardown(&mut map).expect("teardown");
        assert_eq!(ids(&map), (Vec::<String>::new(), Vec::<String>::new()));
        assert_eq!(map.handler_count(), 0);
        assert!(!token.is_current());
        b.teardown(&mut map).expect("second teardown is a no-op");
    }

    #[test]
    fn raster_template_change_remounts() {
        let mut map = HeadlessMap::ready(LngLat::new(0.0, 0.0), 4.0);
        let mut b = LayerBinding::new("r");
        let raster = |t: &str| SourceData::Raster {
            template: t.to_string(),
            tile_size: 256,
            max_zoom: Some(10),
        };
        let layers = || vec![LayerSpec::new("r-layer", "r", LayerKind::Raster)];
        b.set_data(&mut map, raster("https://a/{z}/{x}/{y}"), true, layers)
            .expect("mount");
        b.set_data(&mut map, raster("https://b/{z}/{x}/{y}"), true, layers)
            .expect("remount");
        assert_eq!(
            map.tile_url("r", TileCoord::new(1, 0, 0)).as_deref(),
            Some("https://b/1/0/0")
        );
        assert_eq!(map.layer_ids(), vec!["r-layer"]);
    }

    #[test]
    fn mounts_beneath_the_nearest_present_layer() {
        let mut map = HeadlessMap::ready(LngLat::new(0.0, 0.0), 4.0);
        let mut top = LayerBinding::new("t");
        top.set_data(&mut map, data(1), true, || {
            vec![LayerSpec::new("t-layer", "t", LayerKind::Circle)]
        })
        .expect("top");

        let mut b = LayerBinding::new("a").below(&["missing", "t-layer"]);
        b.set_data(&mut map, data(1), true, specs).expect("mount");
        assert_eq!(map.layer_ids(), vec!["a-fill", "a-label", "t-layer"]);
    }

    #[test]
    fn not_ready_hosts_are_left_alone() {
        let mut map = HeadlessMap::initialize("map", "base", LngLat::new(0.0, 0.0), 4.0);
        let mut b = LayerBinding::new("a");
        assert_eq!(b.set_data(&mut map, data(1), true, specs), Err(MapError::NotReady));
        assert!(!b.is_mounted());
        map.load();
        b.set_data(&mut map, data(1), true, specs).expect("mount after load");
        assert!(b.is_mounted());
    }
}
