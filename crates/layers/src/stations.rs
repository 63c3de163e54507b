//! Monitoring stations as clustered circles.

use std::sync::Arc;

use api::StationCollection;
use map::events::{EventKind, MapEvent};
use map::host::{MapError, MapHost};
use map::style::{Expr, LayerKind, LayerSpec};
use map::ClusterOptions;
use serde_json::Value;

use crate::layer::{Layer, LayerAction, LayerBinding, SourceData, features_of, log_map_error};
use crate::symbology::{
    Legend, PM25_RAMP, STATION_ACTIVE, STATION_INACTIVE, cluster_color, cluster_radius,
};

pub const STATIONS_SOURCE: &str = "stations";
pub const CLUSTERS_LAYER: &str = "stations-clusters";
pub const CLUSTER_COUNT_LAYER: &str = "stations-cluster-count";
pub const POINTS_LAYER: &str = "stations-points";

const POINT_RADIUS_PX: f64 = 7.0;

#[derive(Debug)]
pub struct StationsLayer {
    binding: LayerBinding,
    data: Option<Arc<StationCollection>>,
    clustering: Option<ClusterOptions>,
}

impl Default for StationsLayer {
    fn default() -> Self {
        Self::new(Some(ClusterOptions::default()))
    }
}

impl StationsLayer {
    /// `None` draws every station individually.
    pub fn new(clustering: Option<ClusterOptions>) -> Self {
        let binding = LayerBinding::new(STATIONS_SOURCE)
            .handle(EventKind::Click, CLUSTERS_LAYER)
            .handle(EventKind::Click, POINTS_LAYER);
        Self {
            binding,
            data: None,
            clustering,
        }
    }

    pub fn update(
        &mut self,
        host: &mut dyn MapHost,
        data: Option<&Arc<StationCollection>>,
        visible: bool,
    ) -> Result<(), MapError> {
        let current = self.data.as_ref().filter(|_| self.binding.is_mounted());
        match data {
            Some(fc) if !current.is_some_and(|d| Arc::ptr_eq(d, fc)) => {
                let source = SourceData::GeoJson {
                    features: features_of(fc),
                    cluster: self.clustering,
                };
                self.binding.set_data(host, source, visible, station_layers)?;
                self.data = Some(fc.clone());
                Ok(())
            }
            _ => self.binding.set_visible(host, visible),
        }
    }

    fn expand_cluster(&self, host: &mut dyn MapHost, event: &MapEvent) {
        let Some(hit) = &event.feature else {
            return;
        };
        let Some(cluster_id) = hit.feature.properties.get("cluster_id").and_then(Value::as_u64)
        else {
            return;
        };
        let Some(center) = hit.feature.geometry.points().first().copied() else {
            return;
        };
        let eased = host
            .cluster_expansion_zoom(STATIONS_SOURCE, cluster_id)
            .and_then(|zoom| host.ease_to(center, zoom));
        log_map_error(STATIONS_SOURCE, eased);
    }

    fn picked(&self, event: &MapEvent) -> Option<LayerAction> {
        let hit = event.feature.as_ref()?;
        let index = usize::try_from(hit.feature.id).ok()?;
        let station = self.data.as_ref()?.features.get(index)?;
        let at = station.geometry.points().first().copied()?;
        Some(LayerAction::StationSelected {
            properties: station.properties.clone(),
            at,
        })
    }
}

fn station_layers() -> Vec<LayerSpec> {
    let status = Expr::case(
        vec![(Expr::get("is_active"), Expr::lit(STATION_ACTIVE))],
        Expr::lit(STATION_INACTIVE),
    );
    vec![
        LayerSpec::new(CLUSTERS_LAYER, STATIONS_SOURCE, LayerKind::Circle)
            .filter(Expr::has("point_count"))
            .paint("circle-color", cluster_color())
            .paint("circle-radius", cluster_radius())
            .paint("circle-opacity", 0.85),
        LayerSpec::new(CLUSTER_COUNT_LAYER, STATIONS_SOURCE, LayerKind::Symbol)
            .filter(Expr::has("point_count"))
            .layout("text-field", Expr::get("point_count_abbreviated"))
            .layout("text-size", 12.0)
            .paint("text-color", "#FFFFFF"),
        LayerSpec::new(POINTS_LAYER, STATIONS_SOURCE, LayerKind::Circle)
            .filter(Expr::not(Expr::has("point_count")))
            .paint("circle-color", PM25_RAMP.expr_or(status))
            .paint("circle-radius", POINT_RADIUS_PX)
            .paint("circle-stroke-width", 1.0)
            .paint("circle-stroke-color", "#FFFFFF"),
    ]
}

impl Layer for StationsLayer {
    fn binding(&self) -> &LayerBinding {
        &self.binding
    }

    fn binding_mut(&mut self) -> &mut LayerBinding {
        &mut self.binding
    }

    fn on_event(&mut self, host: &mut dyn MapHost, event: &MapEvent) -> Option<LayerAction> {
        if event.kind != EventKind::Click {
            return None;
        }
        match event.layer_id.as_str() {
            CLUSTERS_LAYER => {
                self.expand_cluster(host, event);
                None
            }
            POINTS_LAYER => self.picked(event),
            _ => None,
        }
    }

    fn legend(&self) -> Option<Legend> {
        Some(PM25_RAMP.legend())
    }
}
