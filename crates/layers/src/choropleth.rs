use std::sync::Arc;

use map::events::{EventKind, MapEvent};
use map::feature::FeatureCollection;
use map::host::{MapError, MapHost};
use map::style::{Expr, LayerKind, LayerSpec};
use serde::Serialize;
use serde_json::Value;

use crate::layer::{LayerBinding, SourceData, features_of, log_map_error};
use crate::radius::RADIUS_FILL_LAYER;
use crate::stations::CLUSTERS_LAYER;
use crate::symbology::{AQI_RAMP, NO_DATA};

pub const FILL_OPACITY: f64 = 0.6;
pub const HOVER_FILL_OPACITY: f64 = 0.9;
const HOVER_STATE: &str = "hover";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChoroplethIds {
    pub source: &'static str,
    pub fill: &'static str,
    pub outline: &'static str,
    /// Transparent copy of the fill that receives clicks.
    pub click: &'static str,
}

/// Polygons filled by the AQI ramp over `mean_aqi`, highlighted on hover.
#[derive(Debug)]
pub struct Choropleth<P> {
    pub ids: ChoroplethIds,
    pub binding: LayerBinding,
    data: Option<Arc<FeatureCollection<P>>>,
    hovered: Option<u64>,
}

impl<P: Serialize + Clone> Choropleth<P> {
    pub fn new(ids: ChoroplethIds) -> Self {
        let binding = LayerBinding::new(ids.source)
            .handle(EventKind::Click, ids.click)
            .handle(EventKind::MouseMove, ids.fill)
            .handle(EventKind::MouseLeave, ids.fill)
            .below(&[RADIUS_FILL_LAYER, CLUSTERS_LAYER]);
        Self {
            ids,
            binding,
            data: None,
            hovered: None,
        }
    }

    pub fn data(&self) -> Option<&Arc<FeatureCollection<P>>> {
        self.data.as_ref()
    }

    pub fn update(
        &mut self,
        host: &mut dyn MapHost,
        data: Option<&Arc<FeatureCollection<P>>>,
        visible: bool,
    ) -> Result<(), MapError> {
        if !self.binding.is_mounted() {
            self.hovered = None;
        } else if !visible {
            self.clear_hover(host);
        }
        let current = self.data.as_ref().filter(|_| self.binding.is_mounted());
        match data {
            Some(fc) if !current.is_some_and(|d| Arc::ptr_eq(d, fc)) => {
                self.clear_hover(host);
                let ids = self.ids;
                let source = SourceData::GeoJson {
                    features: features_of(fc),
                    cluster: None,
                };
                self.binding
                    .set_data(host, source, visible, || choropleth_layers(ids))?;
                self.data = Some(fc.clone());
                Ok(())
            }
            _ => self.binding.set_visible(host, visible),
        }
    }

    /// Properties of the clicked feature, exactly as fetched.
    pub fn picked(&self, event: &MapEvent) -> Option<P> {
        let id = event.feature.as_ref()?.feature.id;
        let index = usize::try_from(id).ok()?;
        self.data
            .as_ref()?
            .features
            .get(index)
            .map(|f| f.properties.clone())
    }

    pub fn hover(&mut self, host: &mut dyn MapHost, event: &MapEvent) {
        match (event.kind, &event.feature) {
            (EventKind::MouseMove, Some(hit)) => {
                let id = hit.feature.id;
                if self.hovered == Some(id) {
                    return;
                }
                self.clear_hover(host);
                log_map_error(
                    self.ids.source,
                    host.set_feature_state(self.ids.source, id, HOVER_STATE, Value::Bool(true)),
                );
                self.hovered = Some(id);
            }
            (EventKind::MouseLeave, _) => self.clear_hover(host),
            _ => {}
        }
    }

    fn clear_hover(&mut self, host: &mut dyn MapHost) {
        if let Some(id) = self.hovered.take() {
            log_map_error(
                self.ids.source,
                host.set_feature_state(self.ids.source, id, HOVER_STATE, Value::Bool(false)),
            );
        }
    }
}

fn choropleth_layers(ids: ChoroplethIds) -> Vec<LayerSpec> {
    let opacity = Expr::case(
        vec![(Expr::feature_state(HOVER_STATE), Expr::lit(HOVER_FILL_OPACITY))],
        Expr::lit(FILL_OPACITY),
    );
    vec![
        LayerSpec::new(ids.fill, ids.source, LayerKind::Fill)
            .paint("fill-color", AQI_RAMP.expr_or(Expr::lit(NO_DATA)))
            .paint("fill-opacity", opacity),
        LayerSpec::new(ids.outline, ids.source, LayerKind::Line)
            .paint("line-color", "#FFFFFF")
            .paint("line-width", 1.0),
        LayerSpec::new(ids.click, ids.source, LayerKind::Fill)
            .paint("fill-color", "#000000")
            .paint("fill-opacity", 0.0),
    ]
}
