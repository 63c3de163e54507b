use std::sync::Arc;

use api::{ProvinceCollection, ProvinceProperties};
use map::events::{EventKind, MapEvent};
use map::host::{MapError, MapHost};

use crate::choropleth::{Choropleth, ChoroplethIds};
use crate::layer::{Layer, LayerAction, LayerBinding};
use crate::symbology::{AQI_RAMP, Legend};

pub const PROVINCE_IDS: ChoroplethIds = ChoroplethIds {
    source: "provinces",
    fill: "provinces-fill",
    outline: "provinces-outline",
    click: "provinces-click",
};

/// Country-wide province choropleth. Clicking a province drills down.
#[derive(Debug)]
pub struct ProvincesLayer {
    inner: Choropleth<ProvinceProperties>,
}

impl Default for ProvincesLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvincesLayer {
    pub fn new() -> Self {
        Self {
            inner: Choropleth::new(PROVINCE_IDS),
        }
    }

    pub fn update(
        &mut self,
        host: &mut dyn MapHost,
        data: Option<&Arc<ProvinceCollection>>,
        visible: bool,
    ) -> Result<(), MapError> {
        self.inner.update(host, data, visible)
    }
}

impl Layer for ProvincesLayer {
    fn binding(&self) -> &LayerBinding {
        &self.inner.binding
    }

    fn binding_mut(&mut self) -> &mut LayerBinding {
        &mut self.inner.binding
    }

    fn on_event(&mut self, host: &mut dyn MapHost, event: &MapEvent) -> Option<LayerAction> {
        match event.kind {
            EventKind::Click => self
                .inner
                .picked(event)
                .map(|p| LayerAction::ProvinceSelected(p.name)),
            EventKind::MouseMove | EventKind::MouseLeave => {
                self.inner.hover(host, event);
                None
            }
        }
    }

    fn legend(&self) -> Option<Legend> {
        Some(AQI_RAMP.legend())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbology::HAZARDOUS;
    use foundation::geo::LngLat;
    use map::headless::HeadlessMap;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn provinces() -> Arc<ProvinceCollection> {
        Arc::new(
            serde_json::from_value(json!({
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[29.0, -2.0], [30.0, -2.0], [30.0, -1.0], [29.0, -1.0], [29.0, -2.0]]]
                    },
                    "properties": { "name": "Northern Province", "mean_aqi": 320 }
                }]
            }))
            .expect("provinces"),
        )
    }

    #[test]
    fn click_selects_the_province_by_name() {
        let mut map = HeadlessMap::ready(LngLat::new(29.5, -1.5), 7.0);
        let mut layer = ProvincesLayer::new();
        layer.update(&mut map, Some(&provinces()), true).expect("mount");
        assert_eq!(map.rendered_paint("provinces-fill", 0, "fill-color"), Some(json!(HAZARDOUS)));

        let events = map.click_at(LngLat::new(29.5, -1.5));
        let actions: Vec<_> = events
            .iter()
            .filter_map(|e| layer.owns(e).then(|| layer.on_event(&mut map, e)).flatten())
            .collect();
        assert_eq!(actions, vec![LayerAction::ProvinceSelected("Northern Province".into())]);
    }

    #[test]
    fn remount_after_unmount_uses_the_same_data() {
        let mut map = HeadlessMap::ready(LngLat::new(29.5, -1.5), 7.0);
        let mut layer = ProvincesLayer::new();
        let data = provinces();
        layer.update(&mut map, Some(&data), true).expect("mount");
        layer.unmount(&mut map);
        assert!(!map.has_source("provinces"));

        layer.update(&mut map, Some(&data), true).expect("remount");
        assert!(map.has_source("provinces"));
        assert_eq!(
            map.layer_ids(),
            vec!["provinces-fill", "provinces-outline", "provinces-click"]
        );
    }
}
