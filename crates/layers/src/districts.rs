use std::sync::Arc;

use api::{DistrictCollection, DistrictProperties};
use map::events::{EventKind, MapEvent};
use map::host::{MapError, MapHost};

use crate::choropleth::{Choropleth, ChoroplethIds};
use crate::layer::{Layer, LayerAction, LayerBinding};
use crate::symbology::{AQI_RAMP, Legend};

pub const DISTRICT_IDS: ChoroplethIds = ChoroplethIds {
    source: "districts",
    fill: "districts-fill",
    outline: "districts-outline",
    click: "districts-click",
};

/// District choropleth for the selected province.
#[derive(Debug)]
pub struct DistrictsLayer {
    inner: Choropleth<DistrictProperties>,
}

impl Default for DistrictsLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl DistrictsLayer {
    pub fn new() -> Self {
        Self {
            inner: Choropleth::new(DISTRICT_IDS),
        }
    }

    pub fn update(
        &mut self,
        host: &mut dyn MapHost,
        data: Option<&Arc<DistrictCollection>>,
        visible: bool,
    ) -> Result<(), MapError> {
        self.inner.update(host, data, visible)
    }
}

impl Layer for DistrictsLayer {
    fn binding(&self) -> &LayerBinding {
        &self.inner.binding
    }

    fn binding_mut(&mut self) -> &mut LayerBinding {
        &mut self.inner.binding
    }

    fn on_event(&mut self, host: &mut dyn MapHost, event: &MapEvent) -> Option<LayerAction> {
        match event.kind {
            EventKind::Click => self.inner.picked(event).map(LayerAction::DistrictSelected),
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
