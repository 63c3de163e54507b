//! Composite map view: decides which layer components are mounted and
//! turns their map events into store actions.

use api::Pollutant;
use foundation::geo::LngLat;
use layers::{
    DistrictsLayer, ExposureLayer, Layer, LayerAction, Legend, ProvincesLayer, RadiusLayer,
    SatelliteLayer, StationsLayer, log_map_error,
};
use map::{MapEvent, MapHost};
use runtime::{EventBus, MountGuard, MountToken};

use crate::datasets::Snapshot;
use crate::legend::visible_legends;
use crate::store::{Action, LayerFlags, SelectedStation, ViewMode, ViewState};

/// What the view asks of its owner after routing map events.
#[derive(Debug, Clone)]
pub enum Routed {
    Dispatch(Action),
    /// Sample the satellite product at `at`; apply the result only while
    /// `token` is current.
    Sample { at: LngLat, token: MountToken },
}

/// View-state fields that decide what gets fetched.
#[derive(Debug, Clone, PartialEq)]
struct FetchInputs {
    mode: ViewMode,
    pollutant: Pollutant,
    date: Option<String>,
    layers: LayerFlags,
}

impl FetchInputs {
    fn of(state: &ViewState) -> Self {
        Self {
            mode: state.mode.clone(),
            pollutant: state.pollutant,
            date: state.satellite_date.clone(),
            layers: state.layers,
        }
    }
}

#[derive(Debug, Default)]
pub struct MapView {
    provinces: ProvincesLayer,
    districts: DistrictsLayer,
    stations: StationsLayer,
    satellite: SatelliteLayer,
    exposure: ExposureLayer,
    radius: RadiusLayer,
    /// Province whose districts are on the map.
    districts_of: Option<String>,
    actions: EventBus<LayerAction>,
    cycle: MountGuard,
    inputs: Option<FetchInputs>,
}

impl MapView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new store snapshot. A change to anything that drives
    /// fetching expires outstanding load tokens.
    pub fn observe(&mut self, state: &ViewState) {
        let inputs = FetchInputs::of(state);
        if self.inputs.as_ref() != Some(&inputs) {
            if self.inputs.is_some() {
                self.cycle.invalidate();
            }
            self.inputs = Some(inputs);
        }
    }

    /// Token for a load started now.
    pub fn load_token(&self) -> MountToken {
        self.cycle.token()
    }

    pub fn render(&mut self, host: &mut dyn MapHost, state: &ViewState, data: &Snapshot) {
        let choropleth = state.layers.districts;
        match &state.mode {
            ViewMode::Provinces => {
                self.districts.unmount(host);
                self.districts_of = None;
                log_map_error(
                    "provinces",
                    self.provinces
                        .update(host, data.provinces.data.as_ref(), choropleth),
                );
            }
            ViewMode::Districts { province } => {
                self.provinces.unmount(host);
                let fresh = data.districts.data.as_ref();
                if self.districts_of.as_deref() != Some(province.as_str()) {
                    // Never leave another province's districts on screen.
                    self.districts.unmount(host);
                    self.districts_of = None;
                }
                log_map_error("districts", self.districts.update(host, fresh, choropleth));
                if fresh.is_some() && self.districts.binding().is_mounted() {
                    self.districts_of = Some(province.clone());
                }
            }
        }

        log_map_error(
            "stations",
            self.stations
                .update(host, data.stations.data.as_ref(), state.layers.stations),
        );
        let product = data.raster_product();
        log_map_error(
            "satellite",
            self.satellite.update(
                host,
                product.as_ref(),
                data.satellite.data.as_deref(),
                state.layers.satellite,
                state.satellite_opacity,
            ),
        );
        log_map_error(
            "exposure",
            self.exposure.update(
                host,
                product.as_ref(),
                data.exposure.data.as_deref(),
                state.layers.exposure,
                state.satellite_opacity,
            ),
        );
        log_map_error(
            "radius",
            self.radius
                .update(host, state.radius_center(), state.radius_km, state.layers.radius),
        );
    }

    fn components_mut(&mut self) -> [&mut dyn Layer; 6] {
        [
            &mut self.stations,
            &mut self.radius,
            &mut self.districts,
            &mut self.provinces,
            &mut self.satellite,
            &mut self.exposure,
        ]
    }

    fn components(&self) -> [&dyn Layer; 6] {
        [
            &self.provinces,
            &self.districts,
            &self.stations,
            &self.satellite,
            &self.exposure,
            &self.radius,
        ]
    }

    /// Hands each event to the component that registered its handler and
    /// converts what they report into work for the owner.
    pub fn handle_events(&mut self, host: &mut dyn MapHost, events: &[MapEvent]) -> Vec<Routed> {
        for event in events {
            let mut action = None;
            if let Some(owner) = self.components_mut().into_iter().find(|c| c.owns(event)) {
                action = owner.on_event(host, event);
            }
            if let Some(action) = action {
                self.actions.emit(action);
            }
        }
        self.actions
            .drain()
            .into_iter()
            .map(|action| self.route(action))
            .collect()
    }

    fn route(&self, action: LayerAction) -> Routed {
        match action {
            LayerAction::DistrictSelected(district) => {
                Routed::Dispatch(Action::SetSelectedDistrict(Some(district)))
            }
            LayerAction::ProvinceSelected(province) => {
                Routed::Dispatch(Action::SetViewMode(ViewMode::Districts { province }))
            }
            LayerAction::StationSelected { properties, at } => {
                Routed::Dispatch(Action::SetSelectedStation(Some(SelectedStation {
                    properties,
                    at,
                })))
            }
            LayerAction::SatelliteSample { at } => Routed::Sample {
                at,
                token: self.satellite.binding().mount_token(),
            },
        }
    }

    /// Legends of the visible layers only.
    pub fn legends(&self) -> Vec<Legend> {
        visible_legends(&self.components())
    }

    /// Ids of the components currently drawn.
    pub fn shown(&self) -> Vec<&str> {
        self.components()
            .into_iter()
            .filter(|c| c.is_shown())
            .map(|c| c.binding().source_id())
            .collect()
    }

    pub fn unmount_all(&mut self, host: &mut dyn MapHost) {
        for c in self.components_mut() {
            c.unmount(host);
        }
        self.districts_of = None;
    }
}
