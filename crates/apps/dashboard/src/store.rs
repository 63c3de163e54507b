//! Cross-component UI state.
//!
//! `ViewState::reduce` is pure; `ViewStore::dispatch` swaps in the reduced
//! snapshot and only then notifies subscribers, so compound actions such as
//! `BackToProvinces` are observed as a single change.

use api::{DistrictProperties, Pollutant, StationProperties};
use foundation::geo::LngLat;
use layers::radius::DEFAULT_RADIUS_KM;
use layers::raster::DEFAULT_OPACITY;
use runtime::{Subscribers, SubscriptionId};
use serde::{Deserialize, Serialize};

/// Per-layer visibility toggles.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerFlags {
    pub districts: bool,
    pub stations: bool,
    pub satellite: bool,
    pub exposure: bool,
    pub radius: bool,
}

impl Default for LayerFlags {
    fn default() -> Self {
        Self {
            districts: true,
            stations: true,
            satellite: false,
            exposure: false,
            radius: true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerToggle {
    Districts,
    Stations,
    Satellite,
    Exposure,
    Radius,
}

impl LayerFlags {
    pub fn get(&self, layer: LayerToggle) -> bool {
        match layer {
            LayerToggle::Districts => self.districts,
            LayerToggle::Stations => self.stations,
            LayerToggle::Satellite => self.satellite,
            LayerToggle::Exposure => self.exposure,
            LayerToggle::Radius => self.radius,
        }
    }

    pub fn set(&mut self, layer: LayerToggle, on: bool) {
        let flag = match layer {
            LayerToggle::Districts => &mut self.districts,
            LayerToggle::Stations => &mut self.stations,
            LayerToggle::Satellite => &mut self.satellite,
            LayerToggle::Exposure => &mut self.exposure,
            LayerToggle::Radius => &mut self.radius,
        };
        *flag = on;
    }
}

/// Drill-down level. The districts view always names its province.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum ViewMode {
    #[default]
    Provinces,
    Districts {
        province: String,
    },
}

impl ViewMode {
    pub fn province(&self) -> Option<&str> {
        match self {
            ViewMode::Provinces => None,
            ViewMode::Districts { province } => Some(province),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedStation {
    pub properties: StationProperties,
    pub at: LngLat,
}

/// Text anchored to a map position.
#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub at: LngLat,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub layers: LayerFlags,
    pub mode: ViewMode,
    pub pollutant: Pollutant,
    /// User-picked satellite date; `None` follows the latest available.
    pub satellite_date: Option<String>,
    pub satellite_opacity: f64,
    pub selected_station: Option<SelectedStation>,
    pub selected_district: Option<DistrictProperties>,
    pub radius_km: f64,
    pub popup: Option<Popup>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            layers: LayerFlags::default(),
            mode: ViewMode::Provinces,
            pollutant: Pollutant::default(),
            satellite_date: None,
            satellite_opacity: DEFAULT_OPACITY,
            selected_station: None,
            selected_district: None,
            radius_km: DEFAULT_RADIUS_KM,
            popup: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetLayers(LayerFlags),
    ToggleLayer(LayerToggle),
    SetViewMode(ViewMode),
    /// `Some` drills into the province, `None` returns to the overview.
    SetSelectedProvince(Option<String>),
    BackToProvinces,
    SetPollutant(Pollutant),
    SetSatelliteDate(Option<String>),
    SetSatelliteOpacity(f64),
    SetSelectedStation(Option<SelectedStation>),
    SetSelectedDistrict(Option<DistrictProperties>),
    SetPopup(Option<Popup>),
    SetRadius(f64),
}

impl ViewState {
    /// Center of the radius ring: the selected station, if any.
    pub fn radius_center(&self) -> Option<LngLat> {
        self.selected_station.as_ref().map(|s| s.at)
    }

    /// A district only stays selected while its province is shown.
    fn enter(&mut self, mode: ViewMode) {
        if self.mode != mode {
            self.selected_district = None;
        }
        self.mode = mode;
    }

    pub fn reduce(&self, action: Action) -> ViewState {
        let mut next = self.clone();
        match action {
            Action::SetLayers(layers) => next.layers = layers,
            Action::ToggleLayer(layer) => {
                let on = next.layers.get(layer);
                next.layers.set(layer, !on);
            }
            Action::SetViewMode(mode) => next.enter(mode),
            Action::SetSelectedProvince(Some(province)) => {
                next.enter(ViewMode::Districts { province });
            }
            Action::SetSelectedProvince(None) | Action::BackToProvinces => {
                next.mode = ViewMode::Provinces;
                next.selected_district = None;
            }
            Action::SetPollutant(pollutant) => {
                if pollutant != next.pollutant {
                    next.pollutant = pollutant;
                    next.satellite_date = None;
                    next.popup = None;
                }
            }
            Action::SetSatelliteDate(date) => next.satellite_date = date,
            Action::SetSatelliteOpacity(opacity) => {
                if opacity.is_finite() {
                    next.satellite_opacity = opacity.clamp(0.0, 1.0);
                }
            }
            Action::SetSelectedStation(station) => next.selected_station = station,
            Action::SetSelectedDistrict(district) => next.selected_district = district,
            Action::SetPopup(popup) => next.popup = popup,
            Action::SetRadius(km) => {
                if km.is_finite() && km > 0.0 {
                    next.radius_km = km;
                }
            }
        }
        next
    }
}

/// Holds the current `ViewState` and fans snapshots out to subscribers.
#[derive(Debug, Default)]
pub struct ViewStore {
    state: ViewState,
    subscribers: Subscribers<ViewState>,
}

impl ViewStore {
    pub fn new(initial: ViewState) -> Self {
        Self {
            state: initial,
            subscribers: Subscribers::new(),
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Applies `action`. Returns whether the state changed; subscribers are
    /// only notified when it did.
    pub fn dispatch(&mut self, action: Action) -> bool {
        tracing::debug!(?action, "dispatch");
        let next = self.state.reduce(action);
        if next == self.state {
            return false;
        }
        self.state = next;
        self.subscribers.notify(&self.state);
        true
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&ViewState) + 'static) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }
}
