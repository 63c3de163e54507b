//! The part of the view state that survives a reload.

use api::Pollutant;
use serde::{Deserialize, Serialize};
use session::{SessionStore, VIEW_STATE_KEY, load_json, save_json};

use crate::store::{LayerFlags, ViewState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedView {
    #[serde(default)]
    pub layers: LayerFlags,
    #[serde(default)]
    pub pollutant: Pollutant,
    pub opacity: f64,
}

impl PersistedView {
    pub fn of(state: &ViewState) -> Self {
        Self {
            layers: state.layers,
            pollutant: state.pollutant,
            opacity: state.satellite_opacity,
        }
    }

    pub fn apply(&self, mut state: ViewState) -> ViewState {
        state.layers = self.layers;
        state.pollutant = self.pollutant;
        if self.opacity.is_finite() {
            state.satellite_opacity = self.opacity.clamp(0.0, 1.0);
        }
        state
    }
}

/// Initial state: defaults overlaid with whatever was saved. Unreadable
/// entries are logged and ignored.
pub fn restore(store: &dyn SessionStore) -> ViewState {
    match load_json::<PersistedView>(store, VIEW_STATE_KEY) {
        Ok(Some(saved)) => saved.apply(ViewState::default()),
        Ok(None) => ViewState::default(),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring saved view state");
            ViewState::default()
        }
    }
}

pub fn save(store: &mut dyn SessionStore, state: &ViewState) {
    if let Err(e) = save_json(store, VIEW_STATE_KEY, &PersistedView::of(state)) {
        tracing::warn!(error = %e, "saving view state failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Action, LayerToggle};
    use pretty_assertions::assert_eq;
    use session::InMemorySessionStore;

    #[test]
    fn saved_toggles_pollutant_and_opacity_come_back() {
        let mut store = InMemorySessionStore::new();
        let state = ViewState::default()
            .reduce(Action::ToggleLayer(LayerToggle::Satellite))
            .reduce(Action::SetPollutant(Pollutant::O3))
            .reduce(Action::SetSatelliteOpacity(0.35))
            .reduce(Action::SetSelectedProvince(Some("Eastern".into())));
        save(&mut store, &state);

        let restored = restore(&store);
        assert!(restored.layers.satellite);
        assert_eq!(restored.pollutant, Pollutant::O3);
        assert_eq!(restored.satellite_opacity, 0.35);
        assert_eq!(restored.mode, ViewState::default().mode);
    }

    #[test]
    fn corrupt_or_partial_entries_fall_back_to_defaults() {
        let mut store = InMemorySessionStore::new();
        store.set(VIEW_STATE_KEY, "{not json").expect("set");
        assert_eq!(restore(&store), ViewState::default());

        store
            .set(VIEW_STATE_KEY, r#"{"layers":{"stations":false},"opacity":3.0}"#)
            .expect("set");
        let restored = restore(&store);
        assert!(!restored.layers.stations);
        assert!(restored.layers.districts);
        assert_eq!(restored.satellite_opacity, 1.0);
    }
}
