//! The dashboard: view store, datasets and map view wired to one map host.

use std::sync::Arc;

use api::ApiClient;
use foundation::geo::LngLat;
use foundation::time::Clock;
use layers::{Legend, RasterProduct};
use map::{MapEvent, MapHost};
use runtime::MountToken;
use session::{SessionStore, load_auth};

use crate::datasets::{Datasets, Snapshot};
use crate::persist;
use crate::store::{Action, Popup, ViewState, ViewStore};
use crate::view::{MapView, Routed};

pub struct Dashboard<H: MapHost> {
    host: H,
    store: ViewStore,
    view: MapView,
    datasets: Datasets,
    session: Box<dyn SessionStore>,
    /// Data of the last completed load, re-rendered on every state change.
    last: Option<Snapshot>,
}

impl<H: MapHost> Dashboard<H> {
    /// Restores the saved view and credentials from `session`.
    pub fn new(
        host: H,
        mut api: ApiClient,
        session: Box<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        match load_auth(session.as_ref()) {
            Ok(tokens) => api.set_access_token(tokens.map(|t| t.access)),
            Err(e) => tracing::warn!(error = %e, "ignoring saved credentials"),
        }
        let state = persist::restore(session.as_ref());
        let mut view = MapView::new();
        view.observe(&state);
        Self {
            host,
            store: ViewStore::new(state),
            view,
            datasets: Datasets::new(api, clock),
            session,
            last: None,
        }
    }

    pub fn state(&self) -> &ViewState {
        self.store.state()
    }

    pub fn store_mut(&mut self) -> &mut ViewStore {
        &mut self.store
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn datasets(&self) -> &Datasets {
        &self.datasets
    }

    pub fn session(&self) -> &dyn SessionStore {
        self.session.as_ref()
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.last.as_ref()
    }

    /// Applies `action`; on change saves the session and redraws from the
    /// last loaded data. Call [`refresh`](Self::refresh) to fetch what the
    /// new state needs.
    pub fn dispatch(&mut self, action: Action) -> bool {
        if !self.store.dispatch(action) {
            return false;
        }
        let state = self.store.state().clone();
        persist::save(self.session.as_mut(), &state);
        self.view.observe(&state);
        if let Some(data) = &self.last {
            self.view.render(&mut self.host, &state, data);
        }
        true
    }

    /// Loads every dataset the current state needs and draws the result.
    /// Returns `false` when the state moved on while loading; the stale
    /// result is dropped.
    pub async fn refresh(&mut self) -> bool {
        let token = self.view.load_token();
        let state = self.store.state().clone();
        let snapshot = self.datasets.load(&state).await;
        if !token.is_current() {
            tracing::debug!("view changed during load, discarding result");
            return false;
        }
        self.view.render(&mut self.host, &state, &snapshot);
        self.last = Some(snapshot);
        true
    }

    /// Routes pointer events from the host through the layer components.
    pub async fn handle_events(&mut self, events: &[MapEvent]) {
        let routed = self.view.handle_events(&mut self.host, events);
        for r in routed {
            match r {
                Routed::Dispatch(action) => {
                    self.dispatch(action);
                }
                Routed::Sample { at, token } => self.sample(at, token).await,
            }
        }
    }

    async fn sample(&mut self, at: LngLat, token: MountToken) {
        // Sample what is drawn: the store may already name another pollutant.
        let Some(RasterProduct { pollutant, date }) =
            self.last.as_ref().and_then(Snapshot::raster_product)
        else {
            tracing::debug!("no satellite date, sample skipped");
            return;
        };
        match self.datasets.api().satellite_value(pollutant, &date, at).await {
            Ok(value) if token.is_current() => {
                let text = value.describe(pollutant);
                self.dispatch(Action::SetPopup(Some(Popup { at, text })));
            }
            Ok(_) => tracing::debug!("satellite layer replaced, sample dropped"),
            Err(e) => tracing::warn!(%pollutant, %date, error = %e, "satellite sample failed"),
        }
    }

    pub fn legends(&self) -> Vec<Legend> {
        self.view.legends()
    }

    /// Periodic housekeeping: marks interval-due entries stale and drops
    /// unobserved cache entries.
    pub fn tick(&self) {
        let due = self.datasets.expire_due();
        let dropped = self.datasets.gc();
        if due > 0 || dropped > 0 {
            tracing::debug!(due, dropped, "cache maintenance");
        }
    }

    pub fn shutdown(&mut self) {
        self.view.unmount_all(&mut self.host);
    }
}
