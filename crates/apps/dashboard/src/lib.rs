//! Air-quality dashboard core: view state, dataset queries and the map
//! view that ties layer components to a map host.

pub mod app;
pub mod datasets;
pub mod legend;
pub mod persist;
pub mod store;
pub mod view;

pub use app::Dashboard;
pub use store::{Action, LayerFlags, LayerToggle, ViewMode, ViewState, ViewStore};
