//! Map layer components for the dashboard datasets.

pub mod choropleth;
pub mod districts;
pub mod exposure;
pub mod layer;
pub mod provinces;
pub mod radius;
pub mod raster;
pub mod satellite;
pub mod stations;
pub mod symbology;

pub use districts::DistrictsLayer;
pub use exposure::ExposureLayer;
pub use layer::*;
pub use provinces::ProvincesLayer;
pub use radius::RadiusLayer;
pub use raster::RasterProduct;
pub use satellite::SatelliteLayer;
pub use stations::StationsLayer;
pub use symbology::{Legend, LegendEntry};
