//! Query wiring for every dataset the map shows.

use std::sync::Arc;
use std::time::Duration;

use api::{
    ApiClient, ApiError, DistrictCollection, Pollutant, ProvinceCollection, SatelliteDates,
    StationCollection, TileDescriptor, is_valid_date,
};
use foundation::time::Clock;
use layers::RasterProduct;
use query::{QueryClient, QueryKey, QueryObserver, QueryOptions, QueryResult};

use crate::store::{ViewMode, ViewState};

pub const STATIONS: &str = "stations";
pub const PROVINCES: &str = "provinces";
pub const DISTRICTS: &str = "districts";
pub const SATELLITE_DATES: &str = "gee-dates";
pub const SATELLITE_TILES: &str = "gee-tiles";
pub const EXPOSURE_TILES: &str = "exposure-tiles";

/// Readings change often; stations also refresh on a timer.
pub fn stations_options() -> QueryOptions {
    QueryOptions::default()
        .stale_time(Duration::from_secs(60))
        .refetch_interval(Some(Duration::from_secs(5 * 60)))
}

pub fn boundary_options() -> QueryOptions {
    QueryOptions::default().stale_time(Duration::from_secs(10 * 60))
}

pub fn satellite_options() -> QueryOptions {
    QueryOptions::default()
        .stale_time(Duration::from_secs(30 * 60))
        .cache_time(Duration::from_secs(60 * 60))
        .refetch_on_focus(false)
}

pub fn districts_key(province: &str) -> QueryKey {
    QueryKey::new(DISTRICTS).with("province", province)
}

pub fn dates_key(pollutant: Pollutant) -> QueryKey {
    QueryKey::new(SATELLITE_DATES).with("pollutant", pollutant)
}

pub fn tiles_key(dataset: &str, pollutant: Pollutant, date: &str) -> QueryKey {
    QueryKey::new(dataset)
        .with("pollutant", pollutant)
        .with("date", date)
}

/// The user's date when it is well formed, otherwise the latest one the
/// backend has for the pollutant.
pub fn resolve_date(selected: Option<&str>, available: Option<&SatelliteDates>) -> Option<String> {
    match selected {
        Some(d) if is_valid_date(d) => Some(d.to_string()),
        _ => available.and_then(SatelliteDates::latest).map(str::to_string),
    }
}

type Query<T> = QueryClient<T, ApiError>;
type Observer<T> = Option<QueryObserver<T, ApiError>>;

/// Everything fetched for one view-state snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub stations: QueryResult<StationCollection, ApiError>,
    pub provinces: QueryResult<ProvinceCollection, ApiError>,
    pub districts: QueryResult<DistrictCollection, ApiError>,
    pub dates: QueryResult<SatelliteDates, ApiError>,
    pub satellite: QueryResult<TileDescriptor, ApiError>,
    pub exposure: QueryResult<TileDescriptor, ApiError>,
    /// Pollutant the raster queries were issued for.
    pub pollutant: Pollutant,
    /// Date the raster queries were issued for.
    pub date: Option<String>,
}

impl Snapshot {
    /// Product the tile queries of this snapshot were issued for.
    pub fn raster_product(&self) -> Option<RasterProduct> {
        self.date
            .as_deref()
            .map(|date| RasterProduct::new(self.pollutant, date))
    }

    pub fn errors(&self) -> Vec<(&'static str, &ApiError)> {
        [
            (STATIONS, self.stations.error.as_ref()),
            (PROVINCES, self.provinces.error.as_ref()),
            (DISTRICTS, self.districts.error.as_ref()),
            (SATELLITE_DATES, self.dates.error.as_ref()),
            (SATELLITE_TILES, self.satellite.error.as_ref()),
            (EXPOSURE_TILES, self.exposure.error.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, e)| e.map(|e| (name, e)))
        .collect()
    }
}

#[derive(Default)]
struct Observers {
    stations: Observer<StationCollection>,
    provinces: Observer<ProvinceCollection>,
    districts: Observer<DistrictCollection>,
    dates: Observer<SatelliteDates>,
    satellite: Observer<TileDescriptor>,
    exposure: Observer<TileDescriptor>,
}

/// Keeps exactly one observer on the key currently in use.
fn track<T>(client: &Query<T>, slot: &mut Observer<T>, key: Option<QueryKey>, options: QueryOptions)
where
    T: Send + Sync + 'static,
{
    if slot.as_ref().map(QueryObserver::key) == key.as_ref() {
        return;
    }
    *slot = key.map(|k| client.observe(&k, options));
}

pub struct Datasets {
    api: ApiClient,
    stations: Query<StationCollection>,
    provinces: Query<ProvinceCollection>,
    districts: Query<DistrictCollection>,
    dates: Query<SatelliteDates>,
    satellite: Query<TileDescriptor>,
    exposure: Query<TileDescriptor>,
    observers: Observers,
}

impl Datasets {
    pub fn new(api: ApiClient, clock: Arc<dyn Clock>) -> Self {
        Self {
            api,
            stations: QueryClient::new(clock.clone()),
            provinces: QueryClient::new(clock.clone()),
            districts: QueryClient::new(clock.clone()),
            dates: QueryClient::new(clock.clone()),
            satellite: QueryClient::new(clock.clone()),
            exposure: QueryClient::new(clock),
            observers: Observers::default(),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut ApiClient {
        &mut self.api
    }

    /// Fetches what `state` needs. Independent datasets load concurrently
    /// and fail independently; tiles wait for the resolved date.
    pub async fn load(&mut self, state: &ViewState) -> Snapshot {
        let province = state.mode.province().map(str::to_string);
        let rasters = state.layers.satellite || state.layers.exposure;

        let o = &mut self.observers;
        track(&self.stations, &mut o.stations, Some(QueryKey::new(STATIONS)), stations_options());
        track(
            &self.provinces,
            &mut o.provinces,
            Some(QueryKey::new(PROVINCES)),
            boundary_options(),
        );
        track(
            &self.districts,
            &mut o.districts,
            province.as_deref().map(districts_key),
            boundary_options(),
        );
        track(
            &self.dates,
            &mut o.dates,
            rasters.then(|| dates_key(state.pollutant)),
            satellite_options(),
        );

        let (stations, provinces, districts, dates) = tokio::join!(
            self.load_stations(state.layers.stations),
            self.load_provinces(matches!(state.mode, ViewMode::Provinces)),
            self.load_districts(province.as_deref()),
            self.load_dates(state.pollutant, rasters),
        );

        let date = resolve_date(state.satellite_date.as_deref(), dates.data());
        let pollutant = state.pollutant;
        let o = &mut self.observers;
        track(
            &self.satellite,
            &mut o.satellite,
            date.as_deref()
                .filter(|_| state.layers.satellite)
                .map(|d| tiles_key(SATELLITE_TILES, pollutant, d)),
            satellite_options(),
        );
        track(
            &self.exposure,
            &mut o.exposure,
            date.as_deref()
                .filter(|_| state.layers.exposure)
                .map(|d| tiles_key(EXPOSURE_TILES, pollutant, d)),
            satellite_options(),
        );

        let (satellite, exposure) = tokio::join!(
            self.load_satellite(pollutant, date.as_deref(), state.layers.satellite),
            self.load_exposure(pollutant, date.as_deref(), state.layers.exposure),
        );

        let snapshot = Snapshot {
            stations,
            provinces,
            districts,
            dates,
            satellite,
            exposure,
            pollutant,
            date,
        };
        for (dataset, error) in snapshot.errors() {
            tracing::warn!(dataset, error = %error, "dataset unavailable");
        }
        snapshot
    }

    async fn load_stations(&self, enabled: bool) -> QueryResult<StationCollection, ApiError> {
        let api = self.api.clone();
        self.stations
            .query(
                &QueryKey::new(STATIONS),
                stations_options().enabled(enabled),
                move || async move { api.stations().await },
            )
            .await
    }

    async fn load_provinces(&self, enabled: bool) -> QueryResult<ProvinceCollection, ApiError> {
        let api = self.api.clone();
        self.provinces
            .query(
                &QueryKey::new(PROVINCES),
                boundary_options().enabled(enabled),
                move || async move { api.provinces().await },
            )
            .await
    }

    async fn load_districts(
        &self,
        province: Option<&str>,
    ) -> QueryResult<DistrictCollection, ApiError> {
        let Some(province) = province else {
            return QueryResult::idle();
        };
        let api = self.api.clone();
        let name = province.to_string();
        self.districts
            .query(&districts_key(province), boundary_options(), move || async move {
                api.districts(&name).await
            })
            .await
    }

    async fn load_dates(
        &self,
        pollutant: Pollutant,
        enabled: bool,
    ) -> QueryResult<SatelliteDates, ApiError> {
        let api = self.api.clone();
        self.dates
            .query(
                &dates_key(pollutant),
                satellite_options().enabled(enabled),
                move || async move { api.satellite_dates(pollutant).await },
            )
            .await
    }

    /// Tiles are only requested once both pollutant and date are known.
    async fn load_satellite(
        &self,
        pollutant: Pollutant,
        date: Option<&str>,
        enabled: bool,
    ) -> QueryResult<TileDescriptor, ApiError> {
        let Some(date) = date else {
            return QueryResult::idle();
        };
        let api = self.api.clone();
        let day = date.to_string();
        self.satellite
            .query(
                &tiles_key(SATELLITE_TILES, pollutant, date),
                satellite_options().enabled(enabled),
                move || async move { api.satellite_tiles(pollutant, &day).await },
            )
            .await
    }

    async fn load_exposure(
        &self,
        pollutant: Pollutant,
        date: Option<&str>,
        enabled: bool,
    ) -> QueryResult<TileDescriptor, ApiError> {
        let Some(date) = date else {
            return QueryResult::idle();
        };
        let api = self.api.clone();
        let day = date.to_string();
        self.exposure
            .query(
                &tiles_key(EXPOSURE_TILES, pollutant, date),
                satellite_options().enabled(enabled),
                move || async move { api.exposure_tiles(pollutant, &day).await },
            )
            .await
    }

    /// Marks entries whose refetch interval elapsed as stale so the next
    /// `load` refetches them. Returns how many were marked.
    pub fn expire_due(&self) -> usize {
        let mut due = 0;
        for key in self.stations.keys_due_for_interval() {
            self.stations.invalidate(&key);
            due += 1;
        }
        due
    }

    /// Drops cached entries nobody observes any more.
    pub fn gc(&self) -> usize {
        self.stations.gc().len()
            + self.provinces.gc().len()
            + self.districts.gc().len()
            + self.dates.gc().len()
            + self.satellite.gc().len()
            + self.exposure.gc().len()
    }

    pub fn fetch_count(&self, dataset: &str, key: &QueryKey) -> u32 {
        match dataset {
            STATIONS => self.stations.fetch_count(key),
            PROVINCES => self.provinces.fetch_count(key),
            DISTRICTS => self.districts.fetch_count(key),
            SATELLITE_DATES => self.dates.fetch_count(key),
            SATELLITE_TILES => self.satellite.fetch_count(key),
            EXPOSURE_TILES => self.exposure.fetch_count(key),
            _ => 0,
        }
    }
}
