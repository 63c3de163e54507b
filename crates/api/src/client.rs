use foundation::geo::LngLat;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::retry::RetryPolicy;
use crate::schema::{
    validate_date, DistrictCollection, Pollutant, ProvinceCollection, SatelliteDates,
    SatelliteValue, StationCollection, TileDescriptor, Validate,
};

pub const STATIONS_PATH: &str = "/api/v1/air-quality/stations/geojson/";
pub const PROVINCES_PATH: &str = "/api/v1/air-quality/provinces/geojson/";
pub const DISTRICTS_PATH: &str = "/api/v1/exposure/geojson/districts/";
pub const SATELLITE_TILES_PATH: &str = "/api/v1/air-quality/gee/tiles/";
pub const SATELLITE_DATES_PATH: &str = "/api/v1/air-quality/gee/dates/";
pub const SATELLITE_VALUE_PATH: &str = "/api/v1/air-quality/gee/value/";
pub const EXPOSURE_TILES_PATH: &str = "/api/v1/exposure/satellite/";

/// Typed client for the air-quality REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ApiConfig,
    retry: RetryPolicy,
    access_token: Option<String>,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            config,
            retry: RetryPolicy::default(),
            access_token: None,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sent as `Authorization: Bearer` on every request while set.
    pub fn set_access_token(&mut self, token: Option<String>) {
        self.access_token = token.filter(|t| !t.is_empty());
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub async fn stations(&self) -> Result<StationCollection, ApiError> {
        self.get_json(STATIONS_PATH, &[]).await
    }

    pub async fn provinces(&self) -> Result<ProvinceCollection, ApiError> {
        self.get_json(PROVINCES_PATH, &[]).await
    }

    pub async fn districts(&self, province: &str) -> Result<DistrictCollection, ApiError> {
        if province.trim().is_empty() {
            return Err(ApiError::Validation("province is required".to_string()));
        }
        self.get_json(DISTRICTS_PATH, &[("province", province.to_string())])
            .await
    }

    pub async fn satellite_tiles(
        &self,
        pollutant: Pollutant,
        date: &str,
    ) -> Result<TileDescriptor, ApiError> {
        validate_date(date)?;
        self.get_json(
            SATELLITE_TILES_PATH,
            &[("pollutant", pollutant.to_string()), ("date", date.to_string())],
        )
        .await
    }

    pub async fn satellite_dates(&self, pollutant: Pollutant) -> Result<SatelliteDates, ApiError> {
        self.get_json(SATELLITE_DATES_PATH, &[("pollutant", pollutant.to_string())])
            .await
    }

    pub async fn satellite_value(
        &self,
        pollutant: Pollutant,
        date: &str,
        at: LngLat,
    ) -> Result<SatelliteValue, ApiError> {
        validate_date(date)?;
        if !at.is_valid() {
            return Err(ApiError::Validation(format!(
                "coordinates out of range: {}, {}",
                at.lat, at.lng
            )));
        }
        self.get_json(
            SATELLITE_VALUE_PATH,
            &[
                ("pollutant", pollutant.to_string()),
                ("date", date.to_string()),
                ("lat", at.lat.to_string()),
                ("lon", at.lng.to_string()),
            ],
        )
        .await
    }

    pub async fn exposure_tiles(
        &self,
        pollutant: Pollutant,
        date: &str,
    ) -> Result<TileDescriptor, ApiError> {
        validate_date(date)?;
        self.get_json(
            EXPOSURE_TILES_PATH,
            &[("pollutant", pollutant.to_string()), ("date", date.to_string())],
        )
        .await
    }

    async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Validate,
    {
        let url = self.config.url(path);
        let mut retry = 0;
        loop {
            match self.get_once(&url, query).await {
                Ok(value) => return Ok(value),
                Err(err) => match self.retry.delay_for(&err, retry) {
                    Some(delay) => {
                        tracing::warn!(%url, error = %err, retry, ?delay, "retrying request");
                        tokio::time::sleep(delay).await;
                        retry += 1;
                    }
                    None => {
                        tracing::debug!(%url, error = %err, "request failed");
                        return Err(err);
                    }
                },
            }
        }
    }

    async fn get_once<T>(&self, url: &str, query: &[(&str, String)]) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Validate,
    {
        let mut req = self.http.get(url).query(query);
        if let Some(token) = &self.access_token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        tracing::debug!(%url, "GET");
        let resp = req.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = resp.text().await.unwrap_or_default();
            return Err(match ApiError::from_status(status.as_u16(), body) {
                ApiError::RateLimited { .. } => ApiError::RateLimited { retry_after },
                other => other,
            });
        }

        let bytes = resp.bytes().await?;
        let value: T =
            serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))?;
        value.validate().map_err(ApiError::Decode)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type Hits = Arc<AtomicUsize>;

    async fn serve(router: Router) -> ApiClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        ApiClient::new(ApiConfig::new(format!("http://{addr}")))
            .expect("client")
            .with_retry(
                RetryPolicy::default()
                    .with_delays(Duration::from_millis(1), Duration::from_millis(4)),
            )
    }

    fn district_fc(province: &str) -> serde_json::Value {
        json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[30.0, -2.0], [30.1, -2.0], [30.1, -1.9], [30.0, -2.0]]]
                },
                "properties": { "name": "Gasabo", "province": province, "mean_aqi": 75.0 }
            }]
        })
    }

    #[tokio::test]
    async fn districts_send_query_and_bearer_token() {
        async fn handler(
            headers: HeaderMap,
            Query(q): Query<HashMap<String, String>>,
        ) -> impl IntoResponse {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if auth != "Bearer t0k" {
                return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "no" })));
            }
            let province = q.get("province").cloned().unwrap_or_default();
            (StatusCode::OK, Json(district_fc(&province)))
        }

        let mut client = serve(Router::new().route(DISTRICTS_PATH, get(handler))).await;
        assert!(matches!(
            client.districts("Kigali City").await,
            Err(ApiError::Client { status: 401, .. })
        ));

        client.set_access_token(Some("t0k".into()));
        let fc = client.districts("Kigali City").await.expect("districts");
        assert_eq!(fc.len(), 1);
        let props = &fc.features[0].properties;
        assert_eq!(props.province.as_deref(), Some("Kigali City"));
        assert_eq!(props.mean_aqi, Some(75.0));
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_success() {
        async fn flaky(State(hits): State<Hits>) -> impl IntoResponse {
            if hits.fetch_add(1, Ordering::SeqCst) < 2 {
                return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({})));
            }
            (StatusCode::OK, Json(json!({ "dates": ["2024-06-01"] })))
        }

        let hits = Hits::default();
        let client = serve(
            Router::new()
                .route(SATELLITE_DATES_PATH, get(flaky))
                .with_state(hits.clone()),
        )
        .await;
        let dates = client
            .satellite_dates(Pollutant::No2)
            .await
            .expect("dates");
        assert_eq!(dates.latest(), Some("2024-06-01"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn server_retries_are_bounded() {
        async fn down(State(hits): State<Hits>) -> impl IntoResponse {
            hits.fetch_add(1, Ordering::SeqCst);
            StatusCode::BAD_GATEWAY
        }

        let hits = Hits::default();
        let client = serve(
            Router::new()
                .route(STATIONS_PATH, get(down))
                .with_state(hits.clone()),
        )
        .await;
        assert!(matches!(
            client.stations().await,
            Err(ApiError::Server { status: 502, .. })
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn client_errors_and_rate_limits_are_final() {
        async fn missing(State(hits): State<Hits>) -> impl IntoResponse {
            hits.fetch_add(1, Ordering::SeqCst);
            StatusCode::NOT_FOUND
        }
        async fn limited(State(hits): State<Hits>) -> impl IntoResponse {
            hits.fetch_add(1, Ordering::SeqCst);
            (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "7")])
        }

        let hits = Hits::default();
        let client = serve(
            Router::new()
                .route(PROVINCES_PATH, get(missing))
                .route(STATIONS_PATH, get(limited))
                .with_state(hits.clone()),
        )
        .await;
        assert!(matches!(
            client.provinces().await,
            Err(ApiError::Client { status: 404, .. })
        ));
        assert_eq!(
            client.stations().await,
            Err(ApiError::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            })
        );
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn schema_violations_are_decode_errors() {
        async fn bad() -> impl IntoResponse {
            Json(json!({ "features": [{
                "geometry": { "type": "Point", "coordinates": [0.0, 0.0] },
                "properties": { "name": "", "pm25": 3.0 }
            }]}))
        }
        async fn garbage() -> impl IntoResponse {
            "not json"
        }

        let client = serve(
            Router::new()
                .route(STATIONS_PATH, get(bad))
                .route(PROVINCES_PATH, get(garbage)),
        )
        .await;
        assert!(matches!(client.stations().await, Err(ApiError::Decode(_))));
        assert!(matches!(client.provinces().await, Err(ApiError::Decode(_))));
    }

    #[tokio::test]
    async fn bad_input_never_reaches_the_network() {
        let client = ApiClient::new(ApiConfig::new("http://127.0.0.1:9")).expect("client");
        assert!(matches!(client.districts(" ").await, Err(ApiError::Validation(_))));
        assert!(matches!(
            client.satellite_tiles(Pollutant::Co, "June 1").await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            client
                .satellite_value(Pollutant::Co, "2024-06-01", LngLat::new(200.0, 0.0))
                .await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_hosts_are_network_errors() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let client = ApiClient::new(ApiConfig::new(format!("http://{addr}")))
            .expect("client")
            .with_retry(
                RetryPolicy::default()
                    .with_delays(Duration::from_millis(1), Duration::from_millis(1)),
            );
        assert!(matches!(client.stations().await, Err(ApiError::Network(_))));
    }
}
