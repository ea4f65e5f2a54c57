use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use tracing::warn;

use syntra_types::api::{GeocodeQuery, GeocodeResponse};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// Reverse geocoding: coordinates to a human-readable address.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the service knows no address for the point.
    async fn reverse(&self, lat: f64, lng: f64) -> Result<Option<String>>;
}

pub struct GoogleGeocoder {
    client: reqwest::Client,
    api_key: String,
}

impl GoogleGeocoder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Deserialize)]
struct GeocodeResults {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    formatted_address: String,
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn reverse(&self, lat: f64, lng: f64) -> Result<Option<String>> {
        let resp: GeocodeResults = self
            .client
            .get("https://maps.googleapis.com/maps/api/geocode/json")
            .query(&[("latlng", format!("{},{}", lat, lng)), ("key", self.api_key.clone())])
            .send()
            .await
            .context("geocoding request failed")?
            .error_for_status()?
            .json()
            .await
            .context("malformed geocoding response")?;

        Ok(resp.results.into_iter().next().map(|r| r.formatted_address))
    }
}

pub fn coordinates_fallback(lat: f64, lng: f64) -> String {
    format!("Coordenadas: {:.5}, {:.5}", lat, lng)
}

/// GET /geocode?lat=..&lng=..
pub async fn reverse_geocode(
    State(state): State<AppState>,
    Query(query): Query<GeocodeQuery>,
) -> ApiResult<Json<GeocodeResponse>> {
    let GeocodeQuery { lat, lng } = query;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(ApiError::validation("Coordenadas fuera de rango"));
    }

    let resolved = match &state.geocoder {
        Some(geocoder) => match geocoder.reverse(lat, lng).await {
            Ok(address) => address.filter(|a| !a.trim().is_empty()),
            Err(e) => {
                warn!("Reverse geocoding {},{} failed: {:#}", lat, lng, e);
                None
            }
        },
        None => None,
    };

    Ok(Json(match resolved {
        Some(address) => GeocodeResponse {
            address,
            resolved: true,
        },
        None => GeocodeResponse {
            address: coordinates_fallback(lat, lng),
            resolved: false,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_uses_five_decimals() {
        assert_eq!(
            coordinates_fallback(4.6482837, -74.0478732),
            "Coordenadas: 4.64828, -74.04787"
        );
    }

    #[test]
    fn parses_first_result() {
        let raw = r#"{"results":[{"formatted_address":"Cl. 100 #19-61, Bogotá"},{"formatted_address":"Bogotá"}],"status":"OK"}"#;
        let parsed: GeocodeResults = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.results[0].formatted_address, "Cl. 100 #19-61, Bogotá");

        let empty: GeocodeResults = serde_json::from_str(r#"{"status":"ZERO_RESULTS"}"#).unwrap();
        assert!(empty.results.is_empty());
    }
}
