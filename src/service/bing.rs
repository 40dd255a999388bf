//! A [`GeocodingService`] backed by the Bing Maps Locations API.

use std::fmt::{self, Debug};

use reqwest::blocking::Client;
use reqwest::Url;
use serde::Deserialize;

use super::{GeocodeResult, GeocodingService, ServiceError};
use crate::scene::Rectangle;

/// Resolves queries with the [Bing Maps Locations
/// API](http://msdn.microsoft.com/en-us/library/ff701715.aspx).
pub struct BingMapsService {
    url: String,
    key: Option<String>,
    client: Client,
}

impl BingMapsService {
    /// Returns a service that sends requests to the Bing Maps API hosted at
    /// `url`, authenticating with `key`.
    #[must_use]
    pub fn new(url: impl Into<String>, key: Option<String>) -> Self {
        if key.is_none() {
            tracing::warn!(
                "no Bing Maps key was provided. Create a key for your application at https://www.bingmapsportal.com/ before deploying."
            );
        }

        Self {
            url: url.into(),
            key,
            client: Client::new(),
        }
    }

    /// Returns the request URL used to resolve `query`.
    pub fn locations_url(&self, query: &str) -> Result<Url, ServiceError> {
        let mut base = self.url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        base.push_str("REST/v1/Locations");

        let mut url = Url::parse(&base).map_err(|err| ServiceError::Http(err.to_string()))?;
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("query", query);
            if let Some(key) = &self.key {
                params.append_pair("key", key);
            }
        }
        Ok(url)
    }
}

impl Debug for BingMapsService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BingMapsService")
            .field("url", &self.url)
            .field("has_key", &self.key.is_some())
            .finish_non_exhaustive()
    }
}

impl GeocodingService for BingMapsService {
    fn geocode(&self, query: &str) -> Result<Option<GeocodeResult>, ServiceError> {
        let url = self.locations_url(query)?;
        tracing::debug!(%url, "requesting location");
        let body = self
            .client
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(reqwest::blocking::Response::text)
            .map_err(|err| ServiceError::Http(err.to_string()))?;
        parse_locations(&body)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationsResponse {
    #[serde(default)]
    resource_sets: Vec<ResourceSet>,
}

#[derive(Deserialize)]
struct ResourceSet {
    #[serde(default)]
    resources: Vec<Resource>,
}

#[derive(Deserialize)]
struct Resource {
    name: String,
    /// `[south, west, north, east]`, in degrees.
    bbox: [f64; 4],
}

/// Parses a Locations API response body, returning its best match.
pub fn parse_locations(body: &str) -> Result<Option<GeocodeResult>, ServiceError> {
    let response = serde_json::from_str::<LocationsResponse>(body)
        .map_err(|err| ServiceError::InvalidResponse(err.to_string()))?;
    let Some(resource) = response
        .resource_sets
        .into_iter()
        .next()
        .and_then(|set| set.resources.into_iter().next())
    else {
        return Ok(None);
    };

    let [south, west, north, east] = resource.bbox;
    Ok(Some(GeocodeResult {
        name: resource.name,
        bounds: Rectangle::from_degrees(west, south, east, north),
    }))
}

#[test]
fn first_resource_wins() {
    let body = r#"{
        "authenticationResultCode": "ValidCredentials",
        "resourceSets": [{
            "estimatedTotal": 2,
            "resources": [
                {
                    "name": "Eiffel Tower, France",
                    "bbox": [48.854, 2.288, 48.862, 2.301],
                    "point": { "type": "Point", "coordinates": [48.858, 2.294] }
                },
                { "name": "Eiffel Tower, Las Vegas, NV", "bbox": [36.1, -115.2, 36.2, -115.1] }
            ]
        }]
    }"#;

    let result = parse_locations(body).unwrap().unwrap();
    assert_eq!(result.name, "Eiffel Tower, France");
    assert_eq!(
        result.bounds,
        Rectangle::from_degrees(2.288, 48.854, 2.301, 48.862)
    );
}

#[test]
fn empty_results() {
    assert_eq!(parse_locations(r#"{"resourceSets": []}"#), Ok(None));
    assert_eq!(
        parse_locations(r#"{"resourceSets": [{"resources": []}]}"#),
        Ok(None)
    );
}

#[test]
fn malformed_response() {
    assert!(matches!(
        parse_locations("<html>"),
        Err(ServiceError::InvalidResponse(_))
    ));
}

#[test]
fn request_url() {
    let service = BingMapsService::new("http://dev.virtualearth.net", Some(String::from("abc")));
    let url = service.locations_url("Mount Fuji").unwrap();
    assert_eq!(
        url.as_str(),
        "http://dev.virtualearth.net/REST/v1/Locations?query=Mount+Fuji&key=abc"
    );
}
