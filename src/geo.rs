//! Geocoding of target districts and the Leaflet deployment map

use std::path::Path;

use anyhow::Context;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::MapConfig;
use crate::resources::TargetDistrict;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Resolves a free-text place query to coordinates
pub trait Geocoder {
    /// `Ok(None)` when the service answered but knows no such place
    fn geocode(&self, query: &str) -> crate::Result<Option<Coordinates>>;
}

/// Geocoder backed by a Nominatim search endpoint
pub struct NominatimGeocoder {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    pub fn new(config: &MapConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .context("failed to build geocoding HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

impl Geocoder for NominatimGeocoder {
    fn geocode(&self, query: &str) -> crate::Result<Option<Coordinates>> {
        let places: Vec<NominatimPlace> = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()?
            .error_for_status()?
            .json()?;

        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };

        let lat = place
            .lat
            .parse()
            .with_context(|| format!("bad latitude '{}' for {query}", place.lat))?;
        let lon = place
            .lon
            .parse()
            .with_context(|| format!("bad longitude '{}' for {query}", place.lon))?;
        Ok(Some(Coordinates { lat, lon }))
    }
}

/// Lookup result for one target district
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeOutcome {
    pub district: String,
    pub vans_required: u64,
    /// `None` when the district was not geocoded
    pub location: Option<Coordinates>,
}

/// Look up each target once, in order. A failed lookup is recorded and the
/// batch continues.
pub fn geocode_targets(
    geocoder: &dyn Geocoder,
    targets: &[TargetDistrict],
    region: &str,
) -> Vec<GeocodeOutcome> {
    targets
        .iter()
        .map(|target| {
            let query = format!("{}, {}", target.district, region);
            let location = match geocoder.geocode(&query) {
                Ok(Some(coords)) => {
                    info!(district = %target.district, lat = coords.lat, lon = coords.lon, "geocoded");
                    Some(coords)
                }
                Ok(None) => {
                    warn!(district = %target.district, "no geocoding match");
                    None
                }
                Err(err) => {
                    warn!(district = %target.district, error = %err, "geocoding failed");
                    None
                }
            };

            GeocodeOutcome {
                district: target.district.clone(),
                vans_required: target.vans_required,
                location,
            }
        })
        .collect()
}

#[derive(Serialize)]
struct Marker<'a> {
    lat: f64,
    lon: f64,
    popup: &'a str,
}

/// Render a self-contained Leaflet page with one marker per geocoded outcome
pub fn render_map_html(outcomes: &[GeocodeOutcome], config: &MapConfig) -> crate::Result<String> {
    let popups: Vec<(Coordinates, String)> = outcomes
        .iter()
        .filter_map(|o| {
            o.location.map(|coords| {
                let popup = format!(
                    "<b>District:</b> {}<br><b>Vans:</b> {}",
                    escape_html(&o.district),
                    o.vans_required
                );
                (coords, popup)
            })
        })
        .collect();

    let markers: Vec<Marker<'_>> = popups
        .iter()
        .map(|(coords, popup)| Marker {
            lat: coords.lat,
            lon: coords.lon,
            popup,
        })
        .collect();
    let markers_json = serde_json::to_string(&markers)?;
    let (center_lat, center_lon) = config.center;

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Deployment Map</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>html, body, #map {{ height: 100%; margin: 0; }}</style>
</head>
<body>
<div id="map"></div>
<script>
var map = L.map('map').setView([{center_lat}, {center_lon}], {zoom});
L.tileLayer('https://{{s}}.basemaps.cartocdn.com/light_all/{{z}}/{{x}}/{{y}}{{r}}.png', {{
  attribution: '&copy; OpenStreetMap contributors &copy; CARTO'
}}).addTo(map);
var markers = {markers_json};
markers.forEach(function (m) {{
  L.marker([m.lat, m.lon]).bindPopup(m.popup).addTo(map);
}});
</script>
</body>
</html>
"#,
        zoom = config.zoom,
    ))
}

/// Write the map page to `path`
pub fn write_map(path: &Path, html: &str) -> crate::Result<()> {
    std::fs::write(path, html).with_context(|| format!("failed to write map to {}", path.display()))
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
