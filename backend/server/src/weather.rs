//! # Weather Fetcher
//!
//! Turns a city id into a [`WeatherReading`].
//!
//! ## Lookup Order
//!
//! 1. Cache, an unexpired hit returns without I/O
//! 2. Mock source: reading synthesized from the catalog baseline
//! 3. Live source: OpenWeatherMap current weather by city id
//! 4. Result is cached before it is returned
//!
//! Mock is used whenever no API key is configured or mock data is forced.
//!
//! ## Batch
//!
//! Every catalog city is fetched concurrently and joined in catalog order.
//! A failing city becomes a failed row and never blanks its siblings.
use std::{sync::Arc, time::Duration};

use futures_util::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    cache::TtlCache,
    catalog::{Catalog, UNKNOWN_CITY_NAME},
    openweather::{CurrentWeather, OpenWeatherClient},
    utils::{celsius_from_kelvin, kelvin_from_celsius, round_half_up},
};

#[derive(Error, Debug, Clone)]
pub enum WeatherError {
    #[error("Upstream responded with status {status}")]
    Upstream { status: u16, body: String },

    #[error("{0}")]
    Fetch(String),
}

pub type FetchResult = Result<WeatherReading, WeatherError>;

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeatherReading {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub temp_kelvin: Option<f64>,
    pub temp_c: Option<i64>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FailedReading {
    pub id: String,
    pub name: String,
    pub error: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum BatchRow {
    Reading(WeatherReading),
    Failed(FailedReading),
}

#[derive(Debug)]
pub enum WeatherSource {
    Mock,
    Live(OpenWeatherClient),
}

pub struct WeatherService {
    catalog: Arc<Catalog>,
    cache: TtlCache<String, WeatherReading>,
    source: WeatherSource,
}

impl WeatherService {
    pub fn new(catalog: Arc<Catalog>, source: WeatherSource, ttl: Duration) -> Self {
        Self {
            catalog,
            cache: TtlCache::new(ttl),
            source,
        }
    }

    pub fn is_mock(&self) -> bool {
        matches!(self.source, WeatherSource::Mock)
    }

    pub async fn fetch(&self, id: &str) -> Result<WeatherReading, WeatherError> {
        if let Some(cached) = self.cache.get(&id.to_string()) {
            debug!("Cache hit for city {id}");
            return Ok(cached);
        }

        let reading = match &self.source {
            WeatherSource::Mock => self.mock_reading(id),
            WeatherSource::Live(client) => live_reading(id, client.current(id).await?),
        };

        self.cache.set(id.to_string(), reading.clone());

        Ok(reading)
    }

    pub async fn fetch_all(&self) -> Vec<(String, FetchResult)> {
        let ids = self.catalog.ids();
        let results = join_all(ids.iter().map(|id| self.fetch(id))).await;

        ids.iter().cloned().zip(results).collect()
    }

    /// Flattens batch results into response rows, failures included.
    pub fn rows(&self, results: Vec<(String, FetchResult)>) -> Vec<BatchRow> {
        results
            .into_iter()
            .map(|(id, result)| match result {
                Ok(reading) => BatchRow::Reading(reading),
                Err(e) => {
                    warn!("Failed to fetch weather for city {id}: {e}");

                    BatchRow::Failed(FailedReading {
                        name: self.city_name(&id),
                        error: e.to_string(),
                        id,
                    })
                }
            })
            .collect()
    }

    fn city_name(&self, id: &str) -> String {
        self.catalog
            .get(id)
            .map(|city| city.name.clone())
            .unwrap_or_else(|| UNKNOWN_CITY_NAME.to_string())
    }

    fn mock_reading(&self, id: &str) -> WeatherReading {
        let Some(city) = self.catalog.get(id) else {
            return WeatherReading {
                id: id.to_string(),
                name: UNKNOWN_CITY_NAME.to_string(),
                description: None,
                temp_kelvin: None,
                temp_c: None,
            };
        };

        let temp_c = city.baseline_temp_c.map(|temp| round_half_up(temp) as i64);

        WeatherReading {
            id: id.to_string(),
            name: city.name.clone(),
            description: city.status.clone(),
            temp_kelvin: temp_c.map(kelvin_from_celsius),
            temp_c,
        }
    }
}

fn live_reading(id: &str, current: CurrentWeather) -> WeatherReading {
    let temp_kelvin = current.main.and_then(|main| main.temp);

    WeatherReading {
        id: id.to_string(),
        name: current.name.unwrap_or_else(|| UNKNOWN_CITY_NAME.to_string()),
        description: current
            .weather
            .into_iter()
            .next()
            .and_then(|condition| condition.description),
        temp_kelvin,
        temp_c: temp_kelvin.map(celsius_from_kelvin),
    }
}
