use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::weather::WeatherError;

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

#[derive(Deserialize, Debug)]
pub struct CurrentWeather {
    pub name: Option<String>,
    #[serde(default)]
    pub weather: Vec<Condition>,
    pub main: Option<MainReadings>,
}

#[derive(Deserialize, Debug)]
pub struct Condition {
    pub description: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct MainReadings {
    /// Kelvin, the upstream default unit.
    pub temp: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherClient {
    pub fn new(base_url: &str, api_key: String) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| WeatherError::Fetch(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub async fn current(&self, city_id: &str) -> Result<CurrentWeather, WeatherError> {
        let url = format!("{}/weather", self.base_url);
        debug!("Fetching current weather for city {city_id}");

        let response = self
            .client
            .get(&url)
            .query(&[("id", city_id), ("appid", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| {
                // The URL carries the API key.
                let e = e.without_url();
                WeatherError::Fetch(format!("Request for city {city_id} failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();

            return Err(WeatherError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<CurrentWeather>()
            .await
            .map_err(|e| {
                let e = e.without_url();
                WeatherError::Fetch(format!("Malformed response for city {city_id}: {e}"))
            })
    }
}
