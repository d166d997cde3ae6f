use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use super::{
    auth::AuthGate,
    catalog::Catalog,
    config::Config,
    openweather::OpenWeatherClient,
    weather::{WeatherService, WeatherSource},
};

pub struct AppState {
    pub config: Config,
    pub catalog: Arc<Catalog>,
    pub weather: WeatherService,
    pub auth: AuthGate,
}

impl AppState {
    /// Validates the configuration, loads the catalog and resolves the weather and auth strategies.
    pub fn new(config: Config) -> Result<Arc<Self>> {
        config.validate()?;

        let catalog = Arc::new(
            Catalog::load(&config.cities_path).context("City catalog could not be loaded")?,
        );

        let source = match config.live_api_key() {
            Some(api_key) => WeatherSource::Live(OpenWeatherClient::new(
                &config.openweather_base_url,
                api_key.to_string(),
            )?),
            None => WeatherSource::Mock,
        };

        let weather = WeatherService::new(catalog.clone(), source, config.cache_ttl);
        info!(
            "Weather source: {}, cache TTL {}s",
            if weather.is_mock() { "mock" } else { "live" },
            config.cache_ttl.as_secs()
        );

        let auth = AuthGate::from_config(&config);

        Ok(Arc::new(Self {
            config,
            catalog,
            weather,
            auth,
        }))
    }
}
