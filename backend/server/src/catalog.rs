//! # City Catalog
//!
//! Static list of cities loaded once at startup.
//!
//! ## Accepted Shapes
//!
//! - Top level array of city objects
//! - Object holding the array under `List`, `list` or `cities`
//!
//! ## Entry Fields
//!
//! - id: first present of `CityCode`, `id`, `cityId`, string or number
//! - name: `CityName` or `name`
//! - status: `Status` or `status`
//! - baseline temperature in Celsius: `Temp` or `temp`, number or numeric string
//!
//! Entries without an id are skipped. The first entry for an id wins.
use std::{collections::HashMap, fs::read_to_string, path::Path};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::utils::parse_number;

pub const UNKNOWN_CITY_NAME: &str = "Unknown";

const LIST_KEYS: [&str; 3] = ["List", "list", "cities"];
const ID_KEYS: [&str; 3] = ["CityCode", "id", "cityId"];
const NAME_KEYS: [&str; 2] = ["CityName", "name"];
const STATUS_KEYS: [&str; 2] = ["Status", "status"];
const TEMP_KEYS: [&str; 2] = ["Temp", "temp"];

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Malformed catalog: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Catalog does not contain an array of cities")]
    Shape,
}

#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub id: String,
    pub name: String,
    pub baseline_temp_c: Option<f64>,
    pub status: Option<String>,
}

#[derive(Debug, Default)]
pub struct Catalog {
    ids: Vec<String>,
    cities: HashMap<String, City>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let catalog = Self::from_json_str(&raw)?;
        info!("Loaded {} cities from {}", catalog.len(), path.display());

        Ok(catalog)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let document: Value = serde_json::from_str(raw)?;

        let entries = match &document {
            Value::Array(entries) => entries,
            Value::Object(object) => LIST_KEYS
                .iter()
                .find_map(|key| object.get(*key))
                .and_then(Value::as_array)
                .ok_or(CatalogError::Shape)?,
            _ => return Err(CatalogError::Shape),
        };

        let mut catalog = Self::default();

        for entry in entries.iter().filter_map(Value::as_object) {
            let Some(city) = parse_city(entry) else {
                continue;
            };

            if catalog.cities.contains_key(&city.id) {
                warn!("Duplicate city id {} in catalog, keeping the first", city.id);
                continue;
            }

            catalog.ids.push(city.id.clone());
            catalog.cities.insert(city.id.clone(), city);
        }

        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&City> {
        self.cities.get(id)
    }

    /// City ids in catalog order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

fn parse_city(entry: &Map<String, Value>) -> Option<City> {
    let id = ID_KEYS.iter().find_map(|key| id_text(entry.get(*key)?))?;

    let name = first_text(entry, &NAME_KEYS).unwrap_or_else(|| UNKNOWN_CITY_NAME.to_string());
    let status = first_text(entry, &STATUS_KEYS);
    let baseline_temp_c = TEMP_KEYS
        .iter()
        .find_map(|key| entry.get(*key))
        .and_then(parse_number);

    Some(City {
        id,
        name,
        baseline_temp_c,
        status,
    })
}

fn id_text(raw: &Value) -> Option<String> {
    match raw {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn first_text(entry: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| entry.get(*key)?.as_str())
        .find(|text| !text.is_empty())
        .map(str::to_string)
}
