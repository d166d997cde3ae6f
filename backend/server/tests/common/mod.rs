#![allow(dead_code)]

use std::{collections::HashMap, io::Write};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode, get_current_timestamp};
use serde_json::{Value, json};
use server::{config::Config, state::AppState};
use tempfile::NamedTempFile;
use tokio::net::TcpListener;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const KID: &str = "test-key";
pub const DOMAIN: &str = "tenant.test";
pub const AUDIENCE: &str = "https://weather-api";
pub const SINGLE_CITY: &str =
    r#"[{"CityCode":"1","CityName":"X","Temp":"20","Status":"Clear"}]"#;

pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
    _catalog: NamedTempFile,
}

impl TestServer {
    pub async fn get(&self, route: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{route}", self.base_url))
            .send()
            .await
            .unwrap()
    }

    pub async fn get_with_auth(&self, route: &str, authorization: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{route}", self.base_url))
            .header("Authorization", authorization)
            .send()
            .await
            .unwrap()
    }
}

pub fn owned(vars: &[(&str, &str)]) -> HashMap<String, String> {
    vars.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn config(catalog: &NamedTempFile, mut vars: HashMap<String, String>) -> Config {
    vars.insert(
        "CITIES_PATH".to_string(),
        catalog.path().display().to_string(),
    );

    Config::from_vars(|key| vars.get(key).cloned()).unwrap()
}

pub fn catalog_file(raw: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(raw.as_bytes()).unwrap();
    file
}

pub async fn spawn(catalog: &str, vars: &[(&str, &str)]) -> TestServer {
    spawn_with(catalog, owned(vars)).await
}

pub async fn spawn_with(catalog: &str, vars: HashMap<String, String>) -> TestServer {
    let catalog = catalog_file(catalog);
    let state = AppState::new(config(&catalog, vars)).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, server::app(state)).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{address}"),
        client: reqwest::Client::new(),
        _catalog: catalog,
    }
}

/// Server in provider mode backed by `jwks`, plus any extra variables.
pub async fn spawn_provider(jwks: &MockServer, extra: &[(&str, &str)]) -> TestServer {
    let mut vars = owned(extra);
    vars.insert("AUTH0_DOMAIN".to_string(), DOMAIN.to_string());
    vars.insert("AUTH0_AUDIENCE".to_string(), AUDIENCE.to_string());
    vars.insert(
        "AUTH0_JWKS_URI".to_string(),
        format!("{}/.well-known/jwks.json", jwks.uri()),
    );

    spawn_with(SINGLE_CITY, vars).await
}

/// Identity provider stand-in serving the test signing key.
pub async fn jwks_server(expected_fetches: u64) -> MockServer {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("../fixtures/jwks.json")),
        )
        .expect(expected_fetches)
        .mount(&mock_server)
        .await;

    mock_server
}

pub fn claims(extra: Value) -> Value {
    let mut claims = json!({
        "sub": "auth0|1234",
        "email": "someone@example.com",
        "iss": format!("https://{DOMAIN}/"),
        "aud": AUDIENCE,
        "iat": get_current_timestamp(),
        "exp": get_current_timestamp() + 3600,
    });

    if let (Some(claims), Value::Object(extra)) = (claims.as_object_mut(), extra) {
        claims.extend(extra);
    }

    claims
}

pub fn sign(claims: &Value, kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());

    sign_with_header(claims, &header)
}

pub fn sign_without_kid(claims: &Value) -> String {
    sign_with_header(claims, &Header::new(Algorithm::RS256))
}

fn sign_with_header(claims: &Value, header: &Header) -> String {
    let key = EncodingKey::from_rsa_pem(include_bytes!("../fixtures/jwt_signing_key.pem")).unwrap();

    encode(header, claims, &key).unwrap()
}
