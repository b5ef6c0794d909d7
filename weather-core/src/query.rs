use std::fmt;

use crate::{api_key::ApiKey, directory::LocationDirectory};

/// Unit system sent with every request.
pub const UNITS: &str = "imperial";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Present conditions.
    Current,
    /// 5-day / 3-hour forecast.
    Forecast,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Current => "current",
            QueryKind::Forecast => "forecast",
        }
    }

    /// Path of the endpoint below the provider base URL.
    pub fn endpoint(&self) -> &'static str {
        match self {
            QueryKind::Current => "weather",
            QueryKind::Forecast => "forecast",
        }
    }

    pub fn url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.endpoint())
    }

    pub const fn all() -> &'static [QueryKind] {
        &[QueryKind::Current, QueryKind::Forecast]
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the provider is asked about. Exactly one of the two forms is ever used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    ProviderId(u64),
    FreeText(String),
}

/// Outbound request parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub app_key: ApiKey,
    pub units: &'static str,
    pub target: Target,
}

impl Query {
    pub fn provider_id(&self) -> Option<u64> {
        match self.target {
            Target::ProviderId(id) => Some(id),
            Target::FreeText(_) => None,
        }
    }

    pub fn free_text_name(&self) -> Option<&str> {
        match &self.target {
            Target::FreeText(name) => Some(name),
            Target::ProviderId(_) => None,
        }
    }

    /// Query-string parameters in the form OpenWeather expects.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let target = match &self.target {
            Target::ProviderId(id) => ("id", id.to_string()),
            Target::FreeText(name) => ("q", name.clone()),
        };

        vec![
            target,
            ("appid", self.app_key.as_str().to_string()),
            ("units", self.units.to_string()),
        ]
    }
}

/// Turns a user-supplied location into a [`Query`].
///
/// Resolution order:
/// 1. all-digit tokens are used as provider ids directly;
/// 2. names registered in the [`LocationDirectory`] use their stored id;
/// 3. anything else goes to the provider verbatim for geocoding.
#[derive(Debug, Clone, Copy)]
pub struct QueryResolver<'a> {
    directory: &'a LocationDirectory,
}

impl<'a> QueryResolver<'a> {
    pub fn new(directory: &'a LocationDirectory) -> Self {
        Self { directory }
    }

    pub fn build(&self, location: &str, api_key: &ApiKey) -> Query {
        Query { app_key: api_key.clone(), units: UNITS, target: self.resolve(location) }
    }

    fn resolve(&self, location: &str) -> Target {
        if let Some(id) = parse_provider_id(location) {
            return Target::ProviderId(id);
        }

        match self.directory.lookup(location) {
            Some(entry) => Target::ProviderId(entry.provider_id),
            None => Target::FreeText(location.to_string()),
        }
    }
}

fn parse_provider_id(token: &str) -> Option<u64> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}
