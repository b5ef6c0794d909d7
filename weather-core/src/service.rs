//! Cache-first access to OpenWeather.

use chrono::Duration;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    api_key::ApiKey,
    cache::{ResponseCache, cache_ttl},
    clock::{Clock, SystemClock},
    config::Config,
    directory::LocationDirectory,
    error::{Result, WeatherError},
    http::{HttpFetcher, RawResponse, ReqwestFetcher, truncate_body},
    query::{QueryKind, QueryResolver},
};

/// Serves cached responses while they are fresh and goes to the network otherwise.
#[derive(Debug)]
pub struct WeatherService {
    cache: ResponseCache,
    directory: LocationDirectory,
    http: Box<dyn HttpFetcher>,
    clock: Box<dyn Clock>,
    base_url: String,
    ttl: Duration,
}

impl WeatherService {
    pub fn new(
        cache: ResponseCache,
        directory: LocationDirectory,
        http: Box<dyn HttpFetcher>,
        clock: Box<dyn Clock>,
        base_url: impl Into<String>,
    ) -> Self {
        Self { cache, directory, http, clock, base_url: base_url.into(), ttl: cache_ttl() }
    }

    /// Production wiring: on-disk stores from `config`, reqwest, system clock.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let directory = LocationDirectory::load(config.directory_path()?)?;
        let cache = ResponseCache::new(config.cache_dir()?);

        Ok(Self::new(
            cache,
            directory,
            Box::new(ReqwestFetcher::new()?),
            Box::new(SystemClock),
            config.base_url(),
        ))
    }

    pub fn directory(&self) -> &LocationDirectory {
        &self.directory
    }

    pub fn directory_mut(&mut self) -> &mut LocationDirectory {
        &mut self.directory
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Payload for `location`, from the cache when fresh, else from OpenWeather.
    ///
    /// A successful network response replaces the cached one. Failures leave the
    /// cache untouched.
    pub async fn fetch(&self, location: &str, kind: QueryKind, api_key: &ApiKey) -> Result<Value> {
        let now = self.clock.now();

        match self.cache.get(location, kind)? {
            Some(entry) if entry.is_fresh(now, self.ttl) => {
                info!(
                    location,
                    %kind,
                    age_secs = entry.age(now).num_seconds(),
                    "Using cached response"
                );
                return Ok(entry.payload);
            }
            Some(entry) => {
                debug!(location, %kind, fetched_at = %entry.fetched_at, "Cached response is stale");
            }
            None => {}
        }

        let query = QueryResolver::new(&self.directory).build(location, api_key);
        let url = kind.url(&self.base_url);

        info!(location, %kind, id = ?query.provider_id(), "Requesting {url}");

        let res = self.http.fetch(&url, &query.params()).await?;

        let checked = decode(&res).and_then(|payload| {
            check_status(&payload, res.status)?;
            Ok(payload)
        });
        let payload = match checked {
            Ok(payload) => payload,
            Err(e) => {
                warn!(location, %kind, status = res.status, error = %e, "Request failed");
                return Err(e);
            }
        };

        // Stored as received; `put` only re-parses to validate.
        self.cache.put(location, kind, &res.body, now)?;
        Ok(payload)
    }

    /// Drop the cached response for `location`. Returns whether one existed.
    pub fn clear(&self, location: &str, kind: QueryKind) -> Result<bool> {
        self.cache.invalidate(location, kind)
    }

    /// Age of the cached response, if there is one.
    pub fn cache_age(&self, location: &str, kind: QueryKind) -> Result<Option<Duration>> {
        let now = self.clock.now();
        Ok(self.cache.get(location, kind)?.map(|entry| entry.age(now)))
    }
}

/// Parse the body. A non-JSON body on an error status is the provider's
/// failure, not a decoding problem.
fn decode(res: &RawResponse) -> Result<Value> {
    match serde_json::from_str(&res.body) {
        Ok(payload) => Ok(payload),
        Err(_) if !res.is_success() => Err(WeatherError::Upstream {
            code: res.status,
            message: truncate_body(&res.body),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Inspect the `cod` field OpenWeather puts in its bodies. It is a number on
/// some endpoints and a string on others. Without `cod` the HTTP status
/// decides: only 2xx is a success.
pub fn check_status(payload: &Value, http_status: u16) -> Result<()> {
    let code = match payload.get("cod") {
        None | Some(Value::Null) if (200..300).contains(&http_status) => return Ok(()),
        None | Some(Value::Null) => Some(http_status),
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse::<u16>().ok(),
        Some(_) => None,
    };

    if code == Some(200) {
        return Ok(());
    }

    let message = match payload.get("message").or_else(|| payload.get("error")) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "no message".to_string(),
    };

    Err(WeatherError::Upstream { code: code.unwrap_or(0), message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::CacheKey, clock::ManualClock};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use std::{
        fs,
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };
    use tempfile::{TempDir, tempdir};

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    #[derive(Debug, Default)]
    struct Recorded {
        calls: AtomicUsize,
        requests: Mutex<Vec<(String, Vec<(&'static str, String)>)>>,
    }

    /// Replies with queued responses in order, repeating the last one.
    #[derive(Debug)]
    struct FakeHttp {
        replies: Mutex<Vec<Result<RawResponse>>>,
        recorded: Arc<Recorded>,
    }

    impl FakeHttp {
        fn new(replies: Vec<Result<RawResponse>>) -> (Self, Arc<Recorded>) {
            let recorded = Arc::new(Recorded::default());
            (Self { replies: Mutex::new(replies), recorded: Arc::clone(&recorded) }, recorded)
        }
    }

    #[async_trait]
    impl HttpFetcher for FakeHttp {
        async fn fetch(
            &self,
            url: &str,
            params: &[(&'static str, String)],
        ) -> Result<RawResponse> {
            self.recorded.calls.fetch_add(1, Ordering::SeqCst);
            self.recorded.requests.lock().unwrap().push((url.to_string(), params.to_vec()));

            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.remove(0)
            } else {
                match &replies[0] {
                    Ok(res) => Ok(res.clone()),
                    Err(_) => Err(WeatherError::Transport("connection refused".into())),
                }
            }
        }
    }

    fn ok(body: Value) -> Result<RawResponse> {
        Ok(RawResponse::new(200, body.to_string()))
    }

    fn reply(status: u16, body: &str) -> Result<RawResponse> {
        Ok(RawResponse::new(status, body))
    }

    struct Harness {
        _tmp: TempDir,
        service: WeatherService,
        recorded: Arc<Recorded>,
        clock: Arc<ManualClock>,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn harness(replies: Vec<Result<RawResponse>>) -> Harness {
        let tmp = tempdir().unwrap();
        let mut directory = LocationDirectory::empty(tmp.path().join("cities.json"));
        directory.upsert("London", 2643743, Some("Europe/London"));

        let (http, recorded) = FakeHttp::new(replies);
        let clock = Arc::new(ManualClock::new(t0()));

        let service = WeatherService::new(
            ResponseCache::new(tmp.path().join("cache")),
            directory,
            Box::new(http),
            Box::new(Arc::clone(&clock)),
            "https://example.test/data/2.5",
        );

        Harness { _tmp: tmp, service, recorded, clock }
    }

    fn key() -> ApiKey {
        ApiKey::parse(KEY).unwrap()
    }

    #[tokio::test]
    async fn second_fetch_within_ttl_is_served_from_cache() {
        let h = harness(vec![ok(json!({"cod": 200, "name": "London"}))]);
        let path = h.service.cache().path_for(&CacheKey::new("london", QueryKind::Current));

        let first = h.service.fetch("london", QueryKind::Current, &key()).await.unwrap();
        let written = fs::read(&path).unwrap();
        let stamped = fs::metadata(&path).unwrap().modified().unwrap();

        h.clock.advance(Duration::seconds(600));
        let second = h.service.fetch("LONDON", QueryKind::Current, &key()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.recorded.calls.load(Ordering::SeqCst), 1);
        // A hit must not rewrite the file or refresh its timestamp.
        assert_eq!(fs::read(&path).unwrap(), written);
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), stamped);
    }

    #[tokio::test]
    async fn response_body_is_cached_verbatim() {
        let body = r#"{"name":"London","cod":200,"main":{"temp":55.40}}"#;
        let h = harness(vec![reply(200, body)]);

        let payload = h.service.fetch("london", QueryKind::Current, &key()).await.unwrap();
        assert_eq!(payload["main"]["temp"], 55.4);

        let entry = h.service.cache().get("london", QueryKind::Current).unwrap().unwrap();
        assert_eq!(entry.raw, body);
    }

    #[tokio::test]
    async fn stale_entry_is_refetched_and_overwritten() {
        let h = harness(vec![
            ok(json!({"cod": 200, "main": {"temp": 50.0}})),
            ok(json!({"cod": 200, "main": {"temp": 61.0}})),
        ]);

        h.service.fetch("london", QueryKind::Current, &key()).await.unwrap();
        h.clock.advance(Duration::seconds(601));
        let refreshed = h.service.fetch("london", QueryKind::Current, &key()).await.unwrap();

        assert_eq!(refreshed["main"]["temp"], 61.0);
        assert_eq!(h.recorded.calls.load(Ordering::SeqCst), 2);

        let entry = h.service.cache().get("london", QueryKind::Current).unwrap().unwrap();
        assert_eq!(entry.payload, refreshed);
        assert_eq!(entry.fetched_at, t0() + Duration::seconds(601));
    }

    #[tokio::test]
    async fn registered_city_is_requested_by_id_and_cached_by_name() {
        let h = harness(vec![ok(json!({"cod": "200", "list": []}))]);

        h.service.fetch("london", QueryKind::Forecast, &key()).await.unwrap();

        let requests = h.recorded.requests.lock().unwrap();
        let (url, params) = &requests[0];
        assert_eq!(url, "https://example.test/data/2.5/forecast");
        assert!(params.contains(&("id", "2643743".to_string())));
        assert!(params.contains(&("appid", KEY.to_string())));
        drop(requests);

        // Cached under what was typed, not under the id.
        assert!(h.service.cache().get("London", QueryKind::Forecast).unwrap().is_some());
        assert!(h.service.cache().get("2643743", QueryKind::Forecast).unwrap().is_none());
    }

    #[tokio::test]
    async fn upstream_failure_is_reported_and_not_cached() {
        let h = harness(vec![reply(404, r#"{"cod":"404","message":"city not found"}"#)]);

        let err = h.service.fetch("atlantis", QueryKind::Current, &key()).await.unwrap_err();
        match err {
            WeatherError::Upstream { code, message } => {
                assert_eq!(code, 404);
                assert_eq!(message, "city not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(h.service.cache().get("atlantis", QueryKind::Current).unwrap().is_none());
    }

    #[tokio::test]
    async fn error_status_without_cod_is_upstream_and_not_cached() {
        let h = harness(vec![reply(503, r#"{"error":"service unavailable"}"#)]);

        let err = h.service.fetch("london", QueryKind::Current, &key()).await.unwrap_err();
        match err {
            WeatherError::Upstream { code, message } => {
                assert_eq!(code, 503);
                assert_eq!(message, "service unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(h.service.cache().get("london", QueryKind::Current).unwrap().is_none());
    }

    #[tokio::test]
    async fn non_json_error_body_is_upstream_error() {
        let h = harness(vec![reply(502, "Bad Gateway")]);

        let err = h.service.fetch("london", QueryKind::Current, &key()).await.unwrap_err();
        match err {
            WeatherError::Upstream { code, message } => {
                assert_eq!(code, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(h.service.cache().get("london", QueryKind::Current).unwrap().is_none());
    }

    #[tokio::test]
    async fn non_json_success_body_is_json_error() {
        let h = harness(vec![reply(200, "<html>")]);

        let err = h.service.fetch("london", QueryKind::Current, &key()).await.unwrap_err();
        assert!(matches!(err, WeatherError::Json(_)));
    }

    #[tokio::test]
    async fn transport_failure_leaves_cache_untouched() {
        let h = harness(vec![Err(WeatherError::Transport("boom".into()))]);

        let err = h.service.fetch("paris", QueryKind::Current, &key()).await.unwrap_err();
        assert!(matches!(err, WeatherError::Transport(_)));
        assert!(h.service.cache().get("paris", QueryKind::Current).unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_entry_survives_failed_refresh() {
        let h = harness(vec![
            ok(json!({"cod": 200, "v": 1})),
            reply(500, r#"{"cod":500,"message":"internal error"}"#),
        ]);

        h.service.fetch("london", QueryKind::Current, &key()).await.unwrap();
        h.clock.advance(Duration::seconds(3600));
        assert!(h.service.fetch("london", QueryKind::Current, &key()).await.is_err());

        let entry = h.service.cache().get("london", QueryKind::Current).unwrap().unwrap();
        assert_eq!(entry.payload["v"], 1);
        assert_eq!(entry.fetched_at, t0());
    }

    #[tokio::test]
    async fn clear_forces_a_new_request() {
        let h = harness(vec![ok(json!({"cod": 200}))]);

        h.service.fetch("london", QueryKind::Current, &key()).await.unwrap();
        assert!(h.service.clear("London", QueryKind::Current).unwrap());
        assert!(!h.service.clear("London", QueryKind::Current).unwrap());
        h.service.fetch("london", QueryKind::Current, &key()).await.unwrap();

        assert_eq!(h.recorded.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cache_age_tracks_clock() {
        let h = harness(vec![ok(json!({"cod": 200}))]);

        assert_eq!(h.service.cache_age("london", QueryKind::Current).unwrap(), None);
        h.service.fetch("london", QueryKind::Current, &key()).await.unwrap();
        h.clock.advance(Duration::seconds(42));

        assert_eq!(
            h.service.cache_age("london", QueryKind::Current).unwrap(),
            Some(Duration::seconds(42))
        );
    }

    #[test]
    fn check_status_accepts_string_and_number_200() {
        assert!(check_status(&json!({"cod": 200}), 200).is_ok());
        assert!(check_status(&json!({"cod": "200"}), 200).is_ok());
        assert!(check_status(&json!({"name": "no cod"}), 200).is_ok());
    }

    #[test]
    fn check_status_rejects_other_codes() {
        let body = json!({"cod": 401, "message": "Invalid API key"});
        let err = check_status(&body, 401).unwrap_err();
        assert!(matches!(err, WeatherError::Upstream { code: 401, .. }));

        let err = check_status(&json!({"cod": "abc"}), 200).unwrap_err();
        assert!(matches!(err, WeatherError::Upstream { code: 0, .. }));
    }

    #[test]
    fn check_status_falls_back_to_http_status_without_cod() {
        let err = check_status(&json!({"error": "service unavailable"}), 503).unwrap_err();
        assert!(matches!(err, WeatherError::Upstream { code: 503, .. }));

        let err = check_status(&json!({}), 429).unwrap_err();
        assert!(matches!(err, WeatherError::Upstream { code: 429, .. }));
        assert!(err.to_string().contains("no message"));
    }
}
