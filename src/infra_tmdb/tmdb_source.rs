use crate::domain_port::*;
use crate::logger::*;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug)]
pub struct TmdbConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub language: String,
    pub request_timeout: Duration,
}

/// TMDB `movie/popular` as a paginated catalog source. Page tokens are page numbers.
pub struct TmdbCatalogSource {
    client: reqwest::Client,
    cfg: TmdbConfig,
}

#[derive(Debug, Deserialize)]
struct PopularPage {
    page: u32,
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    total_pages: u32,
}

impl TmdbCatalogSource {
    pub fn try_new(cfg: TmdbConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()?;
        Ok(Self { client, cfg })
    }

    fn parse_page_token(token: Option<&PageToken>) -> Result<u32, FetchError> {
        match token {
            None => Ok(1),
            Some(token) => token
                .0
                .parse::<u32>()
                .map_err(|e| FetchError::Permanent(format!("bad page token {token}: {e}"))),
        }
    }
}

/// 429 is a rate limit, 408 and 5xx are worth retrying, anything else will not get better.
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>) -> FetchError {
    match status.as_u16() {
        429 => FetchError::RateLimited { retry_after },
        408 | 500..=599 => FetchError::Transient(format!("upstream status {status}")),
        _ => FetchError::Permanent(format!("upstream status {status}")),
    }
}

fn classify_transport(error: reqwest::Error) -> FetchError {
    if error.is_builder() {
        FetchError::Permanent(error.to_string())
    } else {
        FetchError::Transient(error.to_string())
    }
}

/// `Retry-After` in its delta-seconds form. HTTP-date values are ignored.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Decode a page body. Each record field is read on its own, so a wrongly typed field
/// comes through as `None` and the rest of the record survives. Normalization decides
/// what is still usable.
pub fn decode_page(body: &[u8]) -> Result<SourcePage, FetchError> {
    let page: PopularPage = serde_json::from_slice(body)
        .map_err(|e| FetchError::Permanent(format!("undecodable page body: {e}")))?;

    let records = page.results.iter().map(decode_record).collect();
    let next = (page.page < page.total_pages).then(|| PageToken((page.page + 1).to_string()));

    Ok(SourcePage { records, next })
}

fn decode_record(value: &Value) -> ExternalRecord {
    ExternalRecord {
        id: field(value, "id", Value::as_i64),
        title: text(value, "title"),
        original_title: text(value, "original_title"),
        overview: text(value, "overview"),
        poster_path: text(value, "poster_path"),
        vote_average: field(value, "vote_average", Value::as_f64),
        release_date: text(value, "release_date"),
    }
}

/// Absent and `null` are both `None`. Anything else of the wrong type is `None` too, logged.
fn field<T>(value: &Value, name: &str, read: impl Fn(&Value) -> Option<T>) -> Option<T> {
    match value.get(name) {
        None | Some(Value::Null) => None,
        Some(raw) => {
            let decoded = read(raw);
            if decoded.is_none() {
                debug!("record field {} has an unexpected type: {}", name, raw);
            }
            decoded
        }
    }
}

fn text(value: &Value, name: &str) -> Option<String> {
    field(value, name, |raw| raw.as_str().map(str::to_owned))
}

#[async_trait::async_trait]
impl CatalogSource for TmdbCatalogSource {
    async fn fetch_page(&self, token: Option<&PageToken>) -> Result<SourcePage, FetchError> {
        let page = Self::parse_page_token(token)?;
        let url = format!("{}/movie/popular", self.cfg.base_url.trim_end_matches('/'));
        let page_param = page.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("api_key", self.cfg.api_key.expose_secret()),
                ("language", self.cfg.language.as_str()),
                ("page", page_param.as_str()),
            ])
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, retry_after(response.headers())));
        }

        let body = response.bytes().await.map_err(classify_transport)?;
        trace!(page, bytes = body.len(), "tmdb page received");
        decode_page(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn statuses_map_to_retry_classes() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(2))),
            FetchError::RateLimited {
                retry_after: Some(Duration::from_secs(2))
            }
        );
        assert!(classify_status(StatusCode::BAD_GATEWAY, None).is_retryable());
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT, None).is_retryable());
        assert!(!classify_status(StatusCode::UNAUTHORIZED, None).is_retryable());
        assert!(!classify_status(StatusCode::NOT_FOUND, None).is_retryable());
    }

    #[test]
    fn retry_after_reads_delta_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn odd_records_do_not_fail_the_page() {
        let body = br#"{
            "page": 2,
            "total_pages": 3,
            "results": [
                {"id": 27205, "title": "Inception", "vote_average": 8.4, "overview": "Dreams"},
                {"id": "not-a-number", "title": "Broken"},
                {"title": "No id"}
            ]
        }"#;
        let page = decode_page(body).unwrap();
        assert_eq!(page.records.len(), 3);
        assert_eq!(page.records[0].id, Some(27205));
        assert_eq!(page.records[1].id, None);
        assert_eq!(page.records[1].title.as_deref(), Some("Broken"));
        assert_eq!(page.records[2].id, None);
        assert_eq!(page.next, Some(PageToken("3".into())));
    }

    #[test]
    fn a_wrongly_typed_field_keeps_the_rest_of_the_record() {
        let body = br#"{
            "page": 1,
            "total_pages": 1,
            "results": [
                {"id": 27205, "title": "Inception", "vote_average": "8.4", "poster_path": null}
            ]
        }"#;
        let page = decode_page(body).unwrap();
        let record = &page.records[0];
        assert_eq!(record.id, Some(27205));
        assert_eq!(record.title.as_deref(), Some("Inception"));
        assert_eq!(record.vote_average, None);
        assert_eq!(record.poster_path, None);
    }

    #[test]
    fn last_page_has_no_next_token() {
        let page = decode_page(br#"{"page": 3, "total_pages": 3, "results": []}"#).unwrap();
        assert_eq!(page.next, None);
        assert!(matches!(decode_page(b"<html>"), Err(FetchError::Permanent(_))));
    }
}
