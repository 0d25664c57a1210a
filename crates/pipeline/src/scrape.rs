//! Listing scraper adapter.
//!
//! Scraping is delegated to an external actor service; this module only
//! validates URLs, drives the run, and parses the result into
//! [`PropertyData`]. Transient failures retry with exponential backoff.
//! With no token configured the scraper is disabled and a deterministic
//! fixture listing is returned (development and tests).

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{json, Value};

use rv_domain::config::PipelineConfig;
use rv_domain::{Error, Result};
use rv_providers::retry::{classify_reqwest, classify_status, Backoff};

use crate::models::PropertyData;

const ACTOR_ID: &str = "listing~property-scraper";

pub struct ScrapeClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    backoff: Backoff,
}

impl ScrapeClient {
    pub fn from_config(cfg: &PipelineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(classify_reqwest)?;

        let token = std::env::var(&cfg.scraper_token_env).ok().filter(|t| !t.is_empty());
        if token.is_none() {
            tracing::warn!(
                env = %cfg.scraper_token_env,
                "scraper token not set — fixture listings will be served"
            );
        }

        Ok(Self {
            client,
            base_url: cfg.scraper_base_url.trim_end_matches('/').to_string(),
            token,
            backoff: Backoff::new(cfg.max_retries, Duration::from_secs(cfg.retry_base_delay_secs)),
        })
    }

    /// A scraper with no token: every valid URL resolves to the fixture
    /// listing. Used in development and tests.
    pub fn disabled(cfg: &PipelineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(classify_reqwest)?;
        Ok(Self {
            client,
            base_url: cfg.scraper_base_url.trim_end_matches('/').to_string(),
            token: None,
            backoff: Backoff::new(cfg.max_retries, Duration::from_secs(cfg.retry_base_delay_secs)),
        })
    }

    /// Whether a URL points at a listing we can scrape: an idealista.pt
    /// property page (`/imovel/<digits>`).
    pub fn validate_url(url: &str) -> bool {
        let Some(rest) = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))
        else {
            return false;
        };
        let host = rest.split('/').next().unwrap_or("");
        (host == "idealista.pt" || host.ends_with(".idealista.pt"))
            && extract_listing_id(url).is_some()
    }

    /// Fetch and parse the listing. Retries transient failures per the
    /// configured backoff; invalid URLs fail immediately.
    pub async fn scrape(&self, url: &str) -> Result<PropertyData> {
        let listing_id = match extract_listing_id(url) {
            Some(id) if Self::validate_url(url) => id,
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "URL inválido (esperado um anúncio idealista.pt /imovel/...): {url}"
                )));
            }
        };

        let Some(token) = &self.token else {
            return Ok(fixture_listing(url, &listing_id));
        };

        let item = self
            .backoff
            .run("scrape", || self.run_actor(url, token))
            .await?;

        Ok(parse_scraped_item(url, &listing_id, &item))
    }

    async fn run_actor(&self, url: &str, token: &str) -> Result<Value> {
        // Start an actor run.
        let run_url = format!("{}/acts/{ACTOR_ID}/runs", self.base_url);
        let resp = self
            .client
            .post(&run_url)
            .query(&[("token", token)])
            .json(&json!({ "startUrls": [{ "url": url }], "maxItems": 1 }))
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status("scraper", status, &body));
        }
        let run: Value = resp.json().await.map_err(classify_reqwest)?;
        let run_id = run["data"]["id"].as_str().ok_or_else(|| Error::Http(
            "scraper run response missing data.id".into(),
        ))?;

        // Fetch the run's dataset.
        let dataset_url = format!("{}/actor-runs/{run_id}/dataset/items", self.base_url);
        let resp = self
            .client
            .get(&dataset_url)
            .query(&[("token", token)])
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status("scraper", status, &body));
        }
        let items: Vec<Value> = resp.json().await.map_err(classify_reqwest)?;
        items.into_iter().next().ok_or_else(|| {
            Error::NotFound(format!("o anúncio não devolveu dados: {url}"))
        })
    }
}

/// Listing id: the digits after `/imovel/`.
pub fn extract_listing_id(url: &str) -> Option<String> {
    let idx = url.find("/imovel/")?;
    let digits: String = url[idx + "/imovel/".len()..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    (!digits.is_empty()).then_some(digits)
}

/// Parse a raw scraped item. Field names vary across actor versions, so
/// every lookup has alternates.
fn parse_scraped_item(url: &str, listing_id: &str, data: &Value) -> PropertyData {
    let mut image_urls = Vec::new();
    let mut image_tags = BTreeMap::new();
    for key in ["images", "photos", "multimedia", "imageUrls"] {
        if let Some(entries) = data.get(key).and_then(Value::as_array) {
            for entry in entries {
                match entry {
                    Value::String(s) => image_urls.push(s.clone()),
                    Value::Object(obj) => {
                        if let Some(img_url) = obj.get("url").and_then(Value::as_str) {
                            image_urls.push(img_url.to_string());
                            if let Some(tag) = obj.get("tag").and_then(Value::as_str) {
                                image_tags.insert(img_url.to_string(), tag.to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }
            if !image_urls.is_empty() {
                break;
            }
        }
    }

    let price = field_f64(data, &["price", "priceValue"]).unwrap_or(0.0);
    let area_m2 = field_f64(data, &["size", "area"]).unwrap_or(0.0);

    PropertyData {
        url: url.to_string(),
        external_id: Some(listing_id.to_string()),
        title: field_str(data, &["title", "propertyTitle"]).unwrap_or_default(),
        price,
        area_m2,
        num_rooms: field_f64(data, &["rooms", "bedrooms"]).unwrap_or(0.0) as u32,
        num_bathrooms: field_f64(data, &["bathrooms"]).unwrap_or(0.0) as u32,
        location: field_str(data, &["address", "location"]).unwrap_or_default(),
        description: field_str(data, &["description", "propertyComment"]).unwrap_or_default(),
        image_urls,
        image_tags,
        price_per_m2: if area_m2 > 0.0 { price / area_m2 } else { 0.0 },
        raw_data: data.clone(),
    }
}

fn field_str(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| data.get(k).and_then(Value::as_str))
        .map(str::to_string)
}

fn field_f64(data: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| data.get(k).and_then(Value::as_f64))
}

/// Deterministic fixture served when the scraper is disabled. The tags let
/// the classify stage complete without any vision calls.
pub fn fixture_listing(url: &str, listing_id: &str) -> PropertyData {
    let images: Vec<(String, &str)> = vec![
        (format!("https://img.fixture.test/{listing_id}/1.jpg"), "kitchen"),
        (format!("https://img.fixture.test/{listing_id}/2.jpg"), "livingroom"),
        (format!("https://img.fixture.test/{listing_id}/3.jpg"), "bedroom"),
        (format!("https://img.fixture.test/{listing_id}/4.jpg"), "bedroom"),
        (format!("https://img.fixture.test/{listing_id}/5.jpg"), "bathroom"),
    ];

    PropertyData {
        url: url.to_string(),
        external_id: Some(listing_id.to_string()),
        title: format!("Apartamento T2 para venda - {listing_id}"),
        price: 185_000.0,
        area_m2: 75.0,
        num_rooms: 2,
        num_bathrooms: 1,
        location: "Lisboa, Arroios".into(),
        description: "Apartamento T2 com 75m² em prédio de 1960. \
                      Necessita de obras de modernização."
            .into(),
        image_urls: images.iter().map(|(u, _)| u.clone()).collect(),
        image_tags: images.into_iter().map(|(u, t)| (u, t.to_string())).collect(),
        price_per_m2: 185_000.0 / 75.0,
        raw_data: json!({ "fixture": true, "listing_id": listing_id }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validation() {
        assert!(ScrapeClient::validate_url(
            "https://www.idealista.pt/imovel/12345678/"
        ));
        assert!(!ScrapeClient::validate_url("https://www.idealista.pt/arrendar/"));
        assert!(!ScrapeClient::validate_url("https://example.com/imovel/123"));
        assert!(!ScrapeClient::validate_url("not a url"));
    }

    #[test]
    fn listing_id_extraction() {
        assert_eq!(
            extract_listing_id("https://www.idealista.pt/imovel/98765/").as_deref(),
            Some("98765")
        );
        assert_eq!(extract_listing_id("https://www.idealista.pt/"), None);
    }

    #[test]
    fn parse_handles_tagged_image_objects() {
        let raw = json!({
            "title": "T3 em Campo de Ourique",
            "price": 320000,
            "size": 95,
            "rooms": 3,
            "bathrooms": 2,
            "address": "Lisboa, Campo de Ourique",
            "images": [
                { "url": "https://img.test/a.jpg", "tag": "kitchen" },
                "https://img.test/b.jpg"
            ]
        });
        let prop = parse_scraped_item("https://www.idealista.pt/imovel/1/", "1", &raw);
        assert_eq!(prop.image_urls.len(), 2);
        assert_eq!(prop.image_tags.get("https://img.test/a.jpg").map(String::as_str), Some("kitchen"));
        assert!((prop.price_per_m2 - 320000.0 / 95.0).abs() < 1e-9);
    }

    #[test]
    fn fixture_listing_is_fully_tagged() {
        let prop = fixture_listing("https://www.idealista.pt/imovel/42/", "42");
        assert_eq!(prop.image_urls.len(), 5);
        assert_eq!(prop.image_tags.len(), 5);
        assert_eq!(prop.num_rooms, 2);
    }
}
