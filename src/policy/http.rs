//! reqwest implementation of [`AdServices`]
//!
//! Analytics endpoints (`/pca/...`) live under the analytics base URL; ad
//! generation endpoints under the generation base URL. The price endpoint is
//! taken from the price preferences on every call.
//!
//! Ad generation renders images inside the request, so those calls use their
//! own (much longer) timeout instead of the client-wide lookup timeout.

use super::request::{DynamicAdRequest, PredefinedAdRequest};
use super::services::{AdServices, PriceQuote, RelatedItem, ServiceError};
use crate::config::EngineConfig;
use crate::preferences::PriceSettings;
use crate::queue::FeedId;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::Rng;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ProductRow {
    idproduct: Value,
    #[serde(default)]
    pname: String,
}

#[derive(Debug, Deserialize)]
struct ProbabilityRow {
    label_id: Value,
    #[serde(default)]
    label_class: String,
    #[serde(default)]
    probability: f64,
}

#[derive(Debug, Serialize)]
struct ProbabilityQuery<'a> {
    host: &'a str,
    port: u16,
    topic: &'a str,
    dow: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    hh24: Option<u32>,
}

fn id_text(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Map non-2xx responses to errors; 503 is reported as busy
fn check_status(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status == StatusCode::SERVICE_UNAVAILABLE {
        return Err(ServiceError::Busy);
    }
    if !status.is_success() {
        return Err(ServiceError::Status(status.as_u16()));
    }
    Ok(response)
}

/// Per-request limit for ad generation when none is configured
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct HttpAdServices {
    client: Client,
    pca_base_url: String,
    aig_base_url: String,
    generation_timeout: Duration,
}

impl HttpAdServices {
    pub fn with_base_urls(
        pca_base_url: impl Into<String>,
        aig_base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            pca_base_url: pca_base_url.into().trim_end_matches('/').to_string(),
            aig_base_url: aig_base_url.into().trim_end_matches('/').to_string(),
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
        })
    }

    /// Override the timeout of predefined and dynamic ad requests
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, ServiceError> {
        Ok(Self::with_base_urls(
            config.pca_base_url.clone(),
            config.aig_base_url.clone(),
            config.http_timeout(),
        )?
        .with_generation_timeout(config.generation_timeout()))
    }

    pub fn pca_base_url(&self) -> &str {
        &self.pca_base_url
    }

    pub fn aig_base_url(&self) -> &str {
        &self.aig_base_url
    }

    async fn probability_lookup(
        &self,
        path: &str,
        query: ProbabilityQuery<'_>,
    ) -> Result<Vec<RelatedItem>, ServiceError> {
        let url = format!("{}{}", self.pca_base_url, path);
        let response = check_status(self.client.post(&url).json(&query).send().await?)?;
        let rows: Vec<ProbabilityRow> = response.json().await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = id_text(&row.label_id)?;
                Some(RelatedItem::new(id, row.label_class, row.probability))
            })
            .collect())
    }
}

#[async_trait]
impl AdServices for HttpAdServices {
    async fn cross_sell(&self, label_id: &str) -> Result<Vec<RelatedItem>, ServiceError> {
        let url = format!(
            "{}/pca/prd/assocrules/get_antecedents_for/{}",
            self.pca_base_url, label_id
        );
        let response = check_status(self.client.get(&url).send().await?)?;
        let ids: Vec<Value> = response.json().await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if !ids.iter().all(|id| id.is_i64() || id.is_u64()) {
            return Err(ServiceError::Decode(
                "antecedent ids are not all integers".to_string(),
            ));
        }

        let url = format!("{}/pca/prd/getproduct/", self.pca_base_url);
        let response = check_status(
            self.client
                .post(&url)
                .json(&json!({ "Product_IDs": ids }))
                .send()
                .await?,
        )?;
        let products: Vec<ProductRow> = response.json().await?;

        Ok(products
            .into_iter()
            .filter_map(|row| Some(RelatedItem::new(id_text(&row.idproduct)?, row.pname, 1.0)))
            .collect())
    }

    async fn items_by_day_hour(
        &self,
        feed: &FeedId,
        dow: u32,
        hh24: u32,
    ) -> Result<Vec<RelatedItem>, ServiceError> {
        let query = ProbabilityQuery {
            host: &feed.host,
            port: feed.port,
            topic: &feed.topic,
            dow,
            hh24: Some(hh24),
        };
        self.probability_lookup("/pca/mqtt/probweekhh24/", query).await
    }

    async fn items_by_day(
        &self,
        feed: &FeedId,
        dow: u32,
    ) -> Result<Vec<RelatedItem>, ServiceError> {
        let query = ProbabilityQuery {
            host: &feed.host,
            port: feed.port,
            topic: &feed.topic,
            dow,
            hh24: None,
        };
        self.probability_lookup("/pca/mqtt/probweek/", query).await
    }

    async fn price(
        &self,
        settings: &PriceSettings,
        label_id: &str,
    ) -> Result<PriceQuote, ServiceError> {
        let url = format!("{}/{}", settings.endpoint.trim_end_matches('/'), label_id);
        let response = check_status(self.client.get(&url).send().await?)?;
        let body: Value = response.json().await?;

        let price = match body.get(&settings.pricetag) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| ServiceError::Decode(format!("missing '{}' in price", settings.pricetag)))?;

        let unit = match body.get(&settings.unittag) {
            Some(Value::String(s)) => s.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => {
                return Err(ServiceError::Decode(format!(
                    "missing '{}' in price",
                    settings.unittag
                )))
            }
        };

        let promotional_text = body
            .get("promotional_text")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Ok(PriceQuote {
            price,
            unit,
            promotional_text,
        })
    }

    async fn predefined_ads(
        &self,
        service_path: &str,
        request: &PredefinedAdRequest,
    ) -> Result<Vec<String>, ServiceError> {
        let url = format!("{}{}", self.aig_base_url, service_path);
        let response = self
            .client
            .post(&url)
            .timeout(self.generation_timeout)
            .json(request)
            .send()
            .await?;
        let items: Vec<Value> = check_status(response)?.json().await?;

        Ok(items
            .iter()
            .filter_map(|item| item.get("imgb64")?.as_str())
            .filter(|img| !img.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn dynamic_ad(
        &self,
        service_path: &str,
        request: &DynamicAdRequest,
    ) -> Result<String, ServiceError> {
        let url = format!("{}{}", self.aig_base_url, service_path);
        let response = self
            .client
            .post(&url)
            .timeout(self.generation_timeout)
            .json(request)
            .send()
            .await?;
        let bytes = check_status(response)?.bytes().await?;
        if bytes.is_empty() {
            return Err(ServiceError::Decode("empty image body".to_string()));
        }
        Ok(STANDARD.encode(&bytes))
    }
}

/// Health check: `GET {base}{path}/{n}` must echo `{"status": "ok", "id": n}`
pub async fn probe_service(
    client: &Client,
    base_url: &str,
    path: &str,
) -> Result<(), ServiceError> {
    let id: u32 = rand::thread_rng().gen_range(1..=1_000_000);
    let url = format!("{}{}/{}", base_url.trim_end_matches('/'), path, id);

    let response = check_status(client.get(&url).send().await?)?;
    let body: Value = response.json().await?;

    let status_ok = body.get("status").and_then(Value::as_str) == Some("ok");
    let id_matches = body.get("id").and_then(Value::as_u64) == Some(u64::from(id));
    if status_ok && id_matches {
        Ok(())
    } else {
        Err(ServiceError::Decode(format!("unexpected health reply: {}", body)))
    }
}

impl HttpAdServices {
    /// Probe both collaborators and log the outcome. Never fails.
    pub async fn probe_all(&self) -> (bool, bool) {
        let pca = probe_service(&self.client, &self.pca_base_url, "/pca/hstatus").await;
        let aig = probe_service(&self.client, &self.aig_base_url, "/aig/hstatus").await;

        match &pca {
            Ok(()) => log::info!("✅ Analytics service reachable at {}", self.pca_base_url),
            Err(e) => log::warn!(
                "⚠️  Analytics service at {} not healthy: {}",
                self.pca_base_url,
                e
            ),
        }
        match &aig {
            Ok(()) => log::info!("✅ Generation service reachable at {}", self.aig_base_url),
            Err(e) => log::warn!(
                "⚠️  Generation service at {} not healthy: {}",
                self.aig_base_url,
                e
            ),
        }
        (pca.is_ok(), aig.is_ok())
    }
}
