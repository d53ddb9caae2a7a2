//! HTTP access to the archive's REST API and website.
//!
//! [`ArchiveClient`] is a thin, cheaply cloneable wrapper over a shared
//! `reqwest` client. It knows the archive's endpoints and response
//! envelopes and nothing about pagination, validation, or files; those
//! live in the search, vocabulary, and downloader modules.

use std::collections::BTreeMap;

use serde::Deserialize;
use url::Url;

use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};
use crate::types::{NeuronId, NeuronRecord};

/// User agent advertised on every request.
const USER_AGENT: &str = concat!("neuromorpho-dl/", env!("CARGO_PKG_VERSION"));

/// One result page from the select endpoint.
#[derive(Clone, Debug)]
pub struct SelectPage {
    /// Total matching records across all pages, as reported by this page
    pub total: u64,
    /// Records carried by this page, in archive order
    pub records: Vec<NeuronRecord>,
}

/// Client for the archive's API and website endpoints.
#[derive(Clone)]
pub struct ArchiveClient {
    http: reqwest::Client,
    api_base: Url,
    site_base: Url,
    retry: RetryConfig,
}

impl ArchiveClient {
    /// Builds a client from `config`. Fails if a base URL does not parse
    /// or the underlying HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self> {
        let api_base = parse_base(&config.api_base_url, "api_base_url")?;
        let site_base = parse_base(&config.site_base_url, "site_base_url")?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            api_base,
            site_base,
            retry: config.retry.clone(),
        })
    }

    /// Retry settings shared by everything that fetches through this client.
    pub(crate) fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Base URL of the archive website.
    pub(crate) fn site_base(&self) -> &Url {
        &self.site_base
    }

    /// Asks the archive's health endpoint for its status string.
    ///
    /// A healthy archive answers `"UP"`. Callers decide what any other
    /// answer means for them.
    pub async fn health(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct HealthResponse {
            status: String,
        }

        let url = self.api_base.join("health")?;
        let response = check_status(self.http.get(url).send().await?)?;
        let health: HealthResponse = response.json().await?;
        Ok(health.status)
    }

    /// Fetches the archive's list of queryable field names.
    pub async fn remote_fields(&self) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct FieldsResponse {
            #[serde(rename = "Neuron Fields")]
            neuron_fields: Vec<String>,
        }

        let url = self.api_base.join("neuron/fields")?;
        let response = check_status(self.http.get(url).send().await?)?;
        let fields: FieldsResponse = response.json().await?;
        Ok(fields.neuron_fields)
    }

    /// Fetches the accepted values for one queryable field.
    ///
    /// The archive reports some value lists as numbers; everything is
    /// flattened to strings here so validation can compare uniformly.
    pub async fn field_values(&self, field: &str) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct FieldValuesResponse {
            fields: Vec<serde_json::Value>,
        }

        let url = self.api_base.join(&format!("neuron/fields/{field}"))?;
        let response = check_status(self.http.get(url).send().await?)?;
        let values: FieldValuesResponse = response.json().await?;
        Ok(values.fields.iter().map(json_value_to_string).collect())
    }

    /// Fetches one page of search results.
    ///
    /// `q` is the rendered filter expression; `None` asks for the whole
    /// archive. Records the archive serves without an id or name are
    /// dropped with a warning rather than failing the page.
    pub(crate) async fn select_page(
        &self,
        q: Option<&str>,
        page: u32,
        size: u32,
    ) -> Result<SelectPage> {
        #[derive(Deserialize)]
        struct SelectResponse {
            #[serde(rename = "_embedded", default)]
            embedded: Option<Embedded>,
            page: PageInfo,
        }

        #[derive(Deserialize)]
        struct Embedded {
            #[serde(rename = "neuronResources", default)]
            neuron_resources: Vec<serde_json::Value>,
        }

        #[derive(Deserialize)]
        struct PageInfo {
            #[serde(rename = "totalElements")]
            total_elements: u64,
        }

        let url = self.api_base.join("neuron/select")?;
        let mut request = self
            .http
            .get(url)
            .query(&[("page", page.to_string()), ("size", size.to_string())]);
        if let Some(q) = q {
            request = request.query(&[("q", q)]);
        }

        let response = check_status(request.send().await?)?;
        let select: SelectResponse = response.json().await?;

        let raw = select
            .embedded
            .map(|e| e.neuron_resources)
            .unwrap_or_default();
        let mut records = Vec::with_capacity(raw.len());
        for value in &raw {
            match record_from_value(value) {
                Some(record) => records.push(record),
                None => {
                    tracing::warn!(page, "Dropping result record without id or name");
                }
            }
        }

        Ok(SelectPage {
            total: select.page.total_elements,
            records,
        })
    }

    /// Fetches the archive's HTML page for one neuron.
    pub(crate) async fn neuron_page(&self, name: &str) -> Result<String> {
        let mut url = self.site_base.join("neuron_info.jsp")?;
        url.query_pairs_mut().append_pair("neuron_name", name);
        let response = check_status(self.http.get(url).send().await?)?;
        Ok(response.text().await?)
    }

    /// Fetches an arbitrary archive URL as text (morphology files).
    pub(crate) async fn fetch_text(&self, url: &Url) -> Result<String> {
        let response = check_status(self.http.get(url.clone()).send().await?)?;
        Ok(response.text().await?)
    }
}

/// Maps non-success statuses to the archive's documented meanings.
fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if !status.is_success() {
        return Err(Error::remote_status(status.as_u16()));
    }
    Ok(response)
}

/// Parses a base URL and normalizes its path to end in `/` so that
/// relative joins append instead of replacing the last segment.
fn parse_base(raw: &str, key: &'static str) -> Result<Url> {
    let mut url = Url::parse(raw).map_err(|e| Error::Config {
        key,
        message: e.to_string(),
    })?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Converts one wire record into a [`NeuronRecord`], or `None` when the
/// identifying fields are missing or mistyped.
fn record_from_value(value: &serde_json::Value) -> Option<NeuronRecord> {
    let object = value.as_object()?;
    let id = object.get("neuron_id")?.as_i64()?;
    let name = object.get("neuron_name")?.as_str()?.to_string();

    let mut metadata = BTreeMap::new();
    for (key, value) in object {
        if key == "neuron_id" || key == "neuron_name" || key == "_links" {
            continue;
        }
        metadata.insert(key.clone(), json_value_to_string(value));
    }

    Some(NeuronRecord {
        id: NeuronId::new(id),
        name,
        metadata,
    })
}

/// Flattens a JSON value to the string form used in metadata exports.
/// Lists keep their bracketed shape so the export cleaning rules can
/// normalize them.
fn json_value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(json_value_to_string).collect();
            format!("[{}]", parts.join(", "))
        }
        serde_json::Value::Object(_) => value.to_string(),
    }
}
