//! Elasticsearch `_create` sink.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use resilient_log_core::{
    ComponentRegistry, ConfigError, ConfigResult, Delivery, Document, LogEntry, LogTarget,
    TargetOptions, TargetResult,
};

use crate::error::{EsError, EsResult};

/// Kind name used in logger options.
pub const ELASTICSEARCH_TARGET: &str = "elasticsearch";

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 9200;
const DEFAULT_SCHEME: &str = "https";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const RESULT_CREATED: &str = "created";

/// Connection options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElasticsearchOptions {
    pub host: String,
    pub port: u16,
    /// `http` or `https`.
    pub scheme: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub index: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    pub required: bool,
}

impl ElasticsearchOptions {
    /// Options for `index` with every default.
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            scheme: DEFAULT_SCHEME.to_string(),
            username: None,
            password: None,
            index: index.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            required: true,
        }
    }

    /// Reads `es_host`, `es_port`, `es_scheme`, `es_username`,
    /// `es_password`, `es_index` (mandatory), `timeout_secs` and `required`.
    pub fn from_map(options: &Map<String, Value>) -> ConfigResult<Self> {
        let index = optional_string(options, "es_index")?
            .filter(|index| !index.is_empty())
            .ok_or_else(|| ConfigError::MissingOption("es_index".to_string()))?;

        let scheme = optional_string(options, "es_scheme")?
            .unwrap_or_else(|| DEFAULT_SCHEME.to_string())
            .to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(ConfigError::invalid("es_scheme", "'http' or 'https'"));
        }

        let port = match options.get("es_port") {
            None | Some(Value::Null) => DEFAULT_PORT,
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| ConfigError::invalid("es_port", "port number"))?,
            Some(Value::String(s)) => s
                .parse()
                .map_err(|_| ConfigError::invalid("es_port", "port number"))?,
            Some(_) => return Err(ConfigError::invalid("es_port", "port number")),
        };

        let timeout_secs = match options.get("timeout_secs") {
            None | Some(Value::Null) => DEFAULT_TIMEOUT_SECS,
            Some(value) => value
                .as_u64()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigError::invalid("timeout_secs", "positive integer"))?,
        };

        Ok(Self {
            host: optional_string(options, "es_host")?.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            scheme,
            username: optional_string(options, "es_username")?,
            password: optional_string(options, "es_password")?,
            index,
            timeout_secs,
            required: TargetOptions::from_map(options)?.required,
        })
    }

    /// `{scheme}://{host}:{port}/`
    pub fn base_url(&self) -> ConfigResult<Url> {
        Url::parse(&format!("{}://{}:{}/", self.scheme, self.host, self.port))
            .map_err(|e| ConfigError::Component(format!("invalid Elasticsearch host: {}", e)))
    }
}

fn optional_string(options: &Map<String, Value>, key: &str) -> ConfigResult<Option<String>> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ConfigError::invalid(key, "string")),
    }
}

/// Body of a successful index response.
#[derive(Debug, Deserialize)]
struct IndexResponse {
    result: String,
    #[serde(rename = "_id", default)]
    id: Option<String>,
}

/// Writes entries into one Elasticsearch index.
pub struct ElasticsearchTarget {
    /// `elasticsearch:{index}`
    name: String,
    options: ElasticsearchOptions,
    base_url: Url,
    client: Client,
}

impl ElasticsearchTarget {
    /// Create a new target.
    pub fn new(options: ElasticsearchOptions) -> ConfigResult<Self> {
        let base_url = options.base_url()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|e| ConfigError::Component(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: format!("{}:{}", ELASTICSEARCH_TARGET, options.index),
            options,
            base_url,
            client,
        })
    }

    /// Create a target from a descriptor option map.
    pub fn from_map(options: &Map<String, Value>) -> ConfigResult<Self> {
        Self::new(ElasticsearchOptions::from_map(options)?)
    }

    /// Effective options.
    pub fn options(&self) -> &ElasticsearchOptions {
        &self.options
    }

    /// `{base}/{index}/_create/{key}`
    pub fn document_url(&self, key: &str) -> EsResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| EsError::Url(self.base_url.to_string()))?
            .pop_if_empty()
            .extend([self.options.index.as_str(), "_create", key]);
        Ok(url)
    }

    async fn create_document(&self, key: &str, document: &Document) -> EsResult<Delivery> {
        let url = self.document_url(key)?;
        debug!(url = %url, "Creating document");

        let mut request = self.client.put(url).json(document);
        if let Some(username) = &self.options.username {
            request = request.basic_auth(username, self.options.password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();

        // The document id is the content hash, so a conflict means an
        // earlier attempt already stored this document.
        if status == StatusCode::CONFLICT {
            return Ok(Delivery::AlreadyPresent);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EsError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: IndexResponse = response.json().await?;
        if body.result == RESULT_CREATED {
            Ok(Delivery::Created {
                receipt: body.id.unwrap_or_else(|| key.to_string()),
            })
        } else {
            Err(EsError::UnexpectedResult(body.result))
        }
    }
}

#[async_trait]
impl LogTarget for ElasticsearchTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_required(&self) -> bool {
        self.options.required
    }

    async fn submit(&self, entry: &LogEntry) -> TargetResult<Delivery> {
        let key = entry.idempotency_key()?;

        match self.create_document(&key, &entry.document).await {
            Ok(delivery) => {
                debug!(
                    entry_id = %entry.id,
                    index = %self.options.index,
                    key = %key,
                    already_present = matches!(delivery, Delivery::AlreadyPresent),
                    "Entry stored in Elasticsearch"
                );
                Ok(delivery)
            }
            Err(e) => {
                warn!(
                    entry_id = %entry.id,
                    index = %self.options.index,
                    error = %e,
                    "Elasticsearch did not accept entry"
                );
                Ok(Delivery::rejected(e.to_string()))
            }
        }
    }
}

/// Registers the `elasticsearch` target kind.
pub fn register(registry: &mut ComponentRegistry) {
    registry.register_target(ELASTICSEARCH_TARGET, |options| {
        Ok(Arc::new(ElasticsearchTarget::from_map(options)?) as Arc<dyn LogTarget>)
    });
}
