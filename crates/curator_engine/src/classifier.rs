use std::time::Duration;

use curator_core::{FailureKind, Verdict};
use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::{ClassifyError, ClassifyRequest, ClassifyResponse, WireDecision};

/// Transport to a classification service.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, request: &ClassifyRequest) -> Result<ClassifyResponse, ClassifyError>;
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub endpoint: Url,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub bearer_token: Option<String>,
}

impl ClassifierSettings {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            bearer_token: None,
        }
    }
}

/// JSON-over-HTTP classifier: `POST <endpoint>` with a [`ClassifyRequest`].
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    settings: ClassifierSettings,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(settings: ClassifierSettings) -> Result<Self, ClassifyError> {
        if !matches!(settings.endpoint.scheme(), "http" | "https") {
            return Err(ClassifyError::new(
                FailureKind::ServiceError,
                format!("unsupported endpoint scheme {}", settings.endpoint.scheme()),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ClassifyError::new(FailureKind::ServiceError, err.to_string()))?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }
}

#[async_trait::async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, request: &ClassifyRequest) -> Result<ClassifyResponse, ClassifyError> {
        let body = serde_json::to_vec(request)
            .map_err(|err| ClassifyError::new(FailureKind::MalformedResponse, err.to_string()))?;

        let mut builder = self
            .client
            .post(self.settings.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = self.settings.bearer_token.as_deref() {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClassifyError::new(
                FailureKind::ServiceError,
                format!("status {}", status.as_u16()),
            ));
        }

        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        serde_json::from_slice(&bytes)
            .map_err(|err| ClassifyError::new(FailureKind::MalformedResponse, err.to_string()))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ClassifyError {
    if err.is_timeout() {
        ClassifyError::new(FailureKind::Timeout, err.to_string())
    } else {
        ClassifyError::new(FailureKind::ServiceError, err.to_string())
    }
}

/// Offline classifier: denies items whose title or metadata contains one of
/// the active filters, case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier {
    delay: Duration,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated service latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait::async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, request: &ClassifyRequest) -> Result<ClassifyResponse, ClassifyError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let filters: Vec<String> = request
            .active_filters
            .iter()
            .map(|f| f.trim().to_lowercase())
            .filter(|f| !f.is_empty())
            .collect();

        let decisions = request
            .items
            .iter()
            .map(|item| {
                let hit = std::iter::once(&item.title)
                    .chain(item.metadata.values())
                    .map(|text| text.to_lowercase())
                    .any(|text| filters.iter().any(|f| text.contains(f.as_str())));
                WireDecision {
                    id: item.id.clone(),
                    verdict: if hit { Verdict::Deny } else { Verdict::Allow },
                }
            })
            .collect();
        Ok(ClassifyResponse { decisions })
    }
}
