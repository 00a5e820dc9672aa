/// Cliente HTTP para os provedores de IA
/// Implementa connection pooling, timeout e header de credencial
use std::{sync::Arc, time::Duration};

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use crate::config::Cfg;

/// Falha de uma chamada ao provedor (conta como falha no breaker)
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream {name} returned {status}")]
    Status {
        name: String,
        status: http::StatusCode,
    },

    #[error("upstream {name} error: {source}")]
    Transport {
        name: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Cliente de um provedor; clones compartilham o pool HTTP
#[derive(Clone)]
pub struct UpstreamClient {
    /// Nome do provedor, também usado como nome do breaker
    pub name: String,
    url: String,
    auth: Option<(String, String)>,
    http: Arc<Client>,
}

impl UpstreamClient {
    /// Cria novo cliente
    /// # Arguments
    /// * `name` - Nome do provedor ("primary", "fallback")
    /// * `base` - URL base do provedor
    /// * `cfg` - Configurações globais da aplicação
    pub fn new(name: impl Into<String>, base: &str, cfg: &Cfg) -> anyhow::Result<Self> {
        let http = Client::builder()
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_millis(cfg.request_timeout_ms)) // Timeout total da requisição
            .build()?;

        let auth = match (&cfg.auth_header_name, &cfg.auth_header_value) {
            (name, Some(value)) => Some((
                name.clone().unwrap_or_else(|| "Authorization".into()),
                value.clone(),
            )),
            _ => None,
        };

        Ok(Self {
            name: name.into(),
            url: format!("{}{}", base.trim_end_matches('/'), cfg.generate_path),
            auth,
            http: Arc::new(http),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST do payload JSON para o provedor
    ///
    /// Qualquer status fora de 2xx ou erro de rede vira `UpstreamError`
    pub async fn generate(&self, body: &Value) -> Result<Value, UpstreamError> {
        let mut req = self
            .http
            .post(&self.url)
            .json(body)
            .header("X-Request-Id", uuid::Uuid::new_v4().to_string());
        if let Some((name, value)) = &self.auth {
            req = req.header(name.as_str(), value.as_str());
        }

        let transport = |source| UpstreamError::Transport {
            name: self.name.clone(),
            source,
        };

        let resp = req.send().await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                name: self.name.clone(),
                status,
            });
        }
        resp.json::<Value>().await.map_err(transport)
    }
}
