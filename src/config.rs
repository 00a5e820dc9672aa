/// Configurações do gateway de IA
/// Todas as configurações são carregadas de variáveis de ambiente
/// Valores padrão são fornecidos para desenvolvimento
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use crate::breaker::{CircuitBreakerOptions, saturating_millis};

/// Estrutura principal de configurações da aplicação
#[derive(Clone, Debug)]
pub struct Cfg {
    /// Porta HTTP onde o servidor irá escutar
    pub port: u16,

    /// URL base do provedor de IA primário
    pub upstream_primary: String,

    /// URL base do provedor de fallback (opcional)
    pub upstream_fallback: Option<String>,

    /// Path da API de geração nos provedores
    pub generate_path: String,

    /// Nome do header de autenticação (opcional)
    pub auth_header_name: Option<String>,

    /// Valor do header de autenticação (opcional)
    pub auth_header_value: Option<String>,

    /// Timeout total para requisições HTTP (milissegundos)
    pub request_timeout_ms: u64,

    /// Limite máximo de requisições concorrentes
    pub concurrency_limit: usize,

    /// Falhas na janela que abrem o circuit breaker
    pub cb_failure_threshold: u32,

    /// Sucessos consecutivos em HALF_OPEN que fecham o circuito
    pub cb_success_threshold: u32,

    /// Tempo que o circuit breaker fica aberto (milissegundos)
    pub cb_open_ms: u64,

    /// Janela deslizante de contagem de falhas (milissegundos)
    pub cb_window_ms: u64,
}

impl Cfg {
    /// Carrega configurações de variáveis de ambiente
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Carrega usando uma função de lookup arbitrária (facilita testes)
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            // ========== CONFIGURAÇÃO DO SERVIDOR ==========
            port: get_parsed(&get, "PORT").unwrap_or(9999),

            // ========== PROVEDORES DE IA ==========
            upstream_primary: get("UPSTREAM_PRIMARY_URL").context("UPSTREAM_PRIMARY_URL missing")?, // Obrigatório
            upstream_fallback: get("UPSTREAM_FALLBACK_URL").filter(|s| !s.is_empty()),
            generate_path: get("UPSTREAM_GENERATE_PATH").unwrap_or_else(|| "/v1/generate".into()),

            // ========== AUTENTICAÇÃO ==========
            auth_header_name: get("AUTH_HEADER_NAME"),
            auth_header_value: get("AUTH_HEADER_VALUE"),

            // ========== TIMEOUTS E CONCORRÊNCIA ==========
            request_timeout_ms: get_parsed(&get, "REQUEST_TIMEOUT_MS").unwrap_or(30_000), // IA é lenta
            concurrency_limit: get_parsed(&get, "CONCURRENCY_LIMIT").unwrap_or(256),

            // ========== CIRCUIT BREAKER ==========
            cb_failure_threshold: get_parsed(&get, "CB_FAILURE_THRESHOLD")
                .unwrap_or(CircuitBreakerOptions::DEFAULT_FAILURE_THRESHOLD),
            cb_success_threshold: get_parsed(&get, "CB_SUCCESS_THRESHOLD")
                .unwrap_or(CircuitBreakerOptions::DEFAULT_SUCCESS_THRESHOLD),
            cb_open_ms: get_parsed(&get, "CB_OPEN_MS")
                .unwrap_or(saturating_millis(CircuitBreakerOptions::DEFAULT_TIMEOUT)),
            cb_window_ms: get_parsed(&get, "CB_WINDOW_MS")
                .unwrap_or(saturating_millis(CircuitBreakerOptions::DEFAULT_WINDOW_SIZE)),
        })
    }

    /// Padrões compartilhados por todos os breakers do registro
    pub fn breaker_options(&self) -> CircuitBreakerOptions {
        CircuitBreakerOptions {
            failure_threshold: Some(self.cb_failure_threshold),
            success_threshold: Some(self.cb_success_threshold),
            timeout: Some(Duration::from_millis(self.cb_open_ms)),
            window_size: Some(Duration::from_millis(self.cb_window_ms)),
        }
    }

    /// Retorna cópia da configuração com valores sensíveis mascarados
    /// Útil para logging sem expor secrets
    pub fn redacted(&self) -> Self {
        let mut c = self.clone();
        c.auth_header_value = c.auth_header_value.as_ref().map(|_| "***".into());
        c
    }
}

fn get_parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    get(key).and_then(|s| s.parse().ok())
}
