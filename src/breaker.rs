/// Circuit breaker para chamadas a dependências instáveis (ex.: provedor de IA)
///
/// Máquina de estados:
/// ```text
/// CLOSED    --[falhas na janela >= failure_threshold]--> OPEN
/// OPEN      --[agora >= opened_at + timeout, no próximo execute()]--> HALF_OPEN
/// HALF_OPEN --[success_count >= success_threshold]--> CLOSED
/// HALF_OPEN --[qualquer falha]--> OPEN
/// ```
/// A transição OPEN -> HALF_OPEN é preguiçosa: não existe timer em background.
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{BreakerError, CircuitOpenError};

/// Estado do circuito
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Operação normal, falhas são contabilizadas
    Closed,
    /// Chamadas negadas sem executar a operação
    Open,
    /// Chamadas de teste liberadas para verificar a recuperação
    HalfOpen,
}

impl CircuitState {
    fn gauge_value(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuração imutável do breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Identificador para logs e métricas
    pub name: String,
    /// Falhas dentro da janela que abrem o circuito
    pub failure_threshold: u32,
    /// Sucessos consecutivos em HALF_OPEN que fecham o circuito
    pub success_threshold: u32,
    /// Tempo em OPEN antes de liberar uma chamada de teste
    pub timeout: Duration,
    /// Janela deslizante de contagem de falhas
    pub window_size: Duration,
}

/// Configuração parcial aceita pela factory; campos ausentes usam os padrões
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerOptions {
    pub failure_threshold: Option<u32>,
    pub success_threshold: Option<u32>,
    pub timeout: Option<Duration>,
    pub window_size: Option<Duration>,
}

impl CircuitBreakerOptions {
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
    pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_WINDOW_SIZE: Duration = Duration::from_secs(60);

    /// Completa a configuração com os valores padrão
    pub fn into_config(self, name: impl Into<String>) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            name: name.into(),
            failure_threshold: self
                .failure_threshold
                .unwrap_or(Self::DEFAULT_FAILURE_THRESHOLD),
            success_threshold: self
                .success_threshold
                .unwrap_or(Self::DEFAULT_SUCCESS_THRESHOLD),
            timeout: self.timeout.unwrap_or(Self::DEFAULT_TIMEOUT),
            window_size: self.window_size.unwrap_or(Self::DEFAULT_WINDOW_SIZE),
        }
    }
}

/// Cria um breaker pronto para uso aplicando os padrões da factory
pub fn create_circuit_breaker(
    name: impl Into<String>,
    options: CircuitBreakerOptions,
) -> CircuitBreaker {
    CircuitBreaker::new(options.into_config(name))
}

/// Snapshot somente leitura do breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitStats {
    pub state: CircuitState,
    /// Falhas ainda dentro da janela no momento da leitura
    pub failures: usize,
    /// Sucessos consecutivos em HALF_OPEN
    pub successes: u32,
    pub last_failure: Option<Instant>,
    pub last_success: Option<Instant>,
    pub opened_at: Option<Instant>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_timestamps: VecDeque<Instant>,
    success_count: u32,
    last_failure: Option<Instant>,
    last_success: Option<Instant>,
    opened_at: Option<Instant>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_timestamps: VecDeque::new(),
            success_count: 0,
            last_failure: None,
            last_success: None,
            opened_at: None,
        }
    }

    /// Remove falhas mais antigas que a janela
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(ts) = self.failure_timestamps.front() {
            if now.saturating_duration_since(*ts) > window {
                self.failure_timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Circuit breaker seguro para uso concorrente (compartilhar via `Arc`)
///
/// Todo o bookkeeping acontece sob um `Mutex` que nunca é mantido durante
/// o `await` da operação protegida.
///
/// Em HALF_OPEN não há limite de chamadas de teste simultâneas: toda chamada
/// é admitida, a primeira falha reabre o circuito e `success_threshold`
/// sucessos o fecham.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Maior `timeout` aceito; valores acima (ex.: `Duration::MAX`) significam
    /// "aberto até reset manual" e são limitados a este valor
    pub const MAX_TIMEOUT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

    pub fn new(mut config: CircuitBreakerConfig) -> Self {
        if config.failure_threshold == 0 || config.success_threshold == 0 {
            warn!(breaker = %config.name, "zero threshold treated as 1");
            config.failure_threshold = config.failure_threshold.max(1);
            config.success_threshold = config.success_threshold.max(1);
        }
        if config.timeout > Self::MAX_TIMEOUT {
            debug!(breaker = %config.name, "timeout clamped to {:?}", Self::MAX_TIMEOUT);
            config.timeout = Self::MAX_TIMEOUT;
        }
        metrics::gauge!("circuit_breaker_state", "breaker" => config.name.clone())
            .set(CircuitState::Closed.gauge_value());
        Self {
            config,
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Executa `operation` de acordo com o estado atual
    ///
    /// # Returns
    /// * `Ok(valor)` - operação executada com sucesso
    /// * `Err(BreakerError::Open)` - circuito aberto, operação não executada
    /// * `Err(BreakerError::Operation)` - erro original da operação
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit()?;

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(BreakerError::Operation(e))
            }
        }
    }

    /// Estado atual, sem efeitos colaterais
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// `false` apenas quando OPEN e o timeout ainda não expirou
    ///
    /// Não executa a transição para HALF_OPEN; serve para roteamento.
    pub fn would_admit(&self) -> bool {
        let inner = self.lock();
        match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened_at)) => self
                .reopen_at(opened_at)
                .is_some_and(|next| Instant::now() >= next),
            _ => true,
        }
    }

    pub fn stats(&self) -> CircuitStats {
        let mut inner = self.lock();
        inner.prune(Instant::now(), self.config.window_size);
        CircuitStats {
            state: inner.state,
            failures: inner.failure_timestamps.len(),
            successes: inner.success_count,
            last_failure: inner.last_failure,
            last_success: inner.last_success,
            opened_at: inner.opened_at,
        }
    }

    /// Volta para CLOSED e zera todo o estado mutável
    pub fn reset(&self) {
        let mut inner = self.lock();
        let previous = inner.state;
        *inner = Inner::new();
        drop(inner);

        info!(breaker = %self.config.name, from = %previous, "circuit reset");
        self.publish_state(CircuitState::Closed);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Instante da próxima chamada de teste; `None` se não representável (nunca admite)
    fn reopen_at(&self, opened_at: Instant) -> Option<Instant> {
        opened_at.checked_add(self.config.timeout)
    }

    /// Decide, de forma atômica, se a chamada pode seguir
    fn admit(&self) -> Result<(), CircuitOpenError> {
        let now = Instant::now();
        let mut inner = self.lock();

        if inner.state == CircuitState::Open {
            let opened_at = inner.opened_at.unwrap_or(now);
            let reopen_at = self.reopen_at(opened_at);
            if reopen_at.is_none_or(|next| now < next) {
                let next_attempt_at = reopen_at
                    .or_else(|| now.checked_add(Self::MAX_TIMEOUT))
                    .unwrap_or(now);
                drop(inner);
                debug!(breaker = %self.config.name, "call rejected, circuit open");
                metrics::counter!(
                    "circuit_breaker_calls_total",
                    "breaker" => self.config.name.clone(),
                    "outcome" => "rejected"
                )
                .increment(1);
                return Err(CircuitOpenError {
                    breaker: self.config.name.clone(),
                    next_attempt_at,
                });
            }

            inner.state = CircuitState::HalfOpen;
            inner.success_count = 0;
            drop(inner);
            info!(breaker = %self.config.name, "circuit half-open, admitting trial call");
            self.publish_state(CircuitState::HalfOpen);
        }

        Ok(())
    }

    fn on_success(&self) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.last_success = Some(now);

        let closed = match inner.state {
            CircuitState::Closed => {
                inner.prune(now, self.config.window_size);
                false
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_timestamps.clear();
                    inner.success_count = 0;
                    inner.opened_at = None;
                    true
                } else {
                    false
                }
            }
            // resultado de uma chamada admitida antes de reabrir
            CircuitState::Open => false,
        };
        drop(inner);

        metrics::counter!(
            "circuit_breaker_calls_total",
            "breaker" => self.config.name.clone(),
            "outcome" => "success"
        )
        .increment(1);

        if closed {
            info!(breaker = %self.config.name, "circuit closed, dependency recovered");
            self.publish_state(CircuitState::Closed);
        }
    }

    fn on_failure(&self) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.last_failure = Some(now);

        let opened = match inner.state {
            CircuitState::Closed => {
                inner.failure_timestamps.push_back(now);
                inner.prune(now, self.config.window_size);
                if inner.failure_timestamps.len() >= self.config.failure_threshold as usize {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    Some(inner.failure_timestamps.len())
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                inner.success_count = 0;
                Some(inner.failure_timestamps.len())
            }
            // já reaberto por outra chamada; mantém opened_at
            CircuitState::Open => None,
        };
        drop(inner);

        metrics::counter!(
            "circuit_breaker_calls_total",
            "breaker" => self.config.name.clone(),
            "outcome" => "failure"
        )
        .increment(1);

        if let Some(failures) = opened {
            warn!(
                breaker = %self.config.name,
                failures,
                open_for_ms = saturating_millis(self.config.timeout),
                "circuit opened"
            );
            self.publish_state(CircuitState::Open);
        }
    }

    fn publish_state(&self, to: CircuitState) {
        metrics::counter!(
            "circuit_breaker_transitions_total",
            "breaker" => self.config.name.clone(),
            "to" => to.as_str()
        )
        .increment(1);
        metrics::gauge!("circuit_breaker_state", "breaker" => self.config.name.clone())
            .set(to.gauge_value());
    }
}

/// Milissegundos em `u64`, saturando em vez de truncar
pub fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
