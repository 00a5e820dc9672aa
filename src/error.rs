/// Erros produzidos pelo circuit breaker
/// Separa "circuito aberto" de falhas da própria operação protegida
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

/// Chamada negada sem executar a operação porque o circuito está aberto
#[derive(Debug, Clone, Error)]
#[error("circuit '{breaker}' is open, next attempt in {}ms", millis_until(.next_attempt_at))]
pub struct CircuitOpenError {
    /// Nome do breaker que negou a chamada
    pub breaker: String,
    /// Instante a partir do qual o breaker aceita uma chamada de teste
    pub next_attempt_at: Instant,
}

impl CircuitOpenError {
    /// Tempo restante até a próxima chamada de teste (zero se já passou)
    pub fn retry_after(&self) -> Duration {
        self.next_attempt_at.saturating_duration_since(Instant::now())
    }
}

fn millis_until(at: &Instant) -> u128 {
    at.saturating_duration_since(Instant::now()).as_millis()
}

/// Resultado de falha de `CircuitBreaker::execute`
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// O breaker negou a execução
    #[error(transparent)]
    Open(#[from] CircuitOpenError),

    /// A operação foi executada e falhou; o erro original é preservado
    ///
    /// Só o `Display` de `E` é repassado: `E` não precisa implementar
    /// `std::error::Error`, então `source()` não desce por ele. Para percorrer
    /// a cadeia de causas use `into_operation()` ou faça match na variante.
    #[error("{0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open(_))
    }

    pub fn open_error(&self) -> Option<&CircuitOpenError> {
        match self {
            BreakerError::Open(e) => Some(e),
            BreakerError::Operation(_) => None,
        }
    }

    /// Recupera o erro da operação, se houver
    pub fn into_operation(self) -> Option<E> {
        match self {
            BreakerError::Open(_) => None,
            BreakerError::Operation(e) => Some(e),
        }
    }
}
