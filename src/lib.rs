//! Circuit breaker para chamadas a provedores de IA instáveis, com o
//! registro de breakers e o cliente usados pelo gateway `scribe-guard`.

pub mod breaker;
pub mod config;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod strategy;
pub mod upstream;

pub use breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerOptions, CircuitState, CircuitStats,
    create_circuit_breaker,
};
pub use error::{BreakerError, CircuitOpenError};
pub use registry::BreakerRegistry;
