/// Estratégia de roteamento entre provedores de IA
/// Round-robin com awareness de circuit breaker
use crate::breaker::CircuitBreaker;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct RouteStrategy {
    /// Contador atômico para alternar entre os provedores
    skew: AtomicU64,
}

impl Default for RouteStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteStrategy {
    pub fn new() -> Self {
        Self {
            skew: AtomicU64::new(0),
        }
    }

    /// Decide qual provedor tentar primeiro
    ///
    /// # Returns
    /// * `true` se deve tentar `a` primeiro
    /// * `false` se deve tentar `b` primeiro
    pub fn pick_a_first(&self, a: &CircuitBreaker, b: &CircuitBreaker) -> bool {
        let (a_ok, b_ok) = (a.would_admit(), b.would_admit());

        // ========== VERIFICAÇÃO DE CIRCUIT BREAKERS ==========
        if !a_ok && b_ok {
            return false;
        }
        if a_ok && !b_ok {
            return true;
        }

        // ========== ROUND-ROBIN ==========
        self.skew.fetch_add(1, Ordering::Relaxed) % 2 == 0
    }
}
