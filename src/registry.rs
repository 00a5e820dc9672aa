/// Registro de breakers por recurso protegido
/// Um breaker por nome, criado sob demanda com os padrões compartilhados
use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::breaker::{
    CircuitBreaker, CircuitBreakerOptions, CircuitStats, create_circuit_breaker,
};

pub struct BreakerRegistry {
    defaults: CircuitBreakerOptions,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(defaults: CircuitBreakerOptions) -> Self {
        Self {
            defaults,
            breakers: DashMap::new(),
        }
    }

    /// Retorna o breaker do recurso, criando-o na primeira chamada
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return Arc::clone(existing.value());
        }
        // entry() segura o shard: duas threads nunca criam o mesmo nome
        let entry = self.breakers.entry(name.to_owned()).or_insert_with(|| {
            info!(breaker = name, "circuit breaker registered");
            Arc::new(create_circuit_breaker(name, self.defaults.clone()))
        });
        Arc::clone(entry.value())
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| Arc::clone(b.value()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Estatísticas de todos os breakers, ordenadas por nome
    pub fn snapshot(&self) -> Vec<(String, CircuitStats)> {
        let mut all: Vec<(String, CircuitStats)> = self
            .breakers
            .iter()
            .map(|e| (e.key().clone(), e.value().stats()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Reset manual; `false` se o nome não existe
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }
}
