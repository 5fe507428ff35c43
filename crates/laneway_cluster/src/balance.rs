//! Load balancers.
//!
//! A balancer picks one endpoint from an already filtered candidate list.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::endpoint::Endpoint;
use crate::request::OutboundRequest;

/// Endpoint selection strategy
pub trait LoadBalancer: Send + Sync {
    /// Strategy name
    fn name(&self) -> &str;

    /// Pick one candidate; `None` only when `candidates` is empty
    fn select<'a>(
        &self,
        request: &OutboundRequest,
        candidates: &[&'a Endpoint],
    ) -> Option<&'a Endpoint>;
}

/// Cycles through candidates in order
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    next: AtomicUsize,
}

impl RoundRobinBalancer {
    /// Create a balancer starting at the first candidate
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobinBalancer {
    fn name(&self) -> &str {
        "roundRobin"
    }

    fn select<'a>(
        &self,
        _request: &OutboundRequest,
        candidates: &[&'a Endpoint],
    ) -> Option<&'a Endpoint> {
        if candidates.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[index])
    }
}

/// Weighted random choice
///
/// Endpoints with weight zero are only chosen when every candidate has
/// weight zero.
#[derive(Debug)]
pub struct RandomBalancer {
    rng: Mutex<SmallRng>,
}

impl RandomBalancer {
    /// Balancer seeded from the OS
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(SmallRng::from_entropy()),
        }
    }

    /// Balancer with a fixed seed, for reproducible runs
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for RandomBalancer {
    fn name(&self) -> &str {
        "random"
    }

    fn select<'a>(
        &self,
        _request: &OutboundRequest,
        candidates: &[&'a Endpoint],
    ) -> Option<&'a Endpoint> {
        if candidates.is_empty() {
            return None;
        }
        let total: u64 = candidates.iter().map(|e| u64::from(e.weight)).sum();
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        if total == 0 {
            return Some(candidates[rng.gen_range(0..candidates.len())]);
        }
        let mut point = rng.gen_range(0..total);
        for endpoint in candidates {
            let weight = u64::from(endpoint.weight);
            if point < weight {
                return Some(*endpoint);
            }
            point -= weight;
        }
        candidates.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> Vec<Endpoint> {
        vec![
            Endpoint::new("a", "h", 1),
            Endpoint::new("b", "h", 2),
            Endpoint::new("c", "h", 3),
        ]
    }

    #[test]
    fn test_round_robin_cycles() {
        let balancer = RoundRobinBalancer::new();
        let request = OutboundRequest::new("svc", "/");
        let endpoints = endpoints();
        let candidates: Vec<&Endpoint> = endpoints.iter().collect();
        let picked: Vec<&str> = (0..4)
            .map(|_| balancer.select(&request, &candidates).unwrap().id.as_str())
            .collect();
        assert_eq!(picked, vec!["a", "b", "c", "a"]);
        assert!(balancer.select(&request, &[]).is_none());
    }

    #[test]
    fn test_random_respects_weights() {
        let balancer = RandomBalancer::seeded(7);
        let request = OutboundRequest::new("svc", "/");
        let endpoints = vec![
            Endpoint::new("heavy", "h", 1).with_weight(100),
            Endpoint::new("none", "h", 2).with_weight(0),
        ];
        let candidates: Vec<&Endpoint> = endpoints.iter().collect();
        for _ in 0..100 {
            assert_eq!(balancer.select(&request, &candidates).unwrap().id, "heavy");
        }
    }

    #[test]
    fn test_random_all_zero_weights() {
        let balancer = RandomBalancer::seeded(1);
        let request = OutboundRequest::new("svc", "/");
        let endpoints: Vec<Endpoint> = endpoints().into_iter().map(|e| e.with_weight(0)).collect();
        let candidates: Vec<&Endpoint> = endpoints.iter().collect();
        assert!(balancer.select(&request, &candidates).is_some());
    }

    #[test]
    fn test_random_seeded_is_reproducible() {
        let request = OutboundRequest::new("svc", "/");
        let endpoints = endpoints();
        let candidates: Vec<&Endpoint> = endpoints.iter().collect();
        let run = |seed| {
            let balancer = RandomBalancer::seeded(seed);
            (0..20)
                .map(|_| balancer.select(&request, &candidates).unwrap().id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(42), run(42));
    }
}
