//! Ordered fallback tiers
//!
//! A stage declares its alternatives as data: named tiers tried in order,
//! then a terminal tier that cannot fail. The first tier that succeeds wins.
//! Tiers are lazy, so later tiers do no work unless earlier ones fail.

use crate::error::PipelineResult;
use futures::future::BoxFuture;
use tracing::{debug, warn};

type Tier<'a, T> = (&'static str, Box<dyn FnOnce() -> BoxFuture<'a, PipelineResult<T>> + Send + 'a>);

/// Value produced by a [`FallbackChain`] and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    /// Name of the tier that produced `value`
    pub tier: &'static str,
    /// Position of that tier (the terminal tier comes last)
    pub index: usize,
}

impl<T> Resolved<T> {
    /// True unless the first declared tier produced the value
    pub fn fell_back(&self) -> bool {
        self.index > 0
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolved<U> {
        Resolved {
            value: f(self.value),
            tier: self.tier,
            index: self.index,
        }
    }
}

pub struct FallbackChain<'a, T> {
    stage: &'static str,
    tiers: Vec<Tier<'a, T>>,
}

impl<'a, T: Send + 'a> FallbackChain<'a, T> {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            tiers: Vec::new(),
        }
    }

    /// Append a fallible tier
    pub fn tier<F>(mut self, name: &'static str, tier: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'a, PipelineResult<T>> + Send + 'a,
    {
        self.tiers.push((name, Box::new(tier)));
        self
    }

    /// Append a tier only when `enabled`
    pub fn tier_if<F>(self, enabled: bool, name: &'static str, tier: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'a, PipelineResult<T>> + Send + 'a,
    {
        if enabled {
            self.tier(name, tier)
        } else {
            self
        }
    }

    /// Names of the fallible tiers in evaluation order
    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|(name, _)| *name).collect()
    }

    /// Try each tier in order; fall through to `terminal` when all fail
    pub async fn resolve(self, terminal_name: &'static str, terminal: impl FnOnce() -> T) -> Resolved<T> {
        let stage = self.stage;
        let tier_count = self.tiers.len();

        for (index, (name, tier)) in self.tiers.into_iter().enumerate() {
            match tier().await {
                Ok(value) => {
                    debug!(stage, tier = name, "Tier succeeded");
                    return Resolved {
                        value,
                        tier: name,
                        index,
                    };
                }
                Err(e) => {
                    warn!(stage, tier = name, error = %e, "Tier failed, falling back");
                }
            }
        }

        warn!(stage, tier = terminal_name, "All tiers failed, using terminal value");
        Resolved {
            value: terminal(),
            tier: terminal_name,
            index: tier_count,
        }
    }
}
