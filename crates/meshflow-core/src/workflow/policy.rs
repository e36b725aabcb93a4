//! Retry/fallback policy: attempt plans, the cursor that walks them, and
//! backoff between attempts.
//!
//! A plan is an ordered list of targets (primary endpoint, then fallbacks),
//! each with its own attempt budget. The cursor is an explicit state machine
//! over that list so the scheduler never tracks indices by hand.

use std::time::Duration;

use meshflow_types::config::{BackoffConfig, EngineConfig};
use meshflow_types::graph::NodeSpec;
use meshflow_types::service::ServiceDescriptor;

// ---------------------------------------------------------------------------
// AttemptPlan
// ---------------------------------------------------------------------------

/// One endpoint and how many attempts it gets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub endpoint: String,
    pub attempts: u32,
}

/// Concrete, bounded attempt sequence for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptPlan {
    /// Target 0 is the primary endpoint; never empty.
    pub targets: Vec<Target>,
    /// Bound on each individual attempt.
    pub timeout: Duration,
}

impl AttemptPlan {
    pub fn max_total_attempts(&self) -> u32 {
        self.targets.iter().map(|t| t.attempts).sum()
    }

    pub fn cursor(&self) -> AttemptCursor {
        AttemptCursor {
            budgets: self.targets.iter().map(|t| t.attempts).collect(),
            target_index: 0,
            attempt: 1,
            sequence: 1,
        }
    }

    pub fn target(&self, index: usize) -> Option<&Target> {
        self.targets.get(index)
    }
}

// ---------------------------------------------------------------------------
// PolicyResolver
// ---------------------------------------------------------------------------

/// Turns node overrides and descriptor settings into an `AttemptPlan`.
#[derive(Debug, Clone)]
pub struct PolicyResolver {
    default_retry_limit: u32,
    max_retry_limit: Option<u32>,
    default_timeout: Duration,
}

impl PolicyResolver {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            default_retry_limit: config.default_retry_limit,
            max_retry_limit: config.max_retry_limit.map(|limit| limit.max(1)),
            default_timeout: Duration::from_millis(config.default_timeout_ms),
        }
    }

    /// Resolve the plan for `node` calling `descriptor`.
    ///
    /// Node overrides win over descriptor settings. Every target gets the same
    /// independent budget of at least one attempt, capped only when the
    /// config sets `max_retry_limit`.
    pub fn resolve(&self, node: &NodeSpec, descriptor: &ServiceDescriptor) -> AttemptPlan {
        let resolved = node
            .retry_limit
            .or(descriptor.retry_limit)
            .unwrap_or(self.default_retry_limit)
            .max(1);
        let attempts = match self.max_retry_limit {
            Some(cap) => resolved.min(cap),
            None => resolved,
        };

        let fallbacks = node
            .fallback_endpoints
            .as_deref()
            .unwrap_or(descriptor.fallback_endpoints.as_slice());

        let targets = std::iter::once(&descriptor.endpoint)
            .chain(fallbacks)
            .map(|endpoint| Target {
                endpoint: endpoint.clone(),
                attempts,
            })
            .collect();

        let timeout = descriptor
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);

        AttemptPlan { targets, timeout }
    }
}

// ---------------------------------------------------------------------------
// AttemptCursor
// ---------------------------------------------------------------------------

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStep {
    /// Try the same target again after a backoff delay.
    Retry,
    /// Move to the next target immediately.
    Fallback,
    /// No attempts left.
    Exhausted,
}

/// Position within an `AttemptPlan`.
///
/// Starts at the first attempt of the primary target.
#[derive(Debug, Clone)]
pub struct AttemptCursor {
    budgets: Vec<u32>,
    target_index: usize,
    attempt: u32,
    sequence: u32,
}

impl AttemptCursor {
    /// Index of the current target (0 = primary).
    pub fn target_index(&self) -> usize {
        self.target_index
    }

    /// 1-based attempt within the current target.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// 1-based attempt across all targets.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Advance past a failed attempt.
    pub fn advance(&mut self) -> CursorStep {
        let budget = self.budgets.get(self.target_index).copied().unwrap_or(0);
        if self.attempt < budget {
            self.attempt += 1;
            self.sequence += 1;
            CursorStep::Retry
        } else if self.target_index + 1 < self.budgets.len() {
            self.target_index += 1;
            self.attempt = 1;
            self.sequence += 1;
            CursorStep::Fallback
        } else {
            CursorStep::Exhausted
        }
    }
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Exponential backoff with optional jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Delay before retrying after the `failed_attempt`-th attempt (1-based).
    ///
    /// `base * 2^(failed_attempt - 1)` capped at `max`, scaled by 0.8x-1.2x
    /// when jitter is on.
    pub fn delay(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1);
        let ms = self
            .config
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(self.config.max_delay_ms);
        if !self.config.jitter {
            return Duration::from_millis(ms);
        }
        let jitter = 0.8 + rand::random::<f64>() * 0.4;
        Duration::from_millis((ms as f64 * jitter) as u64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
