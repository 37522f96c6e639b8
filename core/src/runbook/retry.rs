use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay between a failed attempt and the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    None,
    Fixed {
        delay_ms: u64,
    },
    Linear {
        base_ms: u64,
        #[serde(default = "default_max_ms")]
        max_ms: u64,
    },
    Exponential {
        base_ms: u64,
        #[serde(default = "default_max_ms")]
        max_ms: u64,
    },
}

fn default_max_ms() -> u64 {
    60_000
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base_ms: 500,
            max_ms: 30_000,
        }
    }
}

impl Backoff {
    /// Delay to wait after the given 1-based attempt failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let ms = match *self {
            Self::None => 0,
            Self::Fixed { delay_ms } => delay_ms,
            Self::Linear { base_ms, max_ms } => base_ms.saturating_mul(attempt as u64).min(max_ms),
            Self::Exponential { base_ms, max_ms } => {
                let exp = 1u64 << (attempt - 1).min(30);
                base_ms.saturating_mul(exp).min(max_ms)
            }
        };
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: Backoff,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}
