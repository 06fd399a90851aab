//! Processing diagnostics: timing, buffer shapes, and pool traffic.
//!
//! Every successful call to
//! [`ResultProcessor::process`](crate::ResultProcessor::process) returns a
//! [`ProcessDiagnostics`] describing what the transform did.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pool::{PoolStats, ReleaseOutcome};
use crate::types::BufferInfo;

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single processed result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDiagnostics {
    /// Key of the transform that ran.
    pub transform: String,
    /// Wall-clock duration of the transform (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Shape of the pre-transform buffer.
    pub input: BufferInfo,
    /// Shape of the post-transform buffer.
    pub output: BufferInfo,
    /// Whether the transform returned a different buffer instance.
    pub replaced: bool,
    /// What happened to the input when the processor reclaimed it.
    /// `None` if it was transformed in place or the transform already
    /// released it.
    pub reclaimed: Option<ReleaseOutcome>,
    /// Pool counters after processing.
    pub pool: PoolStats,
}

impl ProcessDiagnostics {
    /// Human-readable multi-line report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Process Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!("Transform: {}", self.transform));
        lines.push(format!("Duration: {:.3}ms", duration_ms(self.duration)));
        lines.push(String::new());

        lines.push(format!("{:<12} {}", "Input", self.input));
        lines.push(format!("{:<12} {}", "Output", self.output));
        let disposition = match (self.replaced, self.reclaimed) {
            (false, _) => "transformed in place",
            (true, Some(ReleaseOutcome::Pooled)) => "input pooled for reuse",
            (true, Some(ReleaseOutcome::Dropped)) => "input freed",
            (true, None) => "input released by transform",
        };
        lines.push(format!("{:<12} {disposition}", "Buffer"));
        lines.push(String::new());

        lines.push(format!(
            "Pool: {} hits  |  {} misses  |  {} pooled  |  {} dropped  |  {} evicted",
            self.pool.hits, self.pool.misses, self.pool.pooled, self.pool.dropped, self.pool.evicted,
        ));

        lines.join("\n")
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
