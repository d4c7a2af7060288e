use std::time::Duration;

/// What the store knows about a key, read in one atomic step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheRecord {
    /// The serialized value, `None` on a miss.
    pub value: Option<String>,
    /// How long the computation that produced `value` took.
    pub computation_cost: Option<Duration>,
    /// Time left until the store expires the value.
    ///
    /// An already expired value reports zero.
    pub remaining_freshness: Option<Duration>,
    /// Whether `value` is present.
    pub hit: bool,
}

impl CacheRecord {
    pub fn miss() -> Self {
        Self::default()
    }

    /// A record for a stored value.
    ///
    /// The metadata may be missing, e.g. when the delta key was evicted on its own.
    pub fn hit(
        value: String,
        computation_cost: Option<Duration>,
        remaining_freshness: Option<Duration>,
    ) -> Self {
        Self {
            value: Some(value),
            computation_cost,
            remaining_freshness,
            hit: true,
        }
    }

    /// Whether the value and all of its metadata are present.
    pub fn is_complete(&self) -> bool {
        self.hit
            && self.value.is_some()
            && self.computation_cost.is_some()
            && self.remaining_freshness.is_some()
    }
}
