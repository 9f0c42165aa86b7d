//! Engine configuration.

use std::time::Duration;

/// Tunables for a single table.
///
/// The defaults match a human-paced game; tests shrink the timers and pin the
/// seed to make every shuffle and force-pick reproducible.
#[derive(Clone, Debug)]
pub struct TableConfig {
    /// Deadline for the selecting player to draft a hero before the engine
    /// force-picks a random one on their behalf.
    pub selection_timeout: Duration,

    /// Deadline for the turn player to act before the turn is force-ended.
    pub turn_timeout: Duration,

    /// Pause broadcast between an absent hero rank and the next rank. `None`
    /// advances immediately.
    pub hero_absent_delay: Option<Duration>,

    /// Capacity of each outbound event queue. A consumer that lets its queue
    /// fill up is disconnected rather than allowed to stall the table.
    pub queue_capacity: usize,

    /// RNG seed for shuffles and forced picks. `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            selection_timeout: Duration::from_secs(60),
            turn_timeout: Duration::from_secs(60),
            hero_absent_delay: None,
            queue_capacity: 256,
            seed: None,
        }
    }
}

impl TableConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity == 0 {
            return Err("queue capacity must be at least 1".to_string());
        }
        if self.selection_timeout.is_zero() || self.turn_timeout.is_zero() {
            return Err("timers must be non-zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TableConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = TableConfig {
            queue_capacity: 0,
            ..TableConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
