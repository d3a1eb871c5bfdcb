use serde::{Deserialize, Serialize};

/// Lowest level a job can decay to.
pub const LEVEL_FLOOR: u32 = 1;

/// Result of applying the leave penalty to one job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayOutcome {
    pub previous_level: u32,
    pub new_level: u32,
    /// XP after leaving. Always zero: leaving clears progress within the level.
    pub xp: f64,
}

/// `max(1, current_level - decrease)`, saturating.
pub fn decay(current_level: u32, decrease: u32) -> DecayOutcome {
    DecayOutcome {
        previous_level: current_level,
        new_level: current_level.saturating_sub(decrease).max(LEVEL_FLOOR),
        xp: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_drops_below_one() {
        assert_eq!(decay(1, 100).new_level, 1);
        assert_eq!(decay(1, 2).new_level, 1);
        assert_eq!(decay(3, u32::MAX).new_level, 1);
    }

    #[test]
    fn subtracts_configured_decrease() {
        let outcome = decay(10, 3);
        assert_eq!(outcome.previous_level, 10);
        assert_eq!(outcome.new_level, 7);
    }

    #[test]
    fn zero_decrease_keeps_level_but_resets_xp() {
        let outcome = decay(8, 0);
        assert_eq!(outcome.new_level, 8);
        assert_eq!(outcome.xp, 0.0);
    }

    #[test]
    fn out_of_range_level_is_lifted_to_floor() {
        assert_eq!(decay(0, 0).new_level, 1);
    }
}
