//! Skill module
//!
//! The level curve. Levels are derived from lifetime experience, never
//! stored, so a character's level can always be recomputed from its
//! `experience_total`.

use tracing::info;

/// Highest reachable level
pub const MAX_LEVEL: u32 = 50;

/// Experience thresholds per level, precomputed at boot
pub struct SkillTable {
    /// `thresholds[n]` is the lifetime experience needed for level `n + 1`
    thresholds: Vec<u64>,
}

impl SkillTable {
    /// Build the curve. The step to each level grows by 60: reaching level
    /// 2 takes 120 experience, level 3 takes 180 more, and so on.
    pub fn builtin() -> Self {
        let mut thresholds = Vec::with_capacity(MAX_LEVEL as usize);
        let mut total: u64 = 0;
        for level in 1..=MAX_LEVEL as u64 {
            thresholds.push(total);
            total += 60 * (level + 1);
        }
        info!(levels = thresholds.len(), "Skill table built");
        Self { thresholds }
    }

    /// The level a lifetime experience total earns
    pub fn level_for(&self, experience_total: u64) -> u32 {
        match self
            .thresholds
            .iter()
            .rposition(|t| *t <= experience_total)
        {
            Some(idx) => idx as u32 + 1,
            None => 1,
        }
    }

    /// Experience needed for the next level, `None` at the cap
    pub fn next_level_at(&self, experience_total: u64) -> Option<u64> {
        let level = self.level_for(experience_total);
        self.thresholds.get(level as usize).copied()
    }

    pub fn level_count(&self) -> usize {
        self.thresholds.len()
    }
}
