//! Win-probability telemetry (C7 supplemental estimator, §C7/SPEC_FULL §6).
//!
//! The actual win/continue decision lives on [`crate::state::State::evaluate_victory`],
//! which is the only thing that may ever set a winner. This module computes a coarse,
//! advisory estimate purely for `tracing` telemetry; nothing here feeds back into engine
//! control flow.

use mafia_game_lib::FactionCounts;

use crate::consts::WIN_PROB_SEER_DEAD_BONUS;

/// `p(werewolves win) = werewolves / total_alive`, bumped when the seer is dead to reflect
/// the villagers' lost information advantage. Capped at 1.0. Returns `None` when there are
/// no survivors to estimate over.
pub fn werewolf_win_probability(counts: &FactionCounts, seer_alive: bool) -> Option<f64> {
    if counts.total_alive == 0 {
        return None;
    }

    let base = counts.werewolves as f64 / counts.total_alive as f64;
    let bonus = if seer_alive { 0.0 } else { WIN_PROB_SEER_DEAD_BONUS };
    Some((base + bonus).min(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probability_scales_with_werewolf_share() {
        let counts = FactionCounts {
            villagers_plain: 2,
            villager_faction: 3,
            werewolves: 1,
            total_alive: 4,
        };
        let p = werewolf_win_probability(&counts, true).unwrap();
        assert!((p - 0.25).abs() < 1e-9);
    }

    #[test]
    fn dead_seer_adds_bonus_capped_at_one() {
        let counts = FactionCounts {
            villagers_plain: 0,
            villager_faction: 1,
            werewolves: 3,
            total_alive: 4,
        };
        let p = werewolf_win_probability(&counts, false).unwrap();
        assert!((p - 1.0).abs() < 1e-9);
    }

    #[test]
    fn no_survivors_yields_none() {
        let counts = FactionCounts::default();
        assert_eq!(werewolf_win_probability(&counts, true), None);
    }
}
