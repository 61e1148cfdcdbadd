//! Seer divination (C5a): candidate scoring and the engine-resolved truth of a reading.

use std::collections::HashMap;

use mafia_game_lib::Faction;
use mafia_game_lib::PlayerId;
use mafia_game_lib::Role;
use mafia_game_lib::Snapshot;
use mafia_game_lib::SpeechRecord;

use crate::consts::SEER_WEIGHT_BEHAVIOUR;
use crate::consts::SEER_WEIGHT_INCONSISTENCY;
use crate::consts::SEER_WEIGHT_STRATEGIC;
use crate::consts::SEER_WEIGHT_SUSPICION;

/// Stance-flip proxy: counts adjacent-speech sentiment reversals using a crude positive/
/// negative keyword split, normalized by speech count. A player who flips often reads as
/// inconsistent.
fn inconsistency(candidate: PlayerId, speech_history: &[SpeechRecord]) -> f64 {
    const POSITIVE: &[&str] = &["trust", "innocent", "agree", "support"];
    const NEGATIVE: &[&str] = &["suspect", "guilty", "disagree", "accuse"];

    let speeches: Vec<_> = speech_history.iter().filter(|s| s.speaker == candidate).collect();
    if speeches.len() < 2 {
        return 0.0;
    }

    let stances: Vec<Option<bool>> = speeches
        .iter()
        .map(|s| {
            let lower = s.content.to_lowercase();
            let pos = POSITIVE.iter().any(|kw| lower.contains(kw));
            let neg = NEGATIVE.iter().any(|kw| lower.contains(kw));
            match (pos, neg) {
                (true, false) => Some(true),
                (false, true) => Some(false),
                _ => None,
            }
        })
        .collect();

    let flips = stances
        .windows(2)
        .filter(|pair| matches!((pair[0], pair[1]), (Some(a), Some(b)) if a != b))
        .count();

    flips as f64 / speeches.len() as f64
}

/// Speech-share anomaly: a candidate speaking far less or far more than an even share of the
/// round's discussion is flagged as behaviourally anomalous.
fn behaviour_anomaly(candidate: PlayerId, speech_history: &[SpeechRecord], live_count: usize) -> f64 {
    if speech_history.is_empty() || live_count == 0 {
        return 0.0;
    }
    let candidate_speeches = speech_history.iter().filter(|s| s.speaker == candidate).count() as f64;
    let share = candidate_speeches / speech_history.len() as f64;
    if share < 0.1 || share > 0.4 { 1.0 } else { 0.0 }
}

fn strategic_value(round: usize, candidates_remaining: usize) -> f64 {
    let scarcity = if candidates_remaining == 0 {
        0.0
    } else {
        1.0 / candidates_remaining as f64
    };
    (round as f64).sqrt() * scarcity
}

/// Composite `divination_value` per §4.4.
pub fn divination_values(
    candidates: &[PlayerId],
    suspicions: &HashMap<PlayerId, f64>,
    speech_history: &[SpeechRecord],
    round: usize,
    live_count: usize,
) -> HashMap<PlayerId, f64> {
    candidates
        .iter()
        .map(|&candidate| {
            let suspicion = suspicions.get(&candidate).copied().unwrap_or(0.5);
            let value = SEER_WEIGHT_SUSPICION * suspicion
                + SEER_WEIGHT_INCONSISTENCY * inconsistency(candidate, speech_history)
                + SEER_WEIGHT_BEHAVIOUR * behaviour_anomaly(candidate, speech_history, live_count)
                + SEER_WEIGHT_STRATEGIC * strategic_value(round, candidates.len());
            (candidate, value)
        })
        .collect()
}

/// Picks the argmax candidate by `divination_value`, ties broken by lowest id.
pub fn choose_target(values: &HashMap<PlayerId, f64>) -> Option<PlayerId> {
    values
        .iter()
        .max_by(|a, b| {
            a.1.partial_cmp(b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.0.cmp(&a.0.0))
        })
        .map(|(&id, _)| id)
}

/// Engine-resolved truth of a divination: the only place ground-truth role ever crosses into
/// a seer-visible result.
pub fn resolve_truth(target_role: Role) -> Faction {
    if target_role == Role::Werewolf {
        Faction::Werewolves
    } else {
        Faction::Villagers
    }
}

/// Builds the live, not-yet-divined candidate set for a seer (§4.4).
pub fn candidate_set(
    seer: PlayerId,
    snapshot: &Snapshot,
    already_divined: &HashMap<PlayerId, Faction>,
) -> Vec<PlayerId> {
    snapshot
        .alive
        .iter()
        .map(|p| p.id)
        .filter(|&id| id != seer && !already_divined.contains_key(&id))
        .collect()
}
