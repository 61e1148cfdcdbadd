//! Werewolf group cooperation (C4): three-round private dialogue ending in a weighted,
//! mention-biased kill-target vote.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mafia_game_lib::PlayerId;
use mafia_game_lib::Role;
use mafia_game_lib::Snapshot;
use mafia_game_lib::SpeechRecord;
use rand::Rng;

use crate::agent::Agent;
use crate::consts::FALLBACK_SPEECH;
use crate::consts::ROLE_PRIORITY_SEER;
use crate::consts::ROLE_PRIORITY_VILLAGER;
use crate::consts::ROLE_PRIORITY_WITCH;
use crate::consts::SEER_KEYWORDS;
use crate::consts::THREAT_WEIGHT_INFLUENCE;
use crate::consts::THREAT_WEIGHT_ROLE_PRIORITY;
use crate::consts::THREAT_WEIGHT_SPEECH_LOGIC;
use crate::consts::THREAT_WEIGHT_SURVIVAL_ROUNDS;
use crate::consts::THREAT_WEIGHT_SUSPICION_ACCURACY;
use crate::consts::WITCH_KEYWORDS;
use crate::dispatch::CallOutcome;
use crate::dispatch::call_with_timeout;
use crate::memory::NightDiscussionEntry;

/// Outcome of one night's werewolf cooperation.
pub struct WerewolfDecision {
    pub success: bool,
    pub target: Option<PlayerId>,
    pub vote_tally: HashMap<PlayerId, usize>,
    pub transcript: Vec<String>,
}

/// Heuristically estimated role of an unfamiliar player, from keyword hits in their public
/// speeches. Default is `Villager` absent any hit, since werewolves reason under the same
/// hidden information everyone else has.
fn estimate_role(candidate: PlayerId, speech_history: &[SpeechRecord]) -> Role {
    let mut has_seer_hit = false;
    let mut has_witch_hit = false;

    for speech in speech_history.iter().filter(|s| s.speaker == candidate) {
        let lower = speech.content.to_lowercase();
        if SEER_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            has_seer_hit = true;
        }
        if WITCH_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            has_witch_hit = true;
        }
    }

    if has_seer_hit {
        Role::Seer
    } else if has_witch_hit {
        Role::Witch
    } else {
        Role::Villager
    }
}

fn role_priority_weight(role: Role) -> f64 {
    let max = ROLE_PRIORITY_SEER;
    let raw = match role {
        Role::Seer => ROLE_PRIORITY_SEER,
        Role::Witch => ROLE_PRIORITY_WITCH,
        Role::Villager | Role::Werewolf => ROLE_PRIORITY_VILLAGER,
    };
    raw / max
}

fn speech_logic(candidate: PlayerId, speech_history: &[SpeechRecord]) -> f64 {
    let speeches: Vec<_> = speech_history.iter().filter(|s| s.speaker == candidate).collect();
    if speeches.is_empty() {
        return 0.0;
    }
    let named_others = speeches
        .iter()
        .filter(|s| {
            speech_history
                .iter()
                .any(|other| other.speaker != candidate && s.content.contains(&*other.speaker_display()))
        })
        .count();
    named_others as f64 / speeches.len() as f64
}

trait SpeakerDisplay {
    fn speaker_display(&self) -> Box<str>;
}

impl SpeakerDisplay for SpeechRecord {
    fn speaker_display(&self) -> Box<str> {
        format!("{}", self.speaker.0).into()
    }
}

/// Approximates how often the candidate's public accusations have tracked the werewolves'
/// own current belief state, since ground truth isn't available in-character.
fn suspicion_accuracy(candidate: PlayerId, speech_history: &[SpeechRecord], believed_werewolves: &[PlayerId]) -> f64 {
    let speeches: Vec<_> = speech_history.iter().filter(|s| s.speaker == candidate).collect();
    if speeches.is_empty() {
        return 0.0;
    }
    let correct = speeches
        .iter()
        .filter(|s| believed_werewolves.iter().any(|w| s.content.contains(&w.0.to_string())))
        .count();
    correct as f64 / speeches.len() as f64
}

fn influence(candidate: PlayerId, speech_history: &[SpeechRecord], all_candidates: &[PlayerId]) -> f64 {
    let raw = |id: PlayerId| -> f64 {
        let speeches: Vec<_> = speech_history.iter().filter(|s| s.speaker == id).collect();
        let count = speeches.len() as f64;
        let mean_len = if speeches.is_empty() {
            0.0
        } else {
            speeches.iter().map(|s| s.content.split_whitespace().count()).sum::<usize>() as f64
                / speeches.len() as f64
        };
        count * mean_len
    };

    let values: Vec<f64> = all_candidates.iter().map(|&id| raw(id)).collect();
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let candidate_raw = raw(candidate);

    if (max - min).abs() < f64::EPSILON {
        0.0
    } else {
        (candidate_raw - min) / (max - min)
    }
}

fn survival_rounds(death_round: Option<usize>, current_round: usize) -> f64 {
    let rounds_survived = death_round.unwrap_or(current_round) as f64;
    if current_round == 0 {
        0.0
    } else {
        (rounds_survived / current_round as f64).min(1.0)
    }
}

/// Composite `threat_score` per §4.3 / SPEC_FULL §4.3 weighting table.
pub fn threat_scores(
    candidates: &[PlayerId],
    speech_history: &[SpeechRecord],
    believed_werewolves: &[PlayerId],
    current_round: usize,
) -> HashMap<PlayerId, f64> {
    candidates
        .iter()
        .map(|&candidate| {
            let role = estimate_role(candidate, speech_history);
            let score = THREAT_WEIGHT_ROLE_PRIORITY * role_priority_weight(role)
                + THREAT_WEIGHT_SPEECH_LOGIC * speech_logic(candidate, speech_history)
                + THREAT_WEIGHT_SUSPICION_ACCURACY
                    * suspicion_accuracy(candidate, speech_history, believed_werewolves)
                + THREAT_WEIGHT_INFLUENCE * influence(candidate, speech_history, candidates)
                + THREAT_WEIGHT_SURVIVAL_ROUNDS * survival_rounds(None, current_round);
            (candidate, score)
        })
        .collect()
}

fn top_threat(scores: &HashMap<PlayerId, f64>) -> PlayerId {
    scores
        .iter()
        .max_by(|a, b| {
            a.1.partial_cmp(b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.0.cmp(&a.0.0)) // lower id wins ties
        })
        .map(|(&id, _)| id)
        .expect("candidates is non-empty whenever the werewolves decide")
}

fn count_mentions(candidate: PlayerId, transcript: &[String]) -> usize {
    let needle = candidate.0.to_string();
    transcript.iter().filter(|line| line.contains(&needle)).count()
}

/// Runs the three-round dialogue and mention-biased final vote for two or more live
/// werewolves. `candidates` must already exclude `live_werewolves`.
async fn run_dialogue(
    agents: &mut [Agent],
    live_werewolves: &[PlayerId],
    snapshot: &Snapshot,
    timeout: Duration,
) -> Vec<String> {
    let mut transcript = Vec::new();
    let mut passes = vec!["opening"];
    if live_werewolves.len() >= 3 {
        passes.push("debate");
    }
    passes.push("final");

    for pass in passes {
        for &speaker in live_werewolves {
            let Some(idx) = agents.iter().position(|a| a.id == speaker) else {
                continue;
            };
            let policy = Arc::clone(&agents[idx].policy);
            let snapshot = snapshot.clone();
            let transcript_so_far = transcript.clone();

            let outcome = call_with_timeout(timeout, async move {
                policy.night_discussion(&snapshot, &transcript_so_far, pass).await
            })
            .await;

            let line = match outcome {
                CallOutcome::Ok(text) => text,
                CallOutcome::Failed { cause } => {
                    tracing::warn!(seat = speaker.0, cause = cause.as_str(), "werewolf dialogue turn failed");
                    FALLBACK_SPEECH.to_string()
                }
            };

            transcript.push(format!("{speaker:?}: {line}"));

            let round = snapshot.round;
            for &teammate in live_werewolves {
                if let Some(agent) = agents.iter_mut().find(|a| a.id == teammate) {
                    agent.memory.record_night_discussion(
                        round,
                        0,
                        NightDiscussionEntry {
                            speaker,
                            pass,
                            content: line.clone().into_boxed_str(),
                        },
                    );
                }
            }
        }
    }

    transcript
}

/// C4 entry point.
pub async fn decide<R: Rng>(
    agents: &mut [Agent],
    live_werewolves: &[PlayerId],
    snapshot: &Snapshot,
    dialogue_timeout: Duration,
    rng: &mut R,
) -> WerewolfDecision {
    if live_werewolves.is_empty() {
        return WerewolfDecision {
            success: false,
            target: None,
            vote_tally: HashMap::new(),
            transcript: Vec::new(),
        };
    }

    let candidates: Vec<PlayerId> = snapshot
        .alive
        .iter()
        .map(|p| p.id)
        .filter(|id| !live_werewolves.contains(id))
        .collect();

    if candidates.is_empty() {
        return WerewolfDecision {
            success: false,
            target: None,
            vote_tally: HashMap::new(),
            transcript: Vec::new(),
        };
    }

    let speech_history: Vec<SpeechRecord> = snapshot.recent_speeches.clone();
    let scores = threat_scores(&candidates, &speech_history, live_werewolves, snapshot.round);

    if live_werewolves.len() == 1 {
        let target = top_threat(&scores);
        let mut tally = HashMap::new();
        tally.insert(target, 1);
        return WerewolfDecision {
            success: true,
            target: Some(target),
            vote_tally: tally,
            transcript: Vec::new(),
        };
    }

    let transcript = run_dialogue(agents, live_werewolves, snapshot, dialogue_timeout).await;

    let mentioned_enough: Vec<PlayerId> = candidates
        .iter()
        .copied()
        .filter(|&c| count_mentions(c, &transcript) >= 2)
        .collect();

    let target = if !mentioned_enough.is_empty() {
        mentioned_enough
            .iter()
            .copied()
            .max_by(|&a, &b| {
                scores[&a]
                    .partial_cmp(&scores[&b])
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.0.cmp(&a.0))
            })
            .unwrap()
    } else {
        top_threat(&scores)
    };

    let _ = rng; // last-resort tie-break above is already deterministic (lowest id); kept for
    // signature symmetry with other components that do consult the injected RNG.

    let mut tally = HashMap::new();
    tally.insert(target, live_werewolves.len());

    WerewolfDecision {
        success: true,
        target: Some(target),
        vote_tally: tally,
        transcript,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_role_defaults_to_villager_without_keyword_hits() {
        let history = vec![SpeechRecord {
            speaker: PlayerId(1),
            round: 1,
            content: "I think we should vote carefully".into(),
            context: mafia_game_lib::SpeechContext::Discussion,
        }];
        assert_eq!(estimate_role(PlayerId(1), &history), Role::Villager);
    }

    #[test]
    fn estimate_role_detects_seer_keywords() {
        let history = vec![SpeechRecord {
            speaker: PlayerId(1),
            round: 1,
            content: "My vision last night confirms something".into(),
            context: mafia_game_lib::SpeechContext::Discussion,
        }];
        assert_eq!(estimate_role(PlayerId(1), &history), Role::Seer);
    }

    #[test]
    fn single_werewolf_skips_discussion_and_picks_top_threat() {
        let scores = threat_scores(&[PlayerId(2), PlayerId(3)], &[], &[PlayerId(1)], 1);
        let target = top_threat(&scores);
        assert!(target == PlayerId(2) || target == PlayerId(3));
    }
}
