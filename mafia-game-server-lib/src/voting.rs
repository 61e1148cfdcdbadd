//! Parallel vote collection, tally, and tie handling (C6).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use mafia_game_lib::PlayerId;
use mafia_game_lib::Snapshot;
use mafia_game_lib::TieAction;
use mafia_game_lib::VoteOutcome;
use mafia_game_lib::VoterRecord;
use rand::Rng;
use rand::seq::IndexedRandom;
use tap::Tap;

use crate::agent::Agent;
use crate::dispatch::CallOutcome;
use crate::dispatch::call_with_timeout;

/// Fans `Vote` out to every voter concurrently, joins with `timeout`, and resolves ties
/// (§4.6). A timeout, panic, or illegal (not-in-`candidates`) choice is replaced with a
/// uniformly random legal candidate and flagged `fallback=true` (I8, §7).
pub async fn conduct_vote<R: Rng>(
    agents: &[Agent],
    voters: &[PlayerId],
    candidates: &[PlayerId],
    is_revote: bool,
    snapshot: &Snapshot,
    timeout: Duration,
    rng: &mut R,
) -> VoteOutcome {
    let calls = voters.iter().filter_map(|&voter| {
        let agent = agents.iter().find(|a| a.id == voter)?;
        let policy = Arc::clone(&agent.policy);
        let snapshot = snapshot.clone();
        let candidates = candidates.to_vec();
        Some(async move {
            let outcome = call_with_timeout(timeout, async move {
                policy.vote(&snapshot, &candidates).await
            })
            .await;
            (voter, outcome)
        })
    });

    let results = join_all(calls).await;

    let mut per_voter = Vec::with_capacity(results.len());
    let mut tally: HashMap<PlayerId, usize> = HashMap::new();

    for (voter, outcome) in results {
        let (target, fallback) = match outcome {
            CallOutcome::Ok(choice) if candidates.contains(&choice) && choice != voter => {
                (choice, false)
            }
            CallOutcome::Ok(_) => (random_legal_choice(candidates, voter, rng), true),
            CallOutcome::Failed { .. } => (random_legal_choice(candidates, voter, rng), true),
        };

        *tally.entry(target).or_insert(0) += 1;
        per_voter.push(VoterRecord {
            voter,
            target,
            fallback,
        });
    }

    let max_count = tally.values().copied().max().unwrap_or(0);
    let winners: Vec<PlayerId> = tally
        .iter()
        .filter(|&(_, &count)| count == max_count)
        .map(|(&id, _)| id)
        .collect::<Vec<_>>()
        .tap_mut(|w| w.sort());

    let (action, target) = match winners.as_slice() {
        [] => (TieAction::SkipElimination, None),
        [only] => (TieAction::Elimination, Some(*only)),
        _ if !is_revote => (TieAction::RevoteRequired, None),
        _ => (TieAction::SkipElimination, None),
    };

    VoteOutcome {
        tally,
        action,
        target,
        per_voter,
    }
}

fn random_legal_choice<R: Rng>(candidates: &[PlayerId], voter: PlayerId, rng: &mut R) -> PlayerId {
    let legal: Vec<PlayerId> = candidates.iter().copied().filter(|&c| c != voter).collect();
    let pool = if legal.is_empty() { candidates } else { &legal };
    *pool
        .choose(rng)
        .expect("candidates is non-empty whenever a vote is conducted")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::memory::MemoryCaps;
    use mafia_game_lib::Role;
    use rand::rngs::mock::StepRng;

    struct FixedVotePolicy(PlayerId);

    #[async_trait::async_trait]
    impl crate::agent::Policy for FixedVotePolicy {
        async fn speak(&self, _snapshot: &Snapshot, _context: mafia_game_lib::SpeechContext) -> String {
            String::new()
        }

        async fn vote(&self, _snapshot: &Snapshot, _candidates: &[PlayerId]) -> PlayerId {
            self.0
        }

        async fn night_action(
            &self,
            _snapshot: &Snapshot,
            _extras: &mafia_game_lib::NightExtras,
        ) -> mafia_game_lib::ActionResult {
            mafia_game_lib::ActionResult::no_action("n/a")
        }

        async fn night_discussion(
            &self,
            _snapshot: &Snapshot,
            _transcript_so_far: &[String],
            _pass: &'static str,
        ) -> String {
            String::new()
        }

        async fn reflect(&self, _snapshot: &Snapshot) -> String {
            String::new()
        }
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            round: 1,
            phase: mafia_game_lib::Phase::Voting,
            alive: vec![],
            dead: vec![],
            recent_speeches: vec![],
            faction_counts: Default::default(),
        }
    }

    fn agent_voting_for(id: usize, target: usize) -> Agent {
        Agent::new(
            PlayerId(id),
            Arc::from(format!("p{id}")),
            Role::Villager,
            Arc::new(FixedVotePolicy(PlayerId(target))),
            MemoryCaps::default(),
        )
    }

    #[tokio::test]
    async fn unanimous_vote_eliminates_target() {
        let agents = vec![agent_voting_for(1, 3), agent_voting_for(2, 3)];
        let voters = vec![PlayerId(1), PlayerId(2)];
        let candidates = vec![PlayerId(1), PlayerId(2), PlayerId(3)];
        let mut rng = StepRng::new(0, 1);

        let outcome = conduct_vote(
            &agents,
            &voters,
            &candidates,
            false,
            &snapshot(),
            Duration::from_secs(1),
            &mut rng,
        )
        .await;

        assert_eq!(outcome.action, TieAction::Elimination);
        assert_eq!(outcome.target, Some(PlayerId(3)));
        assert!(outcome.per_voter.iter().all(|v| !v.fallback));
    }

    #[tokio::test]
    async fn tie_without_revote_requires_revote() {
        let agents = vec![agent_voting_for(1, 2), agent_voting_for(2, 1)];
        let voters = vec![PlayerId(1), PlayerId(2)];
        let candidates = vec![PlayerId(1), PlayerId(2)];
        let mut rng = StepRng::new(0, 1);

        let outcome = conduct_vote(
            &agents,
            &voters,
            &candidates,
            false,
            &snapshot(),
            Duration::from_secs(1),
            &mut rng,
        )
        .await;

        assert_eq!(outcome.action, TieAction::RevoteRequired);
        assert_eq!(outcome.target, None);
    }

    #[tokio::test]
    async fn tie_on_revote_skips_elimination() {
        let agents = vec![agent_voting_for(1, 2), agent_voting_for(2, 1)];
        let voters = vec![PlayerId(1), PlayerId(2)];
        let candidates = vec![PlayerId(1), PlayerId(2)];
        let mut rng = StepRng::new(0, 1);

        let outcome = conduct_vote(
            &agents,
            &voters,
            &candidates,
            true,
            &snapshot(),
            Duration::from_secs(1),
            &mut rng,
        )
        .await;

        assert_eq!(outcome.action, TieAction::SkipElimination);
        assert_eq!(outcome.target, None);
    }

    #[tokio::test]
    async fn illegal_vote_is_replaced_with_fallback() {
        // votes for itself, which is not a legal candidate for itself.
        let agents = vec![agent_voting_for(1, 1), agent_voting_for(2, 1)];
        let voters = vec![PlayerId(1), PlayerId(2)];
        let candidates = vec![PlayerId(1), PlayerId(2)];
        let mut rng = StepRng::new(0, 1);

        let outcome = conduct_vote(
            &agents,
            &voters,
            &candidates,
            false,
            &snapshot(),
            Duration::from_secs(1),
            &mut rng,
        )
        .await;

        let voter1 = outcome.per_voter.iter().find(|v| v.voter == PlayerId(1)).unwrap();
        assert!(voter1.fallback);
        assert_eq!(outcome.per_voter.len(), 2);
        assert_eq!(outcome.tally.values().sum::<usize>(), 2);
    }
}
