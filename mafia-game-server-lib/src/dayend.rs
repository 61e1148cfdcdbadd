//! Exile last words broadcast and concurrent end-of-day reflection (C8).

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use mafia_game_lib::PlayerId;
use mafia_game_lib::Snapshot;
use mafia_game_lib::SpeechContext;

use crate::agent::Agent;
use crate::consts::FALLBACK_LAST_WORDS;
use crate::dispatch::CallOutcome;
use crate::dispatch::call_with_timeout;
use crate::memory::ThinkingEntry;

/// Asks the exiled agent for last words; a failure substitutes [`FALLBACK_LAST_WORDS`]. The
/// caller is responsible for broadcasting the returned text into every surviving seat's
/// `speeches` memory (tagged `ExileLastWords`) and recording it on `State`.
pub async fn last_words(
    agents: &[Agent],
    exiled: PlayerId,
    snapshot: &Snapshot,
    timeout: Duration,
) -> String {
    let Some(agent) = agents.iter().find(|a| a.id == exiled) else {
        return FALLBACK_LAST_WORDS.to_string();
    };
    let policy = Arc::clone(&agent.policy);
    let snapshot = snapshot.clone();

    let outcome = call_with_timeout(timeout, async move {
        policy.speak(&snapshot, SpeechContext::ExileLastWords).await
    })
    .await;

    match outcome {
        CallOutcome::Ok(text) => text,
        CallOutcome::Failed { cause } => {
            tracing::warn!(seat = exiled.0, cause = cause.as_str(), "last words call failed");
            FALLBACK_LAST_WORDS.to_string()
        }
    }
}

/// Concurrently invokes a reflection prompt for every live player. A timed-out or panicking
/// reflection is recorded as an explicit "no reflection" marker rather than silently omitted
/// (§4.8), so stream length stays diagnosable. Writes directly into each agent's
/// `night_thinking` memory; callers do not need the return value except for logging/testing.
pub async fn run_reflections(agents: &mut [Agent], snapshot: &Snapshot, timeout: Duration) {
    let round = snapshot.round;

    let calls = agents.iter().filter(|a| {
        snapshot.alive.iter().any(|p| p.id == a.id)
    }).map(|agent| {
        let id = agent.id;
        let policy = Arc::clone(&agent.policy);
        let snapshot = snapshot.clone();
        async move {
            let outcome = call_with_timeout(timeout, async move { policy.reflect(&snapshot).await }).await;
            let text = match outcome {
                CallOutcome::Ok(text) => text,
                CallOutcome::Failed { cause } => {
                    tracing::warn!(seat = id.0, cause = cause.as_str(), "reflection call failed");
                    "no reflection".to_string()
                }
            };
            (id, text)
        }
    });

    let results = join_all(calls).await;

    for (id, text) in results {
        if let Some(agent) = agents.iter_mut().find(|a| a.id == id) {
            agent.memory.record_thinking(
                round,
                0,
                ThinkingEntry {
                    content: text.into_boxed_str(),
                },
            );
        }
    }
}

/// Mirrors the exiled player's last words into every surviving seat's `speeches` memory.
pub fn broadcast_last_words(agents: &mut [Agent], exiled: PlayerId, round: usize, text: &str) {
    let record = mafia_game_lib::SpeechRecord {
        speaker: exiled,
        round,
        content: Arc::from(text),
        context: SpeechContext::ExileLastWords,
    };

    for agent in agents.iter_mut().filter(|a| a.id != exiled) {
        agent.memory.record_speech(round, 0, record.clone());
    }
}
