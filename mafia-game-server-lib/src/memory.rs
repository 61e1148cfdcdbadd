//! Per-agent append-only memory streams (C2).
//!
//! Every stream is a ring buffer: once it reaches its configured cap the oldest entry is
//! dropped to make room for the new one. Memory is single-writer from the engine's
//! perspective: agents observe their own streams but never mutate another agent's.

use std::collections::VecDeque;

use mafia_game_lib::ActionResult;
use mafia_game_lib::DeathCause;
use mafia_game_lib::PlayerId;
use mafia_game_lib::SpeechRecord;

/// Per-stream caps, as configured by [`crate::engine::GameConfig::memory_settings`].
#[derive(Copy, Clone, Debug)]
pub struct MemoryCaps {
    pub max_memory_events: usize,
    pub night_discussion_memory_limit: usize,
    pub night_thinking_memory_limit: usize,
}

impl Default for MemoryCaps {
    fn default() -> Self {
        Self {
            max_memory_events: 200,
            night_discussion_memory_limit: 60,
            night_thinking_memory_limit: 60,
        }
    }
}

/// One entry in a memory stream.
#[derive(Clone, Debug)]
pub struct MemoryEntry<T> {
    pub round: usize,
    /// Logical clock reading (see `GameConfig`'s injected clock), not wall time.
    pub timestamp: u64,
    pub payload: T,
}

struct RingBuffer<T> {
    cap: usize,
    entries: VecDeque<MemoryEntry<T>>,
}

impl<T> RingBuffer<T> {
    fn new(cap: usize) -> Self {
        Self {
            cap,
            entries: VecDeque::with_capacity(cap.min(64)),
        }
    }

    fn push(&mut self, round: usize, timestamp: u64, payload: T) {
        if self.entries.len() >= self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(MemoryEntry {
            round,
            timestamp,
            payload,
        });
    }

    fn iter(&self) -> impl Iterator<Item = &MemoryEntry<T>> {
        self.entries.iter()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Signal that a vote was cast, for `ObserveVote`.
#[derive(Clone, Debug)]
pub struct VoteObservation {
    pub voter: PlayerId,
    pub target: Option<PlayerId>,
}

/// Signal that a player died, for `ObserveDeath`.
#[derive(Clone, Debug)]
pub struct DeathObservation {
    pub player: PlayerId,
    pub cause: DeathCause,
}

/// One turn of werewolf-private night dialogue, mirrored to every live werewolf.
#[derive(Clone, Debug)]
pub struct NightDiscussionEntry {
    pub speaker: PlayerId,
    pub pass: &'static str,
    pub content: Box<str>,
}

/// A private reflection entry, never read by any agent other than its owner.
#[derive(Clone, Debug)]
pub struct ThinkingEntry {
    pub content: Box<str>,
}

/// The six append-only streams belonging to a single seat.
pub struct MemoryStore {
    speeches: RingBuffer<SpeechRecord>,
    votes: RingBuffer<VoteObservation>,
    night_actions: RingBuffer<ActionResult>,
    observations: RingBuffer<DeathObservation>,
    night_discussions: RingBuffer<NightDiscussionEntry>,
    night_thinking: RingBuffer<ThinkingEntry>,
}

impl MemoryStore {
    pub fn new(caps: MemoryCaps) -> Self {
        Self {
            speeches: RingBuffer::new(caps.max_memory_events),
            votes: RingBuffer::new(caps.max_memory_events),
            night_actions: RingBuffer::new(caps.max_memory_events),
            observations: RingBuffer::new(caps.max_memory_events),
            night_discussions: RingBuffer::new(caps.night_discussion_memory_limit),
            night_thinking: RingBuffer::new(caps.night_thinking_memory_limit),
        }
    }

    pub fn record_speech(&mut self, round: usize, timestamp: u64, speech: SpeechRecord) {
        self.speeches.push(round, timestamp, speech);
    }

    pub fn record_vote_observation(&mut self, round: usize, timestamp: u64, obs: VoteObservation) {
        self.votes.push(round, timestamp, obs);
    }

    pub fn record_night_action(&mut self, round: usize, timestamp: u64, result: ActionResult) {
        self.night_actions.push(round, timestamp, result);
    }

    pub fn record_death_observation(
        &mut self,
        round: usize,
        timestamp: u64,
        obs: DeathObservation,
    ) {
        self.observations.push(round, timestamp, obs);
    }

    pub fn record_night_discussion(
        &mut self,
        round: usize,
        timestamp: u64,
        entry: NightDiscussionEntry,
    ) {
        self.night_discussions.push(round, timestamp, entry);
    }

    pub fn record_thinking(&mut self, round: usize, timestamp: u64, entry: ThinkingEntry) {
        self.night_thinking.push(round, timestamp, entry);
    }

    pub fn speeches(&self) -> impl Iterator<Item = &MemoryEntry<SpeechRecord>> {
        self.speeches.iter()
    }

    pub fn speeches_this_round(&self, round: usize) -> impl Iterator<Item = &SpeechRecord> {
        self.speeches
            .iter()
            .filter(move |e| e.round == round)
            .map(|e| &e.payload)
    }

    pub fn night_discussions(&self) -> impl Iterator<Item = &MemoryEntry<NightDiscussionEntry>> {
        self.night_discussions.iter()
    }

    pub fn night_discussion_len(&self) -> usize {
        self.night_discussions.len()
    }

    pub fn night_thinking(&self) -> impl Iterator<Item = &MemoryEntry<ThinkingEntry>> {
        self.night_thinking.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speech(speaker: usize, round: usize) -> SpeechRecord {
        SpeechRecord {
            speaker: PlayerId(speaker),
            round,
            content: "hello".into(),
            context: mafia_game_lib::SpeechContext::Discussion,
        }
    }

    #[test]
    fn ring_buffer_drops_oldest_on_overflow() {
        let mut store = MemoryStore::new(MemoryCaps {
            max_memory_events: 2,
            night_discussion_memory_limit: 2,
            night_thinking_memory_limit: 2,
        });

        store.record_speech(1, 0, speech(1, 1));
        store.record_speech(1, 1, speech(2, 1));
        store.record_speech(2, 2, speech(3, 2));

        let rounds: Vec<_> = store.speeches().map(|e| e.round).collect();
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds, vec![1, 2]);
    }

    #[test]
    fn speeches_this_round_filters_by_round() {
        let mut store = MemoryStore::new(MemoryCaps::default());
        store.record_speech(1, 0, speech(1, 1));
        store.record_speech(2, 1, speech(2, 2));

        let this_round: Vec<_> = store.speeches_this_round(1).collect();
        assert_eq!(this_round.len(), 1);
        assert_eq!(this_round[0].speaker, PlayerId(1));
    }
}
