//! Data structures shared by the game engine and the pluggable per-seat policies.
//!
//! Nothing in this crate depends on how a policy makes a decision; it only fixes the
//! shapes policies read (`Snapshot`) and produce (`ActionResult`, speeches, votes) and
//! the shapes the engine publishes as its append-only record (`Event`).

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

/// Identifier for a seat. Assigned 1..N at setup and never reused.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct PlayerId(pub usize);

/// Which side a player is fighting for.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Faction {
    Villagers,
    Werewolves,
}

/// A player's fixed role, assigned at setup and immutable thereafter.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Role {
    Villager,
    Werewolf,
    Seer,
    Witch,
}

impl Role {
    pub fn faction(&self) -> Faction {
        match self {
            Role::Werewolf => Faction::Werewolves,
            Role::Villager | Role::Seer | Role::Witch => Faction::Villagers,
        }
    }
}

/// Why a player left the game.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum DeathCause {
    WerewolfKill,
    WitchPoison,
    Exile,
}

/// The phase the game is currently in.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Phase {
    Preparation,
    Night,
    Day,
    Discussion,
    Voting,
    GameEnd,
}

/// Tags the reason a speech was recorded, so a policy can tell a normal remark apart
/// from a forced one.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum SpeechContext {
    Discussion,
    TieDefence,
    ExileLastWords,
}

/// What kind of result a night action produced.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum ActionKind {
    Kill,
    Divine,
    Save,
    Poison,
    NoAction,
    Reflect,
}

/// Uniform result of any seat's `NightAction` call (see the role-specific design sections
/// for how each role arrives at one).
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ActionResult {
    pub kind: ActionKind,
    pub target: Option<PlayerId>,
    pub success: bool,
    pub message: Box<str>,
}

impl ActionResult {
    pub fn no_action(message: impl Into<Box<str>>) -> Self {
        Self {
            kind: ActionKind::NoAction,
            target: None,
            success: false,
            message: message.into(),
        }
    }
}

/// Role-conditioned extra information handed to `NightAction` alongside a [`Snapshot`].
///
/// Every field is populated conservatively: a seat ignores the fields it has no role-given
/// reason to use, and the witch's `tonight_victim` is `None` whenever she's lost her
/// antidote, regardless of whether anyone is actually marked to die tonight.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct NightExtras {
    pub seer_candidates: Vec<PlayerId>,
    /// The player the werewolves intend to kill tonight, visible to the witch only while
    /// she still holds her antidote.
    pub tonight_victim: Option<PlayerId>,
    pub can_save: bool,
    pub can_poison: bool,
    pub poison_candidates: Vec<PlayerId>,
}

/// Outcome of resolving a tied vote.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum TieAction {
    Elimination,
    RevoteRequired,
    SkipElimination,
}

/// A single voter's recorded ballot, including whether it was an engine-supplied fallback.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct VoterRecord {
    pub voter: PlayerId,
    pub target: PlayerId,
    pub fallback: bool,
}

/// Tally and resolution of one `ConductVote` call.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub tally: HashMap<PlayerId, usize>,
    pub action: TieAction,
    /// The player to exile, present only when `action == Elimination`.
    pub target: Option<PlayerId>,
    pub per_voter: Vec<VoterRecord>,
}

/// Role-hidden-or-not view of one player, as handed to a policy or observer.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: Arc<str>,
    pub alive: bool,
    /// `None` when the viewer is not entitled to see this player's role.
    pub role: Option<Role>,
    pub death_round: Option<usize>,
    pub death_cause: Option<DeathCause>,
}

/// One recorded public utterance, as mirrored into every live seat's memory.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct SpeechRecord {
    pub speaker: PlayerId,
    pub round: usize,
    pub content: Arc<str>,
    pub context: SpeechContext,
}

/// Census of living players by faction.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct FactionCounts {
    pub villagers_plain: usize,
    pub villager_faction: usize,
    pub werewolves: usize,
    pub total_alive: usize,
}

/// A role-hidden-or-not projection of the whole game, safe to hand to a policy.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub round: usize,
    pub phase: Phase,
    pub alive: Vec<PlayerView>,
    pub dead: Vec<PlayerView>,
    /// Speeches given so far in the current round, in the order they were given.
    pub recent_speeches: Vec<SpeechRecord>,
    pub faction_counts: FactionCounts,
}

impl Snapshot {
    pub fn player(&self, id: PlayerId) -> Option<&PlayerView> {
        self.alive
            .iter()
            .chain(self.dead.iter())
            .find(|p| p.id == id)
    }
}

/// Append-only record of everything that happened in a game, in the order it happened.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Event {
    PhaseAdvanced {
        round: usize,
        phase: Phase,
    },
    PlayerKilled {
        player: PlayerId,
        cause: DeathCause,
        round: usize,
    },
    PlayerRevived {
        player: PlayerId,
        round: usize,
    },
    SpeechGiven {
        speaker: PlayerId,
        round: usize,
        context: SpeechContext,
    },
    VoteCast {
        voter: PlayerId,
        target: Option<PlayerId>,
        round: usize,
        fallback: bool,
    },
    NightActionTaken {
        actor: PlayerId,
        round: usize,
        kind: ActionKind,
        target: Option<PlayerId>,
        success: bool,
    },
    TieBreak {
        round: usize,
        candidates: Vec<PlayerId>,
    },
    VoteExecuted {
        round: usize,
        action: TieAction,
        target: Option<PlayerId>,
    },
    GameEnded {
        winner: Option<Faction>,
    },
    InvariantViolation {
        detail: Box<str>,
    },
}
