//! Abstract seat (C3): the uniform `Agent` contract plus role-specific private state.
//!
//! A [`Policy`] is the pluggable, opaque decision-maker behind a seat. The engine never
//! inspects its reasoning, only the `ActionResult`/`String`/`PlayerId` it returns. It is an
//! `async` trait so a seat backed by a remote LLM call can be dispatched concurrently
//! alongside its siblings (§5) without blocking the engine thread.

use std::sync::Arc;

use async_trait::async_trait;
use mafia_game_lib::ActionResult;
use mafia_game_lib::DeathCause;
use mafia_game_lib::NightExtras;
use mafia_game_lib::PlayerId;
use mafia_game_lib::Role;
use mafia_game_lib::Snapshot;
use mafia_game_lib::SpeechContext;

use crate::memory::MemoryCaps;
use crate::memory::MemoryStore;

/// The five-method seat contract (§4.2). Implementations are free to call out to any
/// backend; the engine only awaits the result with a timeout (§5).
#[async_trait]
pub trait Policy: Send + Sync {
    /// Daytime remark. `context` distinguishes ordinary discussion from a tie defence or
    /// exile last words; the engine stores the result opaquely either way.
    async fn speak(&self, snapshot: &Snapshot, context: SpeechContext) -> String;

    /// Must return a member of `candidates`; the engine substitutes a random legal choice
    /// otherwise (fallback, §7).
    async fn vote(&self, snapshot: &Snapshot, candidates: &[PlayerId]) -> PlayerId;

    /// Role-specific night decision. `extras` carries the role-conditioned information the
    /// engine is willing to disclose this night (e.g. the witch's tonight-victim datum,
    /// gated on her still holding the antidote).
    async fn night_action(&self, snapshot: &Snapshot, extras: &NightExtras) -> ActionResult;

    /// One turn of werewolf-private night dialogue (§4.3). Only ever called for live
    /// werewolves; `transcript_so_far` holds every statement made in the current dialogue so
    /// far, across all three passes.
    async fn night_discussion(
        &self,
        snapshot: &Snapshot,
        transcript_so_far: &[String],
        pass: &'static str,
    ) -> String;

    /// Private end-of-day reflection (C8). Never observed by any other seat.
    async fn reflect(&self, snapshot: &Snapshot) -> String;

    /// Side-effect-free signal; implementations may use it to update internal belief state.
    async fn observe_death(&self, _player: PlayerId, _cause: DeathCause) {}

    /// Side-effect-free signal; implementations may use it to update internal belief state.
    async fn observe_vote(&self, _voter: PlayerId, _target: Option<PlayerId>) {}
}

/// Seer's private divination ledger (§3 Role-private state). Once a player is divined the
/// result is immutable.
#[derive(Default, Debug, Clone)]
pub struct SeerState {
    pub vision_results: std::collections::HashMap<PlayerId, mafia_game_lib::Faction>,
}

/// Witch's private potion ledger. `has_antidote`/`has_poison` are monotonically
/// non-increasing (I4); `saved`/`poisoned` record at most one entry each (I5).
#[derive(Debug, Clone)]
pub struct WitchState {
    pub has_antidote: bool,
    pub has_poison: bool,
    pub saved: Vec<PlayerId>,
    pub poisoned: Vec<PlayerId>,
}

impl Default for WitchState {
    fn default() -> Self {
        Self {
            has_antidote: true,
            has_poison: true,
            saved: Vec::new(),
            poisoned: Vec::new(),
        }
    }
}

/// Werewolf's fixed teammate roster, set once at initialization (§3 Ownership).
#[derive(Default, Debug, Clone)]
pub struct WerewolfState {
    pub teammates: Vec<PlayerId>,
}

/// Role-private side channel, accessible only to the component that owns that role (C4/C5a/C5b).
#[derive(Debug, Clone)]
pub enum RoleState {
    Villager,
    Werewolf(WerewolfState),
    Seer(SeerState),
    Witch(WitchState),
}

/// One seat: identity, role, pluggable policy, private role state, and private memory.
pub struct Agent {
    pub id: PlayerId,
    pub name: Arc<str>,
    pub role: Role,
    /// `Arc`, not `Box`: dispatching a call via `tokio::spawn` (§5) needs a `'static`
    /// future, which means the task must own its own handle to the policy rather than
    /// borrow one tied to the engine's `Vec<Agent>`.
    pub policy: Arc<dyn Policy>,
    pub role_state: RoleState,
    pub memory: MemoryStore,
}

impl Agent {
    pub fn new(id: PlayerId, name: Arc<str>, role: Role, policy: Arc<dyn Policy>, caps: MemoryCaps) -> Self {
        let role_state = match role {
            Role::Villager => RoleState::Villager,
            Role::Werewolf => RoleState::Werewolf(WerewolfState::default()),
            Role::Seer => RoleState::Seer(SeerState::default()),
            Role::Witch => RoleState::Witch(WitchState::default()),
        };

        Self {
            id,
            name,
            role,
            policy,
            role_state,
            memory: MemoryStore::new(caps),
        }
    }

    pub fn seer_state(&self) -> Option<&SeerState> {
        match &self.role_state {
            RoleState::Seer(s) => Some(s),
            _ => None,
        }
    }

    pub fn seer_state_mut(&mut self) -> Option<&mut SeerState> {
        match &mut self.role_state {
            RoleState::Seer(s) => Some(s),
            _ => None,
        }
    }

    pub fn witch_state(&self) -> Option<&WitchState> {
        match &self.role_state {
            RoleState::Witch(w) => Some(w),
            _ => None,
        }
    }

    pub fn witch_state_mut(&mut self) -> Option<&mut WitchState> {
        match &mut self.role_state {
            RoleState::Witch(w) => Some(w),
            _ => None,
        }
    }

    pub fn werewolf_state(&self) -> Option<&WerewolfState> {
        match &self.role_state {
            RoleState::Werewolf(w) => Some(w),
            _ => None,
        }
    }
}
