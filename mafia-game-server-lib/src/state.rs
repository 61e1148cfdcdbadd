//! Canonical mutable game state (C1): players, roles, liveness, round, phase, event log.
//!
//! `State` is the single owner of player liveness, the event log, and the phase counter
//! (§3 Ownership). Every mutation goes through one of its methods so that I1/I2/I6/I8 hold
//! by construction; the engine never mutates a `Player` field directly.

use std::sync::Arc;

use mafia_game_lib::DeathCause;
use mafia_game_lib::Event;
use mafia_game_lib::Faction;
use mafia_game_lib::FactionCounts;
use mafia_game_lib::Phase;
use mafia_game_lib::PlayerId;
use mafia_game_lib::PlayerView;
use mafia_game_lib::Role;
use mafia_game_lib::Snapshot;
use mafia_game_lib::SpeechContext;
use mafia_game_lib::SpeechRecord;
use mafia_game_lib::VoteOutcome;

/// Full internal record for one player. Never handed out directly; callers go through
/// [`State::project`] for a role-hidden view or [`State::player`] when they are entitled to
/// the true role (the engine itself, or an observer).
#[derive(Clone, Debug)]
pub struct Player {
    pub id: PlayerId,
    pub name: Arc<str>,
    pub role: Role,
    pub alive: bool,
    pub death_round: Option<usize>,
    pub death_cause: Option<DeathCause>,
    pub votes_received: usize,
}

impl Player {
    fn view(&self, hide_role: bool) -> PlayerView {
        PlayerView {
            id: self.id,
            name: Arc::clone(&self.name),
            alive: self.alive,
            role: if hide_role { None } else { Some(self.role) },
            death_round: self.death_round,
            death_cause: self.death_cause,
        }
    }
}

/// The canonical game state. Owns every player record and the append-only event log.
pub struct State {
    players: Vec<Player>,
    round: usize,
    phase: Phase,
    event_log: Vec<Event>,
    recent_speeches: Vec<SpeechRecord>,
    winner: Option<Option<Faction>>,
    reveal_roles_on_death: bool,
}

impl State {
    pub fn new(players: Vec<Player>, reveal_roles_on_death: bool) -> Self {
        Self {
            players,
            round: 1,
            phase: Phase::Preparation,
            event_log: Vec::new(),
            recent_speeches: Vec::new(),
            winner: None,
            reveal_roles_on_death,
        }
    }

    pub fn round(&self) -> usize {
        self.round
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn events(&self) -> &[Event] {
        &self.event_log
    }

    pub fn winner(&self) -> Option<Option<Faction>> {
        self.winner
    }

    pub fn is_running(&self) -> bool {
        self.winner.is_none()
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn alive_ids(&self) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|p| p.alive)
            .map(|p| p.id)
            .collect()
    }

    pub fn alive_ids_with_role(&self, role: Role) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|p| p.alive && p.role == role)
            .map(|p| p.id)
            .collect()
    }

    /// I1/I2: `len(alive) + len(dead) == N` holds by construction since `players` never
    /// changes length after setup and every player is exactly alive or not.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    fn push_event(&mut self, event: Event) {
        tracing::info!(?event, "event recorded");
        self.event_log.push(event);
    }

    /// Records a terminal invariant breach (§7): logs loudly, appends the event, and leaves
    /// the state unable to accept further mutation (`is_running` becomes false even though
    /// no winner was actually decided).
    pub fn abort_on_invariant_violation(&mut self, detail: impl Into<Box<str>>) {
        let detail = detail.into();
        tracing::error!(%detail, "state invariant violated, aborting game");
        self.push_event(Event::InvariantViolation {
            detail: detail.clone(),
        });
        // A violation is terminal exactly like a decided winner: no further mutation.
        if self.winner.is_none() {
            self.winner = Some(None);
        }
    }

    /// Removes a player from alive, appends to dead with the current round. Rejects
    /// (returns false) if the player isn't currently alive; illegal kills are non-fatal.
    pub fn kill_player(&mut self, id: PlayerId, cause: DeathCause) -> bool {
        if !self.is_running() {
            return false;
        }

        let round = self.round;
        let Some(player) = self.players.iter_mut().find(|p| p.id == id) else {
            tracing::warn!(?id, "kill_player: unknown player");
            return false;
        };

        if !player.alive {
            tracing::warn!(?id, "kill_player: player already dead");
            return false;
        }

        player.alive = false;
        player.death_round = Some(round);
        player.death_cause = Some(cause);

        self.push_event(Event::PlayerKilled {
            player: id,
            cause,
            round,
        });

        true
    }

    /// Succeeds iff the player is dead and died this same round (witch save window).
    pub fn revive_player(&mut self, id: PlayerId) -> bool {
        if !self.is_running() {
            return false;
        }

        let round = self.round;
        let Some(player) = self.players.iter_mut().find(|p| p.id == id) else {
            tracing::warn!(?id, "revive_player: unknown player");
            return false;
        };

        if player.alive || player.death_round != Some(round) {
            tracing::warn!(?id, "revive_player: not eligible for same-round revival");
            return false;
        }

        player.alive = true;
        player.death_round = None;
        player.death_cause = None;

        self.push_event(Event::PlayerRevived { player: id, round });

        true
    }

    /// Preparation→Night→Day→Discussion→Voting→Night (incrementing round). Any other call
    /// order is a caller bug, not a recoverable error, since it is only ever driven by the
    /// engine. Once a winner is decided (I6), this is a no-op: the phase is left untouched and
    /// no event is appended.
    pub fn advance_phase(&mut self) -> Phase {
        if !self.is_running() {
            return self.phase;
        }

        let next = match self.phase {
            Phase::Preparation => Phase::Night,
            Phase::Night => Phase::Day,
            Phase::Day => Phase::Discussion,
            Phase::Discussion => Phase::Voting,
            Phase::Voting => {
                self.round += 1;
                self.recent_speeches.clear();
                Phase::Night
            }
            Phase::GameEnd => Phase::GameEnd,
        };

        self.phase = next;
        self.push_event(Event::PhaseAdvanced {
            round: self.round,
            phase: next,
        });
        next
    }

    pub fn force_game_end(&mut self) {
        if !self.is_running() {
            return;
        }

        self.phase = Phase::GameEnd;
        self.push_event(Event::PhaseAdvanced {
            round: self.round,
            phase: Phase::GameEnd,
        });
    }

    pub fn record_speech(&mut self, speaker: PlayerId, content: Arc<str>, context: SpeechContext) {
        let round = self.round;
        let record = SpeechRecord {
            speaker,
            round,
            content,
            context,
        };
        self.recent_speeches.push(record);
        self.push_event(Event::SpeechGiven {
            speaker,
            round,
            context,
        });
    }

    pub fn record_vote_outcome(&mut self, outcome: &VoteOutcome, round: usize) {
        for voter_record in &outcome.per_voter {
            self.push_event(Event::VoteCast {
                voter: voter_record.voter,
                target: Some(voter_record.target),
                round,
                fallback: voter_record.fallback,
            });
        }
    }

    pub fn record_tie_break(&mut self, candidates: Vec<PlayerId>) {
        self.push_event(Event::TieBreak {
            round: self.round,
            candidates,
        });
    }

    pub fn record_vote_executed(
        &mut self,
        action: mafia_game_lib::TieAction,
        target: Option<PlayerId>,
    ) {
        self.push_event(Event::VoteExecuted {
            round: self.round,
            action,
            target,
        });
    }

    pub fn record_night_action(
        &mut self,
        actor: PlayerId,
        kind: mafia_game_lib::ActionKind,
        target: Option<PlayerId>,
        success: bool,
    ) {
        self.push_event(Event::NightActionTaken {
            actor,
            round: self.round,
            kind,
            target,
            success,
        });
    }

    /// Evaluates victory (C7) and, if set, records `GameEnded` and freezes further mutation.
    /// Returns the decided winner, if any (`None` faction inside `Some` means a draw).
    pub fn evaluate_victory(&mut self) -> Option<Option<Faction>> {
        if self.winner.is_some() {
            return self.winner;
        }

        let counts = self.faction_counts();
        let decided = if counts.total_alive == 0 {
            Some(None)
        } else if counts.villager_faction == 0 && counts.werewolves > 0 {
            Some(Some(Faction::Werewolves))
        } else if counts.werewolves == 0 && counts.villager_faction > 0 {
            Some(Some(Faction::Villagers))
        } else {
            None
        };

        if let Some(winner) = decided {
            self.winner = Some(winner);
            self.push_event(Event::GameEnded { winner });
        }

        decided
    }

    pub fn faction_counts(&self) -> FactionCounts {
        let mut counts = FactionCounts::default();
        for player in self.players.iter().filter(|p| p.alive) {
            counts.total_alive += 1;
            match player.role {
                Role::Werewolf => counts.werewolves += 1,
                Role::Villager => {
                    counts.villagers_plain += 1;
                    counts.villager_faction += 1;
                }
                Role::Seer | Role::Witch => counts.villager_faction += 1,
            }
        }
        counts
    }

    /// Role-hidden-or-not projection of the whole game (I7).
    pub fn project(&self, hide_roles: bool) -> Snapshot {
        let (alive, dead): (Vec<_>, Vec<_>) = self.players.iter().partition(|p| p.alive);

        let reveal_dead_roles = !hide_roles || self.reveal_roles_on_death;

        Snapshot {
            round: self.round,
            phase: self.phase,
            alive: alive.iter().map(|p| p.view(hide_roles)).collect(),
            dead: dead
                .iter()
                .map(|p| p.view(hide_roles && !reveal_dead_roles))
                .collect(),
            recent_speeches: self.recent_speeches.clone(),
            faction_counts: self.faction_counts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_state() -> State {
        let players = vec![
            Player {
                id: PlayerId(1),
                name: Arc::from("alice"),
                role: Role::Villager,
                alive: true,
                death_round: None,
                death_cause: None,
                votes_received: 0,
            },
            Player {
                id: PlayerId(2),
                name: Arc::from("bob"),
                role: Role::Werewolf,
                alive: true,
                death_round: None,
                death_cause: None,
                votes_received: 0,
            },
        ];
        State::new(players, false)
    }

    #[test]
    fn kill_then_revive_same_round_restores_fields() {
        let mut state = make_state();
        let before = state.player(PlayerId(1)).cloned().unwrap();

        assert!(state.kill_player(PlayerId(1), DeathCause::WerewolfKill));
        assert!(state.revive_player(PlayerId(1)));

        let after = state.player(PlayerId(1)).cloned().unwrap();
        assert_eq!(before.alive, after.alive);
        assert_eq!(before.death_round, after.death_round);
        assert_eq!(before.death_cause, after.death_cause);
    }

    #[test]
    fn kill_rejects_already_dead_player() {
        let mut state = make_state();
        assert!(state.kill_player(PlayerId(1), DeathCause::WerewolfKill));
        assert!(!state.kill_player(PlayerId(1), DeathCause::Exile));
    }

    #[test]
    fn revive_rejects_after_round_advances() {
        let mut state = make_state();
        assert!(state.kill_player(PlayerId(1), DeathCause::WerewolfKill));
        state.advance_phase(); // Preparation -> Night
        // force an artificial round bump to simulate "not this round anymore"
        for _ in 0..4 {
            state.advance_phase();
        }
        assert!(!state.revive_player(PlayerId(1)));
    }

    #[test]
    fn project_hides_roles_for_live_players() {
        let state = make_state();
        let snapshot = state.project(true);
        assert!(snapshot.alive.iter().all(|p| p.role.is_none()));
    }

    #[test]
    fn faction_counts_partitions_correctly() {
        let state = make_state();
        let counts = state.faction_counts();
        assert_eq!(counts.total_alive, 2);
        assert_eq!(counts.werewolves, 1);
        assert_eq!(counts.villager_faction, 1);
    }

    #[test]
    fn evaluate_victory_declares_villagers_when_werewolves_extinct() {
        let mut state = make_state();
        state.kill_player(PlayerId(2), DeathCause::Exile);
        let winner = state.evaluate_victory();
        assert_eq!(winner, Some(Some(Faction::Villagers)));
        assert!(!state.is_running());
    }

    #[test]
    fn no_mutation_after_winner_decided() {
        let mut state = make_state();
        state.kill_player(PlayerId(2), DeathCause::Exile);
        state.evaluate_victory();
        let events_before = state.events().len();
        assert!(!state.kill_player(PlayerId(1), DeathCause::Exile));
        assert_eq!(state.events().len(), events_before);
    }
}
