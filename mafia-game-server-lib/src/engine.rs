//! Top-level phase scheduler (C9): orchestrates C4-C8 against C1-C3, enforces invariants and
//! victory short-circuiting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mafia_game_lib::ActionKind;
use mafia_game_lib::ActionResult;
use mafia_game_lib::DeathCause;
use mafia_game_lib::Event;
use mafia_game_lib::Faction;
use mafia_game_lib::PlayerId;
use mafia_game_lib::Role;
use mafia_game_lib::SpeechContext;
use mafia_game_lib::TieAction;
use rand::Rng;
use tap::Tap;

use crate::agent::Agent;
use crate::agent::Policy;
use crate::consts::FALLBACK_SPEECH;
use crate::dayend;
use crate::dispatch::CallOutcome;
use crate::dispatch::call_with_timeout;
use crate::error::Error;
use crate::memory::MemoryCaps;
use crate::memory::DeathObservation;
use crate::seer;
use crate::state::Player;
use crate::state::State;
use crate::voting;
use crate::werewolf;
use crate::witch;

/// Count of each role to assign at setup. Must sum to the player list length (A1).
#[derive(Copy, Clone, Debug, Default)]
pub struct RoleCounts {
    pub villager: usize,
    pub werewolf: usize,
    pub seer: usize,
    pub witch: usize,
}

impl RoleCounts {
    pub fn total(&self) -> usize {
        self.villager + self.werewolf + self.seer + self.witch
    }
}

/// Top-level configuration, validated eagerly in [`Engine::new`]. Invalid configuration is a
/// setup-time [`Error::InvalidConfig`] enumerating every offending key, never a panic.
#[derive(Clone, Debug)]
pub struct GameConfig {
    pub roles: RoleCounts,
    /// Absent ⇒ engine does not terminate on round count.
    pub max_rounds: Option<usize>,
    pub memory: MemoryCaps,
    pub vote_timeout: Duration,
    pub night_discussion_timeout: Duration,
    pub reflection_timeout: Duration,
    pub reveal_roles_on_death: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            roles: RoleCounts::default(),
            max_rounds: None,
            memory: MemoryCaps::default(),
            vote_timeout: Duration::from_secs(30),
            night_discussion_timeout: Duration::from_secs(30),
            reflection_timeout: Duration::from_secs(30),
            reveal_roles_on_death: false,
        }
    }
}

fn validate_config(config: &GameConfig, player_count: usize) -> Result<(), Error> {
    let mut offending = Vec::new();

    if config.roles.werewolf == 0 {
        offending.push("roles.werewolf".to_string());
    }
    if !(5..=12).contains(&player_count) {
        offending.push("total_players".to_string());
    }
    if config.roles.total() != player_count {
        offending.push("roles".to_string());
    }
    if config.roles.werewolf * 2 >= player_count {
        offending.push("roles.werewolf".to_string());
    }
    if let Some(max_rounds) = config.max_rounds {
        if !(1..=100).contains(&max_rounds) {
            offending.push("max_rounds".to_string());
        }
    }

    if offending.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidConfig {
            offending_keys: offending,
        })
    }
}

/// One player supplied at setup: display name, assigned role, and the policy backing them.
pub struct Seat {
    pub name: Arc<str>,
    pub role: Role,
    pub policy: Arc<dyn Policy>,
}

/// The engine: canonical state plus every seat, driven by a seedable RNG so every shuffle,
/// tie-break, and fallback choice is reproducible (§9).
pub struct Engine<R: Rng> {
    state: State,
    agents: Vec<Agent>,
    config: GameConfig,
    rng: R,
}

impl<R: Rng> Engine<R> {
    pub fn new(config: GameConfig, seats: Vec<Seat>, mut rng: R) -> Result<Self, Error> {
        validate_config(&config, seats.len())?;

        let mut ids: Vec<PlayerId> = (1..=seats.len()).map(PlayerId).collect();
        // Deterministic given the injected RNG: callers that want a reproducible role
        // assignment pass a seeded RNG (`StepRng` in tests); nothing here touches the OS RNG.
        use rand::seq::SliceRandom;
        ids.shuffle(&mut rng);

        let mut players = Vec::with_capacity(seats.len());
        let mut agents = Vec::with_capacity(seats.len());

        for (seat, id) in seats.into_iter().zip(ids) {
            players.push(Player {
                id,
                name: Arc::clone(&seat.name),
                role: seat.role,
                alive: true,
                death_round: None,
                death_cause: None,
                votes_received: 0,
            });
            agents.push(Agent::new(id, seat.name, seat.role, seat.policy, config.memory));
        }

        let werewolves: Vec<PlayerId> = players
            .iter()
            .filter(|p| p.role == Role::Werewolf)
            .map(|p| p.id)
            .collect();

        for agent in agents.iter_mut() {
            if let crate::agent::RoleState::Werewolf(ws) = &mut agent.role_state {
                ws.teammates = werewolves.iter().copied().filter(|&id| id != agent.id).collect();
            }
        }

        let state = State::new(players, config.reveal_roles_on_death);

        Ok(Self {
            state,
            agents,
            config,
            rng,
        })
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn events(&self) -> &[Event] {
        self.state.events()
    }

    pub fn winner(&self) -> Option<Option<Faction>> {
        self.state.winner()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub(crate) fn agent_mut(&mut self, id: PlayerId) -> Option<&mut Agent> {
        self.agents.iter_mut().find(|a| a.id == id)
    }

    /// Drives the game to completion: repeats Night→Day→Discussion→Voting→(day-end) until a
    /// winner is set or `max_rounds` is exhausted.
    pub async fn run(&mut self) {
        loop {
            if let Some(max_rounds) = self.config.max_rounds {
                if self.state.round() > max_rounds {
                    tracing::info!(max_rounds, "max_rounds exceeded, forcing game end");
                    self.state.force_game_end();
                    break;
                }
            }

            self.state.advance_phase(); // -> Night
            self.run_night().await;
            if !self.state.is_running() {
                break;
            }

            self.state.advance_phase(); // -> Day
            self.run_day();

            self.state.advance_phase(); // -> Discussion
            self.run_discussion().await;

            self.state.advance_phase(); // -> Voting
            let exiled = self.run_voting().await;
            if !self.state.is_running() {
                break;
            }

            if let Some(exiled) = exiled {
                self.run_dayend(exiled).await;
                if !self.state.is_running() {
                    break;
                }
            }

            // Loop: advance_phase from Voting rolls the round counter and returns to Night.
        }
    }

    pub(crate) async fn run_night(&mut self) {
        let snapshot = self.state.project(true);
        let live_werewolves = self.state.alive_ids_with_role(Role::Werewolf);

        let decision = werewolf::decide(
            &mut self.agents,
            &live_werewolves,
            &snapshot,
            self.config.night_discussion_timeout,
            &mut self.rng,
        )
        .await;

        if let (true, Some(actor)) = (decision.success, live_werewolves.first().copied()) {
            self.state.record_night_action(actor, ActionKind::Kill, decision.target, true);
        }

        let kill_target = decision.target;

        // Seer divination: engine-computed target (C5a), policy is not consulted for the
        // choice itself; only the engine ever sees ground-truth roles.
        let seer_id = self.state.alive_ids_with_role(Role::Seer).into_iter().next();
        if let Some(seer_id) = seer_id {
            let already_divined = self
                .agents
                .iter()
                .find(|a| a.id == seer_id)
                .and_then(|a| a.seer_state())
                .map(|s| s.vision_results.clone())
                .unwrap_or_default();

            let candidates = seer::candidate_set(seer_id, &snapshot, &already_divined);
            if !candidates.is_empty() {
                let suspicions: HashMap<PlayerId, f64> = HashMap::new();
                let live_count = snapshot.alive.len();
                let values = seer::divination_values(&candidates, &suspicions, &snapshot.recent_speeches, snapshot.round, live_count);

                if let Some(target) = seer::choose_target(&values) {
                    let target_role = self.state.player(target).map(|p| p.role);
                    if let Some(target_role) = target_role {
                        let faction = seer::resolve_truth(target_role);
                        if let Some(agent) = self.agent_mut(seer_id) {
                            if let Some(seer_state) = agent.seer_state_mut() {
                                seer_state.vision_results.insert(target, faction);
                            }
                        }
                        self.state.record_night_action(seer_id, ActionKind::Divine, Some(target), true);
                    }
                }
            }
        }

        // Witch: the one role whose night decision genuinely routes through the policy.
        let witch_id = self.state.alive_ids_with_role(Role::Witch).into_iter().next();
        let mut save_target = None;
        let mut poison_target = None;

        if let Some(witch_id) = witch_id {
            let has_action = self
                .agents
                .iter()
                .find(|a| a.id == witch_id)
                .and_then(|a| a.witch_state())
                .map(witch::has_any_action_available)
                .unwrap_or(false);

            if has_action {
                let live_non_witch = snapshot
                    .alive
                    .iter()
                    .map(|p| p.id)
                    .filter(|&id| id != witch_id)
                    .collect::<Vec<_>>();

                let witch_state_snapshot = self
                    .agents
                    .iter()
                    .find(|a| a.id == witch_id)
                    .and_then(|a| a.witch_state())
                    .cloned()
                    .expect("witch seat has witch role state");

                let extras = witch::build_extras(witch_id, &witch_state_snapshot, kill_target, &live_non_witch);

                let policy = self
                    .agents
                    .iter()
                    .find(|a| a.id == witch_id)
                    .map(|a| Arc::clone(&a.policy))
                    .expect("witch seat exists");

                let snapshot_clone = snapshot.clone();
                let extras_clone = extras.clone();
                let outcome = call_with_timeout(self.config.vote_timeout, async move {
                    policy.night_action(&snapshot_clone, &extras_clone).await
                })
                .await;

                let decision = match outcome {
                    CallOutcome::Ok(result) => result,
                    CallOutcome::Failed { cause } => {
                        tracing::warn!(seat = witch_id.0, cause = cause.as_str(), "witch night action failed");
                        ActionResult::no_action("agent failed to respond")
                    }
                };

                if let Some(agent) = self.agent_mut(witch_id) {
                    if let Some(witch_state) = agent.witch_state_mut() {
                        let applied = witch::apply_decision(witch_id, witch_state, &extras, decision);
                        match applied.kind {
                            ActionKind::Save => save_target = applied.target,
                            ActionKind::Poison => poison_target = applied.target,
                            _ => {}
                        }
                        self.state.record_night_action(witch_id, applied.kind, applied.target, applied.success);
                        agent.memory.record_night_action(snapshot.round, 0, applied);
                    }
                }
            }
        }

        // Resolution order fixed by §5: kill candidate -> save -> poison -> apply.
        let mut deaths: Vec<(PlayerId, DeathCause)> = Vec::new();
        if let Some(target) = kill_target {
            deaths.push((target, DeathCause::WerewolfKill));
        }
        if let Some(saved) = save_target {
            deaths.retain(|&(id, _)| id != saved);
        }
        if let Some(poisoned) = poison_target {
            deaths.push((poisoned, DeathCause::WitchPoison));
        }

        let died: Vec<PlayerId> = deaths.iter().map(|&(id, _)| id).collect();
        for (id, cause) in deaths {
            self.state.kill_player(id, cause);
        }

        let round = self.state.round();
        for &dead in &died {
            let cause = self.state.player(dead).and_then(|p| p.death_cause).unwrap_or(DeathCause::WerewolfKill);
            for agent in self.agents.iter_mut().filter(|a| a.id != dead) {
                agent.memory.record_death_observation(round, 0, DeathObservation { player: dead, cause });
                agent.policy.observe_death(dead, cause).await;
            }
        }

        self.state.evaluate_victory();
        self.log_win_probability();
    }

    pub(crate) fn run_day(&mut self) {
        let deaths: Vec<_> = self
            .state
            .players()
            .iter()
            .filter(|p| p.death_round == Some(self.state.round()) && !p.alive)
            .map(|p| p.id)
            .collect();

        if deaths.is_empty() {
            tracing::info!(round = self.state.round(), "peaceful night");
        } else {
            tracing::info!(round = self.state.round(), ?deaths, "night deaths announced");
        }
    }

    pub(crate) async fn run_discussion(&mut self) {
        let mut live: Vec<PlayerId> = self.state.alive_ids();
        live.sort();

        for speaker in live {
            let snapshot = self.state.project(true);
            let policy = self
                .agents
                .iter()
                .find(|a| a.id == speaker)
                .map(|a| Arc::clone(&a.policy))
                .expect("speaker is a live agent");

            let snapshot_clone = snapshot.clone();
            let outcome = call_with_timeout(self.config.vote_timeout, async move {
                policy.speak(&snapshot_clone, SpeechContext::Discussion).await
            })
            .await;

            let content: Arc<str> = match outcome {
                CallOutcome::Ok(text) => Arc::from(text),
                CallOutcome::Failed { cause } => {
                    tracing::warn!(seat = speaker.0, cause = cause.as_str(), "speak call failed");
                    Arc::from(FALLBACK_SPEECH)
                }
            };

            self.state.record_speech(speaker, Arc::clone(&content), SpeechContext::Discussion);

            let round = self.state.round();
            let record = mafia_game_lib::SpeechRecord {
                speaker,
                round,
                content,
                context: SpeechContext::Discussion,
            };
            for agent in self.agents.iter_mut() {
                agent.memory.record_speech(round, 0, record.clone());
            }
        }
    }

    /// Returns the exiled player, if any, and handles the single re-speech/re-vote loop.
    pub(crate) async fn run_voting(&mut self) -> Option<PlayerId> {
        let live = self.state.alive_ids();
        let snapshot = self.state.project(true);

        let mut outcome = voting::conduct_vote(
            &self.agents,
            &live,
            &live,
            false,
            &snapshot,
            self.config.vote_timeout,
            &mut self.rng,
        )
        .await;

        self.state.record_vote_outcome(&outcome, self.state.round());
        self.broadcast_vote_observations(&outcome).await;

        if outcome.action == TieAction::RevoteRequired {
            let max = outcome.tally.values().copied().max().unwrap_or(0);
            let tied: Vec<PlayerId> = outcome
                .tally
                .iter()
                .filter(|&(_, &count)| count == max)
                .map(|(&id, _)| id)
                .collect::<Vec<_>>()
                .tap_mut(|v| v.sort());
            self.state.record_tie_break(tied.clone());

            for &candidate in &tied {
                let policy = self
                    .agents
                    .iter()
                    .find(|a| a.id == candidate)
                    .map(|a| Arc::clone(&a.policy))
                    .expect("tied candidate is a live agent");
                let snapshot_clone = snapshot.clone();

                let result = call_with_timeout(self.config.vote_timeout, async move {
                    policy.speak(&snapshot_clone, SpeechContext::TieDefence).await
                })
                .await;

                let content: Arc<str> = match result {
                    CallOutcome::Ok(text) => Arc::from(text),
                    CallOutcome::Failed { .. } => Arc::from(FALLBACK_SPEECH),
                };

                self.state.record_speech(candidate, content, SpeechContext::TieDefence);
            }

            let revote_snapshot = self.state.project(true);
            outcome = voting::conduct_vote(
                &self.agents,
                &live,
                &tied,
                true,
                &revote_snapshot,
                self.config.vote_timeout,
                &mut self.rng,
            )
            .await;
            self.state.record_vote_outcome(&outcome, self.state.round());
            self.broadcast_vote_observations(&outcome).await;
        }

        self.state.record_vote_executed(outcome.action, outcome.target);

        let exiled = match outcome.action {
            TieAction::Elimination => outcome.target,
            _ => None,
        };

        if let Some(exiled) = exiled {
            self.state.kill_player(exiled, DeathCause::Exile);

            let round = self.state.round();
            for agent in self.agents.iter_mut().filter(|a| a.id != exiled) {
                agent.memory.record_death_observation(
                    round,
                    0,
                    DeathObservation {
                        player: exiled,
                        cause: DeathCause::Exile,
                    },
                );
                agent.policy.observe_death(exiled, DeathCause::Exile).await;
            }

            self.state.evaluate_victory();
            self.log_win_probability();
        }

        exiled
    }

    /// Broadcasts every cast ballot (including engine-supplied fallbacks) into every live
    /// seat's `votes` memory stream and the seat's `Policy::observe_vote` hook (§4.2). Voters
    /// see their own ballot mirrored back, same as in discussion where a speaker's own words
    /// land in their memory too.
    async fn broadcast_vote_observations(&mut self, outcome: &mafia_game_lib::VoteOutcome) {
        let round = self.state.round();
        for voter_record in &outcome.per_voter {
            for agent in self.agents.iter_mut() {
                agent.memory.record_vote_observation(
                    round,
                    0,
                    crate::memory::VoteObservation {
                        voter: voter_record.voter,
                        target: Some(voter_record.target),
                    },
                );
                agent.policy.observe_vote(voter_record.voter, Some(voter_record.target)).await;
            }
        }
    }

    /// Emits the §4.7 supplemental win-probability estimate as a `tracing` event. Advisory
    /// only, never consulted for the actual win/continue decision on [`State`].
    fn log_win_probability(&self) {
        let counts = self.state.faction_counts();
        let seer_alive = self.state.alive_ids_with_role(Role::Seer).first().is_some();
        if let Some(p) = crate::victory::werewolf_win_probability(&counts, seer_alive) {
            tracing::info!(round = self.state.round(), werewolf_win_probability = p, "win probability estimate");
        }
    }

    pub(crate) async fn run_dayend(&mut self, exiled: PlayerId) {
        let snapshot = self.state.project(true);
        let round = self.state.round();

        let words = dayend::last_words(&self.agents, exiled, &snapshot, self.config.vote_timeout).await;
        self.state.record_speech(exiled, Arc::from(words.as_str()), SpeechContext::ExileLastWords);
        dayend::broadcast_last_words(&mut self.agents, exiled, round, &words);

        if self.state.is_running() {
            let snapshot = self.state.project(true);
            dayend::run_reflections(&mut self.agents, &snapshot, self.config.reflection_timeout).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mafia_game_lib::ActionResult;
    use mafia_game_lib::NightExtras;
    use mafia_game_lib::Snapshot;
    use rand::rngs::mock::StepRng;

    /// A fully scripted, deterministic stand-in for an LLM backend.
    struct ScriptedPolicy {
        vote_for: std::sync::Mutex<Option<PlayerId>>,
        night: std::sync::Mutex<Option<ActionResult>>,
    }

    impl ScriptedPolicy {
        fn new() -> Self {
            Self {
                vote_for: std::sync::Mutex::new(None),
                night: std::sync::Mutex::new(None),
            }
        }

        fn voting_for(target: PlayerId) -> Self {
            Self {
                vote_for: std::sync::Mutex::new(Some(target)),
                night: std::sync::Mutex::new(None),
            }
        }
    }

    #[async_trait::async_trait]
    impl Policy for ScriptedPolicy {
        async fn speak(&self, _snapshot: &Snapshot, _context: SpeechContext) -> String {
            "nothing to report".to_string()
        }

        async fn vote(&self, _snapshot: &Snapshot, candidates: &[PlayerId]) -> PlayerId {
            self.vote_for.lock().unwrap().filter(|t| candidates.contains(t)).unwrap_or(candidates[0])
        }

        async fn night_action(&self, _snapshot: &Snapshot, _extras: &NightExtras) -> ActionResult {
            self.night
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| ActionResult::no_action("default"))
        }

        async fn night_discussion(&self, _snapshot: &Snapshot, _transcript: &[String], _pass: &'static str) -> String {
            "let's consider our options".to_string()
        }

        async fn reflect(&self, _snapshot: &Snapshot) -> String {
            "noted".to_string()
        }
    }

    fn seats(n: usize, roles: RoleCounts) -> Vec<Seat> {
        let mut role_seq = Vec::with_capacity(n);
        role_seq.extend(std::iter::repeat(Role::Werewolf).take(roles.werewolf));
        role_seq.extend(std::iter::repeat(Role::Seer).take(roles.seer));
        role_seq.extend(std::iter::repeat(Role::Witch).take(roles.witch));
        role_seq.extend(std::iter::repeat(Role::Villager).take(roles.villager));

        role_seq
            .into_iter()
            .enumerate()
            .map(|(i, role)| Seat {
                name: Arc::from(format!("p{i}")),
                role,
                policy: Arc::new(ScriptedPolicy::new()),
            })
            .collect()
    }

    #[test]
    fn rejects_config_with_zero_werewolves() {
        let config = GameConfig {
            roles: RoleCounts {
                villager: 5,
                werewolf: 0,
                seer: 0,
                witch: 0,
            },
            ..GameConfig::default()
        };
        let result = Engine::new(config, seats(5, RoleCounts { villager: 5, ..Default::default() }), StepRng::new(0, 1));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_role_count_mismatch() {
        let config = GameConfig {
            roles: RoleCounts {
                villager: 10,
                werewolf: 1,
                seer: 0,
                witch: 0,
            },
            ..GameConfig::default()
        };
        let result = Engine::new(config, seats(5, RoleCounts { villager: 4, werewolf: 1, ..Default::default() }), StepRng::new(0, 1));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn accepts_valid_minimal_config() {
        let roles = RoleCounts {
            villager: 2,
            werewolf: 1,
            seer: 1,
            witch: 1,
        };
        let config = GameConfig {
            roles,
            max_rounds: Some(1),
            ..GameConfig::default()
        };
        let engine = Engine::new(config, seats(5, roles), StepRng::new(0, 1));
        assert!(engine.is_ok());
    }

    #[tokio::test]
    async fn max_rounds_forces_game_end_without_winner() {
        let roles = RoleCounts {
            villager: 2,
            werewolf: 1,
            seer: 1,
            witch: 1,
        };
        let config = GameConfig {
            roles,
            max_rounds: Some(1),
            vote_timeout: Duration::from_millis(200),
            night_discussion_timeout: Duration::from_millis(200),
            reflection_timeout: Duration::from_millis(200),
            ..GameConfig::default()
        };
        let mut engine = Engine::new(config, seats(5, roles), StepRng::new(0, 1)).unwrap();
        engine.run().await;

        assert_eq!(engine.state().phase(), mafia_game_lib::Phase::GameEnd);
    }
}
