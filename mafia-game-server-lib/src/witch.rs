//! Witch night deliberation (C5b): potion-gated information disclosure plus save/poison/
//! no-action constraint enforcement.

use mafia_game_lib::ActionKind;
use mafia_game_lib::ActionResult;
use mafia_game_lib::NightExtras;
use mafia_game_lib::PlayerId;

use crate::agent::WitchState;

/// Builds the `NightExtras` the engine is willing to disclose to the witch this night.
/// `tonight_victim` is populated *only* while she still holds the antidote. This is the
/// strict information gate from I4/§4.5; losing the antidote blinds her for the rest of the
/// game regardless of whether anyone is actually marked to die tonight.
pub fn build_extras(
    witch: PlayerId,
    witch_state: &WitchState,
    tonight_victim: Option<PlayerId>,
    live_non_witch: &[PlayerId],
) -> NightExtras {
    let poison_candidates = live_non_witch.iter().copied().filter(|&id| id != witch).collect();

    NightExtras {
        seer_candidates: Vec::new(),
        tonight_victim: if witch_state.has_antidote { tonight_victim } else { None },
        can_save: witch_state.has_antidote,
        can_poison: witch_state.has_poison,
        poison_candidates,
    }
}

/// Validates and applies a witch's declared `ActionResult` against her private ledger,
/// enforcing I4/I5 and the self-save/self-poison/already-used constraints (§4.5). Returns the
/// action actually applied; a constraint violation degrades to `NoAction` rather than being
/// propagated as an error (§7: illegal action leads to a silent safe default).
pub fn apply_decision(
    witch: PlayerId,
    witch_state: &mut WitchState,
    extras: &NightExtras,
    decision: ActionResult,
) -> ActionResult {
    match decision.kind {
        ActionKind::Save => {
            let Some(target) = decision.target else {
                return ActionResult::no_action("save declared with no target");
            };
            if !witch_state.has_antidote {
                return ActionResult::no_action("antidote already spent");
            }
            if extras.tonight_victim != Some(target) {
                return ActionResult::no_action("can only save tonight's marked victim");
            }
            if witch_state.saved.contains(&target) {
                return ActionResult::no_action("already saved this player");
            }

            witch_state.has_antidote = false;
            witch_state.saved.push(target);

            ActionResult {
                kind: ActionKind::Save,
                target: Some(target),
                success: true,
                message: "antidote used".into(),
            }
        }
        ActionKind::Poison => {
            let Some(target) = decision.target else {
                return ActionResult::no_action("poison declared with no target");
            };
            if !witch_state.has_poison {
                return ActionResult::no_action("poison already spent");
            }
            if target == witch {
                return ActionResult::no_action("cannot poison self");
            }
            if !extras.poison_candidates.contains(&target) {
                return ActionResult::no_action("target is not a legal poison candidate");
            }
            if witch_state.poisoned.contains(&target) {
                return ActionResult::no_action("already poisoned this player");
            }

            witch_state.has_poison = false;
            witch_state.poisoned.push(target);

            ActionResult {
                kind: ActionKind::Poison,
                target: Some(target),
                success: true,
                message: "poison used".into(),
            }
        }
        _ => ActionResult::no_action("no action taken"),
    }
}

/// Preconditions: both potions spent ⇒ the witch acts at night in name only; the engine
/// should not even dispatch `NightAction` for her (saves a wasted policy call).
pub fn has_any_action_available(witch_state: &WitchState) -> bool {
    witch_state.has_antidote || witch_state.has_poison
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_state() -> WitchState {
        WitchState::default()
    }

    #[test]
    fn extras_hide_victim_without_antidote() {
        let mut state = fresh_state();
        state.has_antidote = false;
        let extras = build_extras(PlayerId(1), &state, Some(PlayerId(2)), &[PlayerId(2), PlayerId(3)]);
        assert_eq!(extras.tonight_victim, None);
        assert!(!extras.can_save);
    }

    #[test]
    fn extras_reveal_victim_with_antidote() {
        let state = fresh_state();
        let extras = build_extras(PlayerId(1), &state, Some(PlayerId(2)), &[PlayerId(2), PlayerId(3)]);
        assert_eq!(extras.tonight_victim, Some(PlayerId(2)));
    }

    #[test]
    fn self_save_is_permitted_when_witch_is_the_marked_victim() {
        // §4.5 is explicitly permissive here: nothing structurally forbids a witch from
        // saving herself if she happens to be tonight's marked victim. The default policy
        // simply never chooses to.
        let mut state = fresh_state();
        let extras = build_extras(PlayerId(1), &state, Some(PlayerId(1)), &[PlayerId(1)]);
        let decision = ActionResult {
            kind: ActionKind::Save,
            target: Some(PlayerId(1)),
            success: true,
            message: "".into(),
        };
        let applied = apply_decision(PlayerId(1), &mut state, &extras, decision);
        assert!(applied.success);
        assert!(!state.has_antidote);
        assert_eq!(state.saved, vec![PlayerId(1)]);
    }

    #[test]
    fn cannot_poison_self() {
        let mut state = fresh_state();
        let extras = build_extras(PlayerId(1), &state, None, &[PlayerId(1), PlayerId(2)]);
        let decision = ActionResult {
            kind: ActionKind::Poison,
            target: Some(PlayerId(1)),
            success: true,
            message: "".into(),
        };
        let applied = apply_decision(PlayerId(1), &mut state, &extras, decision);
        assert_eq!(applied.kind, ActionKind::NoAction);
        assert!(state.has_poison);
    }

    #[test]
    fn save_flips_antidote_and_records_victim() {
        let mut state = fresh_state();
        let extras = build_extras(PlayerId(1), &state, Some(PlayerId(2)), &[PlayerId(2)]);
        let decision = ActionResult {
            kind: ActionKind::Save,
            target: Some(PlayerId(2)),
            success: true,
            message: "".into(),
        };
        let applied = apply_decision(PlayerId(1), &mut state, &extras, decision);
        assert!(applied.success);
        assert!(!state.has_antidote);
        assert_eq!(state.saved, vec![PlayerId(2)]);
    }

    #[test]
    fn cannot_reuse_potions() {
        let mut state = fresh_state();
        state.has_poison = false;
        let extras = build_extras(PlayerId(1), &state, None, &[PlayerId(2)]);
        let decision = ActionResult {
            kind: ActionKind::Poison,
            target: Some(PlayerId(2)),
            success: true,
            message: "".into(),
        };
        let applied = apply_decision(PlayerId(1), &mut state, &extras, decision);
        assert_eq!(applied.kind, ActionKind::NoAction);
    }
}
