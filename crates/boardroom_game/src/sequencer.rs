//! Obligation stack for turn-local action sequencing.
//!
//! A rule module pushes [`PossibleAction`] frames describing what the active
//! player has to do next. Every submitted action is checked against the head
//! of the stack; the head is consumed as its obligation is met and the frame
//! beneath it becomes reachable. An empty sequencer means the turn-local work
//! is done.
//!
//! Immediate frames (pushed with [`ActionSequencer::push_immediate`]) always
//! sit above regular frames, so a card that says "do X right now" interrupts
//! whatever the player was in the middle of.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Debug;
use tracing::{debug, instrument, warn};

/// A submitted action does not match the declared obligations.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum SequenceError<T> {
    /// The action is not accepted by the reachable head.
    #[display("Action {action:?} is not allowed at this point in the sequence")]
    ActionSequenceViolation {
        /// The offending action type.
        action: T,
    },

    /// The head obligation cannot be skipped.
    #[display("Cannot skip {action:?}")]
    CannotSkipAction {
        /// First action the head still demands, if any.
        action: Option<T>,
    },
}

impl<T: Debug> std::error::Error for SequenceError<T> {}

/// One frame on the obligation stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PossibleAction<T> {
    /// Must be performed exactly once, cannot be skipped.
    Mandatory(T),

    /// May be performed once, or skipped.
    Optional(T),

    /// Performed between `at_least` and `at_most` times.
    ///
    /// Both counters go down as the action is performed.
    Repeat {
        /// Remaining minimum.
        at_least: u32,
        /// Remaining maximum.
        at_most: u32,
        /// The repeated action.
        action: T,
    },

    /// Exactly one alternative is committed to; the rest are discarded.
    ///
    /// When several alternatives accept the same action the first declared
    /// one wins.
    Choice(Vec<PossibleAction<T>>),

    /// Every `when` performed obliges one `then` later on.
    WhenThen {
        /// Remaining minimum number of `when` actions.
        at_least: u32,
        /// Remaining maximum number of `when` actions.
        at_most: u32,
        /// Trigger action.
        when: T,
        /// Follow-up action owed per trigger.
        then: T,
        /// Follow-ups owed but not yet performed.
        pending: u32,
    },

    /// None, some or all of the frames, in any order.
    Any(Vec<PossibleAction<T>>),
}

impl<T: Copy + Eq + Debug> PossibleAction<T> {
    /// Shorthand for a [`PossibleAction::Repeat`] frame.
    pub fn repeat(at_least: u32, at_most: u32, action: T) -> Self {
        Self::Repeat {
            at_least,
            at_most,
            action,
        }
    }

    /// Shorthand for a [`PossibleAction::WhenThen`] frame with nothing owed yet.
    pub fn when_then(at_least: u32, at_most: u32, when: T, then: T) -> Self {
        Self::WhenThen {
            at_least,
            at_most,
            when,
            then,
            pending: 0,
        }
    }

    /// A choice where exactly one of the given actions must be performed.
    pub fn choice(actions: impl IntoIterator<Item = T>) -> Self {
        Self::Choice(actions.into_iter().map(Self::Mandatory).collect())
    }

    /// Any subset of the given actions, each at most once, in any order.
    pub fn any(actions: impl IntoIterator<Item = T>) -> Self {
        Self::Any(actions.into_iter().map(Self::Mandatory).collect())
    }

    /// Whether this frame accepts `action` right now.
    pub fn can_perform(&self, action: T) -> bool {
        match self {
            Self::Mandatory(t) | Self::Optional(t) => *t == action,
            Self::Repeat {
                at_most, action: t, ..
            } => *at_most > 0 && *t == action,
            Self::Choice(frames) | Self::Any(frames) => {
                frames.iter().any(|frame| frame.can_perform(action))
            }
            Self::WhenThen {
                at_most,
                when,
                then,
                pending,
                ..
            } => (*when == action && *at_most > 0) || (*then == action && *pending > 0),
        }
    }

    /// Whether the remaining obligation of this frame may be dropped.
    pub fn can_skip(&self) -> bool {
        match self {
            Self::Mandatory(_) => false,
            Self::Optional(_) | Self::Any(_) => true,
            Self::Repeat { at_least, .. } => *at_least == 0,
            Self::Choice(frames) => frames.iter().all(Self::can_skip),
            Self::WhenThen {
                at_least, pending, ..
            } => *at_least == 0 && *pending == 0,
        }
    }

    /// Performs `action` against this frame.
    ///
    /// Returns `true` once the frame is complete and should be removed.
    fn perform(&mut self, action: T) -> Result<bool, SequenceError<T>> {
        if !self.can_perform(action) {
            return Err(SequenceError::ActionSequenceViolation { action });
        }

        let complete = match self {
            Self::Mandatory(_) | Self::Optional(_) => true,
            Self::Repeat {
                at_least, at_most, ..
            } => {
                *at_most -= 1;
                *at_least = at_least.saturating_sub(1);
                *at_most == 0
            }
            Self::Choice(frames) => {
                let index = first_accepting(frames, action)?;
                if frames[index].perform(action)? {
                    frames.clear();
                    true
                } else {
                    let chosen = frames.swap_remove(index);
                    frames.clear();
                    frames.push(chosen);
                    false
                }
            }
            Self::Any(frames) => {
                let index = first_accepting(frames, action)?;
                if frames[index].perform(action)? {
                    frames.remove(index);
                }
                frames.is_empty()
            }
            Self::WhenThen {
                at_least,
                at_most,
                when,
                pending,
                ..
            } => {
                if *when == action && *at_most > 0 {
                    *at_most -= 1;
                    *at_least = at_least.saturating_sub(1);
                    *pending += 1;
                } else {
                    *pending -= 1;
                }
                *at_most == 0 && *pending == 0
            }
        };

        Ok(complete)
    }

    fn collect_possible(&self, out: &mut Vec<T>) {
        let mut push = |action: T| {
            if !out.contains(&action) {
                out.push(action);
            }
        };

        match self {
            Self::Mandatory(t) | Self::Optional(t) => push(*t),
            Self::Repeat {
                at_most, action, ..
            } => {
                if *at_most > 0 {
                    push(*action);
                }
            }
            Self::WhenThen {
                at_most,
                when,
                then,
                pending,
                ..
            } => {
                if *at_most > 0 {
                    push(*when);
                }
                if *pending > 0 {
                    push(*then);
                }
            }
            Self::Choice(frames) | Self::Any(frames) => {
                for frame in frames {
                    frame.collect_possible(out);
                }
            }
        }
    }

    /// Actions this frame accepts right now, in declaration order.
    pub fn possible_actions(&self) -> Vec<T> {
        let mut out = Vec::new();
        self.collect_possible(&mut out);
        out
    }
}

fn first_accepting<T: Copy + Eq + Debug>(
    frames: &[PossibleAction<T>],
    action: T,
) -> Result<usize, SequenceError<T>> {
    frames
        .iter()
        .position(|frame| frame.can_perform(action))
        .ok_or(SequenceError::ActionSequenceViolation { action })
}

/// Stack of obligation frames owned by one module state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSequencer<T> {
    actions: VecDeque<PossibleAction<T>>,
    #[serde(default = "VecDeque::new")]
    immediate: VecDeque<PossibleAction<T>>,
}

impl<T> Default for ActionSequencer<T> {
    fn default() -> Self {
        Self {
            actions: VecDeque::new(),
            immediate: VecDeque::new(),
        }
    }
}

impl<T: Copy + Eq + Debug> ActionSequencer<T> {
    /// Creates an empty sequencer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sequencer whose head is the first of `frames`.
    pub fn initial(frames: impl IntoIterator<Item = PossibleAction<T>>) -> Self {
        Self {
            actions: frames.into_iter().collect(),
            immediate: VecDeque::new(),
        }
    }

    fn head_stack(&self) -> &VecDeque<PossibleAction<T>> {
        if self.immediate.is_empty() {
            &self.actions
        } else {
            &self.immediate
        }
    }

    fn head_stack_mut(&mut self) -> &mut VecDeque<PossibleAction<T>> {
        if self.immediate.is_empty() {
            &mut self.actions
        } else {
            &mut self.immediate
        }
    }

    /// The reachable head frame, if any.
    pub fn peek(&self) -> Option<&PossibleAction<T>> {
        self.head_stack().front()
    }

    /// Records that `action` was performed.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::ActionSequenceViolation`] if the head does not
    /// accept `action`, or if nothing is left to do.
    #[instrument(skip(self))]
    pub fn perform(&mut self, action: T) -> Result<(), SequenceError<T>> {
        let stack = self.head_stack_mut();

        let Some(head) = stack.front_mut() else {
            warn!("No obligations left");
            return Err(SequenceError::ActionSequenceViolation { action });
        };

        if head.perform(action)? {
            stack.pop_front();
            debug!(remaining = self.len(), "Obligation fulfilled");
        }

        Ok(())
    }

    /// Drops the head obligation.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::CannotSkipAction`] if the head is mandatory,
    /// has an unmet minimum, or if nothing is left to skip.
    #[instrument(skip(self))]
    pub fn skip(&mut self) -> Result<(), SequenceError<T>> {
        let stack = self.head_stack_mut();

        match stack.front() {
            Some(head) if head.can_skip() => {
                stack.pop_front();
                Ok(())
            }
            Some(head) => {
                let action = head.possible_actions().first().copied();
                warn!(?action, "Head obligation cannot be skipped");
                Err(SequenceError::CannotSkipAction { action })
            }
            None => Err(SequenceError::CannotSkipAction { action: None }),
        }
    }

    /// Skips until empty, stopping at the first obligation that cannot be skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::CannotSkipAction`] for the first frame that
    /// must still be performed. Frames skipped before it stay skipped.
    pub fn skip_all(&mut self) -> Result<(), SequenceError<T>> {
        while !self.is_empty() {
            self.skip()?;
        }
        Ok(())
    }

    /// Whether the head accepts `action`.
    pub fn can_perform(&self, action: T) -> bool {
        self.peek().is_some_and(|head| head.can_perform(action))
    }

    /// Whether the head may be skipped.
    pub fn can_skip(&self) -> bool {
        self.peek().is_some_and(PossibleAction::can_skip)
    }

    /// Actions the head accepts right now.
    pub fn possible_actions(&self) -> Vec<T> {
        self.peek()
            .map(PossibleAction::possible_actions)
            .unwrap_or_default()
    }

    /// True once no obligations remain.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.immediate.is_empty()
    }

    /// Number of frames on both stacks.
    pub fn len(&self) -> usize {
        self.actions.len() + self.immediate.len()
    }

    /// Whether an immediate frame is pending.
    pub fn has_immediate(&self) -> bool {
        !self.immediate.is_empty()
    }

    /// Pushes a frame on top of the regular stack.
    pub fn push(&mut self, frame: PossibleAction<T>) {
        self.actions.push_front(frame);
    }

    /// Pushes frames on top of the regular stack, keeping their relative order.
    pub fn push_all(&mut self, frames: impl IntoIterator<Item = PossibleAction<T>>) {
        let frames: Vec<_> = frames.into_iter().collect();
        for frame in frames.into_iter().rev() {
            self.actions.push_front(frame);
        }
    }

    /// Pushes frames above everything else, keeping their relative order.
    pub fn push_immediate(&mut self, frames: impl IntoIterator<Item = PossibleAction<T>>) {
        let frames: Vec<_> = frames.into_iter().collect();
        for frame in frames.into_iter().rev() {
            self.immediate.push_front(frame);
        }
    }

    /// Removes every obligation.
    pub fn clear(&mut self) {
        self.actions.clear();
        self.immediate.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    enum Kind {
        Draw,
        Discard,
        Place,
        Move,
        Pass,
    }

    #[test]
    fn test_mandatory_consumed_then_empty() {
        let mut seq = ActionSequencer::initial([PossibleAction::Mandatory(Kind::Draw)]);
        assert!(!seq.is_empty());
        seq.perform(Kind::Draw).expect("Draw is the head");
        assert!(seq.is_empty());
    }

    #[test]
    fn test_wrong_action_rejected_and_nothing_consumed() {
        let mut seq = ActionSequencer::initial([PossibleAction::Mandatory(Kind::Draw)]);
        assert_eq!(
            seq.perform(Kind::Discard),
            Err(SequenceError::ActionSequenceViolation {
                action: Kind::Discard
            })
        );
        assert_eq!(seq.len(), 1);
    }

    #[test]
    fn test_only_head_is_reachable() {
        let mut seq = ActionSequencer::initial([
            PossibleAction::Optional(Kind::Draw),
            PossibleAction::Mandatory(Kind::Discard),
        ]);
        assert!(seq.perform(Kind::Discard).is_err());
        seq.skip().expect("Optional head can be skipped");
        seq.perform(Kind::Discard).expect("Discard is now the head");
        assert!(seq.is_empty());
    }

    #[test]
    fn test_perform_on_empty_fails() {
        let mut seq = ActionSequencer::<Kind>::new();
        assert!(matches!(
            seq.perform(Kind::Pass),
            Err(SequenceError::ActionSequenceViolation { .. })
        ));
        assert_eq!(
            seq.skip(),
            Err(SequenceError::CannotSkipAction { action: None })
        );
    }

    #[test]
    fn test_repeat_respects_minimum_and_maximum() {
        let mut seq = ActionSequencer::initial([PossibleAction::repeat(1, 3, Kind::Discard)]);
        assert_eq!(
            seq.skip(),
            Err(SequenceError::CannotSkipAction {
                action: Some(Kind::Discard)
            })
        );

        seq.perform(Kind::Discard).expect("first discard");
        assert!(seq.can_skip());
        seq.perform(Kind::Discard).expect("second discard");
        seq.perform(Kind::Discard).expect("third discard");
        assert!(seq.is_empty(), "Repeat is removed once its maximum is spent");
    }

    #[test]
    fn test_repeat_zero_minimum_skippable_immediately() {
        let mut seq = ActionSequencer::initial([PossibleAction::repeat(0, 3, Kind::Discard)]);
        seq.skip().expect("minimum already satisfied");
        assert!(seq.is_empty());
    }

    #[test]
    fn test_choice_commits_first_matching_alternative() {
        let mut seq = ActionSequencer::initial([PossibleAction::Choice(vec![
            PossibleAction::repeat(2, 2, Kind::Place),
            PossibleAction::Mandatory(Kind::Place),
            PossibleAction::Mandatory(Kind::Move),
        ])]);

        seq.perform(Kind::Place).expect("Place accepted by first alternative");
        assert_eq!(seq.possible_actions(), vec![Kind::Place]);
        assert!(!seq.can_perform(Kind::Move), "Other alternatives are discarded");

        seq.perform(Kind::Place).expect("second Place for the committed repeat");
        assert!(seq.is_empty());
    }

    #[test]
    fn test_choice_of_mandatory_alternatives_cannot_be_skipped() {
        let mut seq = ActionSequencer::initial([PossibleAction::choice([Kind::Place, Kind::Move])]);
        assert!(seq.skip().is_err());
        seq.perform(Kind::Move).expect("Move is an alternative");
        assert!(seq.is_empty());
    }

    #[test]
    fn test_choice_of_optional_alternatives_can_be_skipped() {
        let mut seq = ActionSequencer::initial([PossibleAction::Choice(vec![
            PossibleAction::Optional(Kind::Place),
            PossibleAction::repeat(0, 2, Kind::Move),
        ])]);
        seq.skip().expect("No alternative is mandatory");
        assert!(seq.is_empty());
    }

    #[test]
    fn test_when_then_owes_follow_up() {
        let mut seq = ActionSequencer::initial([PossibleAction::when_then(
            0,
            2,
            Kind::Draw,
            Kind::Discard,
        )]);

        assert!(!seq.can_perform(Kind::Discard), "Nothing owed yet");
        seq.perform(Kind::Draw).expect("trigger");
        assert!(!seq.can_skip(), "A follow-up is owed");
        assert_eq!(seq.possible_actions(), vec![Kind::Draw, Kind::Discard]);

        seq.perform(Kind::Discard).expect("follow-up");
        assert!(seq.can_skip());
        seq.perform(Kind::Draw).expect("second trigger");
        seq.perform(Kind::Discard).expect("second follow-up");
        assert!(seq.is_empty(), "Trigger budget spent and nothing owed");
    }

    #[test]
    fn test_any_in_any_order() {
        let mut seq = ActionSequencer::initial([PossibleAction::any([Kind::Place, Kind::Move])]);
        seq.perform(Kind::Move).expect("Move first");
        assert!(!seq.can_perform(Kind::Move), "Each frame at most once");
        seq.perform(Kind::Place).expect("then Place");
        assert!(seq.is_empty());
    }

    #[test]
    fn test_consumed_frame_reveals_next() {
        let mut seq = ActionSequencer::new();
        seq.push_all([
            PossibleAction::Mandatory(Kind::Draw),
            PossibleAction::Mandatory(Kind::Pass),
        ]);
        assert_eq!(seq.possible_actions(), vec![Kind::Draw]);
        seq.perform(Kind::Draw).expect("head");
        assert_eq!(seq.possible_actions(), vec![Kind::Pass]);
    }

    #[test]
    fn test_immediate_frames_take_precedence() {
        let mut seq = ActionSequencer::initial([PossibleAction::Mandatory(Kind::Pass)]);
        seq.push_immediate([
            PossibleAction::Mandatory(Kind::Draw),
            PossibleAction::Optional(Kind::Discard),
        ]);
        assert!(seq.has_immediate());
        assert!(!seq.can_perform(Kind::Pass));

        seq.perform(Kind::Draw).expect("immediate head");
        seq.skip().expect("optional immediate");
        assert!(!seq.has_immediate());
        seq.perform(Kind::Pass).expect("regular head again");
        assert!(seq.is_empty());
    }

    #[test]
    fn test_skip_all_stops_at_mandatory() {
        let mut seq = ActionSequencer::initial([
            PossibleAction::Optional(Kind::Draw),
            PossibleAction::Mandatory(Kind::Pass),
            PossibleAction::Optional(Kind::Move),
        ]);
        assert!(seq.skip_all().is_err());
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.possible_actions(), vec![Kind::Pass]);
    }

    #[test]
    fn test_serde_keeps_progress() {
        let mut seq = ActionSequencer::initial([PossibleAction::repeat(2, 3, Kind::Place)]);
        seq.perform(Kind::Place).expect("first place");

        let json = serde_json::to_string(&seq).expect("serialize");
        let restored: ActionSequencer<Kind> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, seq);
        assert_eq!(
            restored.peek(),
            Some(&PossibleAction::repeat(1, 2, Kind::Place))
        );
    }

    #[test]
    fn test_missing_immediate_stack_reads_as_empty() {
        let restored: ActionSequencer<Kind> =
            serde_json::from_str(r#"{"actions":[{"mandatory":"Draw"}]}"#).expect("deserialize");
        assert!(!restored.has_immediate());
        assert_eq!(restored.possible_actions(), vec![Kind::Draw]);
    }
}
