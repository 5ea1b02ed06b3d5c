//! Join Progress Tracker
//!
//! Tracks watermark, processing time and completion for both parents of a
//! join. The combined watermark (and processing time) is the minimum across
//! both sides: a join cannot be complete ahead of its slower input.

use crate::velojoin::execution::join::JoinSide;
use crate::velojoin::execution::types::Time;

/// Progress reported by one parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentState {
    pub mark: Time,
    pub processing: Time,
    pub finished: bool,
}

impl Default for ParentState {
    fn default() -> Self {
        Self {
            mark: Time::MIN,
            processing: Time::MIN,
            finished: false,
        }
    }
}

/// Tracks progress from both sides of a join
#[derive(Debug, Default)]
pub struct JoinProgressTracker {
    left: ParentState,
    right: ParentState,

    /// Last combined watermark handed downstream
    emitted_watermark: Option<Time>,

    /// Last combined processing time handed downstream
    emitted_processing_time: Option<Time>,
}

impl JoinProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, side: JoinSide) -> &ParentState {
        match side {
            JoinSide::Left => &self.left,
            JoinSide::Right => &self.right,
        }
    }

    fn state_mut(&mut self, side: JoinSide) -> &mut ParentState {
        match side {
            JoinSide::Left => &mut self.left,
            JoinSide::Right => &mut self.right,
        }
    }

    /// Record a parent watermark. Watermarks never move backwards.
    ///
    /// Returns the combined watermark when it advanced past the last one
    /// emitted, `None` otherwise.
    pub fn update_watermark(&mut self, side: JoinSide, mark: Time) -> Option<Time> {
        let state = self.state_mut(side);
        if mark > state.mark {
            state.mark = mark;
        }

        let combined = self.combined_watermark();
        if combined == Time::MIN || self.emitted_watermark.is_some_and(|w| combined <= w) {
            return None;
        }
        self.emitted_watermark = Some(combined);
        Some(combined)
    }

    /// Record a parent processing time, with the same rule as watermarks
    pub fn update_processing_time(&mut self, side: JoinSide, pt: Time) -> Option<Time> {
        let state = self.state_mut(side);
        if pt > state.processing {
            state.processing = pt;
        }

        let combined = self.combined_processing_time();
        if combined == Time::MIN || self.emitted_processing_time.is_some_and(|p| combined <= p) {
            return None;
        }
        self.emitted_processing_time = Some(combined);
        Some(combined)
    }

    /// Minimum watermark across both parents
    pub fn combined_watermark(&self) -> Time {
        self.left.mark.min(self.right.mark)
    }

    /// Minimum processing time across both parents
    pub fn combined_processing_time(&self) -> Time {
        self.left.processing.min(self.right.processing)
    }

    /// Mark a parent finished, returning whether both parents are now finished
    pub fn mark_finished(&mut self, side: JoinSide) -> bool {
        self.state_mut(side).finished = true;
        self.all_finished()
    }

    pub fn is_finished(&self, side: JoinSide) -> bool {
        self.state(side).finished
    }

    pub fn all_finished(&self) -> bool {
        self.left.finished && self.right.finished
    }
}
