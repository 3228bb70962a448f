//! Sequence composition
//!
//! A sequence is a list of groups. [`Sequence::append`] opens a new group that
//! starts once every member of the previous group is terminal;
//! [`Sequence::join`] adds a member to the last group so it runs alongside the
//! others. Members are played lazily when their group becomes active.

use crate::config::validate_speed;
use crate::error::{Result, TweenError};
use crate::lifecycle::{Failures, Lifecycle, TweenState};
use crate::tween::Tweenable;

/// Members that start together
struct Group {
    members: Vec<Box<dyn Tweenable>>,
}

impl Group {
    /// Longest member duration, in sequence time
    fn duration(&self) -> f32 {
        self.members
            .iter()
            .map(|m| m.duration())
            .fold(0.0, f32::max)
    }
}

/// Ordered and parallel composition of tweenables, itself a [`Tweenable`]
pub struct Sequence {
    groups: Vec<Group>,
    lifecycle: Lifecycle,
    speed: f32,
    reversed: bool,
    /// Index of the group currently receiving time
    active: usize,
    /// Sequence time spent in the active group
    group_elapsed: f32,
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequence {
    pub fn new() -> Self {
        Self {
            groups: Vec::new(),
            lifecycle: Lifecycle::new(),
            speed: 1.0,
            reversed: false,
            active: 0,
            group_elapsed: 0.0,
        }
    }

    /// Run `tweenable` after everything added so far
    pub fn append(&mut self, tweenable: impl Tweenable + 'static) -> &mut Self {
        let member: Box<dyn Tweenable> = Box::new(tweenable);
        self.groups.push(Group {
            members: vec![member],
        });
        self
    }

    /// Run `tweenable` in parallel with the last appended group
    pub fn join(&mut self, tweenable: impl Tweenable + 'static) -> &mut Self {
        match self.groups.last_mut() {
            Some(group) => group.members.push(Box::new(tweenable)),
            None => {
                self.append(tweenable);
            }
        }
        self
    }

    /// Reverse group order and mirror start offsets inside each group.
    ///
    /// Members keep their own start and end values; only their position in
    /// the sequence changes. Ignored while the sequence is running or paused.
    pub fn reverse(&mut self) -> &mut Self {
        if self.lifecycle.state().is_active() {
            tracing::warn!("reverse() ignored on an active sequence");
            return self;
        }
        self.groups.reverse();
        self.reversed = !self.reversed;
        self
    }

    /// Detach every member and hand them back in play order
    pub fn clear(&mut self) -> Vec<Box<dyn Tweenable>> {
        self.active = 0;
        self.group_elapsed = 0.0;
        self.reversed = false;
        self.groups
            .drain(..)
            .flat_map(|group| group.members)
            .collect()
    }

    pub fn set_speed(&mut self, speed: f32) -> Result<&mut Self> {
        validate_speed(speed)?;
        self.speed = speed;
        Ok(self)
    }

    pub fn with_invoke_end_on_manual_stop(mut self, invoke: bool) -> Self {
        self.lifecycle.invoke_end_on_manual_stop = invoke;
        self
    }

    pub fn on_end<F: FnMut() + Send + 'static>(mut self, callback: F) -> Self {
        self.lifecycle.on_end(Box::new(callback));
        self
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.members.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// `(start offset, duration)` of every member, group by group, in
    /// sequence time
    pub fn timings(&self) -> Vec<Vec<(f32, f32)>> {
        self.groups
            .iter()
            .map(|group| {
                let span = group.duration();
                group
                    .members
                    .iter()
                    .map(|m| (self.offset(span, m.duration()), m.duration()))
                    .collect()
            })
            .collect()
    }

    /// Start offset of a member of length `member` inside a group of length
    /// `span`
    fn offset(&self, span: f32, member: f32) -> f32 {
        if self.reversed && span.is_finite() {
            span - member
        } else {
            0.0
        }
    }

    fn completed_time(&self) -> f32 {
        self.groups[..self.active.min(self.groups.len())]
            .iter()
            .map(Group::duration)
            .sum()
    }
}

impl Tweenable for Sequence {
    fn state(&self) -> TweenState {
        self.lifecycle.state()
    }

    fn play(&mut self) -> Result<()> {
        match self.lifecycle.state() {
            TweenState::Pending => {
                let terminal = self
                    .groups
                    .iter()
                    .flat_map(|g| g.members.iter())
                    .any(|m| m.is_finished());
                if terminal {
                    return Err(TweenError::Terminal);
                }
                self.active = 0;
                self.group_elapsed = 0.0;
                self.lifecycle.start();
                Ok(())
            }
            TweenState::Running | TweenState::Paused => {
                let invoke_end = self.lifecycle.invoke_end_on_manual_stop;
                self.stop(invoke_end);
                self.reset();
                self.play()
            }
            TweenState::Completed | TweenState::Cancelled => Err(TweenError::Terminal),
        }
    }

    fn advance(&mut self, delta: f32) -> bool {
        match self.lifecycle.state() {
            TweenState::Running => {}
            state => return !state.is_terminal(),
        }

        let mut remaining = delta.max(0.0) * self.speed;
        let reversed = self.reversed;

        while let Some(group) = self.groups.get_mut(self.active) {
            let span = group.duration();
            let before = self.group_elapsed;
            let after = before + remaining;

            for member in group.members.iter_mut() {
                if member.is_finished() {
                    continue;
                }
                let offset = if reversed && span.is_finite() {
                    span - member.duration()
                } else {
                    0.0
                };
                if after < offset {
                    continue;
                }
                if member.state() == TweenState::Pending {
                    if let Err(err) = member.play() {
                        tracing::warn!("sequence member failed to start: {}", err);
                        member.stop(false);
                        continue;
                    }
                }
                member.advance(after - before.max(offset));
            }

            if !group.members.iter().all(|m| m.is_finished()) {
                self.group_elapsed = after;
                break;
            }

            remaining = if span.is_finite() {
                (after - span).max(0.0)
            } else {
                0.0
            };
            self.active += 1;
            self.group_elapsed = 0.0;
        }

        if self.active >= self.groups.len() {
            tracing::trace!("sequence of {} groups completed", self.groups.len());
            self.lifecycle.finish(TweenState::Completed, true);
            return false;
        }
        true
    }

    fn pause(&mut self) -> bool {
        self.lifecycle.pause()
    }

    fn resume(&mut self) -> bool {
        self.lifecycle.resume()
    }

    fn stop(&mut self, invoke_end: bool) {
        if self.lifecycle.state().is_terminal() {
            return;
        }
        for member in self.groups.iter_mut().flat_map(|g| g.members.iter_mut()) {
            member.stop(invoke_end);
        }
        self.lifecycle.finish(TweenState::Cancelled, invoke_end);
    }

    fn reset(&mut self) {
        for member in self.groups.iter_mut().flat_map(|g| g.members.iter_mut()) {
            member.reset();
        }
        self.active = 0;
        self.group_elapsed = 0.0;
        self.lifecycle.reset();
    }

    fn progress(&self) -> f32 {
        match self.lifecycle.state() {
            TweenState::Completed => return 1.0,
            TweenState::Pending => return 0.0,
            _ => {}
        }
        let total: f32 = self.groups.iter().map(Group::duration).sum();
        if !total.is_finite() || total <= 0.0 {
            return 0.0;
        }
        let current = self
            .groups
            .get(self.active)
            .map(|g| self.group_elapsed.min(g.duration()))
            .unwrap_or(0.0);
        ((self.completed_time() + current) / total).clamp(0.0, 1.0)
    }

    fn duration(&self) -> f32 {
        self.groups.iter().map(Group::duration).sum::<f32>() / self.speed
    }

    fn take_failures(&mut self) -> Failures {
        let mut failures = self.lifecycle.take_failures();
        for member in self.groups.iter_mut().flat_map(|g| g.members.iter_mut()) {
            failures.extend(member.take_failures());
        }
        failures
    }
}
