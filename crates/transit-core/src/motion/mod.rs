// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Marker motion interpolation.
//!
//! The interpolator owns the *visual* position of every handle. It never runs
//! its own timer: the host samples it once per rendered frame through
//! [`MotionInterpolator::step`], so motion stays smooth at any frame rate.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::model::Position;
use crate::reconcile::VisualHandle;

/// Default animation length. Shorter than the poll interval so an animation
/// finishes before the next update arrives.
pub const DEFAULT_ANIMATION_DURATION: Duration = Duration::from_millis(4000);

/// Quadratic ease-in for the first half, quadratic ease-out for the second.
#[must_use]
pub fn ease_in_out_quad(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

#[derive(Debug, Clone, Copy)]
struct Animation {
    from: Position,
    to: Position,
    started: Instant,
    duration: Duration,
}

impl Animation {
    fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    fn sample(&self, now: Instant) -> Position {
        self.from.lerp(&self.to, ease_in_out_quad(self.progress(now)))
    }

    fn is_finished(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }
}

#[derive(Debug, Clone, Copy)]
enum Motion {
    Resting(Position),
    Moving(Animation),
}

/// Visual position state for every live handle.
#[derive(Debug, Default)]
pub struct MotionInterpolator {
    markers: HashMap<VisualHandle, Motion>,
}

impl MotionInterpolator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a marker at `position` immediately, cancelling any animation.
    pub fn place(&mut self, handle: VisualHandle, position: Position) {
        self.markers.insert(handle, Motion::Resting(position));
    }

    /// Move a marker from `from` to `to` over `duration`.
    ///
    /// If the marker is still moving, the new animation starts from where the
    /// marker is right now rather than from `from`, so it never snaps back.
    pub fn animate(
        &mut self,
        handle: VisualHandle,
        from: Position,
        to: Position,
        duration: Duration,
        now: Instant,
    ) {
        let from = match self.markers.get(&handle) {
            Some(Motion::Moving(animation)) if !animation.is_finished(now) => {
                animation.sample(now)
            }
            _ => from,
        };

        self.markers.insert(
            handle,
            Motion::Moving(Animation {
                from,
                to,
                started: now,
                duration,
            }),
        );
    }

    /// Forget a marker.
    pub fn remove(&mut self, handle: VisualHandle) {
        self.markers.remove(&handle);
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Visual position of a marker at `now`.
    #[must_use]
    pub fn position(&self, handle: VisualHandle, now: Instant) -> Option<Position> {
        self.markers.get(&handle).map(|motion| match motion {
            Motion::Resting(position) => *position,
            Motion::Moving(animation) => animation.sample(now),
        })
    }

    #[must_use]
    pub fn is_animating(&self, handle: VisualHandle, now: Instant) -> bool {
        matches!(
            self.markers.get(&handle),
            Some(Motion::Moving(animation)) if !animation.is_finished(now)
        )
    }

    /// Number of markers still in motion at `now`.
    #[must_use]
    pub fn active_animations(&self, now: Instant) -> usize {
        self.markers
            .values()
            .filter(|m| matches!(m, Motion::Moving(a) if !a.is_finished(now)))
            .count()
    }

    /// Advance one frame.
    ///
    /// Returns the positions of markers that moved this frame; finished
    /// animations settle at their target and stop being reported.
    pub fn step(&mut self, now: Instant) -> Vec<(VisualHandle, Position)> {
        let mut moved = Vec::new();
        for (handle, motion) in &mut self.markers {
            if let Motion::Moving(animation) = *motion {
                moved.push((*handle, animation.sample(now)));
                if animation.is_finished(now) {
                    *motion = Motion::Resting(animation.to);
                }
            }
        }
        moved.sort_by_key(|(handle, _)| *handle);
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Entity;
    use crate::reconcile::{reconcile, DisplayedEntitySet};

    fn handles(count: usize) -> Vec<VisualHandle> {
        let mut set = DisplayedEntitySet::new();
        let entities: Vec<Entity> = (0..count)
            .map(|i| Entity::new(format!("v{i}"), "r", Position::new(0.0, 0.0)))
            .collect();
        let applied = set.apply(reconcile(&set, &entities));
        applied.added.into_iter().map(|placed| placed.handle).collect()
    }

    fn close(a: Position, b: Position) -> bool {
        (a.lat - b.lat).abs() < 1e-9 && (a.lon - b.lon).abs() < 1e-9
    }

    #[test]
    fn test_easing_curve() {
        assert!(ease_in_out_quad(0.0).abs() < f64::EPSILON);
        assert!((ease_in_out_quad(0.25) - 0.125).abs() < 1e-12);
        assert!((ease_in_out_quad(0.5) - 0.5).abs() < 1e-12);
        assert!((ease_in_out_quad(0.75) - 0.875).abs() < 1e-12);
        assert!((ease_in_out_quad(1.0) - 1.0).abs() < f64::EPSILON);
        // clamped
        assert!((ease_in_out_quad(3.0) - 1.0).abs() < f64::EPSILON);
        assert!(ease_in_out_quad(-1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_animation_reaches_target() {
        let handle = handles(1)[0];
        let mut motion = MotionInterpolator::new();
        let t0 = Instant::now();
        let from = Position::new(10.0, 20.0);
        let to = Position::new(12.0, 24.0);

        motion.place(handle, from);
        motion.animate(handle, from, to, Duration::from_secs(4), t0);

        assert!(close(motion.position(handle, t0).unwrap(), from));
        let halfway = motion.position(handle, t0 + Duration::from_secs(2)).unwrap();
        assert!(close(halfway, Position::new(11.0, 22.0)));
        assert!(motion.is_animating(handle, t0 + Duration::from_secs(3)));

        let end = t0 + Duration::from_secs(5);
        assert!(close(motion.position(handle, end).unwrap(), to));
        assert!(!motion.is_animating(handle, end));
    }

    #[test]
    fn test_superseding_animation_starts_from_current_position() {
        let handle = handles(1)[0];
        let mut motion = MotionInterpolator::new();
        let t0 = Instant::now();
        let a = Position::new(0.0, 0.0);
        let b = Position::new(4.0, 4.0);
        let c = Position::new(8.0, 8.0);

        motion.animate(handle, a, b, Duration::from_secs(4), t0);
        let t1 = t0 + Duration::from_secs(2);
        let midway = motion.position(handle, t1).unwrap();

        // The caller passes the old reported position; it must be ignored.
        motion.animate(handle, b, c, Duration::from_secs(4), t1);
        assert!(close(motion.position(handle, t1).unwrap(), midway));
        assert!(close(
            motion.position(handle, t1 + Duration::from_secs(4)).unwrap(),
            c
        ));
    }

    #[test]
    fn test_finished_animation_uses_given_from() {
        let handle = handles(1)[0];
        let mut motion = MotionInterpolator::new();
        let t0 = Instant::now();
        motion.animate(
            handle,
            Position::new(0.0, 0.0),
            Position::new(1.0, 1.0),
            Duration::from_secs(1),
            t0,
        );

        let later = t0 + Duration::from_secs(10);
        motion.animate(
            handle,
            Position::new(1.0, 1.0),
            Position::new(2.0, 2.0),
            Duration::from_secs(1),
            later,
        );
        assert!(close(motion.position(handle, later).unwrap(), Position::new(1.0, 1.0)));
    }

    #[test]
    fn test_step_reports_moving_markers_then_settles() {
        let hs = handles(2);
        let mut motion = MotionInterpolator::new();
        let t0 = Instant::now();
        motion.place(hs[0], Position::new(5.0, 5.0));
        motion.animate(
            hs[1],
            Position::new(0.0, 0.0),
            Position::new(1.0, 1.0),
            Duration::from_secs(1),
            t0,
        );

        let frame = motion.step(t0 + Duration::from_millis(16));
        assert_eq!(frame.len(), 1);
        assert_eq!(frame[0].0, hs[1]);

        // Final frame reports the target, then the marker rests
        let frame = motion.step(t0 + Duration::from_secs(2));
        assert_eq!(frame.len(), 1);
        assert!(close(frame[0].1, Position::new(1.0, 1.0)));
        assert!(motion.step(t0 + Duration::from_secs(3)).is_empty());
        assert_eq!(motion.active_animations(t0 + Duration::from_secs(3)), 0);
    }

    #[test]
    fn test_place_cancels_animation() {
        let handle = handles(1)[0];
        let mut motion = MotionInterpolator::new();
        let t0 = Instant::now();
        motion.animate(
            handle,
            Position::new(0.0, 0.0),
            Position::new(1.0, 1.0),
            Duration::from_secs(4),
            t0,
        );
        motion.place(handle, Position::new(3.0, 3.0));
        assert!(!motion.is_animating(handle, t0));
        assert!(close(motion.position(handle, t0).unwrap(), Position::new(3.0, 3.0)));

        motion.remove(handle);
        assert!(motion.position(handle, t0).is_none());
        assert!(motion.is_empty());
    }
}
