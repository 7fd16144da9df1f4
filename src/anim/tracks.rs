//! Keyframe tracks and their evaluation.
//!
//! A track is a named target plus a time-ordered key sequence. Evaluation is
//! linear interpolation for values implementing [`Lerp`], stepped for
//! discrete values (bool, string, instance keys). Out-of-range times clamp
//! to the nearest key.

use glam::{Quat, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Single keyframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimKey<T> {
    pub t: f32,
    pub v: T,
}

/// Named, typed key sequence. Keys are kept sorted by time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnimTrack<T> {
    pub target: String,
    pub keys: Vec<AnimKey<T>>,
}

impl<T> AnimTrack<T> {
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            keys: Vec::new(),
        }
    }

    /// Index of the exact key at `t`, if any.
    #[must_use]
    pub fn key_at(&self, t: f32) -> Option<usize> {
        self.keys.iter().position(|k| k.t == t)
    }

    /// Inserts or overwrites the key at `t`, keeping the sequence sorted.
    pub fn set_key(&mut self, t: f32, v: T) {
        if let Some(idx) = self.key_at(t) {
            self.keys[idx].v = v;
        } else {
            let pos = self.keys.partition_point(|k| k.t <= t);
            self.keys.insert(pos, AnimKey { t, v });
        }
    }

    /// Deletes the key at exactly `t`, if present.
    pub fn delete_key(&mut self, t: f32) {
        if let Some(idx) = self.key_at(t) {
            self.keys.remove(idx);
        }
    }

    /// Re-sorts keys by time and drops duplicate timecodes. Call after bulk
    /// edits that may have broken ordering.
    pub fn sort_keys(&mut self) {
        self.keys.sort_by(|a, b| a.t.total_cmp(&b.t));
        self.keys.dedup_by(|a, b| a.t == b.t);
    }
}

/// Finds the key interval bracketing `t`. Returns `Some((k0, k1))` when `t`
/// falls strictly between two keys, `None` with `clamp` holding the nearest
/// key index otherwise.
fn interval_keys<T>(keys: &[AnimKey<T>], t: f32) -> Result<(usize, usize), usize> {
    let i = keys.partition_point(|k| k.t <= t);
    if i == 0 {
        Err(0)
    } else if i == keys.len() {
        Err(keys.len() - 1)
    } else {
        Ok((i - 1, i))
    }
}

/// Linear interpolation support for track value types.
pub trait Lerp: Copy {
    #[must_use]
    fn lerp_between(a: Self, b: Self, k: f32) -> Self;
}

impl Lerp for f32 {
    fn lerp_between(a: Self, b: Self, k: f32) -> Self {
        a + (b - a) * k
    }
}

impl Lerp for Vec2 {
    fn lerp_between(a: Self, b: Self, k: f32) -> Self {
        a.lerp(b, k)
    }
}

impl Lerp for Vec3 {
    fn lerp_between(a: Self, b: Self, k: f32) -> Self {
        a.lerp(b, k)
    }
}

impl Lerp for Vec4 {
    fn lerp_between(a: Self, b: Self, k: f32) -> Self {
        a.lerp(b, k)
    }
}

impl Lerp for Quat {
    fn lerp_between(a: Self, b: Self, k: f32) -> Self {
        // Normalized on write by the evaluator; slerp keeps the short arc.
        a.slerp(b, k)
    }
}

/// Samples a track at `t` with linear interpolation. Returns `None` when the
/// track has no keys.
#[must_use]
pub fn evaluate<T: Lerp>(track: &AnimTrack<T>, t: f32) -> Option<T> {
    if track.keys.is_empty() {
        return None;
    }
    match interval_keys(&track.keys, t) {
        Ok((k0, k1)) => {
            let key0 = &track.keys[k0];
            let key1 = &track.keys[k1];
            let k = (t - key0.t) / (key1.t - key0.t);
            Some(T::lerp_between(key0.v, key1.v, k))
        }
        Err(nearest) => Some(track.keys[nearest].v),
    }
}

/// Samples a track at `t` with stepped interpolation (value of the key at or
/// before `t`).
#[must_use]
pub fn evaluate_step<T: Clone>(track: &AnimTrack<T>, t: f32) -> Option<T> {
    if track.keys.is_empty() {
        return None;
    }
    let idx = match interval_keys(&track.keys, t) {
        Ok((k0, _)) => k0,
        Err(nearest) => nearest,
    };
    Some(track.keys[idx].v.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn track(keys: &[(f32, f32)]) -> AnimTrack<f32> {
        let mut t = AnimTrack::new("Value");
        for &(time, v) in keys {
            t.set_key(time, v);
        }
        t
    }

    #[test]
    fn linear_midpoint() {
        let t = track(&[(0.0, 0.0), (1.0, 10.0)]);
        assert!((evaluate(&t, 0.5).unwrap() - 5.0).abs() < EPSILON);
    }

    #[test]
    fn clamps_outside_range() {
        let t = track(&[(1.0, 2.0), (2.0, 4.0)]);
        assert!((evaluate(&t, 0.0).unwrap() - 2.0).abs() < EPSILON);
        assert!((evaluate(&t, 5.0).unwrap() - 4.0).abs() < EPSILON);
    }

    #[test]
    fn empty_track_yields_none() {
        let t: AnimTrack<f32> = AnimTrack::new("Value");
        assert!(evaluate(&t, 0.0).is_none());
    }

    #[test]
    fn set_key_keeps_order_and_overwrites() {
        let mut t = track(&[(1.0, 1.0), (3.0, 3.0)]);
        t.set_key(2.0, 2.0);
        assert_eq!(t.keys.len(), 3);
        assert!(t.keys.windows(2).all(|w| w[0].t < w[1].t));

        t.set_key(2.0, 20.0);
        assert_eq!(t.keys.len(), 3);
        assert!((evaluate(&t, 2.0).unwrap() - 20.0).abs() < EPSILON);
    }

    #[test]
    fn delete_key_removes_only_exact_time() {
        let mut t = track(&[(0.0, 0.0), (1.0, 1.0)]);
        t.delete_key(0.5);
        assert_eq!(t.keys.len(), 2);
        t.delete_key(1.0);
        assert_eq!(t.keys.len(), 1);
    }

    #[test]
    fn stepped_holds_previous_key() {
        let mut t = AnimTrack::new("Enable");
        t.set_key(0.0, false);
        t.set_key(1.0, true);
        assert_eq!(evaluate_step(&t, 0.5), Some(false));
        assert_eq!(evaluate_step(&t, 1.5), Some(true));
    }
}
