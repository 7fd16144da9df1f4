//! Easing functions for animation playback.
//!
//! A closed set of curves remapping normalized time in `[0, 1]`. Playback
//! applies them only while the clock is inside the animation range; see
//! [`crate::scene::Scene::update_playing_anims`].

use serde::{Deserialize, Serialize};

use std::f32::consts::PI;

/// Easing curve selector, serialized as a single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Easing {
    #[default]
    Linear,
    Step,
    SmoothStep,
    InQuad,
    OutQuad,
    InOutQuad,
    InCubic,
    OutCubic,
    InOutCubic,
    InSine,
    OutSine,
    InOutSine,
    InExpo,
    OutExpo,
    InCirc,
    OutCirc,
    InBack,
    OutBack,
    InBounce,
    OutBounce,
}

impl Easing {
    /// Byte value used in the binary format.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a byte from the binary format, falling back to `Linear` for
    /// unknown values.
    #[must_use]
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Step,
            2 => Self::SmoothStep,
            3 => Self::InQuad,
            4 => Self::OutQuad,
            5 => Self::InOutQuad,
            6 => Self::InCubic,
            7 => Self::OutCubic,
            8 => Self::InOutCubic,
            9 => Self::InSine,
            10 => Self::OutSine,
            11 => Self::InOutSine,
            12 => Self::InExpo,
            13 => Self::OutExpo,
            14 => Self::InCirc,
            15 => Self::OutCirc,
            16 => Self::InBack,
            17 => Self::OutBack,
            18 => Self::InBounce,
            19 => Self::OutBounce,
            _ => Self::Linear,
        }
    }

    /// Remaps normalized time `t` through the curve.
    #[must_use]
    pub fn apply(self, t: f32) -> f32 {
        match self {
            Self::Linear => t,
            Self::Step => {
                if t < 0.5 {
                    0.0
                } else {
                    1.0
                }
            }
            Self::SmoothStep => t * t * (3.0 - 2.0 * t),
            Self::InQuad => t * t,
            Self::OutQuad => t * (2.0 - t),
            Self::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
            Self::InCubic => t * t * t,
            Self::OutCubic => {
                let u = t - 1.0;
                u * u * u + 1.0
            }
            Self::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    let u = 2.0 * t - 2.0;
                    0.5 * u * u * u + 1.0
                }
            }
            Self::InSine => 1.0 - (t * PI * 0.5).cos(),
            Self::OutSine => (t * PI * 0.5).sin(),
            Self::InOutSine => 0.5 * (1.0 - (t * PI).cos()),
            Self::InExpo => {
                if t <= 0.0 {
                    0.0
                } else {
                    2.0_f32.powf(10.0 * (t - 1.0))
                }
            }
            Self::OutExpo => {
                if t >= 1.0 {
                    1.0
                } else {
                    1.0 - 2.0_f32.powf(-10.0 * t)
                }
            }
            Self::InCirc => 1.0 - (1.0 - t * t).max(0.0).sqrt(),
            Self::OutCirc => (1.0 - (t - 1.0) * (t - 1.0)).max(0.0).sqrt(),
            Self::InBack => {
                const S: f32 = 1.70158;
                t * t * ((S + 1.0) * t - S)
            }
            Self::OutBack => {
                const S: f32 = 1.70158;
                let u = t - 1.0;
                u * u * ((S + 1.0) * u + S) + 1.0
            }
            Self::InBounce => 1.0 - Self::OutBounce.apply(1.0 - t),
            Self::OutBounce => {
                if t < 1.0 / 2.75 {
                    7.5625 * t * t
                } else if t < 2.0 / 2.75 {
                    let u = t - 1.5 / 2.75;
                    7.5625 * u * u + 0.75
                } else if t < 2.5 / 2.75 {
                    let u = t - 2.25 / 2.75;
                    7.5625 * u * u + 0.9375
                } else {
                    let u = t - 2.625 / 2.75;
                    7.5625 * u * u + 0.984375
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn endpoints_are_fixed() {
        for easing in [
            Easing::Linear,
            Easing::SmoothStep,
            Easing::InQuad,
            Easing::OutQuad,
            Easing::InOutQuad,
            Easing::InCubic,
            Easing::OutCubic,
            Easing::InOutCubic,
            Easing::InSine,
            Easing::OutSine,
            Easing::InOutSine,
            Easing::OutExpo,
            Easing::InCirc,
            Easing::OutCirc,
            Easing::InBounce,
            Easing::OutBounce,
        ] {
            assert!(easing.apply(0.0).abs() < 1e-3, "{easing:?} at 0");
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-3, "{easing:?} at 1");
        }
    }

    #[test]
    fn linear_is_identity() {
        assert!((Easing::Linear.apply(0.37) - 0.37).abs() < EPSILON);
    }

    #[test]
    fn byte_round_trip() {
        for v in 0..20_u8 {
            let easing = Easing::from_u8(v);
            assert_eq!(easing.to_u8(), v);
        }
        assert_eq!(Easing::from_u8(200), Easing::Linear);
    }
}
