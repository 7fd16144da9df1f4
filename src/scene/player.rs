//! Animation playback.
//!
//! A [`ScenePlayAnim`] exists only while its animation plays: starting a
//! scene anim binds it and adds playback state to the registry, stopping
//! removes it. The per-tick drive advances every playback clock, applies the
//! loop policy, optionally remaps time through an easing curve and
//! evaluates the bound animation against the live components.

use crate::anim::LoopMode;
use crate::easing::Easing;
use crate::registry::GenRef;
use crate::scene::binding::SceneBoundAnim;
use crate::scene::{PlayAnimRef, Scene, SceneAnimRef};

/// Runtime playback state of one scene animation.
#[derive(Debug, Clone, Default)]
pub struct ScenePlayAnim {
    pub name: String,
    pub(crate) bound_anim: SceneBoundAnim,

    pub t: f32,
    pub t_start: f32,
    pub t_end: f32,
    pub t_scale: f32,

    pub paused: bool,
    pub loop_mode: LoopMode,
    pub easing: Easing,
}

impl Scene {
    /// Starts playing a scene animation with default bounds and scale.
    pub fn play_anim(&mut self, r: SceneAnimRef, loop_mode: LoopMode) -> PlayAnimRef {
        self.play_anim_ex(r, loop_mode, Easing::Linear, None, None, false, 1.0)
    }

    /// Starts playing a scene animation. `t_start`/`t_end` default to the
    /// animation's own bounds when unspecified.
    pub fn play_anim_ex(
        &mut self,
        r: SceneAnimRef,
        loop_mode: LoopMode,
        easing: Easing,
        t_start: Option<f32>,
        t_end: Option<f32>,
        paused: bool,
        t_scale: f32,
    ) -> PlayAnimRef {
        let Some(scene_anim) = self.scene_anims.get(r) else {
            log::warn!("Invalid scene animation reference");
            return GenRef::INVALID;
        };

        let t_start = t_start.unwrap_or(scene_anim.t_start);
        let t_end = t_end.unwrap_or(scene_anim.t_end);
        let name = scene_anim.name.clone();

        let play_anim = ScenePlayAnim {
            name,
            bound_anim: self.bind_anim(r),
            t: t_start,
            t_start,
            t_end,
            t_scale,
            paused,
            loop_mode,
            easing,
        };

        self.play_anims.add(play_anim)
    }

    #[must_use]
    pub fn is_playing(&self, r: PlayAnimRef) -> bool {
        self.play_anims.is_valid(r)
    }

    /// Stops a playing animation; terminal, the playback state is removed.
    pub fn stop_anim(&mut self, r: PlayAnimRef) {
        self.play_anims.remove(r);
    }

    pub fn stop_all_anims(&mut self) {
        self.play_anims.clear();
    }

    #[must_use]
    pub fn playing_anim_refs(&self) -> Vec<PlayAnimRef> {
        self.play_anims.iter().map(|(r, _)| r).collect()
    }

    #[must_use]
    pub fn playing_anim_names(&self) -> Vec<String> {
        self.play_anims
            .iter()
            .map(|(_, play)| play.name.clone())
            .collect()
    }

    #[must_use]
    pub fn play_anim_state(&self, r: PlayAnimRef) -> Option<&ScenePlayAnim> {
        self.play_anims.get(r)
    }

    pub fn play_anim_state_mut(&mut self, r: PlayAnimRef) -> Option<&mut ScenePlayAnim> {
        self.play_anims.get_mut(r)
    }

    /// Advances every playing animation by `dt` seconds and evaluates it,
    /// mutating the targeted components. `Once` playbacks that reached
    /// their bound are evaluated one final time at the bound, then removed.
    pub fn update_playing_anims(&mut self, dt: f32) {
        let refs = self.playing_anim_refs();
        let mut clean_list = Vec::new();

        for r in refs {
            let Some(play_anim) = self.play_anims.get_mut(r) else {
                continue;
            };

            // step clock
            if !play_anim.paused {
                play_anim.t += dt * play_anim.t_scale;
            }

            let range = play_anim.t_end - play_anim.t_start;

            match play_anim.loop_mode {
                LoopMode::Infinite => {} // let it run indefinitely
                LoopMode::Loop => {
                    // subtraction, not modulo: stays exact for deltas that
                    // are not a multiple of the range
                    if range > 0.0 {
                        if play_anim.t_scale >= 0.0 {
                            while play_anim.t >= play_anim.t_end {
                                play_anim.t -= range;
                            }
                        } else {
                            while play_anim.t <= play_anim.t_start {
                                play_anim.t += range;
                            }
                        }
                    }
                }
                LoopMode::Once => {
                    if play_anim.t_scale >= 0.0 {
                        if play_anim.t >= play_anim.t_end {
                            play_anim.t = play_anim.t_end;
                            clean_list.push(r); // after one last evaluation
                        }
                    } else if play_anim.t <= play_anim.t_start {
                        play_anim.t = play_anim.t_start;
                        clean_list.push(r);
                    }
                }
            }

            // easing remaps time inside the animation range only; an
            // Infinite playback outside of it evaluates at the raw clock
            let mut t = play_anim.t;
            if play_anim.easing != Easing::Linear
                && range > 0.0
                && t >= play_anim.t_start
                && t <= play_anim.t_end
            {
                let normalized = (t - play_anim.t_start) / range;
                t = play_anim.easing.apply(normalized) * range + play_anim.t_start;
            }

            // evaluation borrows the scene mutably, so the bound animation
            // steps out of its slot for the duration
            let mut bound = std::mem::take(&mut play_anim.bound_anim);
            self.evaluate_bound_anim(&mut bound, t);
            if let Some(play_anim) = self.play_anims.get_mut(r) {
                play_anim.bound_anim = bound;
            }
        }

        for r in clean_list {
            self.play_anims.remove(r);
        }
    }
}
