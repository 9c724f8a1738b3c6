use std::sync::Arc;

use native_engine::Handle;
use scene::{Actor, SceneContext};
use tracing::{debug, error};

use crate::clip::{select_winner, ClipBinding};
use crate::TimelineError;

/// Drift in seconds tolerated between the timeline and a playing asset before
/// the asset is re-seeked.
pub const MAX_TIME_DELTA: f64 = 0.1;

/// Actor state captured on the first tick, restored on stop.
struct FirstTick {
    original_asset: Handle,
    render_method_type: Option<String>,
}

/// Drives one actor from a track of clips.
pub struct ClipMixer {
    ctx: Arc<SceneContext>,
    first_tick: Option<FirstTick>,
    previous_winner: Option<usize>,
}

impl ClipMixer {
    pub fn new(ctx: &Arc<SceneContext>) -> Self { Self { ctx: ctx.clone(), first_tick: None, previous_winner: None } }

    pub fn previous_winner(&self) -> Option<usize> { self.previous_winner }

    pub fn is_running(&self) -> bool { self.first_tick.is_some() }

    /// One evaluation at timeline time `time`. Returns the index of the clip
    /// now bound to `actor`, if any.
    pub fn evaluate(
        &mut self,
        time: f64,
        playing: bool,
        clips: &mut [ClipBinding],
        actor: &mut Actor,
    ) -> Result<Option<usize>, TimelineError> {
        let first = self.first_tick.get_or_insert_with(|| FirstTick {
            original_asset: actor.asset(),
            render_method_type: actor.render_method_type().map(str::to_owned),
        });

        for binding in clips.iter_mut() {
            if binding.clip().wants_asset(time) {
                binding.prepare(&self.ctx);
            } else {
                binding.teardown();
            }
        }

        let winner = select_winner(clips.iter().map(ClipBinding::clip), time, self.previous_winner);

        for binding in clips.iter().filter(|b| b.clip().is_active(time)) {
            sync_playback(binding, time, playing);
        }

        if let Some(expected) = &first.render_method_type {
            if actor.render_method_type() != Some(expected.as_str()) {
                error!(expected = %expected, found = ?actor.render_method_type(), "render method changed during clip playback");
                return Err(TimelineError::RenderMethodChanged {
                    expected: expected.clone(),
                    found: actor.render_method_type().map(str::to_owned),
                });
            }
        }

        // Only a clip that actually got bound counts as the incumbent for ties.
        if winner != self.previous_winner {
            debug!(time, ?winner, previous = ?self.previous_winner, "active clip changed");
        }
        self.previous_winner = winner;

        let desired = winner.map_or(Handle::INVALID, |i| clips[i].asset_handle());
        if actor.asset() != desired {
            actor.set_asset(desired);
        }
        Ok(winner)
    }

    /// Graph stopped: hand the actor back the asset it had before the first
    /// tick (possibly none) and release every clip asset. The next `evaluate`
    /// starts fresh.
    pub fn stop(&mut self, clips: &mut [ClipBinding], actor: &mut Actor) {
        if let Some(first) = self.first_tick.take() {
            if actor.asset() != first.original_asset {
                actor.set_asset(first.original_asset);
            }
        }
        for binding in clips.iter_mut() {
            binding.teardown();
        }
        self.previous_winner = None;
    }
}

/// Keep an active clip's asset in step with the timeline clock.
fn sync_playback(binding: &ClipBinding, time: f64, playing: bool) {
    let Some(asset) = binding.asset() else { return };
    if playing && !asset.is_playing() {
        asset.play();
    }
    let local = binding.clip().local_time(time);
    let delta = local - f64::from(asset.current_time());
    if delta.abs() > MAX_TIME_DELTA || !playing {
        if local > 0.0 && local < f64::from(asset.duration()) {
            asset.seek(local as f32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::Clip;
    use native_engine::{NativeEngine, SoftwareEngine};
    use render_queue::{RenderDrain, RenderEventQueue};
    use scene::{Asset, BridgeConfig, Environment, GraphicsBackend, Platform, RenderMethod};

    fn setup() -> (Arc<SoftwareEngine>, Arc<SceneContext>, RenderDrain) {
        let engine = Arc::new(SoftwareEngine::new());
        let (queue, drain) = RenderEventQueue::new();
        let ctx = SceneContext::new(engine.clone(), queue, BridgeConfig {
            environment: Environment::new(Platform::Linux, GraphicsBackend::OpenGlCore),
            ..BridgeConfig::default()
        });
        (engine, ctx, drain)
    }

    fn overlapping(weight_a: f32, weight_b: f32) -> Vec<ClipBinding> {
        vec![
            Clip::new("clips/a", 0.0, 5.0).with_weight(weight_a).into(),
            Clip::new("clips/b", 4.0, 6.0).with_weight(weight_b).into(),
        ]
    }

    #[test]
    fn test_overlap_scenario() {
        let (engine, ctx, _drain) = setup();
        let mut actor = Actor::new(&ctx);
        let mut clips = overlapping(1.0, 2.0);
        let mut mixer = ClipMixer::new(&ctx);

        assert_eq!(mixer.evaluate(3.9, false, &mut clips, &mut actor).unwrap(), Some(0));
        assert_eq!(actor.asset(), clips[0].asset_handle());
        assert!(clips[1].is_prepared());
        assert!(clips[1].asset_handle().is_valid());
        assert!(!clips[1].asset().unwrap().is_playing());
        assert_ne!(actor.asset(), clips[1].asset_handle());

        assert_eq!(mixer.evaluate(4.5, false, &mut clips, &mut actor).unwrap(), Some(1));
        assert_eq!(actor.asset(), clips[1].asset_handle());
        assert!(clips[0].is_prepared());

        let a = clips[0].asset_handle();
        assert_eq!(mixer.evaluate(5.0, false, &mut clips, &mut actor).unwrap(), Some(1));
        assert!(clips[0].is_prepared());
        mixer.evaluate(5.1, false, &mut clips, &mut actor).unwrap();
        assert!(!clips[0].is_prepared());
        assert!(!engine.asset_is_valid(a));

        let b = clips[1].asset_handle();
        assert_eq!(mixer.evaluate(11.0, false, &mut clips, &mut actor).unwrap(), None);
        assert!(clips.iter().all(|c| !c.is_prepared()));
        assert!(!engine.asset_is_valid(b));
        assert_eq!(actor.asset(), Handle::INVALID);
    }

    #[test]
    fn test_single_rebind_per_change() {
        let (engine, ctx, _drain) = setup();
        let mut actor = Actor::new(&ctx);
        let mut clips = overlapping(1.0, 2.0);
        let mut mixer = ClipMixer::new(&ctx);
        for t in [1.0, 2.0, 3.0, 4.5, 4.6, 4.7] {
            mixer.evaluate(t, false, &mut clips, &mut actor).unwrap();
        }
        let binds: Vec<_> = engine.calls_named("actor_set_asset").into_iter().map(|c| c.arg).collect();
        assert_eq!(binds, vec![clips[0].asset_handle(), clips[1].asset_handle()]);
    }

    #[test]
    fn test_equal_weights_keep_previous_winner() {
        let (_engine, ctx, _drain) = setup();
        let mut actor = Actor::new(&ctx);
        let mut clips = overlapping(1.0, 1.0);
        let mut mixer = ClipMixer::new(&ctx);
        assert_eq!(mixer.evaluate(3.0, false, &mut clips, &mut actor).unwrap(), Some(0));
        assert_eq!(mixer.evaluate(4.0, false, &mut clips, &mut actor).unwrap(), Some(0));
        assert_eq!(mixer.evaluate(4.5, false, &mut clips, &mut actor).unwrap(), Some(0));
        assert_eq!(actor.asset(), clips[0].asset_handle());

        // Reweighting so B leads, then tying again: B is now the incumbent.
        clips[1].set_weight(2.0);
        assert_eq!(mixer.evaluate(4.6, false, &mut clips, &mut actor).unwrap(), Some(1));
        clips[1].set_weight(1.0);
        assert_eq!(mixer.evaluate(4.7, false, &mut clips, &mut actor).unwrap(), Some(1));
    }

    #[test]
    fn test_equal_weights_without_history_take_earliest_start() {
        let (_engine, ctx, _drain) = setup();
        let mut actor = Actor::new(&ctx);
        let mut clips: Vec<ClipBinding> =
            vec![Clip::new("clips/b", 4.0, 6.0).into(), Clip::new("clips/a", 0.0, 5.0).into()];
        let mut mixer = ClipMixer::new(&ctx);
        assert_eq!(mixer.evaluate(4.5, false, &mut clips, &mut actor).unwrap(), Some(1));
        assert_eq!(actor.asset(), clips[1].asset_handle());
    }

    #[test]
    fn test_stop_restores_original_asset() {
        let (_engine, ctx, _drain) = setup();
        let mut actor = Actor::new(&ctx);
        let original = Asset::new(&ctx, "clips/x");
        actor.set_asset(original.handle());

        let mut clips = overlapping(1.0, 2.0);
        let mut mixer = ClipMixer::new(&ctx);
        mixer.evaluate(1.0, false, &mut clips, &mut actor).unwrap();
        assert_eq!(actor.asset(), clips[0].asset_handle());
        assert!(mixer.is_running());

        mixer.stop(&mut clips, &mut actor);
        assert_eq!(actor.asset(), original.handle());
        assert!(clips.iter().all(|c| !c.is_prepared()));
        assert!(!mixer.is_running());
        assert_eq!(mixer.previous_winner(), None);

        // A later run captures the actor afresh, including an empty binding.
        actor.set_asset(Handle::INVALID);
        mixer.evaluate(4.5, false, &mut clips, &mut actor).unwrap();
        assert_eq!(actor.asset(), clips[1].asset_handle());
        mixer.stop(&mut clips, &mut actor);
        assert_eq!(actor.asset(), Handle::INVALID);
    }

    #[test]
    fn test_render_method_change_refuses_rebind() {
        let (_engine, ctx, _drain) = setup();
        let mut actor = Actor::new(&ctx);
        let sprite = RenderMethod::new(&ctx, "PointSprite");
        let blend = RenderMethod::new(&ctx, "PointBlend");
        actor.set_render_method(&sprite);

        let mut clips = overlapping(1.0, 2.0);
        let mut mixer = ClipMixer::new(&ctx);
        mixer.evaluate(3.0, false, &mut clips, &mut actor).unwrap();
        let bound = actor.asset();

        actor.set_render_method(&blend);
        let err = mixer.evaluate(4.5, false, &mut clips, &mut actor).unwrap_err();
        assert!(matches!(
            err,
            TimelineError::RenderMethodChanged { ref expected, ref found }
                if expected == "PointSprite" && found.as_deref() == Some("PointBlend")
        ));
        assert_eq!(actor.asset(), bound);

        actor.set_render_method(&sprite);
        assert_eq!(mixer.evaluate(4.5, false, &mut clips, &mut actor).unwrap(), Some(1));
        assert_eq!(actor.asset(), clips[1].asset_handle());
    }

    #[test]
    fn test_refused_rebind_keeps_bound_clip_as_incumbent() {
        let (_engine, ctx, _drain) = setup();
        let mut actor = Actor::new(&ctx);
        let sprite = RenderMethod::new(&ctx, "PointSprite");
        let blend = RenderMethod::new(&ctx, "PointBlend");
        actor.set_render_method(&sprite);

        let mut clips = overlapping(1.0, 2.0);
        let mut mixer = ClipMixer::new(&ctx);
        assert_eq!(mixer.evaluate(3.0, false, &mut clips, &mut actor).unwrap(), Some(0));

        actor.set_render_method(&blend);
        assert!(mixer.evaluate(4.5, false, &mut clips, &mut actor).is_err());
        assert_eq!(actor.asset(), clips[0].asset_handle());
        assert_eq!(mixer.previous_winner(), Some(0));

        // A is still what the actor shows, so it keeps the tie.
        actor.set_render_method(&sprite);
        clips[1].set_weight(1.0);
        assert_eq!(mixer.evaluate(4.6, false, &mut clips, &mut actor).unwrap(), Some(0));
        assert_eq!(actor.asset(), clips[0].asset_handle());
    }

    #[test]
    fn test_playing_graph_plays_and_resyncs_asset() {
        let (engine, ctx, _drain) = setup();
        let mut actor = Actor::new(&ctx);
        let mut clips: Vec<ClipBinding> = vec![Clip::new("clips/a", 1.0, 5.0).into()];
        let mut mixer = ClipMixer::new(&ctx);

        mixer.evaluate(3.0, true, &mut clips, &mut actor).unwrap();
        {
            let asset = clips[0].asset().unwrap();
            assert!(asset.is_playing());
            assert!((asset.current_time() - 2.0).abs() < 1e-6);
            // Within tolerance while playing: no seek on the next tick.
            asset.seek(2.05);
        }
        let seeks = engine.calls_named("asset_seek").len();

        mixer.evaluate(3.0, true, &mut clips, &mut actor).unwrap();
        assert_eq!(engine.calls_named("asset_seek").len(), seeks);

        // Scrubbing always seeks.
        mixer.evaluate(3.0, false, &mut clips, &mut actor).unwrap();
        assert_eq!(engine.calls_named("asset_seek").len(), seeks + 1);
    }
}
