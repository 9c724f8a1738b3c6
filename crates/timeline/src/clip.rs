use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use native_engine::Handle;
use scene::{Asset, SceneContext};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::TimelineError;

pub const DEFAULT_PRELOAD_TIME: f64 = 1.0;

fn default_preload_time() -> f64 { DEFAULT_PRELOAD_TIME }

fn default_weight() -> f32 { 1.0 }

/// A timeline segment. Times are in seconds on the timeline clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub start: f64,
    pub duration: f64,
    #[serde(default = "default_preload_time")]
    pub preload_time: f64,
    pub locator: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

impl Clip {
    pub fn new(locator: impl Into<String>, start: f64, duration: f64) -> Self {
        Self { start, duration, preload_time: DEFAULT_PRELOAD_TIME, locator: locator.into(), weight: 1.0 }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_preload_time(mut self, seconds: f64) -> Self {
        self.preload_time = seconds;
        self
    }

    pub fn end(&self) -> f64 { self.start + self.duration }

    /// `start <= time <= end`.
    pub fn is_active(&self, time: f64) -> bool { time >= self.start && time <= self.end() }

    /// In the pre-roll before `start`.
    pub fn is_preloading(&self, time: f64) -> bool { time < self.start && time >= self.start - self.preload_time.max(0.0) }

    /// Whether the clip should hold a prepared asset at `time`.
    pub fn wants_asset(&self, time: f64) -> bool { self.is_preloading(time) || self.is_active(time) }

    /// Clip-local time.
    pub fn local_time(&self, time: f64) -> f64 { time - self.start }
}

pub fn load_clips(path: &Path) -> Result<Vec<Clip>, TimelineError> {
    let text = fs::read_to_string(path).map_err(|source| TimelineError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_str(&text).map_err(|source| TimelineError::Parse { path: path.to_path_buf(), source })
}

/// Pick the clip the actor should show at `time`: greatest weight, then the
/// previous winner, then the earliest start, then the lowest index.
pub fn select_winner<'a>(clips: impl IntoIterator<Item = &'a Clip>, time: f64, previous: Option<usize>) -> Option<usize> {
    let mut best: Option<(usize, &Clip)> = None;
    for (index, clip) in clips.into_iter().enumerate() {
        if !clip.is_active(time) {
            continue;
        }
        best = match best {
            Some((b, current)) if !beats(index, clip, b, current, previous) => Some((b, current)),
            _ => Some((index, clip)),
        };
    }
    best.map(|(index, _)| index)
}

/// NaN weights rank below every real weight.
fn rank(weight: f32) -> f32 {
    if weight.is_nan() { f32::NEG_INFINITY } else { weight }
}

fn beats(index: usize, clip: &Clip, best_index: usize, best: &Clip, previous: Option<usize>) -> bool {
    match rank(clip.weight).total_cmp(&rank(best.weight)) {
        Ordering::Greater => return true,
        Ordering::Less => return false,
        Ordering::Equal => {}
    }
    if previous == Some(index) {
        return true;
    }
    if previous == Some(best_index) {
        return false;
    }
    clip.start < best.start
}

/// A clip plus the asset it owns while inside its preload or active window.
pub struct ClipBinding {
    clip: Clip,
    asset: Option<Asset>,
}

impl ClipBinding {
    pub fn new(clip: Clip) -> Self { Self { clip, asset: None } }

    pub fn clip(&self) -> &Clip { &self.clip }

    pub fn set_weight(&mut self, weight: f32) { self.clip.weight = weight; }

    pub fn asset(&self) -> Option<&Asset> { self.asset.as_ref() }

    pub fn is_prepared(&self) -> bool { self.asset.is_some() }

    pub fn asset_handle(&self) -> Handle { self.asset.as_ref().map_or(Handle::INVALID, Asset::handle) }

    /// Open the asset if not open yet. It is left paused.
    pub fn prepare(&mut self, ctx: &Arc<SceneContext>) {
        if self.asset.is_none() {
            let asset = Asset::new(ctx, &self.clip.locator);
            debug!(locator = %self.clip.locator, asset = %asset.handle(), "clip asset prepared");
            self.asset = Some(asset);
        }
    }

    pub fn teardown(&mut self) {
        if let Some(mut asset) = self.asset.take() {
            if asset.is_playing() {
                asset.stop();
            }
            debug!(locator = %self.clip.locator, asset = %asset.handle(), "clip asset torn down");
            asset.delete();
        }
    }
}

impl From<Clip> for ClipBinding {
    fn from(clip: Clip) -> Self { Self::new(clip) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_windows() {
        let clip = Clip::new("a", 4.0, 6.0);
        assert!(!clip.wants_asset(2.9));
        assert!(clip.is_preloading(3.0));
        assert!(clip.is_preloading(3.9));
        assert!(!clip.is_active(3.9));
        assert!(clip.is_active(4.0) && clip.is_active(10.0));
        assert!(!clip.wants_asset(10.1));
        assert!(!Clip::new("b", 4.0, 1.0).with_preload_time(-2.0).is_preloading(3.5));
    }

    #[test]
    fn test_greatest_weight_wins() {
        let clips = [Clip::new("a", 0.0, 5.0).with_weight(0.4), Clip::new("b", 4.0, 6.0).with_weight(0.6)];
        assert_eq!(select_winner(&clips, 4.5, Some(0)), Some(1));
        assert_eq!(select_winner(&clips, 3.0, None), Some(0));
        assert_eq!(select_winner(&clips, 11.0, Some(1)), None);
    }

    #[test]
    fn test_tie_prefers_previous_then_earliest_start() {
        let clips = [Clip::new("late", 4.0, 6.0), Clip::new("early", 0.0, 5.0)];
        assert_eq!(select_winner(&clips, 4.5, Some(0)), Some(0));
        assert_eq!(select_winner(&clips, 4.5, Some(1)), Some(1));
        assert_eq!(select_winner(&clips, 4.5, None), Some(1));
        // A previous winner that is no longer active does not count.
        assert_eq!(select_winner(&clips, 4.5, Some(7)), Some(1));
    }

    #[test]
    fn test_tie_on_start_takes_lowest_index() {
        let clips = [Clip::new("a", 1.0, 2.0), Clip::new("b", 1.0, 2.0), Clip::new("c", 1.0, 2.0)];
        assert_eq!(select_winner(&clips, 2.0, None), Some(0));
        assert_eq!(select_winner(&clips, 2.0, Some(2)), Some(2));
    }

    #[test]
    fn test_nan_weight_never_outranks_real_weight() {
        let clips = [Clip::new("a", 0.0, 5.0).with_weight(f32::NAN), Clip::new("b", 4.0, 6.0).with_weight(0.1)];
        assert_eq!(select_winner(&clips, 4.5, None), Some(1));
        assert_eq!(select_winner(&clips, 4.5, Some(0)), Some(1));
        assert_eq!(select_winner(&clips, 3.0, None), Some(0));

        let mut binding = ClipBinding::new(Clip::new("c", 4.0, 6.0));
        binding.set_weight(-f32::NAN);
        let clips = [Clip::new("a", 0.0, 5.0).with_weight(0.5), binding.clip().clone()];
        assert_eq!(select_winner(&clips, 4.5, Some(1)), Some(0));
    }

    #[test]
    fn test_selection_is_repeatable() {
        let clips = [Clip::new("a", 0.0, 5.0), Clip::new("b", 4.0, 6.0), Clip::new("c", 4.5, 1.0).with_weight(0.5)];
        let first = select_winner(&clips, 4.75, Some(1));
        for _ in 0..5 {
            assert_eq!(select_winner(&clips, 4.75, Some(1)), first);
        }
    }

    #[test]
    fn test_load_clips_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"start": 0.0, "duration": 5.0, "locator": "clips/a"}},
                        {{"start": 4.0, "duration": 6.0, "locator": "clips/b", "weight": 2.0, "preload_time": 0.5}}]"#)
            .unwrap();
        let clips = load_clips(file.path()).unwrap();
        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0].preload_time, DEFAULT_PRELOAD_TIME);
        assert_eq!(clips[0].weight, 1.0);
        assert_eq!(clips[1], Clip::new("clips/b", 4.0, 6.0).with_weight(2.0).with_preload_time(0.5));
    }

    #[test]
    fn test_load_clips_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_clips(&dir.path().join("missing.json")), Err(TimelineError::Io { .. })));
        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{not json").unwrap();
        assert!(matches!(load_clips(&bad), Err(TimelineError::Parse { .. })));
    }
}
