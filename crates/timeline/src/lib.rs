//! Timeline integration: overlapping clips compete for one actor, and the
//! mixer decides each tick which clip's asset the actor shows.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

mod clip;
mod mixer;

pub use clip::{load_clips, select_winner, Clip, ClipBinding, DEFAULT_PRELOAD_TIME};
pub use mixer::{ClipMixer, MAX_TIME_DELTA};

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("actor render method changed from {expected} to {} while a clip was playing", .found.as_deref().unwrap_or("none"))]
    RenderMethodChanged { expected: String, found: Option<String> },
    #[error("cannot read clip list {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse clip list {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
