//! Saving and restoring [State] across process restarts.
//!
//! State is flattened into an ordered list of buckets plus the current bucket
//! and encoded with bincode. Restoring is best-effort: a missing or corrupt
//! file yields an empty state rather than an error.

use crate::bucket::Bucket;
use crate::current::Current;
use crate::state::State;
use crate::window::Window;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::io::Write;
use thiserror::Error;
use tracing::{event, instrument, Level};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode state")]
    Encode(#[source] bincode::Error),

    #[error("Failed to decode state")]
    Decode(#[source] bincode::Error),

    #[error("Unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

// The on-disk representation. The window is flattened oldest first.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    buckets: Vec<Bucket>,
    current: Current,
}

impl From<&State> for Snapshot {
    fn from(state: &State) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            buckets: state.window.iter().cloned().collect(),
            current: state.current.clone(),
        }
    }
}

impl From<Snapshot> for State {
    fn from(snapshot: Snapshot) -> Self {
        let window: Window = snapshot.buckets.into_iter().collect();
        State::new(window, snapshot.current)
    }
}

/// Encodes `state` into bytes.
pub fn encode(state: &State) -> Result<Vec<u8>, Error> {
    bincode::serialize(&Snapshot::from(state)).map_err(Error::Encode)
}

/// Decodes bytes produced by [encode].
pub fn decode(bytes: &[u8]) -> Result<State, Error> {
    let snapshot: Snapshot = bincode::deserialize(bytes).map_err(Error::Decode)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(Error::UnsupportedVersion(snapshot.version));
    }
    Ok(snapshot.into())
}

/// Writes `state` to `path`.
///
/// The file is written to a temporary file in the same directory and renamed
/// into place. On Unix, it is readable and writable only by its owner.
#[instrument(skip(state), err, name = "persistence::save")]
pub fn save(path: &Utf8Path, state: &State) -> Result<(), Error> {
    let bytes = encode(state)?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => dir,
        _ => Utf8Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(&bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| Error::Io(e.error))?;

    event!(
        Level::INFO,
        %path,
        buckets = state.window.len(),
        total = state.current.global_total(),
        "Saved state"
    );
    Ok(())
}

/// Reads state from `path`.
///
/// Never fails: problems are logged and an empty state is returned. The file
/// is left in place; callers [discard] it once the restored state is owned by
/// something which will save it again.
#[instrument(name = "persistence::restore")]
pub fn restore(path: &Utf8Path) -> State {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            event!(Level::INFO, %path, "No state file found; starting from an empty state");
            return State::default();
        }
        Err(err) => {
            event!(Level::WARN, %path, error = %err, "Could not read state file; starting from an empty state");
            return State::default();
        }
    };

    let state = match decode(&bytes) {
        Ok(state) => state,
        Err(err) => {
            event!(Level::WARN, %path, error = %err, "Could not decode state file; starting from an empty state");
            return State::default();
        }
    };
    event!(
        Level::INFO,
        %path,
        buckets = state.window.len(),
        total = state.current.global_total(),
        "Restored state"
    );
    state
}

/// Removes a state file which has already been restored, so a crash loop
/// does not keep re-reading stale state.
///
/// A missing file is not an error; other failures are logged.
#[instrument(name = "persistence::discard")]
pub fn discard(path: &Utf8Path) {
    match std::fs::remove_file(path) {
        Ok(()) => event!(Level::DEBUG, %path, "Removed restored state file"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => (),
        Err(err) => event!(Level::WARN, %path, error = %err, "Could not remove state file"),
    }
}
