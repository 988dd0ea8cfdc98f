use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use crate::dump::SnapshotDump;
use crate::heap::HeapSnapshot;

pub const DEFAULT_ATTACH_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a snapshot comes from.
#[derive(Debug, Clone)]
pub enum SnapshotSource {
    /// A dump file written earlier, e.g. from a crashed process.
    DumpFile(PathBuf),
    /// The heap endpoint of a running process's agent.
    Live {
        endpoint: String,
        attach_timeout: Duration,
    },
}

impl fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DumpFile(path) => write!(f, "dump file {}", path.display()),
            Self::Live { endpoint, .. } => write!(f, "live agent {endpoint}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotUnavailable {
    pub origin: String,
    pub reason: String,
}

impl fmt::Display for SnapshotUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "snapshot unavailable from {}: {}", self.origin, self.reason)
    }
}

impl Error for SnapshotUnavailable {}

pub fn open_snapshot(
    source: &SnapshotSource,
) -> Result<Box<dyn HeapSnapshot>, SnapshotUnavailable> {
    let unavailable = |reason: String| {
        warn!(origin = %source, %reason, "snapshot unavailable");
        SnapshotUnavailable {
            origin: source.to_string(),
            reason,
        }
    };

    let text = match source {
        SnapshotSource::DumpFile(path) => std::fs::read_to_string(path)
            .map_err(|e| unavailable(format!("read {}: {e}", path.display())))?,
        SnapshotSource::Live {
            endpoint,
            attach_timeout,
        } => fetch_live(endpoint, *attach_timeout).map_err(|reason| unavailable(reason))?,
    };

    let dump: SnapshotDump = facet_json::from_str(&text)
        .map_err(|e| unavailable(format!("decode snapshot json: {e}")))?;
    let snapshot = dump
        .into_snapshot()
        .map_err(|e| unavailable(format!("invalid snapshot: {e}")))?;

    info!(
        origin = %source,
        objects = snapshot.object_count(),
        "heap snapshot opened"
    );
    Ok(Box::new(snapshot))
}

fn fetch_live(endpoint: &str, attach_timeout: Duration) -> Result<String, String> {
    let agent = ureq::AgentBuilder::new().timeout(attach_timeout).build();
    let response = agent
        .get(endpoint)
        .call()
        .map_err(|e| {
            format!(
                "attach to {endpoint} (timeout {}ms): {e}",
                attach_timeout.as_millis()
            )
        })?;
    response
        .into_string()
        .map_err(|e| format!("read GET response body: {e}"))
}
