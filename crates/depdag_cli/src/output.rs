//! Writing snapshots as JSON lines.

use async_trait::async_trait;
use depdag_core::ResourceKey;
use depdag_runtime::{GraphStatus, PublishError, StatusPublisher};
use serde::Serialize;
use std::io::Write;
use tokio::sync::Mutex;

/// One published line
#[derive(Debug, Serialize)]
pub struct StatusLine<'a> {
    /// Resource the snapshot belongs to
    pub resource: &'a ResourceKey,
    /// The snapshot itself
    pub status: &'a GraphStatus,
}

/// Publishes every snapshot as one JSON object per line
pub struct JsonLinesPublisher<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesPublisher<W> {
    /// Publish into `out`
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Give back the writer
    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl JsonLinesPublisher<std::io::Stdout> {
    /// Publish to standard output
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

#[async_trait]
impl<W: Write + Send> StatusPublisher for JsonLinesPublisher<W> {
    async fn publish(&self, key: &ResourceKey, status: GraphStatus) -> Result<(), PublishError> {
        let line = serde_json::to_string(&StatusLine {
            resource: key,
            status: &status,
        })?;

        let mut out = self.out.lock().await;
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }
}
