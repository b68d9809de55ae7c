//! Streaming AI analysis seam (spec §5 process-wide state item 1; §9
//! "Addition — streaming analysis as a narrow seam").
//!
//! The Anthropic streaming analyser itself is out of scope for this hub.
//! What's implemented is only the seam a future analyser would attach to:
//! mint an [`AnalysisId`], get back a [`broadcast::Sender<AnalysisChunk>`]
//! to push into, and any number of subscribers can receive every chunk as
//! it's published. Once a run completes its transcript is cached for
//! [`TRANSCRIPT_TTL`] so a subscriber that missed the live broadcast can
//! still read the finished result.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::ids::AnalysisId;

const CHANNEL_CAPACITY: usize = 256;
const TRANSCRIPT_TTL: Duration = Duration::from_secs(5 * 60);

/// One piece of a streaming analysis response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisChunk {
    pub sequence: u64,
    pub text: String,
    pub done: bool,
}

struct CachedTranscript {
    chunks: Vec<AnalysisChunk>,
    completed_at: Instant,
}

impl CachedTranscript {
    fn is_fresh(&self) -> bool {
        self.completed_at.elapsed() < TRANSCRIPT_TTL
    }
}

/// Live broadcast channels for in-flight analyses, plus a TTL-swept cache
/// of finished transcripts. One instance lives on `HubRuntime` (§5 "four
/// global singletons").
#[derive(Default)]
pub struct ActiveAnalysis {
    live: DashMap<AnalysisId, broadcast::Sender<AnalysisChunk>>,
    transcripts: DashMap<AnalysisId, CachedTranscript>,
}

impl ActiveAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new run, returning its id and the sender a future analyser
    /// pushes chunks into. Subscribers must call [`Self::subscribe`] with
    /// the returned id before the analyser starts sending to observe every
    /// chunk — a `broadcast::Sender` only fans out to receivers that exist
    /// at send time.
    pub fn start(&self) -> (AnalysisId, broadcast::Sender<AnalysisChunk>) {
        let id = AnalysisId::new();
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        self.live.insert(id.clone(), tx.clone());
        (id, tx)
    }

    /// Subscribes to a run's live chunks. Returns `None` once the run has
    /// completed and been removed from the live table — callers that race
    /// completion should fall back to [`Self::transcript`].
    pub fn subscribe(&self, id: &AnalysisId) -> Option<broadcast::Receiver<AnalysisChunk>> {
        self.live.get(id).map(|tx| tx.subscribe())
    }

    /// Marks a run finished: caches its full transcript for
    /// [`TRANSCRIPT_TTL`] and drops the live channel, since nothing more
    /// will ever be sent on it.
    pub fn complete(&self, id: &AnalysisId, chunks: Vec<AnalysisChunk>) {
        self.live.remove(id);
        self.transcripts.insert(
            id.clone(),
            CachedTranscript {
                chunks,
                completed_at: Instant::now(),
            },
        );
    }

    /// Returns the cached transcript for a completed run, if it's still
    /// within [`TRANSCRIPT_TTL`]. A stale entry is evicted on read rather
    /// than swept by a background task, same as [`crate::integration::keeper::KeeperCache`].
    pub fn transcript(&self, id: &AnalysisId) -> Option<Vec<AnalysisChunk>> {
        let entry = self.transcripts.get(id)?;
        if entry.is_fresh() {
            Some(entry.chunks.clone())
        } else {
            drop(entry);
            self.transcripts.remove(id);
            None
        }
    }

    /// Broadcasts one chunk to every current subscriber of `id`. Fails if
    /// the run is unknown or already completed.
    pub fn publish(&self, id: &AnalysisId, chunk: AnalysisChunk) -> Result<()> {
        let tx = self
            .live
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("analysis run '{id}'")))?;
        // No receivers is not an error: a chunk published before any
        // subscriber joins is simply dropped, same as any broadcast channel.
        let _ = tx.send(chunk);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(sequence: u64, text: &str, done: bool) -> AnalysisChunk {
        AnalysisChunk {
            sequence,
            text: text.to_string(),
            done,
        }
    }

    #[tokio::test]
    async fn every_subscriber_observes_every_chunk() {
        let analysis = ActiveAnalysis::new();
        let (id, _tx) = analysis.start();

        let mut subscriber_a = analysis.subscribe(&id).unwrap();
        let mut subscriber_b = analysis.subscribe(&id).unwrap();

        analysis.publish(&id, chunk(0, "investigating", false)).unwrap();
        analysis.publish(&id, chunk(1, "disk usage is high", true)).unwrap();

        for subscriber in [&mut subscriber_a, &mut subscriber_b] {
            assert_eq!(subscriber.recv().await.unwrap().text, "investigating");
            let second = subscriber.recv().await.unwrap();
            assert_eq!(second.text, "disk usage is high");
            assert!(second.done);
        }
    }

    #[tokio::test]
    async fn completed_transcript_is_cached_after_the_channel_closes() {
        let analysis = ActiveAnalysis::new();
        let (id, _tx) = analysis.start();
        let chunks = vec![chunk(0, "investigating", false), chunk(1, "done", true)];
        analysis.complete(&id, chunks.clone());

        assert!(analysis.subscribe(&id).is_none());
        assert_eq!(analysis.transcript(&id).unwrap(), chunks);
    }

    #[test]
    fn unknown_run_is_not_found() {
        let analysis = ActiveAnalysis::new();
        let id = AnalysisId::new();
        let err = analysis.publish(&id, chunk(0, "x", false)).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(analysis.transcript(&id).is_none());
    }
}
