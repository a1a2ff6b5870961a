// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Snapshot-and-diff progress feed.
//!
//! A [`ProgressStream`] turns the tracker's mutable state into an ordered
//! sequence of [`ProgressEvent`]s for one observer:
//!
//! 1. read a snapshot;
//! 2. if it equals the last emitted one, wait and retry without emitting;
//! 3. otherwise emit it and make it the new baseline;
//! 4. after a terminal snapshot, wait a short grace period and end.
//!
//! Waiting wakes on the tracker's transition feed, with the poll interval as
//! an upper bound, so observers see changes without poll latency while the
//! diff still coalesces bursts.
//!
//! # Example
//!
//! ```ignore
//! use futures::StreamExt;
//!
//! let mut events = ProgressStream::new(tracker.clone(), StreamSettings::default()).into_stream();
//! while let Some(event) = events.next().await {
//!     println!("{}", event.to_sse_data()?);
//! }
//! ```

use std::time::Duration;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::progress::{OperationState, ProgressTracker};

/// Marker serialized as the `status` of an idle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleStatus {
    /// No operation exists
    Idle,
}

/// One discrete event emitted to an observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressEvent {
    /// No operation exists; serialized as `{"status":"idle"}`.
    Idle {
        /// Always [`IdleStatus::Idle`]
        status: IdleStatus,
    },
    /// Snapshot of the current operation.
    State(OperationState),
}

impl ProgressEvent {
    /// The idle event.
    pub fn idle() -> Self {
        ProgressEvent::Idle {
            status: IdleStatus::Idle,
        }
    }

    fn from_snapshot(snapshot: Option<OperationState>) -> Self {
        match snapshot {
            Some(state) => ProgressEvent::State(state),
            None => ProgressEvent::idle(),
        }
    }

    /// Whether this event carries a terminal status.
    pub fn is_terminal(&self) -> bool {
        match self {
            ProgressEvent::Idle { .. } => false,
            ProgressEvent::State(state) => state.is_terminal(),
        }
    }

    /// Whether this is the idle event.
    pub fn is_idle(&self) -> bool {
        matches!(self, ProgressEvent::Idle { .. })
    }

    /// JSON payload for a server-sent-events `data:` line.
    pub fn to_sse_data(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Timing and termination knobs for a [`ProgressStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    /// Upper bound between two reads when no transition is signalled
    pub poll_interval: Duration,
    /// Delay between a terminal event and the end of the stream
    pub terminal_grace: Duration,
    /// End the stream after emitting an idle event
    pub idle_terminates: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            terminal_grace: Duration::from_secs(2),
            idle_terminates: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Watching,
    Closing,
    Done,
}

/// Per-observer progress feed over a [`ProgressTracker`].
#[derive(Debug)]
pub struct ProgressStream {
    tracker: ProgressTracker,
    settings: StreamSettings,
    wake: broadcast::Receiver<OperationState>,
    last: Option<Option<OperationState>>,
    phase: Phase,
}

impl ProgressStream {
    /// Create a stream for one observer.
    pub fn new(tracker: ProgressTracker, settings: StreamSettings) -> Self {
        let wake = tracker.subscribe();
        Self {
            tracker,
            settings,
            wake,
            last: None,
            phase: Phase::Watching,
        }
    }

    /// Next event, or `None` once the stream has ended.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.phase {
                Phase::Done => return None,
                Phase::Closing => {
                    tokio::time::sleep(self.settings.terminal_grace).await;
                    self.phase = Phase::Done;
                    return None;
                }
                Phase::Watching => {}
            }

            let snapshot = self.tracker.read();
            if self.last.as_ref() != Some(&snapshot) {
                self.last = Some(snapshot.clone());
                let event = ProgressEvent::from_snapshot(snapshot);
                if event.is_terminal() || (event.is_idle() && self.settings.idle_terminates) {
                    self.phase = Phase::Closing;
                }
                return Some(event);
            }

            self.wait_for_change().await;
        }
    }

    async fn wait_for_change(&mut self) {
        tokio::select! {
            received = self.wake.recv() => {
                if let Err(broadcast::error::RecvError::Closed) = received {
                    // Tracker gone: fall back to plain polling.
                    tokio::time::sleep(self.settings.poll_interval).await;
                }
            }
            _ = tokio::time::sleep(self.settings.poll_interval) => {}
        }
    }

    /// Adapt into a [`futures::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next_event().await.map(|event| (event, stream))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{OperationKind, OperationStatus, ProgressUpdate};
    use futures::StreamExt;

    fn fast() -> StreamSettings {
        StreamSettings {
            poll_interval: Duration::from_millis(10),
            terminal_grace: Duration::from_millis(1),
            idle_terminates: true,
        }
    }

    #[tokio::test]
    async fn test_idle_stream_emits_once_and_ends() {
        let tracker = ProgressTracker::new();
        let events: Vec<ProgressEvent> = ProgressStream::new(tracker, fast())
            .into_stream()
            .collect()
            .await;
        assert_eq!(events, vec![ProgressEvent::idle()]);
    }

    #[tokio::test]
    async fn test_idle_stream_keeps_polling_when_configured() {
        let tracker = ProgressTracker::new();
        let settings = StreamSettings {
            idle_terminates: false,
            ..fast()
        };
        let mut stream = ProgressStream::new(tracker.clone(), settings);

        assert_eq!(stream.next_event().await, Some(ProgressEvent::idle()));

        tracker.start(OperationKind::Pull, "m", 0);
        let event = stream.next_event().await.unwrap();
        assert!(matches!(event, ProgressEvent::State(ref s) if s.kind == OperationKind::Pull));
    }

    #[tokio::test]
    async fn test_identical_snapshots_are_not_repeated() {
        let tracker = ProgressTracker::new();
        tracker.start(OperationKind::Benchmark, "x", 2);
        let mut stream = ProgressStream::new(tracker.clone(), fast());

        let first = stream.next_event().await.unwrap();
        assert!(matches!(first, ProgressEvent::State(ref s) if s.is_running()));

        // Nothing changed: the stream must not produce a second event.
        let pending =
            tokio::time::timeout(Duration::from_millis(60), stream.next_event()).await;
        assert!(pending.is_err());

        tracker.update(ProgressUpdate::new("moved").completed(1));
        let second = stream.next_event().await.unwrap();
        assert!(matches!(second, ProgressEvent::State(ref s) if s.message == "moved"));
    }

    #[tokio::test]
    async fn test_terminal_event_is_last_and_unique() {
        let tracker = ProgressTracker::new();
        tracker.start(OperationKind::Benchmark, "x", 1);
        let stream = ProgressStream::new(tracker.clone(), fast()).into_stream();

        let worker = {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                tracker.update(ProgressUpdate::new("halfway").completed(1));
                tokio::time::sleep(Duration::from_millis(20)).await;
                tracker.complete("done");
            })
        };

        let events: Vec<ProgressEvent> = stream.collect().await;
        worker.await.unwrap();

        let terminal: Vec<&ProgressEvent> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminal.len(), 1);
        assert!(events.last().unwrap().is_terminal());
        match events.last().unwrap() {
            ProgressEvent::State(state) => assert_eq!(state.status, OperationStatus::Complete),
            other => panic!("unexpected final event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_over_finished_operation_emits_terminal_once() {
        let tracker = ProgressTracker::new();
        tracker.start(OperationKind::Benchmark, "x", 1);
        tracker.cancel();

        let events: Vec<ProgressEvent> = ProgressStream::new(tracker, fast())
            .into_stream()
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_terminal());
    }

    #[test]
    fn test_idle_event_wire_format() {
        assert_eq!(
            ProgressEvent::idle().to_sse_data().unwrap(),
            r#"{"status":"idle"}"#
        );
    }
}
