//! Source table and stream control
//!
//! Bookkeeping for every connected vehicle: the control surface the
//! embedding application drives (connect, start/stop stream, telemetry,
//! disconnect) and the per-source frame buffers the WebRTC layer reads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::IngestConfig;
use crate::error::{RelayError, Result};
use crate::events::{EventBus, RelayEvent};
use crate::vehicle::{VehicleLink, VehicleStatus};
use crate::video::{EncodedFrame, FrameBuffer};

use super::source::{spawn_ingest_loop, IngestCounters, IngestStats};

/// State for one registered source
struct SourceEntry {
    link: Mutex<Box<dyn VehicleLink>>,
    buffer: Arc<FrameBuffer>,
    streaming: Arc<AtomicBool>,
    sequence: Arc<AtomicU64>,
    counters: Arc<IngestCounters>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Table of connected sources and their ingest loops
///
/// Structural changes (connect/disconnect) take the table write lock;
/// frame flow goes through each entry's buffer without touching it.
pub struct SourceManager {
    config: IngestConfig,
    events: EventBus,
    sources: RwLock<HashMap<String, Arc<SourceEntry>>>,
}

impl SourceManager {
    /// Create an empty source table
    pub fn new(config: IngestConfig, events: EventBus) -> Self {
        Self {
            config,
            events,
            sources: RwLock::new(HashMap::new()),
        }
    }

    /// Connect a vehicle and register it under `source_id`
    ///
    /// The link is connected before anything is registered, so a failed
    /// connection never leaves a half-registered source.
    pub async fn connect_source(
        &self,
        source_id: &str,
        mut link: Box<dyn VehicleLink>,
    ) -> Result<()> {
        if self.sources.read().await.contains_key(source_id) {
            return Err(RelayError::SourceExists(source_id.to_string()));
        }

        link.connect().await?;

        match link.status().await {
            Ok(status) => {
                info!(source_id = %source_id, battery = status.battery, "vehicle connected")
            }
            Err(e) => {
                warn!(source_id = %source_id, error = %e, "vehicle connected, telemetry unavailable")
            }
        }

        let entry = Arc::new(SourceEntry {
            link: Mutex::new(link),
            buffer: Arc::new(FrameBuffer::new(self.config.buffer_capacity)),
            streaming: Arc::new(AtomicBool::new(false)),
            sequence: Arc::new(AtomicU64::new(0)),
            counters: Arc::new(IngestCounters::default()),
            task: Mutex::new(None),
        });

        {
            let mut sources = self.sources.write().await;
            if sources.contains_key(source_id) {
                // Lost a connect race for the same id; release the new link
                drop(sources);
                let _ = entry.link.lock().await.disconnect().await;
                return Err(RelayError::SourceExists(source_id.to_string()));
            }
            sources.insert(source_id.to_string(), entry);
        }

        self.events.publish(RelayEvent::SourceConnected {
            source_id: source_id.to_string(),
        });
        Ok(())
    }

    /// Start the ingest loop for a source
    pub async fn start_stream(&self, source_id: &str) -> Result<()> {
        let entry = self.entry(source_id).await?;

        // At most one ingest loop per source
        if entry.streaming.swap(true, Ordering::SeqCst) {
            return Err(RelayError::AlreadyStreaming(source_id.to_string()));
        }

        let feed = {
            let mut link = entry.link.lock().await;
            match link.stream_on().await {
                Ok(feed) => feed,
                Err(e) => {
                    entry.streaming.store(false, Ordering::SeqCst);
                    return Err(e);
                }
            }
        };

        let handle = spawn_ingest_loop(
            source_id.to_string(),
            feed,
            Arc::clone(&entry.buffer),
            self.events.clone(),
            Arc::clone(&entry.streaming),
            Arc::clone(&entry.sequence),
            Arc::clone(&entry.counters),
            self.config.clone(),
        );
        *entry.task.lock().await = Some(handle);

        info!(source_id = %source_id, "video stream started");
        self.events.publish(RelayEvent::StreamStarted {
            source_id: source_id.to_string(),
        });
        Ok(())
    }

    /// Stop a source's ingest loop
    ///
    /// The loop observes the cleared flag within one capture period. Safe
    /// to call whether or not the stream is running.
    pub async fn stop_stream(&self, source_id: &str) {
        let Ok(entry) = self.entry(source_id).await else {
            return;
        };

        let was_streaming = entry.streaming.swap(false, Ordering::SeqCst);
        if let Some(task) = entry.task.lock().await.take() {
            let _ = task.await;
        }

        if was_streaming {
            let mut link = entry.link.lock().await;
            if let Err(e) = link.stream_off().await {
                warn!(source_id = %source_id, error = %e, "failed to stop vehicle stream");
            }
            info!(source_id = %source_id, "video stream stopped");
        }
    }

    /// Query live telemetry for a source
    pub async fn source_status(&self, source_id: &str) -> Result<VehicleStatus> {
        let entry = self.entry(source_id).await?;
        let link = entry.link.lock().await;
        link.status().await
    }

    /// Ids of all connected sources
    pub async fn list_sources(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sources.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether a source's ingest loop is active
    pub async fn is_streaming(&self, source_id: &str) -> bool {
        match self.entry(source_id).await {
            Ok(entry) => entry.streaming.load(Ordering::Relaxed),
            Err(_) => false,
        }
    }

    /// Ingest statistics for a source
    pub async fn ingest_stats(&self, source_id: &str) -> Result<IngestStats> {
        let entry = self.entry(source_id).await?;
        Ok(entry.counters.snapshot())
    }

    /// Frame buffer of a source, shared with the WebRTC bridge
    pub async fn buffer(&self, source_id: &str) -> Result<Arc<FrameBuffer>> {
        let entry = self.entry(source_id).await?;
        Ok(Arc::clone(&entry.buffer))
    }

    /// Inject an externally produced encoded frame into a source's pipeline
    ///
    /// Used when ingest happens out-of-process and frames arrive over the
    /// signaling channel instead of a local feed.
    pub async fn inject_frame(&self, source_id: &str, jpeg: Bytes) -> Result<()> {
        let entry = self.entry(source_id).await?;

        let frame = EncodedFrame::new(jpeg, entry.sequence.fetch_add(1, Ordering::Relaxed));
        if !frame.looks_like_jpeg() {
            return Err(RelayError::Video(
                "injected frame is not a JPEG payload".to_string(),
            ));
        }
        entry.buffer.put(frame);
        Ok(())
    }

    /// Disconnect one source, stopping its stream first
    pub async fn disconnect_source(&self, source_id: &str) -> Result<()> {
        let entry = {
            let mut sources = self.sources.write().await;
            sources
                .remove(source_id)
                .ok_or_else(|| RelayError::SourceNotFound(source_id.to_string()))?
        };

        let was_streaming = entry.streaming.swap(false, Ordering::SeqCst);
        if let Some(task) = entry.task.lock().await.take() {
            let _ = task.await;
        }

        {
            let mut link = entry.link.lock().await;
            if was_streaming {
                let _ = link.stream_off().await;
            }
            if let Err(e) = link.disconnect().await {
                warn!(source_id = %source_id, error = %e, "vehicle disconnect failed");
            }
        }

        info!(source_id = %source_id, "source disconnected");
        self.events.publish(RelayEvent::SourceDisconnected {
            source_id: source_id.to_string(),
        });
        Ok(())
    }

    /// Disconnect every source (shutdown path)
    pub async fn disconnect_all(&self) {
        for source_id in self.list_sources().await {
            let _ = self.disconnect_source(&source_id).await;
        }
    }

    /// Number of connected sources
    pub async fn source_count(&self) -> usize {
        self.sources.read().await.len()
    }

    async fn entry(&self, source_id: &str) -> Result<Arc<SourceEntry>> {
        self.sources
            .read()
            .await
            .get(source_id)
            .cloned()
            .ok_or_else(|| RelayError::SourceNotFound(source_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::{Velocity, VideoFeed};
    use crate::video::RawFrame;
    use async_trait::async_trait;
    use std::time::Duration;

    struct MockFeed;

    #[async_trait]
    impl VideoFeed for MockFeed {
        async fn next_frame(&mut self) -> Result<Option<RawFrame>> {
            Ok(RawFrame::new(Bytes::from(vec![64u8; 4 * 4 * 3]), 4, 4))
        }
    }

    struct MockLink {
        refuse_connect: bool,
    }

    impl MockLink {
        fn ok() -> Box<Self> {
            Box::new(Self {
                refuse_connect: false,
            })
        }

        fn unreachable() -> Box<Self> {
            Box::new(Self {
                refuse_connect: true,
            })
        }
    }

    #[async_trait]
    impl VehicleLink for MockLink {
        async fn connect(&mut self) -> Result<()> {
            if self.refuse_connect {
                return Err(RelayError::Vehicle("vehicle unreachable".to_string()));
            }
            Ok(())
        }

        async fn status(&self) -> Result<VehicleStatus> {
            Ok(VehicleStatus {
                battery: 77,
                temperature: 38.0,
                height: 0,
                velocity: Velocity::default(),
                flight_time: 0,
                signal_quality: Some(88),
            })
        }

        async fn stream_on(&mut self) -> Result<Box<dyn VideoFeed>> {
            Ok(Box::new(MockFeed))
        }

        async fn stream_off(&mut self) -> Result<()> {
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn manager() -> SourceManager {
        SourceManager::new(IngestConfig::default().with_fps(100), EventBus::new())
    }

    #[tokio::test]
    async fn test_connect_and_list() {
        let manager = manager();
        manager.connect_source("drone-1", MockLink::ok()).await.unwrap();
        manager.connect_source("drone-2", MockLink::ok()).await.unwrap();

        assert_eq!(manager.list_sources().await, vec!["drone-1", "drone-2"]);
        assert_eq!(manager.source_count().await, 2);
    }

    #[tokio::test]
    async fn test_connect_duplicate_rejected() {
        let manager = manager();
        manager.connect_source("drone-1", MockLink::ok()).await.unwrap();

        let result = manager.connect_source("drone-1", MockLink::ok()).await;
        assert!(matches!(result, Err(RelayError::SourceExists(_))));
    }

    #[tokio::test]
    async fn test_failed_connect_registers_nothing() {
        let manager = manager();
        let result = manager
            .connect_source("drone-1", MockLink::unreachable())
            .await;

        assert!(matches!(result, Err(RelayError::Vehicle(_))));
        assert_eq!(manager.source_count().await, 0);
    }

    #[tokio::test]
    async fn test_stream_lifecycle() {
        let manager = manager();
        manager.connect_source("drone-1", MockLink::ok()).await.unwrap();

        manager.start_stream("drone-1").await.unwrap();
        assert!(manager.is_streaming("drone-1").await);

        // A second start must not spawn a second loop
        let again = manager.start_stream("drone-1").await;
        assert!(matches!(again, Err(RelayError::AlreadyStreaming(_))));

        tokio::time::sleep(Duration::from_millis(60)).await;
        let buffer = manager.buffer("drone-1").await.unwrap();
        assert!(!buffer.is_empty());
        assert!(manager.ingest_stats("drone-1").await.unwrap().frames_captured > 0);

        manager.stop_stream("drone-1").await;
        assert!(!manager.is_streaming("drone-1").await);

        // Restart after stop is an explicit, supported control action
        manager.start_stream("drone-1").await.unwrap();
        manager.stop_stream("drone-1").await;
    }

    #[tokio::test]
    async fn test_start_stream_unknown_source() {
        let manager = manager();
        let result = manager.start_stream("ghost").await;
        assert!(matches!(result, Err(RelayError::SourceNotFound(_))));
    }

    #[tokio::test]
    async fn test_status_passthrough() {
        let manager = manager();
        manager.connect_source("drone-1", MockLink::ok()).await.unwrap();

        let status = manager.source_status("drone-1").await.unwrap();
        assert_eq!(status.battery, 77);
        assert_eq!(status.signal_quality, Some(88));

        assert!(manager.source_status("ghost").await.is_err());
    }

    #[tokio::test]
    async fn test_inject_frame() {
        let manager = manager();
        manager.connect_source("drone-1", MockLink::ok()).await.unwrap();

        let garbage = Bytes::from_static(b"not a jpeg");
        assert!(manager.inject_frame("drone-1", garbage).await.is_err());

        let jpeg = Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]);
        manager.inject_frame("drone-1", jpeg).await.unwrap();

        let buffer = manager.buffer("drone-1").await.unwrap();
        assert_eq!(buffer.take_latest().unwrap().len(), 4);

        let missing = manager
            .inject_frame("ghost", Bytes::from_static(&[0xFF, 0xD8, 0, 0]))
            .await;
        assert!(matches!(missing, Err(RelayError::SourceNotFound(_))));
    }

    #[tokio::test]
    async fn test_disconnect_all() {
        let manager = manager();
        manager.connect_source("drone-1", MockLink::ok()).await.unwrap();
        manager.connect_source("drone-2", MockLink::ok()).await.unwrap();
        manager.start_stream("drone-1").await.unwrap();

        manager.disconnect_all().await;
        assert_eq!(manager.source_count().await, 0);
    }
}
