use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::CallError;

/// Audio track exposed by the platform media layer.
pub trait AudioTrack: Send + Sync {
    /// Stop capture/playout and release the device. Must tolerate
    /// being called on an already stopped track.
    fn stop(&self);

    /// Enable or disable the track without releasing it (mute).
    fn set_enabled(&self, enabled: bool);
}

/// Acquires local audio input from the platform.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Fails with `MediaPermissionDenied` on user refusal or
    /// `DeviceUnavailable` when no capture hardware exists.
    async fn request_audio_input(&self) -> Result<LocalMediaHandle, CallError>;
}

/// Owned local audio stream, held from acquisition to teardown.
pub struct LocalMediaHandle {
    id: String,
    track: Option<Arc<dyn AudioTrack>>,
}

impl LocalMediaHandle {
    pub fn new(track: Arc<dyn AudioTrack>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            track: Some(track),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn track(&self) -> Option<&Arc<dyn AudioTrack>> {
        self.track.as_ref()
    }

    pub fn set_enabled(&self, enabled: bool) {
        if let Some(track) = &self.track {
            track.set_enabled(enabled);
        }
    }

    /// Stop and drop the underlying track. Safe to call repeatedly.
    pub fn release(&mut self) {
        if let Some(track) = self.track.take() {
            track.stop();
            tracing::debug!("local media released: {}", self.id);
        }
    }
}

impl Drop for LocalMediaHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for LocalMediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMediaHandle")
            .field("id", &self.id)
            .field("released", &self.track.is_none())
            .finish()
    }
}

/// Owned remote audio stream, held from first remote media to teardown.
pub struct RemoteMediaHandle {
    id: String,
    track: Option<Arc<dyn AudioTrack>>,
}

impl RemoteMediaHandle {
    pub fn new(track: Arc<dyn AudioTrack>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            track: Some(track),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stop playout and drop the underlying track. Safe to call repeatedly.
    pub fn release(&mut self) {
        if let Some(track) = self.track.take() {
            track.stop();
            tracing::debug!("remote media released: {}", self.id);
        }
    }
}

impl Drop for RemoteMediaHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for RemoteMediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteMediaHandle")
            .field("id", &self.id)
            .field("released", &self.track.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeTrack {
        stops: AtomicUsize,
        enabled: AtomicBool,
    }

    impl FakeTrack {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                stops: AtomicUsize::new(0),
                enabled: AtomicBool::new(true),
            })
        }
    }

    impl AudioTrack for FakeTrack {
        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }

        fn set_enabled(&self, enabled: bool) {
            self.enabled.store(enabled, Ordering::SeqCst);
        }
    }

    #[test]
    fn release_is_idempotent() {
        let track = FakeTrack::new();
        let mut handle = LocalMediaHandle::new(track.clone());
        handle.release();
        handle.release();
        assert_eq!(track.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_stops_track_once() {
        let track = FakeTrack::new();
        {
            let mut handle = RemoteMediaHandle::new(track.clone());
            handle.release();
        }
        assert_eq!(track.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn set_enabled_after_release_is_noop() {
        let track = FakeTrack::new();
        let mut handle = LocalMediaHandle::new(track.clone());
        handle.release();
        handle.set_enabled(false);
        assert!(track.enabled.load(Ordering::SeqCst));
    }
}
