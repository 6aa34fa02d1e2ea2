use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::{StartFocus, StudyRoomApi, UpdateFocus};
use crate::errors::StudyRoomError;
use crate::session::RoomId;

/// Local pomodoro clock: accumulated focus time plus the running segment, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FocusClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl FocusClock {
    pub fn start_at(&mut self, now: Instant) {
        self.accumulated = Duration::ZERO;
        self.running_since = Some(now);
    }

    pub fn pause_at(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }

    pub fn resume_at(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        let running = self
            .running_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default();
        self.accumulated + running
    }
}

/// Focus-time counter of one user, synced to the backend.
pub struct FocusTimer {
    api: StudyRoomApi,
    user_id: u64,
    room_id: Option<RoomId>,
    clock: Mutex<FocusClock>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag on every exit path, cancellation included.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl FocusTimer {
    pub fn new(api: StudyRoomApi, user_id: u64, room_id: Option<RoomId>) -> Self {
        Self {
            api,
            user_id,
            room_id,
            clock: Mutex::new(FocusClock::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    fn clock(&self) -> std::sync::MutexGuard<'_, FocusClock> {
        self.clock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin_request(&self) -> Result<InFlight<'_>, StudyRoomError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(StudyRoomError::Room("focus sync already in flight".into()));
        }
        Ok(InFlight(&self.in_flight))
    }

    pub fn is_request_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Tell the backend a focus session started, then start the local clock.
    pub async fn start(&self, cancel: Option<&CancellationToken>) -> Result<(), StudyRoomError> {
        let _guard = self.begin_request()?;
        let body = StartFocus {
            room_id: self.room_id,
            started_at: Utc::now(),
        };
        self.api.start_focus_time(self.user_id, &body, cancel).await?;
        self.clock().start_at(Instant::now());
        tracing::info!("focus timer started for user {}", self.user_id);
        Ok(())
    }

    pub fn pause(&self) {
        self.clock().pause_at(Instant::now());
    }

    pub fn resume(&self) {
        self.clock().resume_at(Instant::now());
    }

    pub fn is_running(&self) -> bool {
        self.clock().is_running()
    }

    pub fn elapsed(&self) -> Duration {
        self.clock().elapsed_at(Instant::now())
    }

    /// Push the accumulated whole seconds to the backend.
    pub async fn sync(&self, cancel: Option<&CancellationToken>) -> Result<u64, StudyRoomError> {
        let _guard = self.begin_request()?;
        let focus_seconds = self.elapsed().as_secs();
        self.api
            .update_focus_time(self.user_id, &UpdateFocus { focus_seconds }, cancel)
            .await?;
        tracing::debug!("focus time synced: {focus_seconds}s");
        Ok(focus_seconds)
    }
}
