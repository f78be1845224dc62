//! Running/paused flags and uptime accounting.

use tokio::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::{FleetError, FleetResult};

#[derive(Debug, Default, Clone)]
pub struct Lifecycle {
    running: bool,
    paused: bool,
    run_id: Option<Uuid>,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
    pause_started: Option<Instant>,
    total_pause: Duration,
}

impl Lifecycle {
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    /// Begin a new run. Fails if one is active.
    pub fn start(&mut self, now: Instant) -> FleetResult<Uuid> {
        if self.running {
            return Err(FleetError::AlreadyRunning);
        }
        let run_id = Uuid::new_v4();
        *self = Self {
            running: true,
            run_id: Some(run_id),
            started_at: Some(now),
            ..Self::default()
        };
        Ok(run_id)
    }

    /// Pausing an already paused run is a no-op.
    pub fn pause(&mut self, now: Instant) -> FleetResult<()> {
        if !self.running {
            return Err(FleetError::NotRunning);
        }
        if !self.paused {
            self.paused = true;
            self.pause_started = Some(now);
        }
        Ok(())
    }

    pub fn resume(&mut self, now: Instant) -> FleetResult<()> {
        if !self.running {
            return Err(FleetError::NotPaused);
        }
        if !self.paused {
            return Err(FleetError::AlreadyRunning);
        }
        if let Some(since) = self.pause_started.take() {
            self.total_pause += now.saturating_duration_since(since);
        }
        self.paused = false;
        Ok(())
    }

    /// The dispatch loop drained its work. Uptime stops counting.
    pub fn finish(&mut self, now: Instant) {
        if let Some(since) = self.pause_started.take() {
            self.total_pause += now.saturating_duration_since(since);
        }
        self.stopped_at = Some(now);
        self.running = false;
        self.paused = false;
    }

    /// Forget the run entirely.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Accumulated pause time, including an ongoing pause.
    pub fn total_pause_duration(&self, now: Instant) -> Duration {
        let ongoing = self
            .pause_started
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default();
        self.total_pause + ongoing
    }

    /// Time from start to now (or to the end of the run) minus pauses.
    pub fn runtime(&self, now: Instant) -> Duration {
        let Some(start) = self.started_at else {
            return Duration::ZERO;
        };
        let end = self.stopped_at.unwrap_or(now);
        end.saturating_duration_since(start)
            .saturating_sub(self.total_pause_duration(end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_guarded() {
        let now = Instant::now();
        let mut lifecycle = Lifecycle::default();
        assert!(matches!(lifecycle.pause(now), Err(FleetError::NotRunning)));
        assert!(matches!(lifecycle.resume(now), Err(FleetError::NotPaused)));

        lifecycle.start(now).unwrap();
        assert!(matches!(lifecycle.start(now), Err(FleetError::AlreadyRunning)));
        assert!(matches!(lifecycle.resume(now), Err(FleetError::AlreadyRunning)));

        lifecycle.pause(now).unwrap();
        assert!(lifecycle.is_paused());
        lifecycle.resume(now).unwrap();
        assert!(!lifecycle.is_paused());
    }

    #[test]
    fn runtime_excludes_pauses() {
        let t0 = Instant::now();
        let mut lifecycle = Lifecycle::default();
        lifecycle.start(t0).unwrap();

        lifecycle.pause(t0 + Duration::from_secs(10)).unwrap();
        let mid_pause = t0 + Duration::from_secs(25);
        assert_eq!(lifecycle.total_pause_duration(mid_pause), Duration::from_secs(15));
        assert_eq!(lifecycle.runtime(mid_pause), Duration::from_secs(10));

        lifecycle.resume(t0 + Duration::from_secs(30)).unwrap();
        let later = t0 + Duration::from_secs(40);
        assert_eq!(lifecycle.runtime(later), Duration::from_secs(20));
    }

    #[test]
    fn repeated_pause_keeps_first_pause_start() {
        let t0 = Instant::now();
        let mut lifecycle = Lifecycle::default();
        lifecycle.start(t0).unwrap();

        lifecycle.pause(t0 + Duration::from_secs(5)).unwrap();
        lifecycle.pause(t0 + Duration::from_secs(20)).unwrap();
        assert!(lifecycle.is_paused());

        lifecycle.resume(t0 + Duration::from_secs(30)).unwrap();
        assert_eq!(
            lifecycle.total_pause_duration(t0 + Duration::from_secs(30)),
            Duration::from_secs(25)
        );
    }

    #[test]
    fn finished_run_keeps_final_uptime() {
        let t0 = Instant::now();
        let mut lifecycle = Lifecycle::default();
        let run_id = lifecycle.start(t0).unwrap();
        lifecycle.finish(t0 + Duration::from_secs(12));

        assert!(!lifecycle.is_running());
        assert_eq!(lifecycle.run_id(), Some(run_id));
        assert_eq!(
            lifecycle.runtime(t0 + Duration::from_secs(100)),
            Duration::from_secs(12)
        );
    }
}
