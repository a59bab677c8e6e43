//! Auto-scroll clock
//!
//! Advances a scroll offset at `speed` units per second on a fixed tick
//! interval. The clock knows nothing about the viewport; consumers read
//! `position()` or follow `subscribe()`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_SPEED: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScrollState {
    pub speed: f64,
    pub position: f64,
    pub running: bool,
}

fn valid_speed(speed: f64) -> bool {
    speed.is_finite() && speed > 0.0
}

pub struct ScrollClock {
    interval: Duration,
    state: Arc<Mutex<ScrollState>>,
    positions: Arc<watch::Sender<f64>>,
    schedule: Option<CancellationToken>,
}

impl ScrollClock {
    pub fn new(interval: Duration, speed: f64) -> Self {
        let (positions, _) = watch::channel(0.0);
        Self {
            interval,
            state: Arc::new(Mutex::new(ScrollState {
                speed: if valid_speed(speed) { speed } else { DEFAULT_SPEED },
                position: 0.0,
                running: false,
            })),
            positions: Arc::new(positions),
            schedule: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn snapshot(&self) -> ScrollState {
        *lock(&self.state)
    }

    pub fn position(&self) -> f64 {
        self.snapshot().position
    }

    pub fn speed(&self) -> f64 {
        self.snapshot().speed
    }

    pub fn is_running(&self) -> bool {
        self.snapshot().running
    }

    /// Receives the position after every tick.
    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.positions.subscribe()
    }

    /// Start ticking. A running schedule is cancelled first so there is never
    /// more than one timer. Must be called inside a tokio runtime.
    pub fn start(&mut self, speed: f64) {
        self.cancel_schedule();

        {
            let mut state = lock(&self.state);
            if valid_speed(speed) {
                state.speed = speed;
            } else {
                log::warn!("Scroll: ignoring invalid speed {}, keeping {}", speed, state.speed);
            }
            state.running = true;
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let state = self.state.clone();
        let positions = self.positions.clone();
        let interval = self.interval;

        // Each tick is scheduled only after the previous one has completed.
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        if !advance(&state, interval, &positions) {
                            break;
                        }
                    }
                }
            }
        });

        self.schedule = Some(token);
        log::debug!("Scroll: started at {} units/s", self.speed());
    }

    /// Advance by one interval. A no-op unless the clock is running.
    pub fn tick(&self) -> bool {
        advance(&self.state, self.interval, &self.positions)
    }

    /// Stop ticking. No position change is observable after this returns.
    pub fn stop(&mut self) {
        let position = {
            let mut state = lock(&self.state);
            state.running = false;
            state.position
        };
        self.cancel_schedule();
        log::debug!("Scroll: stopped at {:.1}", position);
    }

    /// Change speed without touching the position. Non-positive or
    /// non-finite speeds are ignored.
    pub fn set_speed(&self, speed: f64) -> bool {
        if !valid_speed(speed) {
            log::debug!("Scroll: ignoring invalid speed {}", speed);
            return false;
        }
        lock(&self.state).speed = speed;
        true
    }

    /// Stop and rewind to the top. Subscribers stay attached and see 0.
    pub fn reset(&mut self) {
        {
            let mut state = lock(&self.state);
            state.running = false;
            state.position = 0.0;
            self.positions.send_replace(0.0);
        }
        self.cancel_schedule();
    }

    fn cancel_schedule(&mut self) {
        if let Some(token) = self.schedule.take() {
            token.cancel();
        }
    }
}

impl Drop for ScrollClock {
    fn drop(&mut self) {
        self.cancel_schedule();
    }
}

fn lock(state: &Mutex<ScrollState>) -> std::sync::MutexGuard<'_, ScrollState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

fn advance(state: &Mutex<ScrollState>, interval: Duration, positions: &watch::Sender<f64>) -> bool {
    let mut state = lock(state);
    if !state.running {
        return false;
    }
    state.position += state.speed * interval.as_secs_f64();
    // Published under the lock so a concurrent reset is never overwritten.
    positions.send_replace(state.position);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> ScrollClock {
        ScrollClock::new(DEFAULT_TICK_INTERVAL, DEFAULT_SPEED)
    }

    #[tokio::test(start_paused = true)]
    async fn position_tracks_speed_times_elapsed_time() {
        for speed in [1.0, 20.0, 37.5, 400.0] {
            let mut clock = clock();
            clock.start(speed);
            tokio::time::sleep(Duration::from_secs(3)).await;

            let expected = speed * 3.0;
            let one_tick = speed * DEFAULT_TICK_INTERVAL.as_secs_f64();
            let position = clock.position();
            assert!(
                (position - expected).abs() <= one_tick + 1e-9,
                "speed {}: position {} vs expected {}",
                speed,
                position,
                expected
            );
            clock.stop();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn no_movement_after_stop() {
        let mut clock = clock();
        clock.start(20.0);
        tokio::time::sleep(Duration::from_millis(500)).await;
        clock.stop();

        let frozen = clock.position();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(clock.position(), frozen);
        assert!(!clock.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_does_not_double_the_rate() {
        let mut clock = clock();
        clock.start(20.0);
        clock.start(20.0);
        clock.start(20.0);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(clock.position() <= 21.0, "position {}", clock.position());
    }

    #[test]
    fn tick_is_a_no_op_while_stopped() {
        let clock = clock();
        assert!(!clock.tick());
        assert_eq!(clock.position(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_ticks_advance_by_one_interval() {
        let mut clock = clock();
        clock.start(20.0);
        assert!(clock.tick());
        assert!(clock.tick());
        assert!((clock.position() - 2.0).abs() < 1e-9);
        clock.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn set_speed_keeps_position_and_rejects_invalid_values() {
        let mut clock = clock();
        clock.start(20.0);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let before = clock.position();

        assert!(!clock.set_speed(0.0));
        assert!(!clock.set_speed(-3.0));
        assert!(!clock.set_speed(f64::NAN));
        assert_eq!(clock.speed(), 20.0);

        assert!(clock.set_speed(40.0));
        assert_eq!(clock.speed(), 40.0);
        assert!(clock.position() >= before);
        clock.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_monotonic_positions() {
        let mut clock = clock();
        let mut rx = clock.subscribe();
        clock.start(10.0);

        let mut last = 0.0;
        for _ in 0..5 {
            rx.changed().await.unwrap();
            let now = *rx.borrow();
            assert!(now > last);
            last = now;
        }
        clock.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn reset_rewinds_without_detaching_subscribers() {
        let mut clock = clock();
        let mut rx = clock.subscribe();
        clock.start(20.0);
        tokio::time::sleep(Duration::from_millis(500)).await;

        clock.reset();
        assert_eq!(clock.position(), 0.0);
        assert!(!clock.is_running());
        assert_eq!(*rx.borrow_and_update(), 0.0);

        clock.start(20.0);
        rx.changed().await.unwrap();
        assert!(*rx.borrow() > 0.0);
        assert_eq!(clock.speed(), 20.0);
        clock.stop();
    }

    #[test]
    fn invalid_initial_speed_falls_back_to_default() {
        let clock = ScrollClock::new(DEFAULT_TICK_INTERVAL, 0.0);
        assert_eq!(clock.speed(), DEFAULT_SPEED);
    }
}
