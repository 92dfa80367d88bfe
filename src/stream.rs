/// Adaptive polling session for live trip tracking.
///
/// A session repeatedly re-fetches one trip and only emits when the
/// canonical payload actually changed (seahash fingerprint). The
/// interval adapts: a detected change shrinks it (fast polling while
/// the trip is "hot"), a miss grows it, both bounded by the configured
/// window. The session ends itself once the trip reaches a terminal
/// status or after too many consecutive not-found responses.
use crate::models::Trip;
use futures::Stream;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub max_consecutive_not_found: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(60),
            max_consecutive_not_found: 5,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum StepOutcome {
    /// Changed payload, push it downstream.
    Emit(Trip),
    /// Nothing new, keep polling.
    Silent,
    /// Session is over.
    Finished,
}

#[derive(Debug)]
pub struct PollState {
    config: PollConfig,
    interval: Duration,
    fingerprint: Option<u64>,
    not_found_streak: u32,
    finished: bool,
    ticks: u64,
}

impl PollState {
    pub fn new(config: PollConfig) -> Self {
        let interval = config.min_interval;
        Self {
            config,
            interval,
            fingerprint: None,
            not_found_streak: 0,
            finished: false,
            ticks: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn shrink(&mut self) {
        self.interval = (self.interval / 2).max(self.config.min_interval);
    }

    fn grow(&mut self) {
        self.interval = (self.interval * 2).min(self.config.max_interval);
    }

    /// Feed one fetch result into the session.
    ///
    /// `None` covers both upstream not-found and exhausted retries; the
    /// distinction is not preserved past the adapter boundary.
    pub fn observe(&mut self, fetched: Option<Trip>) -> StepOutcome {
        self.ticks += 1;
        match fetched {
            None => {
                self.not_found_streak += 1;
                self.grow();
                if self.not_found_streak >= self.config.max_consecutive_not_found {
                    self.finished = true;
                    StepOutcome::Finished
                } else {
                    StepOutcome::Silent
                }
            }
            Some(trip) => {
                self.not_found_streak = 0;
                let fingerprint = trip.fingerprint();
                let changed = self.fingerprint != Some(fingerprint);
                self.fingerprint = Some(fingerprint);

                if trip.status.is_terminal() {
                    self.finished = true;
                    return if changed {
                        // Push the final state once before closing.
                        StepOutcome::Emit(trip)
                    } else {
                        StepOutcome::Finished
                    };
                }

                if changed {
                    self.shrink();
                    StepOutcome::Emit(trip)
                } else {
                    self.grow();
                    StepOutcome::Silent
                }
            }
        }
    }
}

/// Turn a re-fetchable trip lookup into a stream of changed snapshots.
///
/// The first fetch happens immediately; every later one waits out the
/// session's current adaptive interval.
pub fn trip_updates<F, Fut>(config: PollConfig, fetch: F) -> impl Stream<Item = Trip>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Option<Trip>> + Send,
{
    futures::stream::unfold(
        (PollState::new(config), fetch),
        |(mut state, mut fetch)| async move {
            loop {
                if state.is_finished() {
                    return None;
                }
                if state.ticks > 0 {
                    tokio::time::sleep(state.interval()).await;
                }
                match state.observe(fetch().await) {
                    StepOutcome::Emit(trip) => return Some((trip, (state, fetch))),
                    StepOutcome::Silent => continue,
                    StepOutcome::Finished => return None,
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TripStatus;
    use futures::StreamExt;

    fn sample_trip(delay: Option<i32>, status: TripStatus) -> Trip {
        Trip {
            status,
            delay,
            current_stop_index: 2,
            last_known_location: Some("Trento".into()),
            last_update: None,
            category: Some("R".into()),
            number: "2468".into(),
            company: Some("trenitalia".into()),
            color: None,
            origin: "Verona Porta Nuova".into(),
            destination: "Bolzano/Bozen".into(),
            departure_time: None,
            arrival_time: None,
            stops: Vec::new(),
            info: Vec::new(),
        }
    }

    fn config() -> PollConfig {
        PollConfig {
            min_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(40),
            max_consecutive_not_found: 3,
        }
    }

    #[test]
    fn unchanged_snapshots_are_suppressed() {
        let mut state = PollState::new(config());
        let trip = sample_trip(Some(3), TripStatus::Active);

        assert!(matches!(
            state.observe(Some(trip.clone())),
            StepOutcome::Emit(_)
        ));
        assert_eq!(state.observe(Some(trip)), StepOutcome::Silent);
    }

    #[test]
    fn change_shrinks_interval_and_miss_grows_it() {
        let mut state = PollState::new(config());
        let trip = sample_trip(Some(3), TripStatus::Active);

        state.observe(Some(trip.clone()));
        // Identical snapshots back off towards the max.
        state.observe(Some(trip.clone()));
        state.observe(Some(trip.clone()));
        state.observe(Some(trip.clone()));
        assert_eq!(state.interval(), Duration::from_secs(40));

        // A delay bump is a change and pulls the interval back down.
        let outcome = state.observe(Some(sample_trip(Some(7), TripStatus::Active)));
        assert!(matches!(outcome, StepOutcome::Emit(_)));
        assert_eq!(state.interval(), Duration::from_secs(20));
    }

    #[test]
    fn interval_never_leaves_the_configured_window() {
        let mut state = PollState::new(config());
        let trip = sample_trip(Some(0), TripStatus::Active);
        state.observe(Some(trip.clone()));
        for _ in 0..10 {
            state.observe(Some(trip.clone()));
        }
        assert_eq!(state.interval(), Duration::from_secs(40));
        for delay in 0..10 {
            state.observe(Some(sample_trip(Some(delay), TripStatus::Active)));
        }
        assert_eq!(state.interval(), Duration::from_secs(5));
    }

    #[test]
    fn consecutive_not_found_terminates_the_session() {
        let mut state = PollState::new(config());
        assert_eq!(state.observe(None), StepOutcome::Silent);
        assert_eq!(state.observe(None), StepOutcome::Silent);
        assert_eq!(state.observe(None), StepOutcome::Finished);
        assert!(state.is_finished());
    }

    #[test]
    fn a_found_trip_resets_the_not_found_streak() {
        let mut state = PollState::new(config());
        state.observe(None);
        state.observe(None);
        state.observe(Some(sample_trip(Some(1), TripStatus::Active)));
        assert_eq!(state.observe(None), StepOutcome::Silent);
        assert!(!state.is_finished());
    }

    #[test]
    fn terminal_status_is_pushed_once_then_closes() {
        let mut state = PollState::new(config());
        state.observe(Some(sample_trip(Some(2), TripStatus::Active)));

        let done = sample_trip(Some(2), TripStatus::Completed);
        assert!(matches!(
            state.observe(Some(done.clone())),
            StepOutcome::Emit(_)
        ));
        assert!(state.is_finished());
        assert_eq!(state.observe(Some(done)), StepOutcome::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_yields_only_changed_snapshots() {
        let snapshots = vec![
            Some(sample_trip(Some(1), TripStatus::Active)),
            Some(sample_trip(Some(1), TripStatus::Active)),
            Some(sample_trip(Some(4), TripStatus::Active)),
            Some(sample_trip(Some(4), TripStatus::Completed)),
        ];
        let mut queue = snapshots.into_iter();
        let fetch = move || {
            let next = queue.next().flatten();
            async move { next }
        };

        let emitted: Vec<Trip> = trip_updates(config(), fetch).collect().await;
        let delays: Vec<Option<i32>> = emitted.iter().map(|t| t.delay).collect();
        assert_eq!(delays, vec![Some(1), Some(4), Some(4)]);
        assert_eq!(emitted[2].status, TripStatus::Completed);
    }
}
