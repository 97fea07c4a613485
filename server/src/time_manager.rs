use std::time::Duration;

use log::trace;

use crate::RailServerError;

/// Periodic work owned by the rail server
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timer {
    SyncTick,
    StaleSweep,
}

struct Schedule {
    timer: Timer,
    interval_ms: u64,
    next_at: Option<u64>,
}

/// Single scheduler for every periodic timer. Timers are armed on the first
/// poll; a timer that fell several periods behind fires once and is
/// rescheduled from the current time.
pub struct TimeManager {
    schedules: Vec<Schedule>,
}

impl TimeManager {
    pub fn new(tick_interval: Duration, sweep_interval: Duration) -> Result<Self, RailServerError> {
        let tick_ms = interval_ms(Timer::SyncTick, tick_interval)?;
        let sweep_ms = interval_ms(Timer::StaleSweep, sweep_interval)?;
        Ok(Self {
            schedules: vec![
                Schedule {
                    timer: Timer::SyncTick,
                    interval_ms: tick_ms,
                    next_at: None,
                },
                Schedule {
                    timer: Timer::StaleSweep,
                    interval_ms: sweep_ms,
                    next_at: None,
                },
            ],
        })
    }

    /// Returns every timer due at `now`, in a fixed order
    pub fn poll(&mut self, now: u64) -> Vec<Timer> {
        let mut due = Vec::new();
        for schedule in &mut self.schedules {
            match schedule.next_at {
                None => schedule.next_at = Some(now.saturating_add(schedule.interval_ms)),
                Some(next_at) if now >= next_at => {
                    due.push(schedule.timer);
                    schedule.next_at = Some(now.saturating_add(schedule.interval_ms));
                }
                Some(_) => {}
            }
        }
        if !due.is_empty() {
            trace!("time manager: due {:?} at {}", due, now);
        }
        due
    }

    pub fn interval(&self, timer: Timer) -> Option<Duration> {
        self.schedules
            .iter()
            .find(|schedule| schedule.timer == timer)
            .map(|schedule| Duration::from_millis(schedule.interval_ms))
    }
}

fn interval_ms(timer: Timer, interval: Duration) -> Result<u64, RailServerError> {
    let ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
    if ms == 0 {
        return Err(RailServerError::SchedulerInit {
            reason: format!("{:?} interval must be at least 1ms, got {:?}", timer, interval),
        });
    }
    Ok(ms)
}
