//! Periodic link-check and config-space sanity timers.
//!
//! Timers are deadlines against the device [`Clock`](r8168_hal::Clock); the host calls
//! [`Rtl8168::run_timers`](crate::Rtl8168::run_timers) and due callbacks run inline. Callbacks and
//! lifecycle operations are serialised by the same lock, so cancelling a timer waits for any
//! callback in progress.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Link,
    ConfigCheck,
}

#[derive(Debug)]
struct Periodic {
    period_ns: u64,
    deadline_ns: Option<u64>,
}

impl Periodic {
    fn new(period_ms: u64) -> Self {
        Self {
            period_ns: period_ms.saturating_mul(1_000_000),
            deadline_ns: None,
        }
    }

    fn arm(&mut self, now_ns: u64) {
        self.deadline_ns = Some(now_ns.saturating_add(self.period_ns));
    }

    /// Fires at most once per call even if several periods elapsed, then re-arms relative to
    /// `now_ns`.
    fn fire(&mut self, now_ns: u64) -> bool {
        match self.deadline_ns {
            Some(deadline) if now_ns >= deadline => {
                self.arm(now_ns);
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Timers {
    link: Periodic,
    config: Periodic,
}

impl Timers {
    pub fn new(link_ms: u64, config_ms: u64) -> Self {
        Self {
            link: Periodic::new(link_ms),
            config: Periodic::new(config_ms),
        }
    }

    fn timer(&mut self, kind: TimerKind) -> &mut Periodic {
        match kind {
            TimerKind::Link => &mut self.link,
            TimerKind::ConfigCheck => &mut self.config,
        }
    }

    pub fn start(&mut self, kind: TimerKind, now_ns: u64) {
        self.timer(kind).arm(now_ns);
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.timer(kind).deadline_ns = None;
    }

    pub fn cancel_all(&mut self) {
        self.cancel(TimerKind::Link);
        self.cancel(TimerKind::ConfigCheck);
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        match kind {
            TimerKind::Link => self.link.deadline_ns.is_some(),
            TimerKind::ConfigCheck => self.config.deadline_ns.is_some(),
        }
    }

    /// Timers due at `now_ns`, in firing order. Each is re-armed.
    pub fn expired(&mut self, now_ns: u64) -> Vec<TimerKind> {
        let mut due = Vec::new();
        if self.link.fire(now_ns) {
            due.push(TimerKind::Link);
        }
        if self.config.fire(now_ns) {
            due.push(TimerKind::ConfigCheck);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: u64 = 1_000_000;

    #[test]
    fn unarmed_timers_never_fire() {
        let mut timers = Timers::new(1000, 2000);
        assert!(timers.expired(10_000 * MS).is_empty());
    }

    #[test]
    fn periods_are_independent() {
        let mut timers = Timers::new(1000, 2000);
        timers.start(TimerKind::Link, 0);
        timers.start(TimerKind::ConfigCheck, 0);

        assert!(timers.expired(999 * MS).is_empty());
        assert_eq!(timers.expired(1000 * MS), vec![TimerKind::Link]);
        assert_eq!(
            timers.expired(2000 * MS),
            vec![TimerKind::Link, TimerKind::ConfigCheck]
        );
    }

    #[test]
    fn late_tick_fires_once_and_rearms_from_now() {
        let mut timers = Timers::new(1000, 2000);
        timers.start(TimerKind::Link, 0);
        assert_eq!(timers.expired(5500 * MS), vec![TimerKind::Link]);
        assert!(timers.expired(6000 * MS).is_empty());
        assert_eq!(timers.expired(6500 * MS), vec![TimerKind::Link]);
    }

    #[test]
    fn cancel_disarms() {
        let mut timers = Timers::new(1000, 2000);
        timers.start(TimerKind::Link, 0);
        timers.cancel_all();
        assert!(!timers.is_armed(TimerKind::Link));
        assert!(timers.expired(5000 * MS).is_empty());
    }
}
