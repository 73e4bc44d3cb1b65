//! Explicit scheduler loop for the periodic drivers.
//!
//! Timers live in a slotmap, so cancelling removes the timer outright and a
//! stale [`TimerId`] can never fire or be cancelled twice. Time only moves
//! when [`Scheduler::advance`] is called with an elapsed delta.

use std::collections::BTreeMap;

use slotmap::SlotMap;

use crate::id::TimerId;

/// The periodic drivers, in firing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Driver {
    PassiveIncome,
    EffectDecay,
    EventSpawn,
}

#[derive(Debug, Clone)]
struct Timer {
    driver: Driver,
    /// 0 means "every advance".
    period_ms: u64,
    /// Time accumulated toward the next firing.
    carried_ms: u64,
}

/// What a driver owes after an advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Firing {
    pub driver: Driver,
    /// Whole periods elapsed (1 for every-advance drivers).
    pub count: u64,
    /// Raw elapsed time handed to every-advance drivers.
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    timers: SlotMap<TimerId, Timer>,
    by_driver: BTreeMap<Driver, TimerId>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `driver`. Replaces (and cancels) any existing timer for it.
    pub fn schedule(&mut self, driver: Driver, period_ms: u64) -> TimerId {
        self.cancel_driver(driver);
        let id = self.timers.insert(Timer {
            driver,
            period_ms,
            carried_ms: 0,
        });
        self.by_driver.insert(driver, id);
        id
    }

    /// Cancel a timer. Returns `false` for a stale or unknown id.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.timers.remove(id) {
            Some(timer) => {
                if self.by_driver.get(&timer.driver) == Some(&id) {
                    self.by_driver.remove(&timer.driver);
                }
                true
            }
            None => false,
        }
    }

    pub fn cancel_driver(&mut self, driver: Driver) -> bool {
        match self.by_driver.get(&driver).copied() {
            Some(id) => self.cancel(id),
            None => false,
        }
    }

    pub fn timer_for(&self, driver: Driver) -> Option<TimerId> {
        self.by_driver.get(&driver).copied()
    }

    pub fn is_scheduled(&self, driver: Driver) -> bool {
        self.by_driver.contains_key(&driver)
    }

    /// Number of live timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Move time forward and report every driver that is due, in
    /// [`Driver`] order.
    pub fn advance(&mut self, delta_ms: u64) -> Vec<Firing> {
        let mut firings = Vec::new();
        for (&driver, &id) in &self.by_driver {
            let Some(timer) = self.timers.get_mut(id) else {
                continue;
            };
            if timer.period_ms == 0 {
                if delta_ms > 0 {
                    firings.push(Firing {
                        driver,
                        count: 1,
                        elapsed_ms: delta_ms,
                    });
                }
                continue;
            }
            timer.carried_ms += delta_ms;
            let count = timer.carried_ms / timer.period_ms;
            if count > 0 {
                timer.carried_ms %= timer.period_ms;
                firings.push(Firing {
                    driver,
                    count,
                    elapsed_ms: count * timer.period_ms,
                });
            }
        }
        firings
    }
}
