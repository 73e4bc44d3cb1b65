//! Pending-update buffer for deferred state deltas.
//!
//! Actions and passive ticks push updates here instead of writing the store.
//! Updates coalesce on push, so however many arrive between two flushes the
//! flush applies one write per touched field.

/// A single deferred change.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingUpdate {
    /// Packages added to the balance and the earned counters.
    Earn { amount: f64 },
    /// An accepted click: earns `value` and counts toward clicked totals.
    Click { value: f64 },
    /// Packages paid out of the pending balance by a purchase that could
    /// not be covered by the canonical balance alone.
    Spend { amount: f64 },
    /// Production must be recomputed on the next flush.
    PpsDirty,
    /// Achievements must be evaluated on the next flush.
    AchievementsDirty,
}

/// The coalesced contents of the buffer, handed to the flush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingBatch {
    /// Net change to the spendable balance.
    pub packages_delta: f64,
    /// Increment for the earned counters.
    pub earned_delta: f64,
    /// Increment for the clicked-packages counter.
    pub clicked_delta: f64,
    /// Number of accepted clicks.
    pub clicks: u64,
    pub pps_dirty: bool,
    pub achievements_dirty: bool,
}

impl PendingBatch {
    /// Whether anything needs writing.
    pub fn is_empty(&self) -> bool {
        self.packages_delta == 0.0
            && self.earned_delta == 0.0
            && self.clicked_delta == 0.0
            && self.clicks == 0
            && !self.pps_dirty
            && !self.achievements_dirty
    }
}

/// Staging area flushed once per scheduling cycle.
#[derive(Debug, Clone, Default)]
pub struct PendingUpdates {
    batch: PendingBatch,
    /// Updates pushed since the last drain, before coalescing.
    pushed: u64,
}

impl PendingUpdates {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one update into the batch.
    pub fn push(&mut self, update: PendingUpdate) {
        let b = &mut self.batch;
        match update {
            PendingUpdate::Earn { amount } => {
                b.packages_delta += amount;
                b.earned_delta += amount;
            }
            PendingUpdate::Click { value } => {
                b.packages_delta += value;
                b.earned_delta += value;
                b.clicked_delta += value;
                b.clicks += 1;
            }
            PendingUpdate::Spend { amount } => {
                b.packages_delta -= amount;
            }
            PendingUpdate::PpsDirty => b.pps_dirty = true,
            PendingUpdate::AchievementsDirty => b.achievements_dirty = true,
        }
        self.pushed += 1;
    }

    /// Push several updates at once.
    pub fn push_batch(&mut self, updates: impl IntoIterator<Item = PendingUpdate>) {
        for u in updates {
            self.push(u);
        }
    }

    /// Net balance change not yet written.
    pub fn packages_delta(&self) -> f64 {
        self.batch.packages_delta
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Updates pushed since the last drain.
    pub fn pushed_count(&self) -> u64 {
        self.pushed
    }

    pub fn peek(&self) -> &PendingBatch {
        &self.batch
    }

    /// Take the batch and leave the buffer empty.
    pub fn drain(&mut self) -> PendingBatch {
        self.pushed = 0;
        std::mem::take(&mut self.batch)
    }

    /// Drop everything pending (ascension, reset, load).
    pub fn discard(&mut self) {
        self.drain();
    }
}
