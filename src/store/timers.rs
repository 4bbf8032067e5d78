use log::debug;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Named slot of a store timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    Debounce,
    /// Backoff wait before the n-th automatic retry.
    Retry(u32),
}

struct TimerEntry {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct TimerTable {
    next_generation: u64,
    entries: HashMap<TimerSlot, TimerEntry>,
    closed: bool,
}

impl TimerTable {
    /// Removes the entry if it still belongs to `generation`.
    fn claim(&mut self, slot: TimerSlot, generation: u64) -> bool {
        match self.entries.get(&slot) {
            Some(entry) if entry.generation == generation => {
                self.entries.remove(&slot);
                true
            }
            _ => false,
        }
    }
}

/// Arena of named, individually cancellable delayed tasks.
///
/// A timer claims its slot once its delay has elapsed and before it runs its
/// work. Cancelling or replacing a slot therefore only ever aborts a task that
/// is still waiting; work that has started always runs to completion.
pub struct TimerArena {
    table: Arc<Mutex<TimerTable>>,
}

impl TimerArena {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(TimerTable::default())),
        }
    }

    /// Schedules `fire` to run after `delay` in `slot`, replacing any timer
    /// still waiting in that slot.
    ///
    /// Returns `false` when the arena is closed or no tokio runtime is active.
    pub fn schedule<F>(&self, slot: TimerSlot, delay: Duration, fire: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no tokio runtime available, timer {slot:?} not scheduled");
            return false;
        };

        let mut table = lock_table(&self.table);
        if table.closed {
            return false;
        }

        table.next_generation += 1;
        let generation = table.next_generation;
        let weak_table = Arc::downgrade(&self.table);

        // The table lock is held until the entry is inserted, so the task
        // cannot try to claim its slot before it exists.
        let handle = runtime.spawn(async move {
            sleep(delay).await;
            let claimed = weak_table
                .upgrade()
                .is_some_and(|table| lock_table(&table).claim(slot, generation));
            if claimed {
                fire.await;
            }
        });

        if let Some(previous) = table.entries.insert(slot, TimerEntry { generation, handle }) {
            previous.handle.abort();
        }
        true
    }

    pub fn cancel(&self, slot: TimerSlot) -> bool {
        match lock_table(&self.table).entries.remove(&slot) {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels every waiting timer whose slot matches `predicate`.
    pub fn cancel_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&TimerSlot) -> bool,
    {
        let mut table = lock_table(&self.table);
        let slots = table
            .entries
            .keys()
            .filter(|slot| predicate(slot))
            .copied()
            .collect::<Vec<_>>();
        for slot in &slots {
            if let Some(entry) = table.entries.remove(slot) {
                entry.handle.abort();
            }
        }
        slots.len()
    }

    pub fn cancel_all(&self) -> usize {
        self.cancel_where(|_| true)
    }

    /// Cancels everything and refuses further scheduling.
    pub fn close(&self) -> usize {
        let cancelled = self.cancel_all();
        lock_table(&self.table).closed = true;
        cancelled
    }

    pub fn is_closed(&self) -> bool {
        lock_table(&self.table).closed
    }

    pub fn is_armed(&self, slot: TimerSlot) -> bool {
        lock_table(&self.table).entries.contains_key(&slot)
    }

    pub fn armed_count(&self) -> usize {
        lock_table(&self.table).entries.len()
    }
}

impl Default for TimerArena {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimerArena {
    fn drop(&mut self) {
        let mut table = lock_table(&self.table);
        for (_, entry) in table.entries.drain() {
            entry.handle.abort();
        }
    }
}

fn lock_table(table: &Mutex<TimerTable>) -> MutexGuard<'_, TimerTable> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Single-slot timer that coalesces bursts of triggers into one fire.
#[derive(Debug, Clone, Copy)]
pub struct DebounceScheduler {
    window: Duration,
}

impl DebounceScheduler {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Arms the debounce slot; an already waiting timer is replaced, so the
    /// quiet window restarts.
    pub fn arm<F>(&self, timers: &TimerArena, fire: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        timers.schedule(TimerSlot::Debounce, self.window, fire)
    }

    pub fn cancel(&self, timers: &TimerArena) -> bool {
        timers.cancel(TimerSlot::Debounce)
    }

    pub fn is_armed(&self, timers: &TimerArena) -> bool {
        timers.is_armed(TimerSlot::Debounce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_task(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_restarts_the_window_and_fires_once() {
        let timers = TimerArena::new();
        let debounce = DebounceScheduler::new(Duration::from_millis(500));
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            assert!(debounce.arm(&timers, counting_task(&fired)));
            sleep(Duration::from_millis(400)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(debounce.is_armed(&timers));

        sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!debounce.is_armed(&timers));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_and_closed_timers_never_fire() {
        let timers = TimerArena::new();
        let fired = Arc::new(AtomicUsize::new(0));

        timers.schedule(TimerSlot::Retry(1), Duration::from_millis(100), counting_task(&fired));
        timers.schedule(TimerSlot::Retry(2), Duration::from_millis(200), counting_task(&fired));
        assert_eq!(timers.armed_count(), 2);
        assert!(timers.cancel(TimerSlot::Retry(1)));
        assert_eq!(timers.close(), 1);
        assert!(!timers.schedule(TimerSlot::Debounce, Duration::ZERO, counting_task(&fired)));

        sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timers.is_closed());
    }

    #[test]
    fn scheduling_without_runtime_is_refused() {
        let timers = TimerArena::new();
        let fired = Arc::new(AtomicUsize::new(0));
        assert!(!timers.schedule(TimerSlot::Debounce, Duration::ZERO, counting_task(&fired)));
        assert_eq!(timers.armed_count(), 0);
    }
}
