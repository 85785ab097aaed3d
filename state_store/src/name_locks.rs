use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Per-name mutual exclusion for check-then-act sequences against the filesystem.
///
/// The outer map is only locked while a slot is looked up, created or retired, so holding
/// the section for one name never blocks work on a different name. A slot is dropped from
/// the table as soon as its last holder leaves, which keeps the table bounded by the
/// number of names with in-flight requests.
#[derive(Debug, Default)]
pub struct NameLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the section for `name`. The slot is retired even if `f` panics.
    pub fn with_name<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        let slot = self.slots.lock().entry(name.to_owned()).or_default().clone();
        let _retire = RetireOnDrop {
            locks: self,
            name,
            slot: &slot,
        };

        let _held = slot.lock();
        f()
    }

    /// Number of names currently holding or waiting on a section.
    pub fn active_names(&self) -> usize {
        self.slots.lock().len()
    }
}

struct RetireOnDrop<'a> {
    locks: &'a NameLocks,
    name: &'a str,
    slot: &'a Arc<Mutex<()>>,
}

impl Drop for RetireOnDrop<'_> {
    fn drop(&mut self) {
        let mut slots = self.locks.slots.lock();
        // Clones are only handed out under the table lock, so the count is stable here:
        // one reference in the table plus ours means nobody else is waiting.
        if Arc::strong_count(self.slot) == 2 {
            slots.remove(self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use super::NameLocks;

    #[test]
    fn test_slots_are_retired_after_use() {
        let locks = NameLocks::new();
        let value = locks.with_name("prod", || {
            assert_eq!(locks.active_names(), 1);
            7
        });
        assert_eq!(value, 7);
        assert_eq!(locks.active_names(), 0);
    }

    #[test]
    fn test_slot_is_retired_when_closure_panics() {
        let locks = NameLocks::new();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            locks.with_name("prod", || panic!("boom"));
        }));
        assert!(outcome.is_err());
        assert_eq!(locks.active_names(), 0);

        // The name is usable again afterwards.
        assert_eq!(locks.with_name("prod", || 1), 1);
    }

    #[test]
    fn test_same_name_is_serialized() {
        let locks = Arc::new(NameLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    locks.with_name("shared", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.active_names(), 0);
    }

    #[test]
    fn test_distinct_names_do_not_contend() {
        let locks = Arc::new(NameLocks::new());
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let holder = {
            let locks = locks.clone();
            thread::spawn(move || {
                locks.with_name("a", || {
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                });
            })
        };

        entered_rx.recv().unwrap();
        // "a" is held by the other thread; "b" must still be available.
        let got = locks.with_name("b", || "b done");
        assert_eq!(got, "b done");

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert_eq!(locks.active_names(), 0);
    }
}
