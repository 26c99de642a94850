//! Per-key gate serializing check-then-build sequences
//!
//! Callers holding the gate for a path run one at a time. The first one in
//! builds the artifact; the rest find it present and only load it. Keys are
//! made absolute and cleaned lexically, so `models/m.bin` and
//! `./models/m.bin` share a gate. A gate is dropped from the map when its
//! last holder releases it and nobody is waiting.

use dashmap::DashMap;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, OwnedMutexGuard};

static GLOBAL_GATES: OnceLock<SingleFlight> = OnceLock::new();

type Gates = DashMap<PathBuf, Arc<Mutex<()>>>;

/// Async mutex per artifact path
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    gates: Arc<Gates>,
}

/// Exclusive hold on one key; released on drop
#[derive(Debug)]
pub struct FlightGuard {
    key: PathBuf,
    gates: Arc<Gates>,
    gate: Arc<Mutex<()>>,
    _held: OwnedMutexGuard<()>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        // An idle gate is referenced by the map, this guard and its lock.
        // Any further reference belongs to a waiter.
        let ours = &self.gate;
        self.gates.remove_if(&self.key, |_, gate| {
            Arc::ptr_eq(gate, ours) && Arc::strong_count(gate) <= 3
        });
    }
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide instance shared by every service that does not bring its own
    pub fn global() -> Self {
        GLOBAL_GATES.get_or_init(SingleFlight::new).clone()
    }

    fn gate(&self, key: &Path) -> Arc<Mutex<()>> {
        self.gates.entry(key.to_path_buf()).or_default().value().clone()
    }

    /// Wait for exclusive use of `key`
    pub async fn acquire(&self, key: &Path) -> FlightGuard {
        let key = normalize(key);
        let gate = self.gate(&key);
        let held = gate.clone().lock_owned().await;
        FlightGuard {
            key,
            gates: self.gates.clone(),
            gate,
            _held: held,
        }
    }

    /// Run `f` while holding the gate for `key`
    pub async fn run<F, Fut, T>(&self, key: &Path, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(key).await;
        f().await
    }

    /// Number of keys currently held or waited on
    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}

/// Absolute form of `path` with `.` and `..` resolved lexically
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut clean = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(clean.components().next_back(), Some(Component::Normal(_))) {
                    clean.pop();
                } else if !clean.has_root() {
                    clean.push("..");
                }
            }
            other => clean.push(other.as_os_str()),
        }
    }
    clean
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_key_never_overlaps() {
        let flight = SingleFlight::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let flight = flight.clone();
                let inside = inside.clone();
                let max_seen = max_seen.clone();
                tokio::spawn(async move {
                    flight
                        .run(Path::new("models/a.bin"), || async {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            inside.fetch_sub(1, Ordering::SeqCst);
                        })
                        .await
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(flight.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block_each_other() {
        let flight = SingleFlight::new();
        let _a = flight.acquire(Path::new("a.bin")).await;
        let b = tokio::time::timeout(Duration::from_secs(1), flight.acquire(Path::new("b.bin"))).await;
        assert!(b.is_ok());
        assert_eq!(flight.len(), 2);
    }

    #[tokio::test]
    async fn test_spellings_of_one_path_share_a_gate() {
        let flight = SingleFlight::new();
        let _held = flight.acquire(Path::new("models/m.bin")).await;

        for alias in ["./models/m.bin", "models/./m.bin", "models/tmp/../m.bin"] {
            let blocked =
                tokio::time::timeout(Duration::from_millis(50), flight.acquire(Path::new(alias)))
                    .await;
            assert!(blocked.is_err(), "{} did not share the gate", alias);
        }
        assert_eq!(flight.len(), 1);
    }

    #[tokio::test]
    async fn test_released_gates_are_pruned() {
        let flight = SingleFlight::new();
        for i in 0..5 {
            let _guard = flight.acquire(Path::new(&format!("m{}.bin", i))).await;
        }
        assert!(flight.is_empty());
    }

    #[tokio::test]
    async fn test_gate_survives_while_waited_on() {
        let flight = SingleFlight::new();
        let first = flight.acquire(Path::new("m.bin")).await;

        let waiter = {
            let flight = flight.clone();
            tokio::spawn(async move {
                let _guard = flight.acquire(Path::new("./m.bin")).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        assert_eq!(flight.len(), 1);

        waiter.await.unwrap();
        assert!(flight.is_empty());
    }

    #[test]
    fn test_normalize_resolves_dots() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(normalize(Path::new("./models/m.bin")), cwd.join("models/m.bin"));
        assert_eq!(normalize(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize(Path::new("/../x")), PathBuf::from("/x"));
    }

    #[test]
    fn test_global_is_shared() {
        let a = SingleFlight::global();
        let b = SingleFlight::global();
        assert!(Arc::ptr_eq(&a.gates, &b.gates));
    }
}
