//! One-shot initialization barrier for object instances.

use std::future::Future;

use tokio::sync::OnceCell;

/// Lifecycle phase of a gated instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    /// Initialization has not completed; callers wait.
    Initializing,
    /// Initialization completed; all operations are permitted.
    Ready,
}

/// Barrier that holds callers until an instance finishes initializing.
///
/// The transition to [`GatePhase::Ready`] happens at most once. Callers
/// arriving while initialization runs wait in arrival order instead of
/// failing. A failed initialization leaves the gate in
/// [`GatePhase::Initializing`] so the next caller retries it.
#[derive(Debug)]
pub struct InitGate<T> {
    cell: OnceCell<T>,
}

impl<T> InitGate<T> {
    /// Create a closed gate.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> GatePhase {
        if self.cell.initialized() {
            GatePhase::Ready
        } else {
            GatePhase::Initializing
        }
    }

    /// Value if the gate is open.
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    /// Wait for the gate, running `init` if no one else is.
    ///
    /// # Errors
    ///
    /// Returns the error of `init` when this caller ran it and it failed.
    pub async fn open_with<F, Fut, E>(&self, init: F) -> Result<&T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cell.get_or_try_init(init).await
    }
}

impl<T> Default for InitGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_gate_starts_initializing() {
        let gate: InitGate<u32> = InitGate::new();
        assert_eq!(gate.phase(), GatePhase::Initializing);
        assert!(gate.get().is_none());
    }

    #[tokio::test]
    async fn test_gate_opens_once() {
        let gate = InitGate::new();
        let runs = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = gate
                .open_with(|| async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(7)
                })
                .await;
            assert_eq!(value.ok(), Some(&7));
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(gate.phase(), GatePhase::Ready);
    }

    #[tokio::test]
    async fn test_failed_init_is_retried() {
        let gate = InitGate::new();

        let first = gate.open_with(|| async { Err::<u32, _>("boom") }).await;
        assert_eq!(first, Err("boom"));
        assert_eq!(gate.phase(), GatePhase::Initializing);

        let second = gate.open_with(|| async { Ok::<_, &str>(1) }).await;
        assert_eq!(second, Ok(&1));
        assert_eq!(gate.phase(), GatePhase::Ready);
    }

    #[tokio::test]
    async fn test_callers_wait_for_slow_init() {
        let gate = Arc::new(InitGate::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = Arc::clone(&gate);
            let runs = Arc::clone(&runs);
            handles.push(tokio::spawn(async move {
                gate.open_with(|| async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<_, String>(42)
                })
                .await
                .copied()
            }));
        }

        for handle in handles {
            let result = handle.await;
            assert!(matches!(result, Ok(Ok(42))));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
