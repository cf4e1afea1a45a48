use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::io;
use std::thread::{self, JoinHandle};

/// Whether the current thread may park while waiting on other work.
///
/// Set once when a thread is created (or for the duration of a
/// [`ThreadCapability::scope`]) and read by admission decisions. Threads that
/// never set it are treated as blocking-capable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadCapability {
    #[default]
    Blocking,
    NonBlocking,
}

thread_local! {
    static CURRENT: Cell<ThreadCapability> = const { Cell::new(ThreadCapability::Blocking) };
}

impl ThreadCapability {
    pub fn current() -> Self {
        CURRENT.with(Cell::get)
    }

    pub fn can_block(&self) -> bool {
        matches!(self, ThreadCapability::Blocking)
    }

    /// Marks the calling thread for the rest of its life and returns the
    /// previous marker.
    pub fn mark_current(self) -> ThreadCapability {
        CURRENT.with(|cell| cell.replace(self))
    }

    /// Runs `f` with the calling thread marked as `self`, restoring the
    /// previous marker afterwards (also on unwind).
    pub fn scope<R>(self, f: impl FnOnce() -> R) -> R {
        let _guard = CapabilityGuard {
            previous: self.mark_current(),
        };
        f()
    }

    pub fn label(&self) -> &'static str {
        match self {
            ThreadCapability::Blocking => "blocking",
            ThreadCapability::NonBlocking => "non_blocking",
        }
    }
}

struct CapabilityGuard {
    previous: ThreadCapability,
}

impl Drop for CapabilityGuard {
    fn drop(&mut self) {
        self.previous.mark_current();
    }
}

/// Spawns a named thread whose capability marker is set before `f` runs.
pub fn spawn_with_capability<F, T>(
    name: impl Into<String>,
    capability: ThreadCapability,
    f: F,
) -> io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new().name(name.into()).spawn(move || {
        capability.mark_current();
        f()
    })
}
