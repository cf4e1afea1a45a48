use super::error::TelemetryError;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        })
    }
}

#[derive(Debug)]
struct MetricCell {
    kind: MetricKind,
    value: AtomicU64,
}

/// Namespaced counters and gauges for one process. Clones share the same
/// cells; a name is bound to the kind it was first used as.
#[derive(Debug, Clone)]
pub struct SharedMetricsRegistry {
    namespace: Arc<str>,
    cells: Arc<RwLock<BTreeMap<String, Arc<MetricCell>>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn gauge(&self, name: &str) -> Option<u64> {
        self.gauges.get(name).copied()
    }
}

impl SharedMetricsRegistry {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: Arc::from(namespace.trim_end_matches('.')),
            cells: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Adds `delta` (saturating) and returns the new total.
    pub fn inc_counter(&self, name: &str, delta: u64) -> Result<u64, TelemetryError> {
        let cell = self.cell(name, MetricKind::Counter)?;
        let previous = match cell.value.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            Some(v.saturating_add(delta))
        }) {
            Ok(previous) | Err(previous) => previous,
        };
        Ok(previous.saturating_add(delta))
    }

    pub fn set_gauge(&self, name: &str, value: u64) -> Result<(), TelemetryError> {
        self.cell(name, MetricKind::Gauge)?
            .value
            .store(value, Ordering::Relaxed);
        Ok(())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot::default();
        for (name, cell) in self.cells.read().iter() {
            let value = cell.value.load(Ordering::Relaxed);
            match cell.kind {
                MetricKind::Counter => snapshot.counters.insert(name.clone(), value),
                MetricKind::Gauge => snapshot.gauges.insert(name.clone(), value),
            };
        }
        snapshot
    }

    fn cell(&self, name: &str, kind: MetricKind) -> Result<Arc<MetricCell>, TelemetryError> {
        let qualified = self.qualify(name)?;
        let existing = self.cells.read().get(&qualified).cloned();
        let cell = match existing {
            Some(cell) => cell,
            None => self
                .cells
                .write()
                .entry(qualified.clone())
                .or_insert_with(|| {
                    Arc::new(MetricCell {
                        kind,
                        value: AtomicU64::new(0),
                    })
                })
                .clone(),
        };
        if cell.kind != kind {
            return Err(TelemetryError::KindMismatch {
                name: qualified,
                registered: cell.kind,
            });
        }
        Ok(cell)
    }

    fn qualify(&self, name: &str) -> Result<String, TelemetryError> {
        if name.is_empty() {
            return Err(TelemetryError::EmptyName);
        }
        match name.strip_prefix(&*self.namespace) {
            Some(rest) if rest.starts_with('.') => Ok(name.to_owned()),
            _ => Ok(format!("{}.{}", self.namespace, name)),
        }
    }
}
