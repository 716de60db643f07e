// Scan ledger - the authoritative audit record of every verification outcome

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::constants::limits;
use crate::core::models::{Direction, ScanResult, ScanStatus, SignatureVerdict};

/// Sink that receives every ledger create and update.
///
/// The external observation surface (UI, persistence) implements this;
/// the ledger itself never blocks on it.
#[async_trait::async_trait]
pub trait ScanSink: Send + Sync {
    async fn publish(&self, scan: ScanResult);
}

/// Sink that only logs. Default for headless operation.
pub struct TracingScanSink;

#[async_trait::async_trait]
impl ScanSink for TracingScanSink {
    async fn publish(&self, scan: ScanResult) {
        debug!(
            scan_id = %scan.id,
            tool = %scan.tool_name,
            direction = %scan.direction,
            allowed = scan.allowed,
            status = ?scan.status,
            "Scan record published"
        );
    }
}

/// Append/update store of verification records.
///
/// A record is created in `InProgress` state the instant a call is
/// observed and moved to exactly one terminal state once a verdict is
/// known; terminal records are never mutated again. Retention is bounded:
/// once capacity is exceeded the oldest terminal records are dropped from
/// memory (the sink has already seen them).
pub struct ScanLedger {
    records: Mutex<LedgerInner>,
    sink: Arc<dyn ScanSink>,
    capacity: usize,
}

struct LedgerInner {
    by_id: HashMap<Uuid, ScanResult>,
    order: Vec<Uuid>,
}

impl ScanLedger {
    pub fn new(sink: Arc<dyn ScanSink>) -> Self {
        Self::with_capacity(sink, limits::LEDGER_CAPACITY)
    }

    pub fn with_capacity(sink: Arc<dyn ScanSink>, capacity: usize) -> Self {
        Self {
            records: Mutex::new(LedgerInner {
                by_id: HashMap::new(),
                order: Vec::new(),
            }),
            sink,
            capacity,
        }
    }

    /// Open a new record for an observed operation, before verification
    /// has completed. Returns the stable record id.
    pub async fn begin(
        &self,
        app_name: &str,
        server_name: &str,
        tool_name: &str,
        payload: &serde_json::Value,
        direction: Direction,
    ) -> ScanResult {
        let scan = ScanResult {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            app_name: app_name.to_string(),
            server_name: server_name.to_string(),
            tool_name: tool_name.to_string(),
            payload: payload.to_string(),
            direction,
            allowed: false,
            verdicts: HashMap::new(),
            elapsed_ms: 0,
            status: ScanStatus::InProgress,
        };

        {
            let mut inner = self.records.lock().unwrap_or_else(|e| e.into_inner());
            inner.by_id.insert(scan.id, scan.clone());
            inner.order.push(scan.id);
            Self::trim(&mut inner, self.capacity);
        }

        self.sink.publish(scan.clone()).await;
        scan
    }

    /// Move a record to `Completed` with its final verdict set.
    pub async fn complete(
        &self,
        id: Uuid,
        allowed: bool,
        verdicts: HashMap<String, SignatureVerdict>,
        elapsed_ms: u64,
    ) -> Option<ScanResult> {
        self.finish(id, ScanStatus::Completed, allowed, verdicts, elapsed_ms)
            .await
    }

    /// Move a record to `Error`. Used when verification itself failed in a
    /// way that still produced a decision.
    pub async fn error(
        &self,
        id: Uuid,
        allowed: bool,
        verdicts: HashMap<String, SignatureVerdict>,
        elapsed_ms: u64,
    ) -> Option<ScanResult> {
        self.finish(id, ScanStatus::Error, allowed, verdicts, elapsed_ms)
            .await
    }

    async fn finish(
        &self,
        id: Uuid,
        status: ScanStatus,
        allowed: bool,
        verdicts: HashMap<String, SignatureVerdict>,
        elapsed_ms: u64,
    ) -> Option<ScanResult> {
        let updated = {
            let mut inner = self.records.lock().unwrap_or_else(|e| e.into_inner());
            match inner.by_id.get_mut(&id) {
                Some(record) if record.status.is_terminal() => {
                    warn!(scan_id = %id, status = ?record.status, "Ignored update to terminal scan record");
                    return None;
                }
                Some(record) => {
                    record.status = status;
                    record.allowed = allowed;
                    record.verdicts = verdicts;
                    record.elapsed_ms = elapsed_ms;
                    Some(record.clone())
                }
                None => {
                    warn!(scan_id = %id, "Ignored update to unknown scan record");
                    None
                }
            }
        };

        if let Some(ref scan) = updated {
            self.sink.publish(scan.clone()).await;
        }
        updated
    }

    /// Fetch a record by id.
    pub fn get(&self, id: Uuid) -> Option<ScanResult> {
        let inner = self.records.lock().unwrap_or_else(|e| e.into_inner());
        inner.by_id.get(&id).cloned()
    }

    /// Most recent records, newest last.
    pub fn recent(&self, limit: usize) -> Vec<ScanResult> {
        let inner = self.records.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .order
            .iter()
            .rev()
            .take(limit)
            .rev()
            .filter_map(|id| inner.by_id.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        let inner = self.records.lock().unwrap_or_else(|e| e.into_inner());
        inner.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn trim(inner: &mut LedgerInner, capacity: usize) {
        while inner.order.len() > capacity {
            // Oldest terminal record goes first; an in-progress record is
            // kept until it resolves even when over capacity.
            let evict = inner.order.iter().position(|id| {
                inner
                    .by_id
                    .get(id)
                    .map(|r| r.status.is_terminal())
                    .unwrap_or(true)
            });
            let Some(evict) = evict else {
                break;
            };
            let id = inner.order.remove(evict);
            inner.by_id.remove(&id);
        }
    }
}
