use std::sync::Arc;

use parking_lot::Mutex;
use tapedeck_shared::TapeRecord;
use tracing::{debug, error, info};

use crate::api::{ApiError, TapeBackend};
use crate::tape::{Tape, TapeId, TapeRecordError};

/// One accepted `GET /api/tapes` response. Replaced wholesale, never patched.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TapeSnapshot {
    generation: u64,
    tapes: Vec<Tape>,
}

impl TapeSnapshot {
    pub fn tapes(&self) -> &[Tape] {
        &self.tapes
    }

    /// Zero until the first successful load.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loaded(&self) -> bool {
        self.generation > 0
    }

    pub fn find(&self, id: TapeId) -> Option<&Tape> {
        self.tapes.iter().find(|tape| tape.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Replaced { generation: u64, count: usize },
    Failed,
    Stale,
}

impl LoadOutcome {
    pub fn replaced(self) -> bool {
        matches!(self, LoadOutcome::Replaced { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LoadTicket(u64);

#[derive(Debug, thiserror::Error)]
enum LoadError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Record(#[from] TapeRecordError),
}

#[derive(Debug, Default)]
struct StoreInner {
    snapshot: Arc<TapeSnapshot>,
    issued: u64,
    applied: u64,
}

/// Shared handle on the current tape snapshot. Writers go through
/// [`TapeStore::load`]; readers take a cheap `Arc` of the snapshot.
#[derive(Debug, Clone, Default)]
pub struct TapeStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl TapeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<TapeSnapshot> {
        Arc::clone(&self.inner.lock().snapshot)
    }

    pub fn begin_load(&self) -> LoadTicket {
        let mut inner = self.inner.lock();
        inner.issued += 1;
        LoadTicket(inner.issued)
    }

    /// Applies a finished fetch. A completion older than the last applied one
    /// is dropped so the view never moves backwards.
    #[tracing::instrument(skip(self, result), fields(ticket = ticket.0))]
    pub fn complete_load(
        &self,
        ticket: LoadTicket,
        result: Result<Vec<TapeRecord>, ApiError>,
    ) -> LoadOutcome {
        let tapes = match validate(result) {
            Ok(tapes) => tapes,
            Err(err) => {
                error!(error = %err, "failed to load tapes; keeping previous snapshot");
                return LoadOutcome::Failed;
            }
        };

        let mut inner = self.inner.lock();
        if ticket.0 <= inner.applied {
            debug!(applied = inner.applied, "discarding stale tape load");
            return LoadOutcome::Stale;
        }

        let generation = inner.snapshot.generation + 1;
        let count = tapes.len();
        inner.applied = ticket.0;
        inner.snapshot = Arc::new(TapeSnapshot { generation, tapes });
        info!(generation, count, "replaced tape snapshot");
        LoadOutcome::Replaced { generation, count }
    }

    #[tracing::instrument(skip_all)]
    pub async fn load(&self, backend: &dyn TapeBackend) -> LoadOutcome {
        let ticket = self.begin_load();
        let result = backend.fetch_tapes().await;
        self.complete_load(ticket, result)
    }
}

fn validate(result: Result<Vec<TapeRecord>, ApiError>) -> Result<Vec<Tape>, LoadError> {
    let records = result?;
    let tapes = records
        .into_iter()
        .map(Tape::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tapes)
}
