use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tapedeck_shared::AddTapeRequest;
use tracing::{debug, error, info, instrument, warn};

use crate::api::{ApiError, TapeBackend};
use crate::store::{LoadOutcome, TapeStore};
use crate::tape::{Slot, Tape, TapeId};

pub const DEFAULT_SETTLE: Duration = Duration::from_secs(4);

pub const REMOVE_PROMPT: &str = "Are you sure you want to remove this cassette?";
pub const REMOVE_ALL_PROMPT: &str =
    "This will remove ALL cassettes from the database! Are you sure?";
pub const REMOVE_ALL_SUMMARY: &str = "All cassettes removed successfully.";

const MACHINE_ERROR: &str = "Error communicating with machine.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Dispense,
    Return,
    Add,
    Remove,
    RemoveAll,
}

impl Action {
    pub fn loader_text(self) -> &'static str {
        match self {
            Action::Dispense => "DISPENSING...",
            Action::Return => "RETURNING...",
            Action::Add => "SAVING...",
            Action::Remove => "REMOVING...",
            Action::RemoveAll => "CLEARING...",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionState {
    #[default]
    Idle,
    Busy {
        action: Action,
        target: Option<TapeId>,
    },
}

impl ActionState {
    pub fn is_busy(self) -> bool {
        matches!(self, ActionState::Busy { .. })
    }

    pub fn loader_text(self) -> Option<&'static str> {
        match self {
            ActionState::Idle => None,
            ActionState::Busy { action, .. } => Some(action.loader_text()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("{0}")]
    Validation(String),
    #[error("another action is still in progress")]
    Busy,
    #[error("{message}")]
    Network {
        message: String,
        #[source]
        source: ApiError,
    },
    #[error("{message}")]
    Server {
        message: String,
        #[source]
        source: ApiError,
    },
}

impl ActionError {
    /// Text for the operator; the server's own `status` when it sent one.
    pub fn operator_message(&self) -> String {
        self.to_string()
    }

    fn from_api(err: ApiError, fallback: &str, network: &str, prefer_server_text: bool) -> Self {
        if err.is_network() {
            return ActionError::Network {
                message: network.to_string(),
                source: err,
            };
        }
        let message = err
            .server_message()
            .filter(|_| prefer_server_text)
            .unwrap_or(fallback)
            .to_string();
        ActionError::Server {
            message,
            source: err,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Cancelled,
    Completed {
        message: Option<String>,
        reload: LoadOutcome,
    },
}

/// Operator yes/no prompt guarding destructive calls.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// State of the add-cassette form. `submitting` is the disabled submit button.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddForm {
    pub open: bool,
    pub name: String,
    pub artist: String,
    pub slot: Option<Slot>,
    pub submitting: bool,
}

impl AddForm {
    pub fn open(&mut self) {
        self.open = true;
    }

    pub fn open_at(&mut self, slot: Slot) {
        self.open = true;
        self.slot = Some(slot);
    }

    pub fn close(&mut self) {
        *self = Self::default();
    }

    pub fn submit_label(&self) -> &'static str {
        if self.submitting {
            "SAVING..."
        } else {
            "ADD CASSETTE"
        }
    }
}

/// The removal panel keeps its own copy of the tape list.
#[derive(Debug, Clone, Default)]
pub struct RemovalPanel {
    tapes: Vec<Tape>,
    filter: String,
}

impl RemovalPanel {
    pub fn set_filter(&mut self, term: &str) {
        self.filter = term.to_lowercase();
    }

    pub fn clear(&mut self) {
        self.tapes.clear();
        self.filter.clear();
    }

    pub fn label(tape: &Tape) -> String {
        format!("{} - {}", tape.display_name(), tape.display_artist())
    }

    pub fn visible(&self) -> Vec<&Tape> {
        self.tapes
            .iter()
            .filter(|tape| Self::label(tape).to_lowercase().contains(&self.filter))
            .collect()
    }

    #[instrument(skip_all)]
    pub async fn refresh(&mut self, backend: &dyn TapeBackend) -> bool {
        let records = match backend.fetch_tapes().await {
            Ok(records) => records,
            Err(err) => {
                error!(error = %err, "failed to load removal list");
                return false;
            }
        };
        match records
            .into_iter()
            .map(Tape::try_from)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(tapes) => {
                self.tapes = tapes;
                true
            }
            Err(err) => {
                error!(error = %err, "removal list contained an invalid tape");
                false
            }
        }
    }
}

struct BusyGuard<'a> {
    state: &'a Mutex<ActionState>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock() = ActionState::Idle;
    }
}

/// Runs one machine action at a time and refreshes the store afterwards.
pub struct ActionCoordinator {
    backend: Arc<dyn TapeBackend>,
    store: TapeStore,
    state: Mutex<ActionState>,
    settle: Duration,
}

impl ActionCoordinator {
    pub fn new(backend: Arc<dyn TapeBackend>, store: TapeStore, settle: Duration) -> Self {
        Self {
            backend,
            store,
            state: Mutex::new(ActionState::Idle),
            settle,
        }
    }

    pub fn state(&self) -> ActionState {
        *self.state.lock()
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }

    fn begin(&self, action: Action, target: Option<TapeId>) -> Result<BusyGuard<'_>, ActionError> {
        let mut state = self.state.lock();
        if let ActionState::Busy {
            action: running, ..
        } = *state
        {
            warn!(?action, ?running, "rejecting action while another is in flight");
            return Err(ActionError::Busy);
        }
        *state = ActionState::Busy { action, target };
        debug!(?action, ?target, "action started");
        Ok(BusyGuard { state: &self.state })
    }

    #[instrument(skip(self))]
    pub async fn dispense(&self, id: TapeId) -> Result<ActionOutcome, ActionError> {
        self.machine_action(Action::Dispense, id).await
    }

    #[instrument(skip(self))]
    pub async fn return_tape(&self, id: TapeId) -> Result<ActionOutcome, ActionError> {
        self.machine_action(Action::Return, id).await
    }

    async fn machine_action(
        &self,
        action: Action,
        id: TapeId,
    ) -> Result<ActionOutcome, ActionError> {
        let guard = self.begin(action, Some(id))?;

        let result = match action {
            Action::Dispense => self.backend.dispense(id).await,
            _ => self.backend.return_tape(id).await,
        };
        let payload = match result {
            Ok(payload) => payload,
            Err(err) => {
                error!(?action, id, error = %err, "machine action failed");
                return Err(ActionError::from_api(err, MACHINE_ERROR, MACHINE_ERROR, false));
            }
        };

        info!(?action, id, settle = ?self.settle, "waiting for hardware to settle");
        tokio::time::sleep(self.settle).await;
        drop(guard);

        let reload = self.store.load(self.backend.as_ref()).await;
        Ok(ActionOutcome::Completed {
            message: payload.status,
            reload,
        })
    }

    #[instrument(skip(self, form), fields(slot = ?form.slot))]
    pub async fn add(&self, form: &mut AddForm) -> Result<ActionOutcome, ActionError> {
        let name = form.name.trim().to_string();
        let artist = form.artist.trim().to_string();
        if name.is_empty() {
            return Err(ActionError::Validation("Name required".to_string()));
        }

        let _guard = self.begin(Action::Add, None)?;
        form.submitting = true;
        let outcome = self.submit_add(form, name, artist).await;
        form.submitting = false;
        outcome
    }

    async fn submit_add(
        &self,
        form: &mut AddForm,
        name: String,
        artist: String,
    ) -> Result<ActionOutcome, ActionError> {
        let request = AddTapeRequest {
            name,
            artist,
            slot_x: form.slot.map(Slot::x),
            slot_y: form.slot.map(Slot::y),
        };

        if let Err(err) = self.backend.add(&request).await {
            error!(error = %err, "add tape failed");
            return Err(ActionError::from_api(err, "Error adding tape", "Network error", true));
        }

        info!(name = %request.name, "tape added");
        form.close();
        let reload = self.store.load(self.backend.as_ref()).await;
        Ok(ActionOutcome::Completed {
            message: None,
            reload,
        })
    }

    #[instrument(skip(self, confirm, removal))]
    pub async fn remove(
        &self,
        id: TapeId,
        confirm: &mut dyn Confirm,
        removal: &mut RemovalPanel,
    ) -> Result<ActionOutcome, ActionError> {
        if !confirm.confirm(REMOVE_PROMPT) {
            debug!(id, "removal declined");
            return Ok(ActionOutcome::Cancelled);
        }

        let _guard = self.begin(Action::Remove, Some(id))?;
        let message = match self.backend.remove(id).await {
            Ok(payload) => payload.status,
            Err(err) => {
                error!(id, error = %err, "remove tape failed");
                None
            }
        };

        removal.refresh(self.backend.as_ref()).await;
        let reload = self.store.load(self.backend.as_ref()).await;
        Ok(ActionOutcome::Completed { message, reload })
    }

    #[instrument(skip(self, confirm, removal))]
    pub async fn remove_all(
        &self,
        confirm: &mut dyn Confirm,
        removal: &mut RemovalPanel,
    ) -> Result<ActionOutcome, ActionError> {
        if !confirm.confirm(REMOVE_ALL_PROMPT) {
            debug!("clear-all declined");
            return Ok(ActionOutcome::Cancelled);
        }

        let _guard = self.begin(Action::RemoveAll, None)?;
        if let Err(err) = self.backend.remove_all().await {
            error!(error = %err, "remove all failed");
            return Err(ActionError::from_api(
                err,
                "Error clearing database",
                "Network error while clearing database",
                true,
            ));
        }

        info!("all tapes removed");
        removal.refresh(self.backend.as_ref()).await;
        let reload = self.store.load(self.backend.as_ref()).await;
        Ok(ActionOutcome::Completed {
            message: Some(REMOVE_ALL_SUMMARY.to_string()),
            reload,
        })
    }
}
