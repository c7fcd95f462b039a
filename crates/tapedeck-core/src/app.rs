use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tapedeck_shared::MoveAction;
use tracing::{debug, error, info, instrument, warn};

use crate::actions::{
    Action, ActionCoordinator, ActionError, ActionOutcome, AddForm, Confirm, RemovalPanel,
};
use crate::api::TapeBackend;
use crate::navigation::{NavigationController, Screen};
use crate::project::{Projection, Selection, project, project_grid};
use crate::render::Renderer;
use crate::store::{LoadOutcome, TapeStore};
use crate::tape::{OfferedAction, Slot, TapeId};
use crate::view::{SortKey, ViewMode, ViewState};

const COMM_ERROR: &str = "Comm Error";
const GENRES_ERROR: &str = "Could not load genres.";

/// Everything an operator can ask the console to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Navigate(Screen),
    Refresh,
    Render,
    Search(String),
    Sort(SortKey),
    ToggleMode,
    ListGenres,
    ApplyGenres(Vec<String>),
    ClearGenres,
    Select(Selection),
    Cell(Slot),
    OpenTape(TapeId),
    CloseTape,
    Dispense(TapeId),
    Return(TapeId),
    OpenAdd,
    CloseAdd,
    SubmitAdd {
        name: String,
        artist: String,
        slot: Option<Slot>,
    },
    OpenRemoval,
    FilterRemoval(String),
    CloseRemoval,
    Remove(TapeId),
    RemoveAll,
    Move {
        action: MoveAction,
        x: u8,
        y: u8,
    },
    Offset(f64),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// One operator session: the view state, the open panels and the action
/// coordinator around a shared [`TapeStore`].
pub struct App<W: Write> {
    out: W,
    renderer: Renderer,
    backend: Arc<dyn TapeBackend>,
    store: TapeStore,
    coordinator: ActionCoordinator,
    nav: NavigationController,
    view: ViewState,
    open_tape: Option<TapeId>,
    add_form: AddForm,
    removal: RemovalPanel,
    removal_open: bool,
}

impl<W: Write> App<W> {
    pub fn new(
        out: W,
        renderer: Renderer,
        backend: Arc<dyn TapeBackend>,
        settle: Duration,
        view: ViewState,
    ) -> Self {
        let store = TapeStore::new();
        let coordinator =
            ActionCoordinator::new(Arc::clone(&backend), store.clone(), settle);
        Self {
            out,
            renderer,
            backend,
            store,
            coordinator,
            nav: NavigationController::default(),
            view,
            open_tape: None,
            add_form: AddForm::default(),
            removal: RemovalPanel::default(),
            removal_open: false,
        }
    }

    pub fn store(&self) -> &TapeStore {
        &self.store
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn screen(&self) -> Screen {
        self.nav.current()
    }

    pub fn add_form(&self) -> &AddForm {
        &self.add_form
    }

    pub fn open_tape(&self) -> Option<TapeId> {
        self.open_tape
    }

    pub fn coordinator(&self) -> &ActionCoordinator {
        &self.coordinator
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn output_mut(&mut self) -> &mut W {
        &mut self.out
    }

    #[instrument(skip(self, confirm))]
    pub async fn dispatch(
        &mut self,
        command: Command,
        confirm: &mut dyn Confirm,
    ) -> anyhow::Result<Flow> {
        debug!(screen = %self.nav.current(), "dispatching command");
        match command {
            Command::Navigate(screen) => {
                let outcome = self
                    .nav
                    .navigate_to(screen, &self.store, self.backend.as_ref())
                    .await;
                if let Some(outcome) = outcome {
                    self.after_reload(outcome)?;
                }
            }
            Command::Refresh => {
                let outcome = self.store.load(self.backend.as_ref()).await;
                self.after_reload(outcome)?;
            }
            Command::Render => self.render()?,
            Command::Search(term) => {
                self.view.set_search(&term);
                self.render_if_directory()?;
            }
            Command::Sort(key) => {
                if !self.view.sort_control_visible() {
                    writeln!(self.out, "sorting is only available in the list view")?;
                } else {
                    self.view.set_sort(key);
                    self.render_if_directory()?;
                }
            }
            Command::ToggleMode => {
                let mode = self.view.toggle_mode();
                let label = match mode {
                    ViewMode::List => "LIST",
                    ViewMode::Grid => "GRID",
                };
                writeln!(self.out, "view: {label}")?;
                self.render_if_directory()?;
            }
            Command::ListGenres => self.list_genres().await?,
            Command::ApplyGenres(genres) => {
                self.view.apply_genres(genres);
                self.render_if_directory()?;
            }
            Command::ClearGenres => {
                self.view.clear_genres();
                self.render_if_directory()?;
            }
            Command::Select(selection) => self.select(selection)?,
            Command::Cell(slot) => {
                let snapshot = self.store.snapshot();
                let grid = project_grid(snapshot.tapes(), "");
                match grid.cell_at(slot) {
                    Some(cell) => self.select(cell.select)?,
                    None => writeln!(self.out, "no cell at {slot}")?,
                }
            }
            Command::OpenTape(id) => self.select(Selection::OpenTape(id))?,
            Command::CloseTape => self.open_tape = None,
            Command::Dispense(id) => self.machine_action(OfferedAction::Dispense, id).await?,
            Command::Return(id) => self.machine_action(OfferedAction::Return, id).await?,
            Command::OpenAdd => {
                self.add_form.open();
                writeln!(self.out, "add cassette: name and artist")?;
            }
            Command::CloseAdd => self.add_form.close(),
            Command::SubmitAdd { name, artist, slot } => {
                self.submit_add(name, artist, slot).await?;
            }
            Command::OpenRemoval => {
                self.removal_open = true;
                self.removal.set_filter("");
                self.removal.refresh(self.backend.as_ref()).await;
                self.render_removal()?;
            }
            Command::FilterRemoval(term) => {
                self.removal.set_filter(&term);
                self.render_removal()?;
            }
            Command::CloseRemoval => {
                self.removal_open = false;
                self.removal.clear();
                let outcome = self.store.load(self.backend.as_ref()).await;
                self.after_reload(outcome)?;
            }
            Command::Remove(id) => {
                let result = self
                    .coordinator
                    .remove(id, confirm, &mut self.removal)
                    .await;
                self.report(result)?;
                if self.removal_open {
                    self.render_removal()?;
                }
            }
            Command::RemoveAll => {
                writeln!(self.out, "{}", Action::RemoveAll.loader_text())?;
                let result = self.coordinator.remove_all(confirm, &mut self.removal).await;
                self.report(result)?;
                if self.removal_open {
                    self.render_removal()?;
                }
            }
            Command::Move { action, x, y } => {
                let (x, y) = if action.takes_coordinates() {
                    (x, y)
                } else {
                    (0, 0)
                };
                let status = match self.backend.move_hardware(action, x, y).await {
                    Ok(payload) => payload.status.unwrap_or_else(|| format!("Executed {action}")),
                    Err(err) => {
                        error!(%action, x, y, error = %err, "move command failed");
                        err.server_message()
                            .map(str::to_string)
                            .unwrap_or_else(|| COMM_ERROR.to_string())
                    }
                };
                writeln!(self.out, "{status}")?;
            }
            Command::Offset(val) => {
                let status = match self.backend.offset(val).await {
                    Ok(payload) => payload.status.unwrap_or_else(|| format!("Offset {val} set")),
                    Err(err) => {
                        error!(val, error = %err, "offset command failed");
                        err.server_message()
                            .map(str::to_string)
                            .unwrap_or_else(|| COMM_ERROR.to_string())
                    }
                };
                writeln!(self.out, "{status}")?;
            }
            Command::Status => self.write_status()?,
            Command::Help => writeln!(self.out, "{}", crate::console::HELP)?,
            Command::Quit => return Ok(Flow::Quit),
        }
        self.out.flush()?;
        Ok(Flow::Continue)
    }

    fn select(&mut self, selection: Selection) -> anyhow::Result<()> {
        match selection {
            Selection::OpenTape(id) => {
                let snapshot = self.store.snapshot();
                match snapshot.find(id) {
                    Some(tape) => {
                        self.open_tape = Some(id);
                        self.renderer.write_tape(&mut self.out, tape)?;
                    }
                    None => writeln!(self.out, "unknown tape {id}")?,
                }
            }
            Selection::AddAt(slot) => {
                self.add_form.open_at(slot);
                writeln!(self.out, "add cassette at slot {slot}: name and artist")?;
            }
        }
        Ok(())
    }

    async fn machine_action(&mut self, wanted: OfferedAction, id: TapeId) -> anyhow::Result<()> {
        let snapshot = self.store.snapshot();
        let Some(tape) = snapshot.find(id) else {
            writeln!(self.out, "unknown tape {id}")?;
            return Ok(());
        };
        if tape.offered_action() != wanted {
            warn!(id, ?wanted, in_machine = tape.in_machine, "action not offered for tape");
            writeln!(
                self.out,
                "{} is not available for {}; offered action is {}",
                wanted.label(),
                tape.display_name(),
                tape.offered_action().label()
            )?;
            return Ok(());
        }

        self.open_tape = None;
        let (action, result) = match wanted {
            OfferedAction::Dispense => {
                writeln!(self.out, "{}", Action::Dispense.loader_text())?;
                self.out.flush()?;
                (Action::Dispense, self.coordinator.dispense(id).await)
            }
            OfferedAction::Return => {
                writeln!(self.out, "{}", Action::Return.loader_text())?;
                self.out.flush()?;
                (Action::Return, self.coordinator.return_tape(id).await)
            }
        };
        info!(?action, id, ok = result.is_ok(), "machine action finished");
        self.report(result)
    }

    async fn submit_add(
        &mut self,
        name: String,
        artist: String,
        slot: Option<Slot>,
    ) -> anyhow::Result<()> {
        self.add_form.open = true;
        self.add_form.name = name;
        self.add_form.artist = artist;
        if slot.is_some() {
            self.add_form.slot = slot;
        }

        if !self.add_form.name.trim().is_empty() {
            writeln!(self.out, "{}", Action::Add.loader_text())?;
        }
        let result = self.coordinator.add(&mut self.add_form).await;
        if result.is_ok() {
            writeln!(self.out, "cassette added")?;
        }
        self.report(result)
    }

    async fn list_genres(&mut self) -> anyhow::Result<()> {
        match self.backend.fetch_tags().await {
            Ok(tags) => {
                if tags.is_empty() {
                    writeln!(self.out, "no genres")?;
                }
                for tag in tags {
                    let mark = if self.view.genre_filter().contains(&tag) {
                        "[x]"
                    } else {
                        "[ ]"
                    };
                    writeln!(self.out, "{mark} {tag}")?;
                }
            }
            Err(err) => {
                error!(error = %err, "failed to load genres");
                writeln!(self.out, "{GENRES_ERROR}")?;
            }
        }
        Ok(())
    }

    fn report(&mut self, result: Result<ActionOutcome, ActionError>) -> anyhow::Result<()> {
        match result {
            Ok(ActionOutcome::Cancelled) => writeln!(self.out, "cancelled")?,
            Ok(ActionOutcome::Completed { message, reload }) => {
                if let Some(message) = message {
                    writeln!(self.out, "{message}")?;
                }
                self.after_reload(reload)?;
            }
            Err(err) => {
                warn!(error = %err, "action failed");
                writeln!(self.out, "{}", err.operator_message())?;
            }
        }
        Ok(())
    }

    fn after_reload(&mut self, outcome: LoadOutcome) -> anyhow::Result<()> {
        if outcome.replaced() {
            self.render_if_directory()?;
        }
        Ok(())
    }

    fn render_if_directory(&mut self) -> anyhow::Result<()> {
        if self.nav.is_visible(Screen::Directory) {
            self.render()?;
        }
        Ok(())
    }

    pub fn render(&mut self) -> anyhow::Result<()> {
        let snapshot = self.store.snapshot();
        match project(snapshot.tapes(), &self.view) {
            Projection::List(rows) => self.renderer.write_list(&mut self.out, &rows)?,
            Projection::Grid(grid) => self.renderer.write_grid(&mut self.out, &grid)?,
        }
        Ok(())
    }

    fn render_removal(&mut self) -> anyhow::Result<()> {
        self.renderer
            .write_removal(&mut self.out, self.removal.visible())
    }

    fn write_status(&mut self) -> anyhow::Result<()> {
        let snapshot = self.store.snapshot();
        writeln!(self.out, "screen    {}", self.nav.current())?;
        writeln!(self.out, "view      {:?}", self.view.mode())?;
        writeln!(self.out, "search    {}", self.view.search_term())?;
        if self.view.sort_control_visible() {
            writeln!(self.out, "sort      {}", self.view.sort_key())?;
        }
        let genres: Vec<&str> = self.view.genre_filter().iter().map(String::as_str).collect();
        writeln!(self.out, "genres    {}", genres.join(", "))?;
        writeln!(
            self.out,
            "tapes     {} (generation {})",
            snapshot.tapes().len(),
            snapshot.generation()
        )?;
        if let Some(loader) = self.coordinator.state().loader_text() {
            writeln!(self.out, "busy      {loader}")?;
        }
        Ok(())
    }
}
