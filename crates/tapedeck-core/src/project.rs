use std::cmp::Ordering;
use std::collections::{
  BTreeSet,
  HashMap
};

use tapedeck_shared::{
  SLOT_COLUMNS,
  SLOT_ROWS
};
use tracing::trace;

use crate::tape::{
  Slot,
  Tape,
  TapeId
};
use crate::view::{
  SortKey,
  ViewMode,
  ViewState
};

/// What activating a rendered row or
/// cell does.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Selection {
  OpenTape(TapeId),
  AddAt(Slot)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRow {
  pub tape_id:     TapeId,
  pub out:         bool,
  pub name:        String,
  pub artist:      String,
  pub plays:       u64,
  pub match_count: Option<usize>,
  pub select:      Selection
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellState {
  Loaded {
    tape_id: TapeId,
    name:    String
  },
  Out {
    tape_id: TapeId,
    name:    String
  },
  Empty
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridCell {
  pub row:         usize,
  pub column:      usize,
  pub slot:        Slot,
  pub state:       CellState,
  pub highlighted: bool,
  pub select:      Selection
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridModel {
  cells: Vec<GridCell>
}

impl GridModel {
  pub fn cells(&self) -> &[GridCell] {
    &self.cells
  }

  pub fn rows(
    &self
  ) -> impl Iterator<Item = &[GridCell]>
  {
    self
      .cells
      .chunks(usize::from(SLOT_COLUMNS))
  }

  pub fn cell_at(
    &self,
    slot: Slot
  ) -> Option<&GridCell> {
    let (row, column) =
      cell_for_slot(slot);
    self.cells.get(
      row * usize::from(SLOT_COLUMNS)
        + column
    )
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
  List(Vec<ListRow>),
  Grid(GridModel)
}

/// Visual row 0 is the top of the
/// machine, which holds `y = 11`.
#[must_use]
pub fn slot_for_cell(
  row: usize,
  column: usize
) -> Option<Slot> {
  let x = u8::try_from(column + 1).ok()?;
  let y = usize::from(SLOT_ROWS)
    .checked_sub(row)
    .and_then(|y| u8::try_from(y).ok())?;
  Slot::new(x, y)
}

#[must_use]
pub fn cell_for_slot(
  slot: Slot
) -> (usize, usize) {
  (
    usize::from(SLOT_ROWS - slot.y()),
    usize::from(slot.x() - 1)
  )
}

#[tracing::instrument(skip_all, fields(mode = ?view.mode(), tapes = tapes.len()))]
pub fn project(
  tapes: &[Tape],
  view: &ViewState
) -> Projection {
  match view.mode() {
    | ViewMode::List => {
      Projection::List(project_list(
        tapes, view
      ))
    }
    | ViewMode::Grid => {
      Projection::Grid(project_grid(
        tapes,
        view.search_term()
      ))
    }
  }
}

pub fn project_list(
  tapes: &[Tape],
  view: &ViewState
) -> Vec<ListRow> {
  if !view.genre_filter().is_empty() {
    return project_genres(
      tapes,
      view.genre_filter()
    );
  }

  let term =
    view.search_term().to_lowercase();
  let (out, mut inside): (
    Vec<&Tape>,
    Vec<&Tape>
  ) = tapes
    .iter()
    .filter(|tape| {
      tape.matches_text(&term)
    })
    .partition(|tape| tape.is_out());

  sort_in_machine(
    &mut inside,
    view.sort_key()
  );
  trace!(
    out = out.len(),
    inside = inside.len(),
    sort = %view.sort_key(),
    "projected list"
  );

  out
    .into_iter()
    .chain(inside)
    .map(|tape| list_row(tape, None))
    .collect()
}

pub fn project_genres(
  tapes: &[Tape],
  genres: &BTreeSet<String>
) -> Vec<ListRow> {
  let mut matched: Vec<(&Tape, usize)> =
    tapes
      .iter()
      .map(|tape| {
        let count = tape
          .tags
          .iter()
          .filter(|tag| {
            genres.contains(tag.as_str())
          })
          .count();
        (tape, count)
      })
      .filter(|(_, count)| *count > 0)
      .collect();

  matched.sort_by(|a, b| b.1.cmp(&a.1));

  matched
    .into_iter()
    .map(|(tape, count)| {
      list_row(tape, Some(count))
    })
    .collect()
}

/// Lays the snapshot onto the fixed
/// slot grid. When two tapes claim the
/// same slot the earlier one wins.
pub fn project_grid(
  tapes: &[Tape],
  search_term: &str
) -> GridModel {
  let mut by_slot: HashMap<
    Slot,
    &Tape
  > = HashMap::new();
  for tape in tapes {
    if let Some(slot) = tape.slot {
      by_slot.entry(slot).or_insert(tape);
    }
  }

  let term = search_term.to_lowercase();
  let mut cells = Vec::with_capacity(
    usize::from(SLOT_COLUMNS)
      * usize::from(SLOT_ROWS)
  );

  for row in 0..usize::from(SLOT_ROWS) {
    for column in
      0..usize::from(SLOT_COLUMNS)
    {
      let Some(slot) =
        slot_for_cell(row, column)
      else {
        continue;
      };

      let cell = match by_slot.get(&slot)
      {
        | Some(tape) => {
          let name = tape
            .display_name()
            .to_string();
          let highlighted = !term
            .is_empty()
            && name
              .to_lowercase()
              .contains(&term);
          let state = if tape.in_machine
          {
            CellState::Loaded {
              tape_id: tape.id,
              name
            }
          } else {
            CellState::Out {
              tape_id: tape.id,
              name
            }
          };
          GridCell {
            row,
            column,
            slot,
            state,
            highlighted,
            select: Selection::OpenTape(
              tape.id
            )
          }
        }
        | None => GridCell {
          row,
          column,
          slot,
          state: CellState::Empty,
          highlighted: false,
          select: Selection::AddAt(slot)
        }
      };
      cells.push(cell);
    }
  }

  GridModel {
    cells
  }
}

fn list_row(
  tape: &Tape,
  match_count: Option<usize>
) -> ListRow {
  ListRow {
    tape_id: tape.id,
    out: tape.is_out(),
    name: tape
      .display_name()
      .to_string(),
    artist: tape
      .display_artist()
      .to_string(),
    plays: tape.listens,
    match_count,
    select: Selection::OpenTape(tape.id)
  }
}

fn sort_in_machine(
  tapes: &mut [&Tape],
  key: SortKey
) {
  match key {
    | SortKey::NameAsc => {
      tapes.sort_by(|a, b| {
        compare_names(
          a.name.as_deref(),
          b.name.as_deref()
        )
      })
    }
    | SortKey::PlaysAsc => {
      tapes.sort_by_key(|t| t.listens)
    }
    | SortKey::PlaysDesc => {
      tapes.sort_by(|a, b| {
        b.listens.cmp(&a.listens)
      })
    }
    | SortKey::RecentAsc => {
      tapes
        .sort_by_key(|t| t.last_played)
    }
    | SortKey::RecentDesc => {
      tapes.sort_by(|a, b| {
        b.last_played.cmp(&a.last_played)
      })
    }
    | SortKey::None => {}
  }
}

fn compare_names(
  a: Option<&str>,
  b: Option<&str>
) -> Ordering {
  let a = a.unwrap_or_default();
  let b = b.unwrap_or_default();
  a.to_lowercase()
    .cmp(&b.to_lowercase())
    .then_with(|| a.cmp(b))
}
