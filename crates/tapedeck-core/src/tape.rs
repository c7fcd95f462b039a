use std::fmt;

use chrono::{DateTime, Utc};
use tapedeck_shared::{LooseValue, SLOT_COLUMNS, SLOT_ROWS, TapeRecord};
use tracing::warn;

use crate::datetime::parse_timestamp;

pub type TapeId = u64;

pub const UNKNOWN_NAME: &str = "UNKNOWN";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// A 1-based storage position in the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot {
    x: u8,
    y: u8,
}

impl Slot {
    pub fn new(x: u8, y: u8) -> Option<Self> {
        if (1..=SLOT_COLUMNS).contains(&x) && (1..=SLOT_ROWS).contains(&y) {
            Some(Self { x, y })
        } else {
            None
        }
    }

    pub fn x(self) -> u8 {
        self.x
    }

    pub fn y(self) -> u8 {
        self.y
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tape {
    pub id: TapeId,
    pub name: Option<String>,
    pub artist: Option<String>,
    pub listens: u64,
    pub last_played: Option<DateTime<Utc>>,
    pub in_machine: bool,
    pub slot: Option<Slot>,
    pub tags: Vec<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TapeRecordError {
    #[error("tape record has no id")]
    MissingId,
    #[error("tape record has an invalid id: {0}")]
    InvalidId(String),
    #[error("tape {id} has no in_machine flag")]
    MissingInMachine { id: TapeId },
    #[error("tape {id} has an invalid in_machine flag: {value}")]
    InvalidInMachine { id: TapeId, value: String },
}

impl Tape {
    pub fn new(id: TapeId, name: &str, in_machine: bool) -> Self {
        Self {
            id,
            name: Some(name.to_string()),
            artist: None,
            listens: 0,
            last_played: None,
            in_machine,
            slot: None,
            tags: vec![],
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_NAME)
    }

    pub fn display_artist(&self) -> &str {
        self.artist.as_deref().unwrap_or(UNKNOWN_ARTIST)
    }

    pub fn is_out(&self) -> bool {
        !self.in_machine
    }

    pub fn offered_action(&self) -> OfferedAction {
        if self.in_machine {
            OfferedAction::Dispense
        } else {
            OfferedAction::Return
        }
    }

    pub fn matches_text(&self, lowered_term: &str) -> bool {
        if lowered_term.is_empty() {
            return true;
        }
        let name_match = self
            .name
            .as_deref()
            .is_some_and(|name| name.to_lowercase().contains(lowered_term));
        let artist_match = self
            .artist
            .as_deref()
            .is_some_and(|artist| artist.to_lowercase().contains(lowered_term));
        name_match || artist_match
    }

    pub fn tags_label(&self) -> String {
        if self.tags.is_empty() {
            "No tags".to_string()
        } else {
            self.tags.join(", ")
        }
    }
}

/// The single action a tape detail view offers, decided by `in_machine` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferedAction {
    Dispense,
    Return,
}

impl OfferedAction {
    pub fn label(self) -> &'static str {
        match self {
            OfferedAction::Dispense => "DISPENSE",
            OfferedAction::Return => "RETURN",
        }
    }
}

impl TryFrom<TapeRecord> for Tape {
    type Error = TapeRecordError;

    fn try_from(record: TapeRecord) -> Result<Self, Self::Error> {
        let id = match record.id.as_ref() {
            None => return Err(TapeRecordError::MissingId),
            Some(raw) => raw
                .as_i64()
                .and_then(|value| u64::try_from(value).ok())
                .ok_or_else(|| TapeRecordError::InvalidId(describe(raw)))?,
        };

        let in_machine = match record.in_machine.as_ref() {
            None => return Err(TapeRecordError::MissingInMachine { id }),
            Some(raw) => raw
                .as_flag()
                .ok_or_else(|| TapeRecordError::InvalidInMachine {
                    id,
                    value: describe(raw),
                })?,
        };

        let slot = parse_slot(id, record.slot_x.as_ref(), record.slot_y.as_ref());

        let listens = record
            .listens
            .as_ref()
            .and_then(LooseValue::as_i64)
            .and_then(|value| u64::try_from(value).ok())
            .unwrap_or(0);

        let last_played = record
            .last_played
            .as_ref()
            .and_then(LooseValue::as_text)
            .and_then(parse_timestamp);

        let mut tags = record.tags.map(|t| t.into_tags()).unwrap_or_default();
        if tags.is_empty()
            && let Some(genre) = record.genre
        {
            tags = tapedeck_shared::TagsField::Joined(genre).into_tags();
        }

        Ok(Self {
            id,
            name: non_blank(record.name),
            artist: non_blank(record.artist),
            listens,
            last_played,
            in_machine,
            slot,
            tags,
        })
    }
}

fn parse_slot(id: TapeId, x: Option<&LooseValue>, y: Option<&LooseValue>) -> Option<Slot> {
    let (x, y) = match (x, y) {
        (Some(x), Some(y)) => (x, y),
        (None, None) => return None,
        _ => {
            warn!(id, "tape has only one slot coordinate; treating as unassigned");
            return None;
        }
    };

    let coords = x
        .as_i64()
        .zip(y.as_i64())
        .and_then(|(x, y)| Some((u8::try_from(x).ok()?, u8::try_from(y).ok()?)));
    let slot = coords.and_then(|(x, y)| Slot::new(x, y));
    if slot.is_none() {
        warn!(
            id,
            slot_x = %describe(x),
            slot_y = %describe(y),
            "tape slot is outside the machine; treating as unassigned"
        );
    }
    slot
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn describe(value: &LooseValue) -> String {
    match value {
        LooseValue::Bool(v) => v.to_string(),
        LooseValue::Int(v) => v.to_string(),
        LooseValue::Float(v) => v.to_string(),
        LooseValue::Text(v) => format!("{v:?}"),
    }
}
