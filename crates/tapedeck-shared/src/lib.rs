use std::fmt;
use std::str::FromStr;

use serde::{
  Deserialize,
  Serialize
};

pub const SLOT_COLUMNS: u8 = 5;
pub const SLOT_ROWS: u8 = 11;

// -2^63 and 2^63; floats in this
// half-open range cast to i64 exactly.
const I64_FLOAT_MIN: f64 =
  -9_223_372_036_854_775_808.0;
const I64_FLOAT_END: f64 =
  9_223_372_036_854_775_808.0;

/// A scalar as the tape machine backend
/// sends it. The backend is loosely
/// typed: `in_machine` shows up as `1`,
/// `true` or `"1"` depending on which
/// code path produced the row.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(untagged)]
pub enum LooseValue {
  Bool(bool),
  Int(i64),
  Float(f64),
  Text(String)
}

impl LooseValue {
  pub fn as_i64(&self) -> Option<i64> {
    match self {
      | LooseValue::Int(value) => {
        Some(*value)
      }
      | LooseValue::Float(value)
        if value.fract() == 0.0
          && (I64_FLOAT_MIN
            ..I64_FLOAT_END)
            .contains(value) =>
      {
        Some(*value as i64)
      }
      | LooseValue::Text(text) => {
        text.trim().parse::<i64>().ok()
      }
      | _ => None
    }
  }

  pub fn as_flag(&self) -> Option<bool> {
    match self {
      | LooseValue::Bool(value) => {
        Some(*value)
      }
      | LooseValue::Int(0) => Some(false),
      | LooseValue::Int(1) => Some(true),
      | LooseValue::Float(value)
        if *value == 0.0 =>
      {
        Some(false)
      }
      | LooseValue::Float(value)
        if *value == 1.0 =>
      {
        Some(true)
      }
      | LooseValue::Text(text) => {
        match text
          .trim()
          .to_ascii_lowercase()
          .as_str()
        {
          | "0" | "false" => Some(false),
          | "1" | "true" => Some(true),
          | _ => None
        }
      }
      | _ => None
    }
  }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      | LooseValue::Text(text) => {
        Some(text.as_str())
      }
      | _ => None
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(untagged)]
pub enum TagsField {
  List(Vec<String>),
  Joined(String)
}

impl TagsField {
  pub fn into_tags(self) -> Vec<String> {
    let raw = match self {
      | TagsField::List(list) => list,
      | TagsField::Joined(joined) => {
        joined
          .split(',')
          .map(str::to_string)
          .collect()
      }
    };
    raw
      .into_iter()
      .map(|tag| tag.trim().to_string())
      .filter(|tag| !tag.is_empty())
      .collect()
  }
}

/// One row of `GET /api/tapes`, before
/// validation.
#[derive(
  Debug,
  Clone,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct TapeRecord {
  #[serde(default)]
  pub id:          Option<LooseValue>,
  #[serde(default)]
  pub name:        Option<String>,
  #[serde(default)]
  pub artist:      Option<String>,
  #[serde(default)]
  pub listens:     Option<LooseValue>,
  #[serde(default)]
  pub last_played: Option<LooseValue>,
  #[serde(default)]
  pub in_machine:  Option<LooseValue>,
  #[serde(default)]
  pub slot_x:      Option<LooseValue>,
  #[serde(default)]
  pub slot_y:      Option<LooseValue>,
  #[serde(default)]
  pub tags:        Option<TagsField>,
  #[serde(default)]
  pub genre:       Option<String>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct AddTapeRequest {
  pub name:   String,
  pub artist: String,
  #[serde(rename = "slotX")]
  pub slot_x: Option<u8>,
  #[serde(rename = "slotY")]
  pub slot_y: Option<u8>
}

#[derive(
  Debug,
  Clone,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct StatusPayload {
  #[serde(default)]
  pub status: Option<String>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct TapeIdArg {
  pub id: u64
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct OffsetArg {
  pub val: f64
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct MoveArgs {
  pub action: MoveAction,
  pub x:      u8,
  pub y:      u8
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum MoveAction {
  Home,
  Pickup,
  Dropoff,
  Goto,
  Servo,
  Cancel
}

impl MoveAction {
  pub const ALL: [MoveAction; 6] = [
    MoveAction::Home,
    MoveAction::Pickup,
    MoveAction::Dropoff,
    MoveAction::Goto,
    MoveAction::Servo,
    MoveAction::Cancel
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      | MoveAction::Home => "home",
      | MoveAction::Pickup => "pickup",
      | MoveAction::Dropoff => "dropoff",
      | MoveAction::Goto => "goto",
      | MoveAction::Servo => "servo",
      | MoveAction::Cancel => "cancel"
    }
  }

  /// Whether the machine reads the x/y
  /// bytes that follow this command.
  pub fn takes_coordinates(
    self
  ) -> bool {
    matches!(
      self,
      MoveAction::Pickup
        | MoveAction::Dropoff
        | MoveAction::Goto
    )
  }
}

impl fmt::Display for MoveAction {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for MoveAction {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let wanted =
      s.trim().to_ascii_lowercase();
    MoveAction::ALL
      .into_iter()
      .find(|action| {
        action.as_str() == wanted
      })
      .ok_or_else(|| {
        format!(
          "unknown move action: {s} \
           (expected one of home, \
           pickup, dropoff, goto, \
           servo, cancel)"
        )
      })
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::{
    AddTapeRequest,
    LooseValue,
    MoveAction,
    StatusPayload,
    TagsField,
    TapeRecord
  };

  #[test]
  fn tape_record_accepts_mixed_scalar_types()
  {
    let record: TapeRecord =
      serde_json::from_value(json!({
        "id": "7",
        "name": "Rumours",
        "in_machine": true,
        "slot_x": "3",
        "slot_y": 7,
        "listens": null
      }))
      .expect("decode record");

    assert_eq!(
      record.id.and_then(|v| v.as_i64()),
      Some(7)
    );
    assert_eq!(
      record
        .in_machine
        .and_then(|v| v.as_flag()),
      Some(true)
    );
    assert_eq!(
      record
        .slot_x
        .and_then(|v| v.as_i64()),
      Some(3)
    );
    assert!(record.listens.is_none());
    assert!(record.artist.is_none());
  }

  #[test]
  fn flags_only_accept_zero_or_one() {
    assert_eq!(
      LooseValue::Int(0).as_flag(),
      Some(false)
    );
    assert_eq!(
      LooseValue::Text(" 1 ".into())
        .as_flag(),
      Some(true)
    );
    assert_eq!(
      LooseValue::Int(2).as_flag(),
      None
    );
    assert_eq!(
      LooseValue::Text("yes".into())
        .as_flag(),
      None
    );
  }

  #[test]
  fn floats_outside_i64_are_rejected() {
    assert_eq!(
      LooseValue::Float(12.0).as_i64(),
      Some(12)
    );
    assert_eq!(
      LooseValue::Float(1e19).as_i64(),
      None
    );
    assert_eq!(
      LooseValue::Float(-1e19).as_i64(),
      None
    );
    assert_eq!(
      LooseValue::Float(f64::NAN)
        .as_i64(),
      None
    );
    assert_eq!(
      LooseValue::Float(2.5).as_i64(),
      None
    );
  }

  #[test]
  fn joined_tags_are_split_and_trimmed()
  {
    let tags = TagsField::Joined(
      "rock, live,,  ".to_string()
    )
    .into_tags();
    assert_eq!(tags, vec![
      "rock".to_string(),
      "live".to_string()
    ]);
  }

  #[test]
  fn add_request_uses_camel_case_slots()
  {
    let body = serde_json::to_value(
      AddTapeRequest {
        name:   "Blue".to_string(),
        artist: "Joni".to_string(),
        slot_x: None,
        slot_y: Some(4)
      }
    )
    .expect("encode request");
    assert_eq!(
      body,
      json!({
        "name": "Blue",
        "artist": "Joni",
        "slotX": null,
        "slotY": 4
      })
    );
  }

  #[test]
  fn status_payload_tolerates_missing_field()
  {
    let payload: StatusPayload =
      serde_json::from_value(json!({}))
        .expect("decode payload");
    assert_eq!(payload.status, None);
  }

  #[test]
  fn move_actions_parse_case_insensitively()
  {
    assert_eq!(
      "PickUp".parse::<MoveAction>(),
      Ok(MoveAction::Pickup)
    );
    assert!(
      "wait_sense"
        .parse::<MoveAction>()
        .is_err()
    );
    assert!(
      MoveAction::Goto
        .takes_coordinates()
    );
    assert!(
      !MoveAction::Home
        .takes_coordinates()
    );
  }
}
