//! The synchronized item envelope and the typed task/event models
//! projected from it.
//!
//! Everything that crosses the wire or sits in the authoritative store is
//! an [`Item`]: an opaque id, a kind tag, the server-stamped `updated`
//! timestamp, a tombstone flag, the scheduling fields and a kind-specific
//! JSON body. Clients flatten items into [`Task`] / [`Event`] for local
//! storage and display.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::recur::Recur;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Task,
    Event,
    Schedule,
}

/// Kinds a client replica keeps locally and asks the server for.
pub const SYNCED_KINDS: [Kind; 2] = [Kind::Task, Kind::Event];

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Task => "task",
            Kind::Event => "event",
            Kind::Schedule => "schedule",
        }
    }

    pub fn parse(input: &str) -> Option<Kind> {
        match input {
            "task" => Some(Kind::Task),
            "event" => Some(Kind::Event),
            "schedule" => Some(Kind::Schedule),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub kind: Kind,
    /// Stamped by the authoritative store on every write; `None` on items
    /// the client created but never pushed.
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(with = "date_text", default)]
    pub date: Option<NaiveDate>,
    #[serde(with = "recur_text", default)]
    pub recurrer: Option<Recur>,
    #[serde(rename = "recurNext", with = "date_text", default)]
    pub recur_next: Option<NaiveDate>,
    pub body: String,
}

impl Item {
    pub fn new(kind: Kind, body: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            updated: None,
            deleted: false,
            date: None,
            recurrer: None,
            recur_next: None,
            body,
        }
    }
}

/// Dates travel as `yyyy-mm-dd` strings, empty when absent.
mod date_text {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::models::date::parse_date;

    pub fn serialize<S: Serializer>(
        date: &Option<NaiveDate>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => serializer.serialize_str(&d.to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDate>, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(parse_date(&text))
    }
}

/// Recurrence rules travel in canonical text form, empty when absent.
/// Unparseable text degrades to no rule rather than failing the whole
/// envelope.
mod recur_text {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::models::recur::Recur;

    pub fn serialize<S: Serializer>(
        recur: &Option<Recur>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match recur {
            Some(r) => serializer.serialize_str(&r.to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Recur>, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Recur::parse(&text))
    }
}

/// Raised when an item body cannot be decoded for its kind, or an item of
/// the wrong kind is projected into a typed model.
#[derive(Debug)]
pub enum BodyError {
    WrongKind { expected: Kind, got: Kind },
    Malformed(serde_json::Error),
}

impl fmt::Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyError::WrongKind { expected, got } => {
                write!(f, "expected a {} item, got {}", expected, got)
            }
            BodyError::Malformed(e) => write!(f, "could not decode item body: {}", e),
        }
    }
}

impl std::error::Error for BodyError {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskBody {
    pub title: String,
    #[serde(default)]
    pub project: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub date: Option<NaiveDate>,
    pub recurrer: Option<Recur>,
    pub recur_next: Option<NaiveDate>,
    pub title: String,
    pub project: String,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            date: None,
            recurrer: None,
            recur_next: None,
            title: title.into(),
            project: String::new(),
        }
    }

    pub fn from_item(item: &Item) -> Result<Self, BodyError> {
        if item.kind != Kind::Task {
            return Err(BodyError::WrongKind {
                expected: Kind::Task,
                got: item.kind,
            });
        }
        let body: TaskBody =
            serde_json::from_str(&item.body).map_err(BodyError::Malformed)?;

        Ok(Self {
            id: item.id.clone(),
            date: item.date,
            recurrer: item.recurrer.clone(),
            recur_next: item.recur_next,
            title: body.title,
            project: body.project,
        })
    }

    pub fn into_item(self) -> Item {
        let body = TaskBody {
            title: self.title,
            project: self.project,
        };

        Item {
            id: self.id,
            kind: Kind::Task,
            updated: None,
            deleted: false,
            date: self.date,
            recurrer: self.recurrer,
            recur_next: self.recur_next,
            // TaskBody serialization cannot fail.
            body: serde_json::to_string(&body).unwrap_or_default(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.title.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventBody {
    pub title: String,
    #[serde(default)]
    pub time: Option<NaiveTime>,
    #[serde(default)]
    pub duration_min: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub date: Option<NaiveDate>,
    pub title: String,
    pub time: Option<NaiveTime>,
    pub duration_min: Option<u32>,
}

impl Event {
    pub fn from_item(item: &Item) -> Result<Self, BodyError> {
        if item.kind != Kind::Event {
            return Err(BodyError::WrongKind {
                expected: Kind::Event,
                got: item.kind,
            });
        }
        let body: EventBody =
            serde_json::from_str(&item.body).map_err(BodyError::Malformed)?;

        Ok(Self {
            id: item.id.clone(),
            date: item.date,
            title: body.title,
            time: body.time,
            duration_min: body.duration_min,
        })
    }

    pub fn into_item(self) -> Item {
        let body = EventBody {
            title: self.title,
            time: self.time,
            duration_min: self.duration_min,
        };

        Item {
            id: self.id,
            kind: Kind::Event,
            updated: None,
            deleted: false,
            date: self.date,
            recurrer: None,
            recur_next: None,
            body: serde_json::to_string(&body).unwrap_or_default(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.title.is_empty() && self.date.is_some()
    }
}
