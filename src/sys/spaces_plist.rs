//! Reader for the per-user spaces preference document.
//!
//! The document nests monitors, each with an ordered list of spaces:
//!
//! ```text
//! SpacesDisplayConfiguration
//!   Management Data
//!     Monitors: [ { Spaces: [ { ManagedSpaceID | id64, uuid }, .. ] }, .. ]
//! ```

use std::io::{self, Cursor};
use std::path::PathBuf;

use plist::{Dictionary, Value};
use thiserror::Error;
use tracing::trace;

use crate::model::SpaceId;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("layout document unreadable: {0}")]
    Io(#[from] io::Error),
    #[error("layout document malformed: {0}")]
    Malformed(#[from] plist::Error),
    #[error("layout document is missing {0}")]
    MissingField(&'static str),
    #[error("layout document lists no spaces")]
    Empty,
}

pub trait LayoutSource: Send + Sync {
    fn read(&self) -> Result<Vec<u8>, LayoutError>;
}

pub struct FileLayoutSource {
    path: PathBuf,
}

impl FileLayoutSource {
    pub fn new(path: PathBuf) -> Self { FileLayoutSource { path } }
}

impl LayoutSource for FileLayoutSource {
    fn read(&self) -> Result<Vec<u8>, LayoutError> { Ok(std::fs::read(&self.path)?) }
}

/// One space entry, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutEntry {
    pub id: SpaceId,
    pub uuid: String,
}

/// Parses a binary or XML spaces document into its ordered entries.
/// Entries missing an id or uuid are skipped.
pub fn parse_layout(bytes: &[u8]) -> Result<Vec<LayoutEntry>, LayoutError> {
    let root = Value::from_reader(Cursor::new(bytes))?;
    let monitors = root
        .as_dictionary()
        .and_then(|d| d.get("SpacesDisplayConfiguration"))
        .and_then(Value::as_dictionary)
        .ok_or(LayoutError::MissingField("SpacesDisplayConfiguration"))?
        .get("Management Data")
        .and_then(Value::as_dictionary)
        .ok_or(LayoutError::MissingField("Management Data"))?
        .get("Monitors")
        .and_then(Value::as_array)
        .ok_or(LayoutError::MissingField("Monitors"))?;

    let entries: Vec<LayoutEntry> = monitors
        .iter()
        .filter_map(Value::as_dictionary)
        .filter_map(|monitor| monitor.get("Spaces").and_then(Value::as_array))
        .flatten()
        .filter_map(|space| {
            let entry = space.as_dictionary().and_then(layout_entry);
            if entry.is_none() {
                trace!(?space, "Skipping incomplete space entry");
            }
            entry
        })
        .collect();

    if entries.is_empty() {
        return Err(LayoutError::Empty);
    }
    Ok(entries)
}

fn layout_entry(space: &Dictionary) -> Option<LayoutEntry> {
    let id = ["ManagedSpaceID", "id64"]
        .iter()
        .find_map(|key| space.get(key).and_then(integer))?;
    if id == 0 {
        return None;
    }
    let uuid = space.get("uuid").and_then(Value::as_string)?;
    Some(LayoutEntry { id: SpaceId::new(id), uuid: uuid.to_string() })
}

fn integer(value: &Value) -> Option<u64> {
    value
        .as_unsigned_integer()
        .or_else(|| value.as_signed_integer().and_then(|i| u64::try_from(i).ok()))
}
