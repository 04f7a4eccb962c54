use std::collections::HashMap;
use std::io::Read;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ExportDocument, LoginItem};

/// Header names a Google Passwords export must declare. `note` is optional.
pub const REQUIRED_HEADERS: [&str; 4] = ["name", "url", "username", "password"];

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("missing required headers {missing:?} (found {found:?})")]
    Schema {
        missing: Vec<String>,
        found: Vec<String>,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// How a row whose credentials disagree with its group is merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Keep the first credentials and record the conflicting row in notes.
    #[default]
    MergeIntoNotes,
    /// Keep the first credentials without touching notes.
    FirstWins,
    /// Take the conflicting row's credentials and record the superseded
    /// username in notes.
    LastWins,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputRecord {
    pub name: Option<String>,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub name: String,
    pub url: String,
    #[serde(skip)]
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionReport {
    pub accepted_rows: usize,
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub document: ExportDocument,
    pub report: ConversionReport,
}

/// Group name to item, in first-seen order.
#[derive(Debug, Default)]
struct GroupIndex {
    positions: HashMap<String, usize>,
    items: Vec<LoginItem>,
}

impl GroupIndex {
    fn get_mut(&mut self, name: &str) -> Option<&mut LoginItem> {
        let position = *self.positions.get(name)?;
        self.items.get_mut(position)
    }

    fn insert(&mut self, item: LoginItem) {
        self.positions.insert(item.name.clone(), self.items.len());
        self.items.push(item);
    }

    fn into_items(self) -> Vec<LoginItem> {
        self.items
    }
}

pub fn convert<I>(records: I, policy: ConflictPolicy) -> Conversion
where
    I: IntoIterator<Item = InputRecord>,
{
    let mut groups = GroupIndex::default();
    let mut report = ConversionReport::default();

    for record in records {
        let InputRecord {
            name,
            url,
            username,
            password,
            note,
        } = record;
        let (Some(name), Some(url), Some(username)) = (
            non_empty(name),
            non_empty(url),
            non_empty(username),
        ) else {
            continue;
        };
        report.accepted_rows += 1;

        let Some(existing) = groups.get_mut(&name) else {
            groups.insert(LoginItem::new(name, url, username, password, note));
            continue;
        };

        existing.push_uri(url.clone());
        if !existing.credentials_differ(&username, password.as_deref()) {
            continue;
        }

        match policy {
            ConflictPolicy::MergeIntoNotes => existing.append_conflict_note(&url, &username),
            ConflictPolicy::FirstWins => {}
            ConflictPolicy::LastWins => {
                let superseded =
                    std::mem::replace(&mut existing.login.username, username.clone());
                existing.login.password = password;
                existing.append_conflict_note(&url, &superseded);
            }
        }
        report.conflicts.push(Conflict {
            name,
            url,
            username,
        });
    }

    Conversion {
        document: ExportDocument::new(groups.into_items()),
        report,
    }
}

/// Validates the header row, then converts every record. Nothing is
/// converted when a required header is missing.
pub fn convert_reader<R: Read>(
    input: R,
    policy: ConflictPolicy,
) -> Result<Conversion, ConvertError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
    let headers = reader.headers()?.clone();
    let columns = ColumnMap::from_headers(&headers)?;

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result?;
        records.push(columns.record(&row));
    }
    Ok(convert(records, policy))
}

#[derive(Debug)]
struct ColumnMap {
    name: usize,
    url: usize,
    username: usize,
    password: usize,
    note: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, ConvertError> {
        // A repeated header resolves to its last column.
        let position = |name: &str| {
            (0..headers.len())
                .rev()
                .find(|&index| &headers[index] == name)
        };
        if let (Some(name), Some(url), Some(username), Some(password)) = (
            position("name"),
            position("url"),
            position("username"),
            position("password"),
        ) {
            return Ok(Self {
                name,
                url,
                username,
                password,
                note: position("note"),
            });
        }

        Err(ConvertError::Schema {
            missing: missing_headers(headers),
            found: headers.iter().map(ToOwned::to_owned).collect(),
        })
    }

    fn record(&self, row: &csv::StringRecord) -> InputRecord {
        let cell = |index: usize| row.get(index).map(ToOwned::to_owned);
        InputRecord {
            name: cell(self.name),
            url: cell(self.url),
            username: cell(self.username),
            password: cell(self.password),
            note: self.note.and_then(cell),
        }
    }
}

#[must_use]
pub fn missing_headers(headers: &csv::StringRecord) -> Vec<String> {
    REQUIRED_HEADERS
        .iter()
        .filter(|required| !headers.iter().any(|header| header == **required))
        .map(|required| (*required).to_owned())
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}
