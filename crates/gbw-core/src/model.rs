use serde::{Serialize, Serializer};
use thiserror::Error;

const CONFLICT_MARKER: &str = "--- AUTO-MERGE WARNING ---";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("document encoding failed: {0}")]
    EncodeFailure(String),
}

/// Bitwarden unencrypted JSON export.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExportDocument {
    pub encrypted: bool,
    pub folders: Vec<Folder>,
    pub items: Vec<LoginItem>,
}

impl ExportDocument {
    #[must_use]
    pub fn new(items: Vec<LoginItem>) -> Self {
        Self {
            encrypted: false,
            folders: Vec::new(),
            items,
        }
    }

    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Two-space indented JSON with a trailing newline.
    pub fn to_json_pretty(&self) -> Result<Vec<u8>, ModelError> {
        let mut output = serde_json::to_vec_pretty(self)
            .map_err(|error| ModelError::EncodeFailure(error.to_string()))?;
        output.push(b'\n');
        Ok(output)
    }
}

/// Never populated; present so `folders` keeps its array shape.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Folder {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ItemType {
    Login = 1,
}

impl Serialize for ItemType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LoginItem {
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub name: String,
    pub notes: Option<String>,
    pub favorite: bool,
    pub login: Login,
    pub fields: Vec<CustomField>,
}

impl LoginItem {
    #[must_use]
    pub fn new(
        name: String,
        uri: String,
        username: String,
        password: Option<String>,
        notes: Option<String>,
    ) -> Self {
        Self {
            item_type: ItemType::Login,
            name,
            notes: notes.filter(|value| !value.is_empty()),
            favorite: false,
            login: Login {
                uris: vec![UriEntry::new(uri)],
                username,
                password,
                totp: None,
            },
            fields: Vec::new(),
        }
    }

    pub fn push_uri(&mut self, uri: String) {
        self.login.uris.push(UriEntry::new(uri));
    }

    #[must_use]
    pub fn credentials_differ(&self, username: &str, password: Option<&str>) -> bool {
        self.login.username != username || self.login.password.as_deref() != password
    }

    /// Appends a review block naming the URL and username. Passwords never
    /// enter the notes.
    pub fn append_conflict_note(&mut self, url: &str, username: &str) {
        let block = conflict_block(url, username);
        match &mut self.notes {
            Some(notes) if !notes.is_empty() => notes.push_str(&block),
            _ => self.notes = Some(block.trim().to_owned()),
        }
    }
}

fn conflict_block(url: &str, username: &str) -> String {
    format!(
        "\n\n{CONFLICT_MARKER}\n\
         An entry for the URL below had different credentials and was not merged automatically:\n\
         URL: {url}\n\
         Username: {username}\n"
    )
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Login {
    pub uris: Vec<UriEntry>,
    pub username: String,
    pub password: Option<String>,
    pub totp: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UriEntry {
    pub uri: String,
    #[serde(rename = "match")]
    pub match_type: Option<UriMatch>,
}

impl UriEntry {
    #[must_use]
    pub fn new(uri: String) -> Self {
        Self {
            uri,
            match_type: None,
        }
    }
}

/// Bitwarden URI match detection. Unset entries fall back to the importer's
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UriMatch {
    Domain = 0,
    Host = 1,
    StartsWith = 2,
    Exact = 3,
    RegularExpression = 4,
    Never = 5,
}

impl Serialize for UriMatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CustomField {
    pub name: String,
    pub value: String,
}
