//! Records produced by an inventory run and the listing payload they are shaped from.
//!
//! [`ListItem`] wraps the raw field/value map returned for one document library entry.
//! [`FileRecord::from_item`] normalises it: sizes become kilobytes rounded to two
//! decimals and absent person fields become [`NOBODY`], so every record is fully
//! populated for display and CSV export.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Sentinel written wherever a person field is absent.
pub const NOBODY: &str = "Nobody";

/// Internal field names of a document library item.
pub mod fields {
    pub const UNIQUE_ID: &str = "UniqueId";
    pub const TITLE: &str = "Title";
    pub const LEAF_NAME: &str = "FileLeafRef";
    pub const FILE_TYPE: &str = "File_x0020_Type";
    pub const FILE_SIZE: &str = "File_x0020_Size";
    pub const STREAM_SIZE: &str = "SMTotalFileStreamSize";
    pub const CREATED: &str = "Created";
    pub const MODIFIED: &str = "Modified";
    pub const AUTHOR: &str = "Author";
    pub const EDITOR: &str = "Editor";
    pub const CHECKOUT_USER: &str = "CheckoutUser";
    pub const SHARED_WITH_USERS: &str = "SharedWithUsers";
    pub const IS_CURRENT_VERSION: &str = "_IsCurrentVersion";
    pub const CHECKED_OUT_LOCALLY: &str = "IsCheckedoutToLocal";
    pub const RELATIVE_URL: &str = "FileRef";
}

/// One collaboration site found during enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteRecord {
    #[serde(rename = "Url")]
    pub url: String,
    /// True for OneDrive personal sites.
    #[serde(rename = "Personal")]
    pub personal: bool,
}

impl SiteRecord {
    pub fn new(url: impl Into<String>, personal: bool) -> Self {
        Self {
            url: url.into(),
            personal,
        }
    }
}

/// A single failed connect or listing operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "TimeStamp")]
    pub timestamp: String,
    #[serde(rename = "Action")]
    pub action: String,
    #[serde(rename = "Reason")]
    pub reason: String,
}

impl FailureRecord {
    /// Records a failure observed now on this machine.
    pub fn now(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            host: local_host(),
            timestamp: crate::timestamp::now_plain(),
            action: action.into(),
            reason: reason.into(),
        }
    }
}

fn local_host() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.to_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// A person value (author, editor, checkout holder, share recipient).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Person {
    pub name: String,
    pub email: String,
}

impl Person {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Person {
                name: s.clone(),
                email: String::new(),
            }),
            Value::Object(obj) => {
                let pick = |keys: &[&str]| {
                    keys.iter()
                        .find_map(|k| obj.get(*k).and_then(Value::as_str))
                        .unwrap_or_default()
                        .to_string()
                };
                let person = Person {
                    name: pick(&["LookupValue", "Title"]),
                    email: pick(&["Email", "EMail"]),
                };
                if person.name.is_empty() && person.email.is_empty() {
                    None
                } else {
                    Some(person)
                }
            }
            _ => None,
        }
    }

    /// The name as reported, or the email when no name was given.
    pub fn display(&self) -> &str {
        if self.name.is_empty() {
            &self.email
        } else {
            &self.name
        }
    }
}

/// One entry of a document library listing, looked up by internal field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListItem {
    fields: Map<String, Value>,
}

impl ListItem {
    /// Wraps a JSON object; any other value is rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Raw field value; explicit nulls read as absent.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    pub fn text(&self, name: &str) -> Option<String> {
        match self.field(name)? {
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.field(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Booleans arrive as JSON bools, 0/1 or their string forms.
    pub fn flag(&self, name: &str) -> bool {
        match self.field(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(Value::String(s)) => {
                matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
            }
            _ => false,
        }
    }

    pub fn person(&self, name: &str) -> Option<Person> {
        match self.field(name)? {
            Value::Array(values) => values.iter().find_map(Person::from_value),
            value => Person::from_value(value),
        }
    }

    pub fn people(&self, name: &str) -> Vec<Person> {
        match self.field(name) {
            Some(Value::Array(values)) => values.iter().filter_map(Person::from_value).collect(),
            Some(value) => Person::from_value(value).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// A leaf name containing a dot marks a file; folders and plain list entries are skipped.
    pub fn is_file(&self) -> bool {
        self.text(fields::LEAF_NAME)
            .is_some_and(|leaf| leaf.contains('.'))
    }

    fn size_bytes(&self) -> u64 {
        self.number(fields::FILE_SIZE)
            .or_else(|| self.number(fields::STREAM_SIZE))
            .filter(|b| b.is_finite() && *b > 0.0)
            .map_or(0, |b| b as u64)
    }
}

/// Bytes to kilobytes, rounded to two decimals.
pub fn size_in_kb(bytes: u64) -> f64 {
    (bytes as f64 / 1024.0 * 100.0).round() / 100.0
}

fn two_decimals<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{value:.2}"))
}

/// Normalised metadata of one discovered file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    #[serde(rename = "UniqueId")]
    pub unique_id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "FileLeafRef")]
    pub leaf_name: String,
    #[serde(rename = "FileType")]
    pub file_type: String,
    #[serde(rename = "FileSizeKB", serialize_with = "two_decimals")]
    pub size_kb: f64,
    #[serde(rename = "Created")]
    pub created: String,
    #[serde(rename = "CreatedBy")]
    pub created_by: String,
    #[serde(rename = "Modified")]
    pub modified: String,
    #[serde(rename = "ModifiedBy")]
    pub modified_by: String,
    #[serde(rename = "CheckoutUser")]
    pub checkout_user: String,
    #[serde(rename = "SharedWithUsers")]
    pub shared_with_users: String,
    #[serde(rename = "IsCurrentVersion")]
    pub is_current_version: bool,
    #[serde(rename = "CheckedOutLocally")]
    pub checked_out_locally: bool,
    #[serde(rename = "RelativeUrl")]
    pub relative_url: String,
}

impl FileRecord {
    pub fn from_item(item: &ListItem) -> Self {
        let leaf_name = item.text(fields::LEAF_NAME).unwrap_or_default();
        let email_or_nobody = |field: &str| {
            item.person(field)
                .map(|p| if p.email.is_empty() { p.name } else { p.email })
                .unwrap_or_else(|| NOBODY.to_string())
        };

        let checkout_user = item
            .person(fields::CHECKOUT_USER)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| NOBODY.to_string());

        let shared = item.people(fields::SHARED_WITH_USERS);
        let shared_with_users = if shared.is_empty() {
            NOBODY.to_string()
        } else {
            shared
                .iter()
                .map(Person::display)
                .collect::<Vec<_>>()
                .join("; ")
        };

        FileRecord {
            unique_id: item.text(fields::UNIQUE_ID).unwrap_or_default(),
            name: item.text(fields::TITLE).unwrap_or_else(|| leaf_name.clone()),
            file_type: item.text(fields::FILE_TYPE).unwrap_or_default(),
            size_kb: size_in_kb(item.size_bytes()),
            created: item.text(fields::CREATED).unwrap_or_default(),
            created_by: email_or_nobody(fields::AUTHOR),
            modified: item.text(fields::MODIFIED).unwrap_or_default(),
            modified_by: email_or_nobody(fields::EDITOR),
            checkout_user,
            shared_with_users,
            is_current_version: item.flag(fields::IS_CURRENT_VERSION),
            checked_out_locally: item.flag(fields::CHECKED_OUT_LOCALLY),
            relative_url: item.text(fields::RELATIVE_URL).unwrap_or_default(),
            leaf_name,
        }
    }
}
