use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Physical medium a file's bytes live on. Stored on every record so each file
/// is read back from the backend that wrote it, not the process-wide default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    S3,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::S3 => "s3",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may see a file besides its owner.
///
/// Admin-only files are always private as well; modelling visibility as a
/// single enum keeps that implication true for every record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
    AdminOnly,
}

impl Visibility {
    pub fn from_flags(is_admin_only: bool, is_private: bool) -> Self {
        if is_admin_only {
            Visibility::AdminOnly
        } else if is_private {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }

    pub fn is_private(&self) -> bool {
        !matches!(self, Visibility::Public)
    }

    pub fn is_admin_only(&self) -> bool {
        matches!(self, Visibility::AdminOnly)
    }
}

/// A file record stored in redb
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: u64,
    pub user_id: String,

    // Placement
    pub storage: BackendKind,
    pub path: String,
    pub filename: String,
    #[serde(default)]
    pub bucket: Option<String>,

    pub content_type: String,
    pub size: u64,
    #[serde(default)]
    pub category: Option<String>,
    pub visibility: Visibility,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// Location of the bytes relative to the backend root (or bucket).
    pub fn key(&self) -> String {
        format!("{}/{}", self.path, self.filename)
    }

    pub fn is_private(&self) -> bool {
        self.visibility.is_private()
    }

    pub fn is_admin_only(&self) -> bool {
        self.visibility.is_admin_only()
    }
}

/// A record as built by a storage backend, before the repository assigns
/// its id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFile {
    pub user_id: String,
    pub storage: BackendKind,
    pub path: String,
    pub filename: String,
    pub bucket: Option<String>,
    pub content_type: String,
    pub size: u64,
    pub category: Option<String>,
    pub visibility: Visibility,
}

impl NewFile {
    pub fn key(&self) -> String {
        format!("{}/{}", self.path, self.filename)
    }
}

/// A physical object whose metadata row could not be written and whose
/// compensating delete also failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanRecord {
    pub storage: BackendKind,
    pub bucket: Option<String>,
    pub key: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Filter, sort and pagination options for [`crate::metadata::FileRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub user_id: Option<String>,
    /// Drop admin-only records (applied for non-privileged callers).
    pub exclude_admin_only: bool,
    pub sort: SortOrder,
    /// Zero means no limit.
    pub limit: usize,
    pub offset: usize,
}
