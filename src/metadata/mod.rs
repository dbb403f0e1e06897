//! File metadata persistence.
//!
//! [`FileRepository`] is the contract the storage layer and the HTTP facade
//! program against; [`Database`] is the embedded redb implementation.

pub mod db;
mod files;
pub mod models;
mod tables;

pub use db::{Database, DatabaseError};
pub use models::{
    BackendKind, FileRecord, ListParams, NewFile, OrphanRecord, SortOrder, Visibility,
};
pub use tables::*;

/// CRUD and query access to file records.
pub trait FileRepository: Send + Sync {
    fn create(&self, file: NewFile) -> Result<FileRecord, DatabaseError>;
    fn update(&self, file: &FileRecord) -> Result<FileRecord, DatabaseError>;
    fn delete(&self, file: &FileRecord) -> Result<(), DatabaseError>;
    fn find_by_id(&self, id: u64) -> Result<Option<FileRecord>, DatabaseError>;

    /// Like [`FileRepository::find_by_id`], but a missing record is an error.
    fn get_by_id(&self, id: u64) -> Result<FileRecord, DatabaseError> {
        self.find_by_id(id)?.ok_or(DatabaseError::NotFound(id))
    }

    /// A user's tagged files whose category is not in `excluded_categories`.
    /// Untagged files never match.
    fn find_admin_visible_by_uid(
        &self,
        user_id: &str,
        excluded_categories: &[String],
    ) -> Result<Vec<FileRecord>, DatabaseError>;

    /// A user's files that are not admin-only.
    fn find_client_visible_by_uid(&self, user_id: &str) -> Result<Vec<FileRecord>, DatabaseError>;

    fn total_size_of_user_files(&self, user_id: &str) -> Result<u64, DatabaseError>;
    fn list(&self, params: &ListParams) -> Result<Vec<FileRecord>, DatabaseError>;
    fn record_orphan(&self, orphan: &OrphanRecord) -> Result<(), DatabaseError>;
}

impl FileRepository for Database {
    fn create(&self, file: NewFile) -> Result<FileRecord, DatabaseError> {
        self.create_file(file)
    }

    fn update(&self, file: &FileRecord) -> Result<FileRecord, DatabaseError> {
        self.update_file(file)
    }

    fn delete(&self, file: &FileRecord) -> Result<(), DatabaseError> {
        if self.delete_file(file.id)? {
            Ok(())
        } else {
            Err(DatabaseError::NotFound(file.id))
        }
    }

    fn find_by_id(&self, id: u64) -> Result<Option<FileRecord>, DatabaseError> {
        self.find_file(id)
    }

    fn find_admin_visible_by_uid(
        &self,
        user_id: &str,
        excluded_categories: &[String],
    ) -> Result<Vec<FileRecord>, DatabaseError> {
        let mut files = self.get_files_by_user(user_id)?;
        files.retain(|f| {
            f.category
                .as_ref()
                .is_some_and(|c| !excluded_categories.contains(c))
        });
        Ok(files)
    }

    fn find_client_visible_by_uid(&self, user_id: &str) -> Result<Vec<FileRecord>, DatabaseError> {
        let mut files = self.get_files_by_user(user_id)?;
        files.retain(|f| !f.is_admin_only());
        Ok(files)
    }

    fn total_size_of_user_files(&self, user_id: &str) -> Result<u64, DatabaseError> {
        Database::total_size_of_user_files(self, user_id)
    }

    fn list(&self, params: &ListParams) -> Result<Vec<FileRecord>, DatabaseError> {
        self.list_files(params)
    }

    fn record_orphan(&self, orphan: &OrphanRecord) -> Result<(), DatabaseError> {
        Database::record_orphan(self, orphan)
    }
}
