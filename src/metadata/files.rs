use chrono::Utc;
use redb::{ReadableTable, WriteTransaction};

use super::db::{Database, DatabaseError};
use super::models::{FileRecord, ListParams, NewFile, OrphanRecord, SortOrder};
use super::tables::*;

impl Database {
    // ========================================================================
    // File operations
    // ========================================================================

    /// Assign an id and timestamps to a new file and store it with its owner index entry
    pub fn create_file(&self, file: NewFile) -> Result<FileRecord, DatabaseError> {
        debug_assert!(!file.filename.is_empty(), "file name must not be empty");

        let write_txn = self.begin_write()?;
        let id = Database::next_sequence(&write_txn, FILE_ID_SEQUENCE)?;
        let now = Utc::now();
        let record = FileRecord {
            id,
            user_id: file.user_id,
            storage: file.storage,
            path: file.path,
            filename: file.filename,
            bucket: file.bucket,
            content_type: file.content_type,
            size: file.size,
            category: file.category,
            visibility: file.visibility,
            created_at: now,
            updated_at: now,
        };
        {
            let mut table = write_txn.open_table(FILES)?;
            let data = rmp_serde::to_vec_named(&record)?;
            table.insert(id, data.as_slice())?;
        }
        index_add(&write_txn, &record.user_id, id)?;
        write_txn.commit()?;
        Ok(record)
    }

    /// Get a file by id
    pub fn find_file(&self, id: u64) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        match table.get(id)? {
            Some(data) => {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(file))
            }
            None => Ok(None),
        }
    }

    /// Overwrite the mutable fields of an existing file, keeping the owner index in sync
    pub fn update_file(&self, file: &FileRecord) -> Result<FileRecord, DatabaseError> {
        let write_txn = self.begin_write()?;

        let existing: FileRecord = {
            let table = write_txn.open_table(FILES)?;
            let result = match table.get(file.id)? {
                Some(data) => rmp_serde::from_slice(data.value())?,
                None => return Err(DatabaseError::NotFound(file.id)),
            };
            result
        };

        let mut updated = file.clone();
        updated.created_at = existing.created_at;
        updated.updated_at = Utc::now();

        if existing.user_id != updated.user_id {
            index_remove(&write_txn, &existing.user_id, file.id)?;
            index_add(&write_txn, &updated.user_id, file.id)?;
        }

        {
            let mut table = write_txn.open_table(FILES)?;
            let data = rmp_serde::to_vec_named(&updated)?;
            table.insert(file.id, data.as_slice())?;
        }

        write_txn.commit()?;
        Ok(updated)
    }

    /// Delete a file by id and clean up the owner index
    pub fn delete_file(&self, id: u64) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;

        let owner: Option<String> = {
            let table = write_txn.open_table(FILES)?;
            let result = match table.get(id)? {
                Some(data) => {
                    let file: FileRecord = rmp_serde::from_slice(data.value())?;
                    Some(file.user_id)
                }
                None => None,
            };
            result
        };

        let deleted = match owner {
            Some(user_id) => {
                {
                    let mut table = write_txn.open_table(FILES)?;
                    table.remove(id)?;
                }
                index_remove(&write_txn, &user_id, id)?;
                true
            }
            None => false,
        };

        write_txn.commit()?;
        Ok(deleted)
    }

    /// Get all files owned by a user
    pub fn get_files_by_user(&self, user_id: &str) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let index_table = read_txn.open_table(USER_FILES)?;
        let files_table = read_txn.open_table(FILES)?;

        let file_ids: Vec<u64> = match index_table.get(user_id)? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => return Ok(Vec::new()),
        };

        let mut files = Vec::with_capacity(file_ids.len());
        for file_id in file_ids {
            if let Some(data) = files_table.get(file_id)? {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                files.push(file);
            }
        }

        Ok(files)
    }

    /// Get all files
    pub fn get_all_files(&self) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        let mut files = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let file: FileRecord = rmp_serde::from_slice(value.value())?;
            files.push(file);
        }

        Ok(files)
    }

    /// Sum of the sizes of a user's private and admin-only files. Public files
    /// do not count against the quota.
    pub fn total_size_of_user_files(&self, user_id: &str) -> Result<u64, DatabaseError> {
        Ok(self
            .get_files_by_user(user_id)?
            .iter()
            .filter(|f| f.is_private())
            .map(|f| f.size)
            .sum())
    }

    /// List files with optional owner filter, admin-only exclusion, ordering and paging
    pub fn list_files(&self, params: &ListParams) -> Result<Vec<FileRecord>, DatabaseError> {
        // Use the owner index when a user filter is given
        let mut files = match params.user_id.as_deref() {
            Some(uid) => self.get_files_by_user(uid)?,
            None => self.get_all_files()?,
        };

        if params.exclude_admin_only {
            files.retain(|f| !f.is_admin_only());
        }

        files.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        if params.sort == SortOrder::Desc {
            files.reverse();
        }

        let limit = if params.limit == 0 {
            usize::MAX
        } else {
            params.limit
        };

        Ok(files
            .into_iter()
            .skip(params.offset)
            .take(limit)
            .collect())
    }

    // ========================================================================
    // Orphan tracking
    // ========================================================================

    /// Remember a physical object that no metadata row points at
    pub fn record_orphan(&self, orphan: &OrphanRecord) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        let id = Database::next_sequence(&write_txn, ORPHAN_SEQUENCE)?;
        {
            let mut table = write_txn.open_table(ORPHANED_OBJECTS)?;
            let data = rmp_serde::to_vec_named(orphan)?;
            table.insert(id, data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn list_orphans(&self) -> Result<Vec<OrphanRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ORPHANED_OBJECTS)?;

        let mut orphans = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            orphans.push(rmp_serde::from_slice(value.value())?);
        }
        Ok(orphans)
    }
}

// ============================================================================
// Owner index maintenance
// ============================================================================

fn index_add(write_txn: &WriteTransaction, user_id: &str, id: u64) -> Result<(), DatabaseError> {
    let mut table = write_txn.open_table(USER_FILES)?;
    let mut file_ids: Vec<u64> = match table.get(user_id)? {
        Some(data) => rmp_serde::from_slice(data.value())?,
        None => Vec::new(),
    };

    if !file_ids.contains(&id) {
        file_ids.push(id);
        let data = rmp_serde::to_vec_named(&file_ids)?;
        table.insert(user_id, data.as_slice())?;
    }
    Ok(())
}

fn index_remove(
    write_txn: &WriteTransaction,
    user_id: &str,
    id: u64,
) -> Result<(), DatabaseError> {
    let mut table = write_txn.open_table(USER_FILES)?;
    let file_ids: Option<Vec<u64>> = match table.get(user_id)? {
        Some(data) => Some(rmp_serde::from_slice(data.value())?),
        None => None,
    };

    if let Some(mut ids) = file_ids {
        ids.retain(|fid| *fid != id);
        if ids.is_empty() {
            table.remove(user_id)?;
        } else {
            let data = rmp_serde::to_vec_named(&ids)?;
            table.insert(user_id, data.as_slice())?;
        }
    }
    Ok(())
}
