use redb::TableDefinition;

/// File records: id -> FileRecord (msgpack)
pub const FILES: TableDefinition<u64, &[u8]> = TableDefinition::new("files");

/// Owner index: user_id -> msgpack Vec of file ids
pub const USER_FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("user_files");

/// Named counters: sequence name -> last issued value
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Orphan candidates for out-of-band cleanup: sequence -> OrphanRecord (msgpack)
pub const ORPHANED_OBJECTS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("orphaned_objects");

pub(crate) const FILE_ID_SEQUENCE: &str = "file_id";
pub(crate) const ORPHAN_SEQUENCE: &str = "orphan_id";
