//! files-service - user file storage with role-aware access control
//!
//! This crate provides file upload, download and deletion with:
//! - Pluggable storage backends (local filesystem, S3-compatible object stores)
//! - Per-user storage quotas for private files, enforced before any write
//! - A role/action/resource access policy with remote permission delegation
//! - redb embedded database for file metadata (ACID, MVCC, crash-safe)
//! - REST API with multipart upload support, plus internal RPC routes

pub mod api;
pub mod config;
pub mod engine;
pub mod metadata;
pub mod object_store;
pub mod policy;
pub mod profile_image;
pub mod remote;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use config::Config;
use engine::StorageEngine;
use metadata::FileRepository;
use policy::AccessPolicy;
use remote::IdentityService;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub engine: StorageEngine,
    pub identity: Arc<dyn IdentityService>,
    pub policy: AccessPolicy,
    pub repo: Arc<dyn FileRepository>,
}
