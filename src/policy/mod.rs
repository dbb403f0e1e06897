//! Role-aware access policy.
//!
//! Decisions are made in two tiers. A static table keyed by
//! `(role, resource type, action)` handles coarse role gating and owner
//! self-access locally. Only admin actions on another user's files fall
//! through to the remote permissions service.

mod actor;

pub use actor::{Actor, Role};

use std::collections::HashMap;
use std::sync::Arc;

use crate::metadata::FileRecord;
use crate::remote::{IdentityService, PermissionChecker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    Read,
    ReadList,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Files,
    UploadPublic,
    UploadPrivate,
    UploadAdminOnly,
}

/// The instance an action targets: a stored file, or a user whose files are
/// being listed or uploaded to.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    File(&'a FileRecord),
    User(&'a Actor),
}

/// Named permissions held in the remote permissions service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ViewUserProfiles,
    ViewAdminProfiles,
    ModifyUserProfiles,
    ModifyAdminProfiles,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewUserProfiles => "view_user_profiles",
            Permission::ViewAdminProfiles => "view_admin_profiles",
            Permission::ModifyUserProfiles => "modify_user_profiles",
            Permission::ModifyAdminProfiles => "modify_admin_profiles",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileRule {
    ClientRead,
    ClientDelete,
    AdminRead,
    AdminDelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UserRule {
    AdminReadFiles,
    AdminModifyFiles,
}

/// A rule is bound to the payload it inspects, so a file rule can only ever
/// be evaluated against a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    Always,
    OnFile(FileRule),
    OnUser(UserRule),
}

type RuleKey = (Role, ResourceType, Action);

pub struct AccessPolicy {
    rules: HashMap<RuleKey, Rule>,
    identity: Arc<dyn IdentityService>,
    permissions: Arc<dyn PermissionChecker>,
}

fn default_rules() -> HashMap<RuleKey, Rule> {
    use Action::*;
    use ResourceType::*;

    HashMap::from([
        // Clients
        ((Role::Client, Files, Update), Rule::Always),
        ((Role::Client, Files, Read), Rule::OnFile(FileRule::ClientRead)),
        ((Role::Client, Files, ReadList), Rule::Always),
        ((Role::Client, Files, Delete), Rule::OnFile(FileRule::ClientDelete)),
        ((Role::Client, UploadPublic, Create), Rule::Always),
        ((Role::Client, UploadPrivate, Create), Rule::Always),
        // Admins
        ((Role::Admin, Files, Read), Rule::OnFile(FileRule::AdminRead)),
        (
            (Role::Admin, Files, ReadList),
            Rule::OnUser(UserRule::AdminReadFiles),
        ),
        ((Role::Admin, Files, Delete), Rule::OnFile(FileRule::AdminDelete)),
        (
            (Role::Admin, UploadPublic, Create),
            Rule::OnUser(UserRule::AdminModifyFiles),
        ),
        (
            (Role::Admin, UploadPrivate, Create),
            Rule::OnUser(UserRule::AdminModifyFiles),
        ),
        (
            (Role::Admin, UploadAdminOnly, Create),
            Rule::OnUser(UserRule::AdminModifyFiles),
        ),
    ])
}

impl AccessPolicy {
    pub fn new(identity: Arc<dyn IdentityService>, permissions: Arc<dyn PermissionChecker>) -> Self {
        Self {
            rules: default_rules(),
            identity,
            permissions,
        }
    }

    /// Decide whether `actor` may perform `action` on `resource`.
    ///
    /// Never fails: a missing rule, a resource of the wrong kind, or a remote
    /// lookup error all deny.
    pub async fn authorize(
        &self,
        actor: &Actor,
        action: Action,
        resource_type: ResourceType,
        resource: Option<Resource<'_>>,
    ) -> bool {
        let role = actor.role();
        if role == Role::Root {
            return true;
        }

        let Some(rule) = self.rules.get(&(role, resource_type, action)).copied() else {
            tracing::debug!(
                user_id = %actor.uid,
                role = %actor.role_name,
                ?action,
                ?resource_type,
                "No permission rule registered"
            );
            return false;
        };

        match (rule, resource) {
            (Rule::Always, _) => true,
            (Rule::OnFile(rule), Some(Resource::File(file))) => {
                self.evaluate_file_rule(rule, file, actor).await
            }
            (Rule::OnUser(rule), Some(Resource::User(owner))) => {
                self.evaluate_user_rule(rule, owner, actor).await
            }
            (rule, resource) => {
                tracing::warn!(
                    user_id = %actor.uid,
                    ?rule,
                    ?action,
                    ?resource_type,
                    has_resource = resource.is_some(),
                    "Permission rule applied to the wrong kind of resource"
                );
                false
            }
        }
    }

    async fn evaluate_file_rule(&self, rule: FileRule, file: &FileRecord, actor: &Actor) -> bool {
        match rule {
            FileRule::ClientRead => client_can_read_file(file, actor),
            FileRule::ClientDelete => client_can_delete_file(file, actor),
            FileRule::AdminRead => match self.file_owner(file, actor).await {
                OwnerLookup::SelfOwned => true,
                OwnerLookup::Owner(owner) => self.admin_can_read_files(&owner, actor).await,
                OwnerLookup::Failed => false,
            },
            FileRule::AdminDelete => match self.file_owner(file, actor).await {
                OwnerLookup::SelfOwned => true,
                OwnerLookup::Owner(owner) => self.admin_can_modify_files(&owner, actor).await,
                OwnerLookup::Failed => false,
            },
        }
    }

    async fn evaluate_user_rule(&self, rule: UserRule, owner: &Actor, actor: &Actor) -> bool {
        match rule {
            UserRule::AdminReadFiles => self.admin_can_read_files(owner, actor).await,
            UserRule::AdminModifyFiles => self.admin_can_modify_files(owner, actor).await,
        }
    }

    async fn file_owner(&self, file: &FileRecord, actor: &Actor) -> OwnerLookup {
        if file.user_id == actor.uid {
            return OwnerLookup::SelfOwned;
        }

        match self.identity.get_by_uid(&file.user_id).await {
            Ok(owner) => OwnerLookup::Owner(owner),
            Err(e) => {
                tracing::error!(
                    file_id = file.id,
                    owner_id = %file.user_id,
                    error = %e,
                    "Failed to resolve file owner"
                );
                OwnerLookup::Failed
            }
        }
    }

    async fn admin_can_read_files(&self, owner: &Actor, actor: &Actor) -> bool {
        self.delegate_for_owner(
            owner,
            actor,
            Permission::ViewUserProfiles,
            Permission::ViewAdminProfiles,
        )
        .await
    }

    async fn admin_can_modify_files(&self, owner: &Actor, actor: &Actor) -> bool {
        self.delegate_for_owner(
            owner,
            actor,
            Permission::ModifyUserProfiles,
            Permission::ModifyAdminProfiles,
        )
        .await
    }

    /// Self-access is allowed, acting on someone who outranks the actor is not,
    /// and anything else is up to the permissions service.
    async fn delegate_for_owner(
        &self,
        owner: &Actor,
        actor: &Actor,
        on_client: Permission,
        on_staff: Permission,
    ) -> bool {
        if owner.uid == actor.uid {
            return true;
        }

        let owner_role = owner.role();
        if owner_role.rank() > actor.role().rank() {
            return false;
        }

        let permission = if owner_role == Role::Client {
            on_client
        } else {
            on_staff
        };

        self.check_permission(actor, permission).await
    }

    async fn check_permission(&self, actor: &Actor, permission: Permission) -> bool {
        match self.permissions.check(&actor.uid, permission.as_str()).await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::error!(
                    user_id = %actor.uid,
                    permission = permission.as_str(),
                    error = %e,
                    "Permission check failed"
                );
                false
            }
        }
    }
}

enum OwnerLookup {
    SelfOwned,
    Owner(Actor),
    Failed,
}

fn client_can_read_file(file: &FileRecord, actor: &Actor) -> bool {
    if file.is_admin_only() {
        return false;
    }
    !file.is_private() || file.user_id == actor.uid
}

fn client_can_delete_file(file: &FileRecord, actor: &Actor) -> bool {
    file.user_id == actor.uid && !file.is_admin_only()
}
