//! Role precedence checks.
//!
//! Roles carry a numeric level where a lower number means more power, so a
//! caller satisfies a required role when its own level is at most the
//! required one.

use tracing::{debug, warn};

use crate::{
    error::AppError,
    store::{RoleRepository, StoreError, User},
};

/// Whether `caller` ranks at or above the role named `required`.
///
/// A role name that does not resolve is an internal failure, not a denial.
pub async fn check_role_precedence(
    roles: &dyn RoleRepository,
    caller: &User,
    required: &str,
) -> Result<bool, AppError> {
    let role = roles.get_by_name(required).await.map_err(|e| match e {
        StoreError::NotFound => {
            AppError::internal(anyhow::anyhow!("role {required:?} is not defined"))
        }
        other => other.into(),
    })?;
    Ok(caller.role.level <= role.level)
}

/// Owners pass unconditionally; anyone else needs `required` or better.
pub async fn ensure_owner_or_role(
    roles: &dyn RoleRepository,
    caller: &User,
    owner_id: i64,
    required: &str,
) -> Result<(), AppError> {
    if caller.id == owner_id {
        return Ok(());
    }
    if check_role_precedence(roles, caller, required).await? {
        debug!(user_id = caller.id, role = %caller.role.name, required, "allowed by role");
        return Ok(());
    }
    warn!(user_id = caller.id, role = %caller.role.name, required, "permission denied");
    Err(AppError::Forbidden)
}
