use tracing::{debug, instrument};

use crate::{error::AppError, state::AppState, store::User};

/// Read-through user lookup.
///
/// With caching off this is a plain store read. Otherwise the cache is asked
/// first and a miss is filled from the store and written back. Any cache
/// failure, read or write, fails the lookup; a user missing from the store
/// is never cached.
#[instrument(skip(state))]
pub async fn get_user(state: &AppState, id: i64) -> Result<User, AppError> {
    let Some(cache) = state.cache() else {
        return Ok(state.store.users.get_by_id(id).await?);
    };

    if let Some(user) = cache.get(id).await? {
        debug!(user_id = id, "user cache hit");
        return Ok(user);
    }

    debug!(user_id = id, "user cache miss");
    let user = state.store.users.get_by_id(id).await?;
    cache.set(&user).await?;
    Ok(user)
}
