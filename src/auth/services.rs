use axum::extract::FromRef;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn, Instrument};

use super::{
    dto::{CreateTokenPayload, RegisterUserPayload, UserWithToken},
    invitation::{activation_url, generate_token, hash_token},
    jwt::JwtKeys,
    password::{hash_password, verify_password},
};
use crate::{
    error::AppError,
    mailer::{InvitationData, MailError, Template, SEND_DEADLINE},
    state::AppState,
    store::{NewUser, StoreError, User},
};

/// Creates an inactive user with an invitation and mails the activation link.
///
/// If the mail cannot be delivered the user is deleted again before the
/// error is returned. A failed delete is only logged. Once the user is
/// committed, delivery and rollback run on their own task and finish even
/// when the request is dropped.
#[instrument(skip(state, payload), fields(username = %payload.username))]
pub async fn register_user(
    state: &AppState,
    payload: RegisterUserPayload,
) -> Result<UserWithToken, AppError> {
    let password_hash = hash_password(payload.password).await?;

    let token = generate_token();
    let expires_at = OffsetDateTime::now_utc() + state.config.mail.invitation_ttl;

    let user = state
        .store
        .users
        .create_and_invite(
            NewUser {
                username: payload.username,
                email: payload.email,
                password_hash,
            },
            &hash_token(&token),
            expires_at,
        )
        .await
        .map_err(|e| {
            match &e {
                StoreError::DuplicateEmail | StoreError::DuplicateUsername => {
                    warn!(error = %e, "registration conflict")
                }
                _ => error!(error = %e, "create user failed"),
            }
            AppError::from(e)
        })?;

    let delivery = tokio::spawn(
        deliver_invitation(state.clone(), user.clone(), token.clone()).in_current_span(),
    );
    delivery.await.map_err(AppError::internal)??;

    Ok(UserWithToken { user, token })
}

async fn deliver_invitation(state: AppState, user: User, token: String) -> Result<(), AppError> {
    let data = InvitationData {
        username: user.username.clone(),
        activation_url: activation_url(&state.config.server.frontend_url, &token),
    };
    let send = state.mailer.send(
        Template::UserInvitation,
        &user.username,
        &user.email,
        &data,
        state.config.mail.sandbox,
    );
    let sent = tokio::time::timeout(SEND_DEADLINE, send)
        .await
        .unwrap_or(Err(MailError::DeadlineExceeded(SEND_DEADLINE)));

    match sent {
        Ok(status) => {
            info!(user_id = user.id, email = %user.email, status, "user registered, invitation sent");
            Ok(())
        }
        Err(mail_err) => {
            error!(user_id = user.id, error = %mail_err, "invitation email failed, rolling back user");
            if let Err(del_err) = state.store.users.delete(user.id).await {
                error!(
                    user_id = user.id,
                    error = %del_err,
                    "compensating delete failed, inactive user left behind"
                );
            }
            Err(AppError::internal(mail_err))
        }
    }
}

/// Redeems a plaintext invitation token.
#[instrument(skip_all)]
pub async fn activate_user(state: &AppState, token: &str) -> Result<(), AppError> {
    match state.store.users.activate(&hash_token(token)).await {
        Ok(()) => {
            info!("user activated");
            Ok(())
        }
        Err(StoreError::NotFound) => {
            warn!("unknown or expired invitation");
            Err(AppError::NotFound)
        }
        Err(e) => {
            error!(error = %e, "activation failed");
            Err(e.into())
        }
    }
}

/// Exchanges the credentials of an active user for a bearer token.
#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn issue_token(state: &AppState, payload: CreateTokenPayload) -> Result<String, AppError> {
    let invalid = || AppError::Unauthorized("invalid credentials".into());

    let user = match state.store.users.get_by_email(&payload.email).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            warn!("token requested for unknown or inactive email");
            return Err(invalid());
        }
        Err(e) => return Err(e.into()),
    };

    if !verify_password(payload.password, user.password_hash).await? {
        warn!(user_id = user.id, "wrong password");
        return Err(invalid());
    }

    let keys = JwtKeys::from_ref(state);
    let token = keys
        .generate_token(&keys.claims_for(user.id))
        .map_err(AppError::Internal)?;
    info!(user_id = user.id, "token issued");
    Ok(token)
}
