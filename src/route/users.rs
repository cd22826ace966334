use rocket::http::{Cookie, CookieJar};
use rocket::serde::json::Json;
use rocket::State;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::data::store::Store;
use crate::data::user::db::{
    fail as user_fail, UserLoginData, UserSignupData, UserStoreExt, UserTxExt, UserUpdateData,
};
use crate::data::user::{User, UserResponse};
use crate::resp::envelope::Envelope;
use crate::resp::error::ApiError;
use crate::resp::jwt::{TokenPair, UserClaims, REFRESH_COOKIE_NAME};
use crate::role::Role;

/// Token payload returned by login and refresh.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub role: Role,
}

/// Looks the account up by email or username and checks the password.
pub async fn authenticate(store: &Store, data: &UserLoginData) -> Result<User, ApiError> {
    let (identifier, is_email) = data.identifier()?;

    let user = if is_email {
        store.find_user_by_email(identifier).await?
    } else {
        store.find_user_by_username(identifier).await?
    };

    let user = user.ok_or_else(|| ApiError::not_found("User not found."))?;

    if !user.pw_hash.matches(&data.password) {
        return Err(user_fail::wrong_password());
    }

    Ok(user)
}

/// Issues a token pair, persists the refresh token and sets the cookie.
pub async fn open_session(
    store: &Store,
    cookies: &CookieJar<'_>,
    user: &User,
) -> Result<SessionResponse, ApiError> {
    let pair = TokenPair::issue(user)?;
    store.set_refresh_token(user.id, Some(&pair.refresh)).await?;
    cookies.add(pair.refresh_cookie());

    Ok(SessionResponse {
        access_token: pair.access,
        refresh_token: pair.refresh,
        role: user.user_role,
    })
}

/// Refresh-token rotation shared by the user and admin surfaces. The cookie
/// must be present (401), match a stored token (403) and carry a valid
/// signature (403); a fresh pair replaces it in one step.
pub async fn rotate_session(
    store: &Store,
    cookies: &CookieJar<'_>,
) -> Result<(User, SessionResponse), ApiError> {
    let token = cookies
        .get(REFRESH_COOKIE_NAME)
        .map(|c| c.value().to_owned())
        .ok_or_else(|| ApiError::unauthorized("Refresh token not provided."))?;

    let user = store
        .find_user_by_refresh_token(&token)
        .await?
        .ok_or_else(|| ApiError::forbidden("Refresh token not recognized."))?;

    UserClaims::decode_jwt(&token, &crate::SECURITY.secrets.refresh)
        .map_err(|_| ApiError::forbidden("Invalid or expired refresh token."))?;

    let session = open_session(store, cookies, &user).await?;
    Ok((user, session))
}

/// Clears the persisted refresh token and drops the cookie.
pub async fn close_session(store: &Store, cookies: &CookieJar<'_>) -> Result<(), ApiError> {
    if let Some(cookie) = cookies.get(REFRESH_COOKIE_NAME) {
        store.revoke_refresh_token(cookie.value()).await?;
    }
    cookies.remove(Cookie::build(REFRESH_COOKIE_NAME).path("/"));
    Ok(())
}

#[utoipa::path(
    context_path = "/api/users",
    request_body = UserSignupData,
    responses(
        (status = 201, description = "Account created"),
        (status = 409, description = "Username or email already in use")
    )
)]
#[post("/register", data = "<data>")]
#[tracing::instrument(skip(store, config))]
pub async fn register(
    data: Json<UserSignupData>,
    store: &State<Store>,
    config: &State<Config>,
) -> Result<Envelope<UserResponse>, ApiError> {
    let user = store
        .create_user(data.into_inner(), Role::Student, &config.admin_usernames)
        .await?;

    Ok(Envelope::created(
        "User registered.",
        UserResponse::from(&user),
    ))
}

#[utoipa::path(
    context_path = "/api/users",
    request_body = UserLoginData,
    responses(
        (status = 200, description = "Logged in", body = SessionResponse),
        (status = 400, description = "Wrong password"),
        (status = 404, description = "No such account")
    )
)]
#[post("/login", data = "<data>")]
#[tracing::instrument(skip(store, cookies))]
pub async fn login(
    data: Json<UserLoginData>,
    cookies: &CookieJar<'_>,
    store: &State<Store>,
) -> Result<Envelope<SessionResponse>, ApiError> {
    let user = authenticate(store, &data).await?;
    let session = open_session(store, cookies, &user).await?;
    Ok(Envelope::ok("Logged in.", session))
}

#[utoipa::path(
    context_path = "/api/users",
    responses(
        (status = 200, description = "Tokens rotated", body = SessionResponse),
        (status = 401, description = "Refresh cookie missing"),
        (status = 403, description = "Refresh token invalid or revoked")
    )
)]
#[post("/token")]
pub async fn refresh_token(
    cookies: &CookieJar<'_>,
    store: &State<Store>,
) -> Result<Envelope<SessionResponse>, ApiError> {
    let (_, session) = rotate_session(store, cookies).await?;
    Ok(Envelope::ok("Tokens refreshed.", session))
}

#[utoipa::path(
    context_path = "/api/users",
    responses((status = 200, description = "Logged out"))
)]
#[post("/logout")]
pub async fn logout(
    cookies: &CookieJar<'_>,
    store: &State<Store>,
) -> Result<Envelope<()>, ApiError> {
    close_session(store, cookies).await?;
    Ok(Envelope::message("Logged out."))
}

#[utoipa::path(
    context_path = "/api/users",
    responses((status = 200, description = "All users", body = [UserResponse]))
)]
#[get("/")]
#[tracing::instrument(skip(store))]
pub async fn list(
    _auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<Vec<UserResponse>>, ApiError> {
    let users = store.list_users().await?;
    Ok(Envelope::ok(
        "Users retrieved.",
        users.iter().map(UserResponse::from).collect(),
    ))
}

#[utoipa::path(
    context_path = "/api/users",
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 404, description = "No such user")
    )
)]
#[get("/<id>")]
#[tracing::instrument(skip(store))]
pub async fn get(
    id: Uuid,
    _auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<UserResponse>, ApiError> {
    let user = store
        .get_user(id)
        .await?
        .ok_or_else(|| user_fail::not_found(id))?;

    Ok(Envelope::ok("User retrieved.", UserResponse::from(&user)))
}

#[utoipa::path(
    context_path = "/api/users",
    request_body = UserUpdateData,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 403, description = "Not your account")
    )
)]
#[put("/<id>", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn update(
    id: Uuid,
    data: Json<UserUpdateData>,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<UserResponse>, ApiError> {
    if auth.user != id && auth.role != Role::Admin {
        return Err(ApiError::forbidden("You can only update your own account."));
    }

    // Role changes stay on the admin surface even for admin callers here.
    let user = store
        .update_user(id, data.into_inner(), false)
        .await?
        .ok_or_else(|| user_fail::not_found(id))?;

    Ok(Envelope::ok("User updated.", UserResponse::from(&user)))
}

#[utoipa::path(
    context_path = "/api/users",
    responses(
        (status = 200, description = "User deleted"),
        (status = 403, description = "Not your account"),
        (status = 404, description = "No such user")
    )
)]
#[delete("/<id>")]
#[tracing::instrument(skip(store, cookies))]
pub async fn delete(
    id: Uuid,
    auth: UserClaims,
    cookies: &CookieJar<'_>,
    store: &State<Store>,
) -> Result<Envelope<()>, ApiError> {
    if auth.user != id && auth.role != Role::Admin {
        return Err(ApiError::forbidden("You can only delete your own account."));
    }

    store.delete_user(id).await?;

    if auth.user == id {
        cookies.remove(Cookie::build(REFRESH_COOKIE_NAME).path("/"));
    }

    Ok(Envelope::message("User deleted."))
}
