use rocket::http::CookieJar;
use rocket::serde::json::Json;
use rocket::State;
use utoipa::ToSchema;
use uuid::Uuid;

use super::users::{authenticate, close_session, open_session, rotate_session, SessionResponse};
use crate::config::Config;
use crate::data::enrollment::db::EnrollmentStoreExt;
use crate::data::enrollment::EnrollmentResponse;
use crate::data::store::Store;
use crate::data::user::db::{
    fail as user_fail, UserLoginData, UserSignupData, UserStoreExt, UserTxExt, UserUpdateData,
};
use crate::data::user::UserResponse;
use crate::middleware::paging::PageState;
use crate::resp::envelope::Envelope;
use crate::resp::error::ApiError;
use crate::resp::jwt::UserClaims;
use crate::role::Role;

/// Signup body plus an explicit role from the assignable set.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AdminCreateUserData {
    #[serde(flatten)]
    pub user: UserSignupData,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlatformStats {
    pub users: u64,
    pub courses: u64,
    pub enrollments: u64,
}

#[utoipa::path(
    context_path = "/api/admin",
    request_body = UserLoginData,
    responses(
        (status = 200, description = "Logged in", body = SessionResponse),
        (status = 403, description = "Account is not an admin")
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

    if user.user_role != Role::Admin {
        return Err(ApiError::forbidden("Admin access required."));
    }

    let session = open_session(store, cookies, &user).await?;
    Ok(Envelope::ok("Admin logged in.", session))
}

#[post("/refresh-token")]
pub async fn refresh_token(
    cookies: &CookieJar<'_>,
    store: &State<Store>,
) -> Result<Envelope<SessionResponse>, ApiError> {
    let (user, session) = rotate_session(store, cookies).await?;

    if user.user_role != Role::Admin {
        return Err(ApiError::forbidden("Admin access required."));
    }

    Ok(Envelope::ok("Tokens refreshed.", session))
}

#[post("/logout")]
pub async fn logout(
    cookies: &CookieJar<'_>,
    store: &State<Store>,
) -> Result<Envelope<()>, ApiError> {
    close_session(store, cookies).await?;
    Ok(Envelope::message("Logged out."))
}

#[utoipa::path(
    context_path = "/api/admin",
    responses((status = 200, description = "All users", body = [UserResponse]))
)]
#[get("/users")]
#[tracing::instrument(skip(store))]
pub async fn list_users(
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<Vec<UserResponse>>, ApiError> {
    auth.require(&[Role::Admin])?;

    let users = store.list_users().await?;
    Ok(Envelope::ok(
        "Users retrieved.",
        users.iter().map(UserResponse::from).collect(),
    ))
}

#[utoipa::path(
    context_path = "/api/admin",
    request_body = AdminCreateUserData,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Role not assignable"),
        (status = 409, description = "Username or email already in use")
    )
)]
#[post("/users", data = "<data>")]
#[tracing::instrument(skip(store, config))]
pub async fn create_user(
    data: Json<AdminCreateUserData>,
    auth: UserClaims,
    store: &State<Store>,
    config: &State<Config>,
) -> Result<Envelope<UserResponse>, ApiError> {
    auth.require(&[Role::Admin])?;

    let AdminCreateUserData { user, role } = data.into_inner();
    if !Role::ASSIGNABLE.contains(&role) {
        return Err(ApiError::bad_request("Role not allowed."));
    }

    let user = store
        .create_user(user, role, &config.admin_usernames)
        .await?;

    Ok(Envelope::created(
        "User created.",
        UserResponse::from(&user),
    ))
}

#[utoipa::path(
    context_path = "/api/admin",
    request_body = UserUpdateData,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 404, description = "No such user")
    )
)]
#[put("/users/<id>", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn update_user(
    id: Uuid,
    data: Json<UserUpdateData>,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<UserResponse>, ApiError> {
    auth.require(&[Role::Admin])?;

    let user = store
        .update_user(id, data.into_inner(), true)
        .await?
        .ok_or_else(|| user_fail::not_found(id))?;

    Ok(Envelope::ok("User updated.", UserResponse::from(&user)))
}

#[utoipa::path(
    context_path = "/api/admin",
    responses(
        (status = 200, description = "User deleted"),
        (status = 404, description = "No such user")
    )
)]
#[delete("/users/<id>")]
#[tracing::instrument(skip(store))]
pub async fn delete_user(
    id: Uuid,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<()>, ApiError> {
    auth.require(&[Role::Admin])?;

    store.delete_user(id).await?;
    Ok(Envelope::message("User deleted."))
}

#[utoipa::path(
    context_path = "/api/admin",
    params(
        ("page" = Option<u64>, Query, description = "1-based page"),
        ("limit" = Option<u64>, Query, description = "page size")
    ),
    responses((status = 200, description = "All enrollments", body = [EnrollmentResponse]))
)]
#[get("/enrollments")]
#[tracing::instrument(skip(store))]
pub async fn list_enrollments(
    auth: UserClaims,
    page: PageState,
    store: &State<Store>,
) -> Result<Envelope<Vec<EnrollmentResponse>>, ApiError> {
    auth.require(&[Role::Admin])?;

    let (enrollments, total) = store.list_enrollments(page).await?;
    Ok(Envelope::ok("Enrollments retrieved.", enrollments).with_meta(page.meta(total)))
}

#[utoipa::path(
    context_path = "/api/admin",
    responses(
        (status = 200, description = "Enrollment deleted"),
        (status = 404, description = "No such enrollment")
    )
)]
#[delete("/enrollments/<id>")]
#[tracing::instrument(skip(store))]
pub async fn delete_enrollment(
    id: Uuid,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<()>, ApiError> {
    auth.require(&[Role::Admin])?;

    store.delete_enrollment(id).await?;
    Ok(Envelope::message("Enrollment deleted."))
}

#[utoipa::path(
    context_path = "/api/admin",
    responses((status = 200, description = "Platform totals", body = PlatformStats))
)]
#[get("/stats")]
#[tracing::instrument(skip(store))]
pub async fn stats(
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<PlatformStats>, ApiError> {
    use crate::data::course::db::CourseStoreExt;

    auth.require(&[Role::Admin])?;

    let stats = PlatformStats {
        users: store.count_users().await?,
        courses: store.count_courses().await?,
        enrollments: store.count_enrollments().await?,
    };

    Ok(Envelope::ok("Stats retrieved.", stats))
}
