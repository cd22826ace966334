//! Likes, saves and comments. Mounted at `/api` so the paths read
//! `/api/projects/<id>/like` and `/api/comments/<id>`.

use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::data::project::db::ProjectStoreExt;
use crate::data::project::{CommentCreateData, CommentNode, ProjectResponse};
use crate::data::store::Store;
use crate::data::user::db::UserStoreExt;
use crate::resp::envelope::Envelope;
use crate::resp::error::ApiError;
use crate::resp::jwt::UserClaims;
use crate::role::Role;

#[utoipa::path(
    context_path = "/api",
    responses(
        (status = 201, description = "Liked"),
        (status = 404, description = "No such project"),
        (status = 409, description = "Already liked")
    )
)]
#[post("/projects/<id>/like")]
#[tracing::instrument(skip(store))]
pub async fn like(
    id: Uuid,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<()>, ApiError> {
    store.like_project(id, auth.user).await?;
    Ok(Envelope::message("Project liked."))
}

#[utoipa::path(
    context_path = "/api",
    responses(
        (status = 200, description = "Unliked"),
        (status = 404, description = "Not liked")
    )
)]
#[delete("/projects/<id>/like")]
#[tracing::instrument(skip(store))]
pub async fn unlike(
    id: Uuid,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<()>, ApiError> {
    store.unlike_project(id, auth.user).await?;
    Ok(Envelope::message("Project unliked."))
}

#[utoipa::path(
    context_path = "/api",
    responses(
        (status = 201, description = "Saved"),
        (status = 404, description = "No such project"),
        (status = 409, description = "Already saved")
    )
)]
#[post("/projects/<id>/save")]
#[tracing::instrument(skip(store))]
pub async fn save(
    id: Uuid,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<()>, ApiError> {
    store.save_project(id, auth.user).await?;
    Ok(Envelope::message("Project saved."))
}

#[utoipa::path(
    context_path = "/api",
    responses(
        (status = 200, description = "Unsaved"),
        (status = 404, description = "Not saved")
    )
)]
#[delete("/projects/<id>/save")]
#[tracing::instrument(skip(store))]
pub async fn unsave(
    id: Uuid,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<()>, ApiError> {
    store.unsave_project(id, auth.user).await?;
    Ok(Envelope::message("Project unsaved."))
}

#[utoipa::path(
    context_path = "/api",
    responses((status = 200, description = "Liked projects", body = [ProjectResponse]))
)]
#[get("/projects/liked")]
#[tracing::instrument(skip(store))]
pub async fn liked(
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<Vec<ProjectResponse>>, ApiError> {
    let projects = store.liked_projects(auth.user).await?;
    Ok(Envelope::ok("Projects retrieved.", projects))
}

#[utoipa::path(
    context_path = "/api",
    responses((status = 200, description = "Saved projects", body = [ProjectResponse]))
)]
#[get("/projects/saved")]
#[tracing::instrument(skip(store))]
pub async fn saved(
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<Vec<ProjectResponse>>, ApiError> {
    let projects = store.saved_projects(auth.user).await?;
    Ok(Envelope::ok("Projects retrieved.", projects))
}

#[utoipa::path(
    context_path = "/api",
    request_body = CommentCreateData,
    responses(
        (status = 201, description = "Comment added"),
        (status = 404, description = "No such project")
    )
)]
#[post("/projects/<id>/comments", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn add_comment(
    id: Uuid,
    data: Json<CommentCreateData>,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<CommentNode>, ApiError> {
    let comment = store.add_comment(id, auth.user, data.into_inner()).await?;

    let user = store
        .get_user(auth.user)
        .await?
        .as_ref()
        .map(crate::data::user::UserSummary::from);

    Ok(Envelope::created(
        "Comment added.",
        CommentNode {
            id: comment.id,
            user_id: comment.user,
            user,
            comment_text: comment.comment_text,
            created_at: comment.created_at,
            replies: vec![],
        },
    ))
}

#[utoipa::path(
    context_path = "/api",
    responses(
        (status = 200, description = "Comment deleted"),
        (status = 404, description = "No such comment")
    )
)]
#[delete("/comments/<id>")]
#[tracing::instrument(skip(store))]
pub async fn delete_comment(
    id: Uuid,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<()>, ApiError> {
    store
        .delete_comment(id, auth.user, auth.role == Role::Admin)
        .await?;
    Ok(Envelope::message("Comment deleted."))
}

#[utoipa::path(
    context_path = "/api",
    responses(
        (status = 200, description = "Comment tree", body = [CommentNode]),
        (status = 404, description = "No comments")
    )
)]
#[get("/projects/<id>/comments")]
#[tracing::instrument(skip(store))]
pub async fn comments(
    id: Uuid,
    store: &State<Store>,
) -> Result<Envelope<Vec<CommentNode>>, ApiError> {
    let tree = store.project_comments(id).await?;
    if tree.is_empty() {
        return Err(ApiError::not_found("No comments found for this project."));
    }
    Ok(Envelope::ok("Comments retrieved.", tree))
}
