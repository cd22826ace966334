use rocket::serde::json::Json;
use rocket::State;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::project::db::{fail as project_fail, ProjectStoreExt, ProjectTxExt};
use crate::data::project::{
    ProjectCreateData, ProjectMember, ProjectMemberData, ProjectResponse, ProjectUpdateData,
};
use crate::data::store::Store;
use crate::data::user::db::UserStoreExt;
use crate::middleware::paging::PageState;
use crate::resp::envelope::Envelope;
use crate::resp::error::ApiError;
use crate::resp::jwt::UserClaims;
use crate::role::Role;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MemberRoleData {
    pub user_id: Uuid,
    pub role: String,
}

#[utoipa::path(
    context_path = "/api/projects",
    request_body = ProjectCreateData,
    responses(
        (status = 201, description = "Project created", body = ProjectResponse),
        (status = 409, description = "Duplicate project title")
    )
)]
#[post("/", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn create(
    data: Json<ProjectCreateData>,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<ProjectResponse>, ApiError> {
    let project = store.create_project(data.into_inner(), auth.user).await?;
    let project = store
        .get_project(project.id, Some(auth.user))
        .await?
        .ok_or_else(project_fail::not_found)?;

    Ok(Envelope::created("Project created.", project))
}

#[utoipa::path(
    context_path = "/api/projects",
    params(
        ("page" = Option<u64>, Query, description = "1-based page"),
        ("limit" = Option<u64>, Query, description = "page size")
    ),
    responses((status = 200, description = "Own projects", body = [ProjectResponse]))
)]
#[get("/mine")]
#[tracing::instrument(skip(store))]
pub async fn mine(
    auth: UserClaims,
    page: PageState,
    store: &State<Store>,
) -> Result<Envelope<Vec<ProjectResponse>>, ApiError> {
    let (projects, total) = store.my_projects(auth.user, page).await?;
    Ok(Envelope::ok("Projects retrieved.", projects).with_meta(page.meta(total)))
}

#[utoipa::path(
    context_path = "/api/projects",
    responses(
        (status = 200, description = "Project found", body = ProjectResponse),
        (status = 404, description = "No such project")
    )
)]
#[get("/<id>")]
#[tracing::instrument(skip(store))]
pub async fn get(
    id: Uuid,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<ProjectResponse>, ApiError> {
    let project = store
        .get_project(id, Some(auth.user))
        .await?
        .filter(|p| p.owner_id == auth.user || auth.role == Role::Admin)
        .ok_or_else(project_fail::not_found)?;

    Ok(Envelope::ok("Project retrieved.", project))
}

#[utoipa::path(
    context_path = "/api/projects",
    request_body = ProjectUpdateData,
    responses(
        (status = 200, description = "Project updated", body = ProjectResponse),
        (status = 404, description = "No such project")
    )
)]
#[put("/<id>", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn update(
    id: Uuid,
    data: Json<ProjectUpdateData>,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<ProjectResponse>, ApiError> {
    store.update_project(id, auth.user, data.into_inner()).await?;
    let project = store
        .get_project(id, Some(auth.user))
        .await?
        .ok_or_else(project_fail::not_found)?;

    Ok(Envelope::ok("Project updated.", project))
}

#[utoipa::path(
    context_path = "/api/projects",
    responses(
        (status = 200, description = "Project deleted"),
        (status = 404, description = "No such project")
    )
)]
#[delete("/<id>")]
#[tracing::instrument(skip(store))]
pub async fn delete(
    id: Uuid,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<()>, ApiError> {
    store
        .delete_project(id, auth.user, auth.role == Role::Admin)
        .await?;
    Ok(Envelope::message("Project deleted."))
}

#[utoipa::path(
    context_path = "/api/projects",
    responses(
        (status = 200, description = "User's projects", body = [ProjectResponse]),
        (status = 404, description = "No such user")
    )
)]
#[get("/by-username/<username>")]
#[tracing::instrument(skip(store))]
pub async fn by_username(
    username: &str,
    viewer: Option<UserClaims>,
    store: &State<Store>,
) -> Result<Envelope<Vec<ProjectResponse>>, ApiError> {
    let owner = store
        .find_user_by_username(username)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))?;

    let viewer = viewer.map(|claims| claims.user);
    let projects = store.projects_by_owner(owner.id, viewer).await?;
    Ok(Envelope::ok("Projects retrieved.", projects))
}

#[utoipa::path(
    context_path = "/api/projects",
    responses(
        (status = 200, description = "Tagged projects", body = [ProjectResponse]),
        (status = 404, description = "No projects with this tag")
    )
)]
#[get("/by-tag/<tag>")]
#[tracing::instrument(skip(store))]
pub async fn by_tag(
    tag: &str,
    viewer: Option<UserClaims>,
    store: &State<Store>,
) -> Result<Envelope<Vec<ProjectResponse>>, ApiError> {
    let viewer = viewer.map(|claims| claims.user);
    let projects = store.projects_by_tag(tag, viewer).await?;

    if projects.is_empty() {
        return Err(ApiError::not_found("No projects found."));
    }
    Ok(Envelope::ok("Projects retrieved.", projects))
}

#[utoipa::path(
    context_path = "/api/projects",
    params(("q" = String, Query, description = "title/description/tag substring")),
    responses(
        (status = 200, description = "Matching projects", body = [ProjectResponse]),
        (status = 404, description = "No matches")
    )
)]
#[get("/search?<q>")]
#[tracing::instrument(skip(store))]
pub async fn search(
    q: &str,
    viewer: Option<UserClaims>,
    store: &State<Store>,
) -> Result<Envelope<Vec<ProjectResponse>>, ApiError> {
    let viewer = viewer.map(|claims| claims.user);
    let projects = store.search_projects(q, viewer).await?;

    if projects.is_empty() {
        return Err(ApiError::not_found("No projects found."));
    }
    Ok(Envelope::ok("Projects retrieved.", projects))
}

#[utoipa::path(
    context_path = "/api/projects",
    request_body = ProjectMemberData,
    responses(
        (status = 200, description = "Member added", body = ProjectResponse),
        (status = 409, description = "Already a member")
    )
)]
#[post("/<id>/members", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn add_member(
    id: Uuid,
    data: Json<ProjectMemberData>,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<ProjectResponse>, ApiError> {
    let data = data.into_inner();

    if store.get_user(data.user_id).await?.is_none() {
        return Err(ApiError::not_found("User not found."));
    }

    let member = ProjectMember::new(data.user_id, data.role);
    store.add_member(id, auth.user, member).await?;

    let project = store
        .get_project(id, Some(auth.user))
        .await?
        .ok_or_else(project_fail::not_found)?;
    Ok(Envelope::ok("Member added.", project))
}

#[utoipa::path(
    context_path = "/api/projects",
    responses(
        (status = 200, description = "Member removed", body = ProjectResponse),
        (status = 404, description = "No such member")
    )
)]
#[delete("/<id>/members/<user_id>")]
#[tracing::instrument(skip(store))]
pub async fn remove_member(
    id: Uuid,
    user_id: Uuid,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<ProjectResponse>, ApiError> {
    store.remove_member(id, auth.user, user_id).await?;

    let project = store
        .get_project(id, Some(auth.user))
        .await?
        .ok_or_else(project_fail::not_found)?;
    Ok(Envelope::ok("Member removed.", project))
}

#[utoipa::path(
    context_path = "/api/projects",
    request_body = MemberRoleData,
    responses(
        (status = 200, description = "Member role updated", body = ProjectResponse),
        (status = 404, description = "No such member")
    )
)]
#[patch("/<id>/members/role", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn update_member_role(
    id: Uuid,
    data: Json<MemberRoleData>,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<ProjectResponse>, ApiError> {
    let data = data.into_inner();
    store
        .update_member_role(id, auth.user, data.user_id, &data.role)
        .await?;

    let project = store
        .get_project(id, Some(auth.user))
        .await?
        .ok_or_else(project_fail::not_found)?;
    Ok(Envelope::ok("Member role updated.", project))
}
