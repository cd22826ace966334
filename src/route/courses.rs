use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::data::course::db::{fail as course_fail, CourseStoreExt, CourseTxExt};
use crate::data::course::{
    CourseCreateData, CourseLevel, CourseListFilter, CourseResponse, CourseUpdateData,
};
use crate::data::enrollment::db::EnrollmentStoreExt;
use crate::data::enrollment::EnrollmentResponse;
use crate::data::store::Store;
use crate::middleware::paging::PageState;
use crate::resp::envelope::Envelope;
use crate::resp::error::ApiError;
use crate::resp::jwt::UserClaims;
use crate::role::Role;

#[utoipa::path(
    context_path = "/api/courses",
    params(
        ("q" = Option<String>, Query, description = "title/description/tag substring"),
        ("tags" = Option<Vec<String>>, Query, description = "any-of tag filter"),
        ("level" = Option<String>, Query, description = "beginner|intermediate|advanced"),
        ("instructor" = Option<Uuid>, Query, description = "staff member filter"),
        ("is_published" = Option<bool>, Query, description = "publication filter"),
        ("page" = Option<u64>, Query, description = "1-based page"),
        ("limit" = Option<u64>, Query, description = "page size")
    ),
    responses((status = 200, description = "Course catalog", body = [CourseResponse]))
)]
#[get("/?<q>&<tags>&<level>&<instructor>&<is_published>")]
#[tracing::instrument(skip(store))]
pub async fn list(
    q: Option<String>,
    tags: Option<Vec<String>>,
    level: Option<CourseLevel>,
    instructor: Option<Uuid>,
    is_published: Option<bool>,
    page: PageState,
    viewer: Option<UserClaims>,
    store: &State<Store>,
) -> Result<Envelope<Vec<CourseResponse>>, ApiError> {
    let filter = CourseListFilter {
        q,
        tags,
        level,
        instructor,
        is_published,
    };

    let viewer = viewer.map(|claims| claims.user);
    let (courses, total) = store.list_courses(filter, page, viewer).await?;

    Ok(Envelope::ok("Courses retrieved.", courses).with_meta(page.meta(total)))
}

#[utoipa::path(
    context_path = "/api/courses",
    responses(
        (status = 200, description = "Course found", body = CourseResponse),
        (status = 404, description = "No such course")
    )
)]
#[get("/<id>")]
#[tracing::instrument(skip(store))]
pub async fn get(
    id: Uuid,
    viewer: Option<UserClaims>,
    store: &State<Store>,
) -> Result<Envelope<CourseResponse>, ApiError> {
    let viewer = viewer.map(|claims| claims.user);
    let course = store
        .get_course(id, viewer)
        .await?
        .ok_or_else(course_fail::not_found)?;

    Ok(Envelope::ok("Course retrieved.", course))
}

#[utoipa::path(
    context_path = "/api/courses",
    request_body = CourseCreateData,
    responses(
        (status = 201, description = "Course created", body = CourseResponse),
        (status = 403, description = "Students and TAs cannot create courses")
    )
)]
#[post("/", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn create(
    data: Json<CourseCreateData>,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<CourseResponse>, ApiError> {
    if !auth.role.can_manage_courses() {
        return Err(ApiError::forbidden(
            "Only instructors and admins can manage courses.",
        ));
    }

    let course = store.create_course(data.into_inner(), auth.user).await?;
    let course = store
        .get_course(course.id, Some(auth.user))
        .await?
        .ok_or_else(course_fail::not_found)?;

    Ok(Envelope::created("Course created.", course))
}

#[utoipa::path(
    context_path = "/api/courses",
    request_body = CourseUpdateData,
    responses(
        (status = 200, description = "Course updated", body = CourseResponse),
        (status = 400, description = "Capacity below current enrollment"),
        (status = 404, description = "No such course")
    )
)]
#[put("/<id>", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn update(
    id: Uuid,
    data: Json<CourseUpdateData>,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<CourseResponse>, ApiError> {
    if !auth.role.can_manage_courses() {
        return Err(ApiError::forbidden(
            "Only instructors and admins can manage courses.",
        ));
    }

    store.update_course(id, data.into_inner()).await?;
    let course = store
        .get_course(id, Some(auth.user))
        .await?
        .ok_or_else(course_fail::not_found)?;

    Ok(Envelope::ok("Course updated.", course))
}

#[utoipa::path(
    context_path = "/api/courses",
    responses(
        (status = 200, description = "Course deleted"),
        (status = 404, description = "No such course")
    )
)]
#[delete("/<id>")]
#[tracing::instrument(skip(store))]
pub async fn delete(
    id: Uuid,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<()>, ApiError> {
    if !auth.role.can_manage_courses() {
        return Err(ApiError::forbidden(
            "Only instructors and admins can manage courses.",
        ));
    }

    store.delete_course(id).await?;
    Ok(Envelope::message("Course deleted."))
}

#[utoipa::path(
    context_path = "/api/courses",
    params(
        ("page" = Option<u64>, Query, description = "1-based page"),
        ("limit" = Option<u64>, Query, description = "page size")
    ),
    responses((status = 200, description = "Student roster", body = [EnrollmentResponse]))
)]
#[get("/<id>/students")]
#[tracing::instrument(skip(store))]
pub async fn students(
    id: Uuid,
    auth: UserClaims,
    page: PageState,
    store: &State<Store>,
) -> Result<Envelope<Vec<EnrollmentResponse>>, ApiError> {
    auth.require(&[Role::Admin, Role::Instructor, Role::Ta])?;

    if store.get_course_record(id).await?.is_none() {
        return Err(course_fail::not_found());
    }

    let (students, total) = store.list_course_students(id, page).await?;
    Ok(Envelope::ok("Students retrieved.", students).with_meta(page.meta(total)))
}
