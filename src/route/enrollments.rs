use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::data::enrollment::db::{EnrollmentStoreExt, EnrollmentTxExt};
use crate::data::enrollment::{EnrollmentResponse, EnrollmentUpdateData};
use crate::data::store::Store;
use crate::resp::envelope::Envelope;
use crate::resp::error::ApiError;
use crate::resp::jwt::UserClaims;
use crate::role::Role;

#[utoipa::path(
    context_path = "/api",
    responses(
        (status = 201, description = "Enrolled"),
        (status = 400, description = "Course is full"),
        (status = 404, description = "No such course"),
        (status = 409, description = "Already enrolled")
    )
)]
#[post("/courses/<id>/enroll")]
#[tracing::instrument(skip(store))]
pub async fn enroll(
    id: Uuid,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<EnrollmentResponse>, ApiError> {
    let enrollment = store.enroll_student(id, auth.user).await?;
    Ok(Envelope::created(
        "Enrolled.",
        EnrollmentResponse::new(&enrollment, None, None),
    ))
}

#[utoipa::path(
    context_path = "/api",
    responses(
        (status = 200, description = "Unenrolled"),
        (status = 404, description = "Not enrolled")
    )
)]
#[delete("/courses/<id>/enroll")]
#[tracing::instrument(skip(store))]
pub async fn unenroll(
    id: Uuid,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<()>, ApiError> {
    store.unenroll_student(id, auth.user).await?;
    Ok(Envelope::message("Unenrolled."))
}

#[utoipa::path(
    context_path = "/api",
    responses((status = 200, description = "Own enrollments", body = [EnrollmentResponse]))
)]
#[get("/enrollments/mine")]
#[tracing::instrument(skip(store))]
pub async fn mine(
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<Vec<EnrollmentResponse>>, ApiError> {
    let enrollments = store.my_enrollments(auth.user).await?;
    Ok(Envelope::ok("Enrollments retrieved.", enrollments))
}

#[utoipa::path(
    context_path = "/api",
    request_body = EnrollmentUpdateData,
    responses(
        (status = 200, description = "Enrollment updated", body = EnrollmentResponse),
        (status = 404, description = "No such enrollment")
    )
)]
#[put("/enrollments/<id>", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn update(
    id: Uuid,
    data: Json<EnrollmentUpdateData>,
    auth: UserClaims,
    store: &State<Store>,
) -> Result<Envelope<EnrollmentResponse>, ApiError> {
    auth.require(&[Role::Admin, Role::Instructor])?;

    let enrollment = store.update_enrollment(id, data.into_inner()).await?;
    Ok(Envelope::ok("Enrollment updated.", enrollment))
}
