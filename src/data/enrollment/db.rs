use std::collections::HashMap;

use bson::{doc, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::Database;
use rocket::futures::StreamExt;
use uuid::Uuid;

use super::{
    Enrollment, EnrollmentResponse, EnrollmentUpdateData, ENROLLMENT_COLLECTION_NAME,
};
use crate::data::course::db::{active_students, CourseStoreExt};
use crate::data::course::{Course, CourseSummary, COURSE_COLLECTION_NAME};
use crate::data::filter;
use crate::data::store::Store;
use crate::data::user::db::UserStoreExt;
use crate::data::user::UserSummary;
use crate::middleware::paging::PageState;
use crate::resp::error::{is_duplicate_key, ApiError};

pub mod fail {
    use crate::resp::error::ApiError;

    #[inline]
    pub fn not_found() -> ApiError {
        ApiError::not_found("Enrollment not found.")
    }

    #[inline]
    pub fn already_enrolled() -> ApiError {
        ApiError::conflict("Already enrolled in this course.")
    }

    #[inline]
    pub fn course_full() -> ApiError {
        ApiError::bad_request("Course is full.")
    }
}

/// Populates user/course summaries for a batch of enrollments with one query
/// per collection.
async fn enrich_enrollments(
    db: &Database,
    enrollments: Vec<Enrollment>,
) -> Result<Vec<EnrollmentResponse>, ApiError> {
    let mut user_ids: Vec<Uuid> = enrollments.iter().map(|e| e.user).collect();
    user_ids.sort_unstable();
    user_ids.dedup();

    let mut course_ids: Vec<Uuid> = enrollments.iter().map(|e| e.course).collect();
    course_ids.sort_unstable();
    course_ids.dedup();

    let users: HashMap<Uuid, UserSummary> = db
        .find_users_by_ids(&user_ids)
        .await?
        .iter()
        .map(|u| (u.id, UserSummary::from(u)))
        .collect();

    let mut courses: HashMap<Uuid, CourseSummary> = HashMap::new();
    if !course_ids.is_empty() {
        let mut cursor = db
            .collection::<Course>(COURSE_COLLECTION_NAME)
            .find(filter::by_ids(&course_ids), None)
            .await?;
        while let Some(course) = cursor.next().await {
            match course {
                Ok(course) => {
                    courses.insert(course.id, CourseSummary::from(&course));
                }
                Err(e) => tracing::warn!("Unable to deserialize Course document: {}", e),
            }
        }
    }

    Ok(enrollments
        .iter()
        .map(|e| {
            EnrollmentResponse::new(
                e,
                users.get(&e.user).cloned(),
                courses.get(&e.course).cloned(),
            )
        })
        .collect())
}

async fn collect_enrollments(
    db: &Database,
    filter: Document,
    options: FindOptions,
) -> Result<Vec<Enrollment>, ApiError> {
    let mut cursor = db
        .collection::<Enrollment>(ENROLLMENT_COLLECTION_NAME)
        .find(filter, options)
        .await?;

    let mut enrollments = vec![];
    while let Some(enrollment) = cursor.next().await {
        match enrollment {
            Ok(enrollment) => enrollments.push(enrollment),
            Err(e) => tracing::warn!("Unable to deserialize Enrollment document: {}", e),
        }
    }
    Ok(enrollments)
}

pub trait EnrollmentStoreExt {
    /// Removes the caller's student seat in a course.
    async fn unenroll_student(&self, course: Uuid, user: Uuid) -> Result<(), ApiError>;

    /// The caller's enrollments, newest first, with course summaries.
    async fn my_enrollments(&self, user: Uuid) -> Result<Vec<EnrollmentResponse>, ApiError>;

    /// All enrollments, paged and populated.
    async fn list_enrollments(
        &self,
        page: PageState,
    ) -> Result<(Vec<EnrollmentResponse>, u64), ApiError>;

    /// Student roster of a single course, paged.
    async fn list_course_students(
        &self,
        course: Uuid,
        page: PageState,
    ) -> Result<(Vec<EnrollmentResponse>, u64), ApiError>;

    async fn update_enrollment(
        &self,
        id: Uuid,
        updates: EnrollmentUpdateData,
    ) -> Result<EnrollmentResponse, ApiError>;

    async fn delete_enrollment(&self, id: Uuid) -> Result<(), ApiError>;

    async fn count_enrollments(&self) -> Result<u64, ApiError>;
}

impl EnrollmentStoreExt for Database {
    async fn unenroll_student(&self, course: Uuid, user: Uuid) -> Result<(), ApiError> {
        self.collection::<Enrollment>(ENROLLMENT_COLLECTION_NAME)
            .find_one_and_delete(
                doc! {
                    "course": filter::uuid_bson(course),
                    "user": filter::uuid_bson(user),
                    "role": "student",
                },
                None,
            )
            .await?
            .ok_or_else(fail::not_found)?;
        Ok(())
    }

    async fn my_enrollments(&self, user: Uuid) -> Result<Vec<EnrollmentResponse>, ApiError> {
        let options = FindOptions::builder()
            .sort(doc! { "enrolled_at": -1 })
            .build();
        let enrollments = collect_enrollments(
            self,
            doc! { "user": filter::uuid_bson(user) },
            options,
        )
        .await?;
        enrich_enrollments(self, enrollments).await
    }

    async fn list_enrollments(
        &self,
        page: PageState,
    ) -> Result<(Vec<EnrollmentResponse>, u64), ApiError> {
        let options = FindOptions::builder()
            .sort(doc! { "enrolled_at": -1 })
            .skip(page.skip())
            .limit(page.limit as i64)
            .build();

        let enrollments = collect_enrollments(self, doc! {}, options).await?;
        let total = self.count_enrollments().await?;

        Ok((enrich_enrollments(self, enrollments).await?, total))
    }

    async fn list_course_students(
        &self,
        course: Uuid,
        page: PageState,
    ) -> Result<(Vec<EnrollmentResponse>, u64), ApiError> {
        let filter = doc! {
            "course": filter::uuid_bson(course),
            "role": "student",
        };

        let options = FindOptions::builder()
            .sort(doc! { "enrolled_at": 1 })
            .skip(page.skip())
            .limit(page.limit as i64)
            .build();

        let enrollments = collect_enrollments(self, filter.clone(), options).await?;

        let total = self
            .collection::<Enrollment>(ENROLLMENT_COLLECTION_NAME)
            .count_documents(filter, None)
            .await?;

        Ok((enrich_enrollments(self, enrollments).await?, total))
    }

    async fn update_enrollment(
        &self,
        id: Uuid,
        updates: EnrollmentUpdateData,
    ) -> Result<EnrollmentResponse, ApiError> {
        let set = updates.set_document()?;

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let enrollment = self
            .collection::<Enrollment>(ENROLLMENT_COLLECTION_NAME)
            .find_one_and_update(filter::by_id(id), doc! { "$set": set }, options)
            .await?
            .ok_or_else(fail::not_found)?;

        let mut enriched = enrich_enrollments(self, vec![enrollment]).await?;
        enriched.pop().ok_or_else(fail::not_found)
    }

    async fn delete_enrollment(&self, id: Uuid) -> Result<(), ApiError> {
        self.collection::<Enrollment>(ENROLLMENT_COLLECTION_NAME)
            .find_one_and_delete(filter::by_id(id), None)
            .await?
            .ok_or_else(fail::not_found)?;
        Ok(())
    }

    async fn count_enrollments(&self) -> Result<u64, ApiError> {
        self.collection::<Enrollment>(ENROLLMENT_COLLECTION_NAME)
            .count_documents(None, None)
            .await
            .map_err(ApiError::from)
    }
}

pub trait EnrollmentTxExt {
    /// Takes a student seat in a course. The seat count check and the insert
    /// run in one transaction so a full course never oversubscribes; the
    /// unique (user, course, role) index rejects double enrollment.
    async fn enroll_student(&self, course: Uuid, user: Uuid) -> Result<Enrollment, ApiError>;
}

impl EnrollmentTxExt for Store {
    async fn enroll_student(&self, course: Uuid, user: Uuid) -> Result<Enrollment, ApiError> {
        let record = self
            .get_course_record(course)
            .await?
            .ok_or_else(crate::data::course::db::fail::not_found)?;

        let mut session = self.transaction().await?;

        if let Some(capacity) = record.capacity {
            let seated = self
                .collection::<Enrollment>(ENROLLMENT_COLLECTION_NAME)
                .count_documents_with_session(active_students(course), None, &mut session)
                .await?;
            if seated >= capacity as u64 {
                return Err(fail::course_full());
            }
        }

        let enrollment = Enrollment::new(user, course, super::EnrollRole::Student);

        self.collection::<Enrollment>(ENROLLMENT_COLLECTION_NAME)
            .insert_one_with_session(&enrollment, None, &mut session)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    fail::already_enrolled()
                } else {
                    ApiError::from(e)
                }
            })?;

        session.commit_transaction().await?;
        Ok(enrollment)
    }
}
