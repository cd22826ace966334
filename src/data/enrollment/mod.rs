use chrono::{DateTime, Utc};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod db;

use crate::data::course::CourseSummary;
use crate::data::serde_helpers::chrono_opt_as_bson_datetime;
use crate::data::user::UserSummary;
use crate::resp::error::ApiError;

pub static ENROLLMENT_COLLECTION_NAME: &str = "enrollment";

/// Role a user holds within one course; independent of the platform-wide
/// [`crate::role::Role`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EnrollRole {
    Student,
    Ta,
    Instructor,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Pending,
    Active,
    Cancelled,
    Completed,
}

/// Join record between [`User`](crate::data::user::User) and
/// [`Course`](crate::data::course::Course), unique per (user, course, role).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub user: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub course: Uuid,
    pub role: EnrollRole,
    pub status: EnrollmentStatus,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub enrolled_at: DateTime<Utc>,
    #[serde(default, with = "chrono_opt_as_bson_datetime")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Completion percentage, 0-100.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub grade: Option<String>,
}

impl Enrollment {
    pub fn new(user: Uuid, course: Uuid, role: EnrollRole) -> Enrollment {
        Enrollment {
            id: Uuid::new_v4(),
            user,
            course,
            role,
            status: EnrollmentStatus::Active,
            enrolled_at: Utc::now(),
            completed_at: None,
            progress: 0,
            grade: None,
        }
    }
}

/// Admin/instructor update; restricted to these fields, everything else in
/// the request body is ignored by deserialization.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct EnrollmentUpdateData {
    pub role: Option<EnrollRole>,
    pub status: Option<EnrollmentStatus>,
    pub progress: Option<u8>,
    pub grade: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl EnrollmentUpdateData {
    pub fn set_document(&self) -> Result<bson::Document, ApiError> {
        let mut set = bson::doc! {};

        if let Some(role) = &self.role {
            set.insert("role", bson::to_bson(role).expect("role is serializable"));
        }
        if let Some(status) = &self.status {
            set.insert(
                "status",
                bson::to_bson(status).expect("status is serializable"),
            );
        }
        if let Some(progress) = self.progress {
            if progress > 100 {
                return Err(ApiError::bad_request("Progress must be between 0 and 100."));
            }
            set.insert("progress", progress as i32);
        }
        if let Some(grade) = &self.grade {
            set.insert("grade", grade);
        }
        if let Some(completed_at) = self.completed_at {
            set.insert("completed_at", bson::DateTime::from_chrono(completed_at));
        }

        if set.is_empty() {
            return Err(ApiError::bad_request("No fields to update."));
        }
        Ok(set)
    }
}

/// Enrollment row with populated user/course summaries.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EnrollmentResponse {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<CourseSummary>,
    pub role: EnrollRole,
    pub status: EnrollmentStatus,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: u8,
    pub grade: Option<String>,
}

impl EnrollmentResponse {
    pub fn new(
        enrollment: &Enrollment,
        user: Option<UserSummary>,
        course: Option<CourseSummary>,
    ) -> EnrollmentResponse {
        EnrollmentResponse {
            id: enrollment.id,
            user,
            course,
            role: enrollment.role,
            status: enrollment.status,
            enrolled_at: enrollment.enrolled_at,
            completed_at: enrollment.completed_at,
            progress: enrollment.progress,
            grade: enrollment.grade.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_enrollment_is_active_student_shape() {
        let enrollment = Enrollment::new(Uuid::new_v4(), Uuid::new_v4(), EnrollRole::Student);
        assert_eq!(enrollment.status, EnrollmentStatus::Active);
        assert_eq!(enrollment.progress, 0);
        assert!(enrollment.completed_at.is_none());
    }

    #[test]
    fn update_rejects_out_of_range_progress() {
        let update = EnrollmentUpdateData {
            progress: Some(101),
            ..Default::default()
        };
        assert!(update.set_document().is_err());
    }

    #[test]
    fn update_serializes_wire_names() {
        let update = EnrollmentUpdateData {
            role: Some(EnrollRole::Ta),
            status: Some(EnrollmentStatus::Completed),
            ..Default::default()
        };
        let set = update.set_document().unwrap();
        assert_eq!(set.get_str("role").unwrap(), "ta");
        assert_eq!(set.get_str("status").unwrap(), "completed");
    }
}
