use chrono::{DateTime, Utc};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod db;

use crate::data::serde_helpers::uuid_vec_as_binary;
use crate::data::user::UserSummary;
use crate::resp::error::ApiError;

pub static COURSE_COLLECTION_NAME: &str = "course";

#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema, rocket::FromFormField,
)]
#[serde(rename_all = "snake_case")]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl Default for CourseLevel {
    fn default() -> Self {
        CourseLevel::Beginner
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub created_by: Uuid,
    #[serde(default, with = "uuid_vec_as_binary")]
    pub instructors: Vec<Uuid>,
    #[serde(default, with = "uuid_vec_as_binary")]
    pub teaching_assistants: Vec<Uuid>,
    /// `None` means unlimited.
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub level: CourseLevel,
    #[serde(default)]
    pub duration_hours: f64,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub is_published: bool,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_language() -> String {
    "English".to_string()
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CourseCreateData {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub instructors: Vec<Uuid>,
    #[serde(default)]
    pub teaching_assistants: Vec<Uuid>,
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub level: CourseLevel,
    #[serde(default)]
    pub duration_hours: f64,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub is_published: bool,
}

impl CourseCreateData {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.title.trim().is_empty() {
            return Err(ApiError::bad_request("Title is required."));
        }
        if let Some(capacity) = self.capacity {
            if capacity < 0 {
                return Err(ApiError::bad_request("Capacity cannot be negative."));
            }
        }
        Ok(())
    }

    /// Builds the stored course; staff lists are expected to be validated
    /// against the user collection already.
    pub fn into_course(self, created_by: Uuid) -> Course {
        let now = Utc::now();
        Course {
            id: Uuid::new_v4(),
            title: self.title,
            description: self.description,
            price: self.price,
            currency: self.currency,
            created_by,
            instructors: self.instructors,
            teaching_assistants: self.teaching_assistants,
            capacity: self.capacity,
            tags: self.tags,
            category: self.category,
            level: self.level,
            duration_hours: self.duration_hours,
            language: self.language,
            image_url: self.image_url,
            is_published: self.is_published,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial course update; `created_by` is deliberately absent.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CourseUpdateData {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub instructors: Option<Vec<Uuid>>,
    pub teaching_assistants: Option<Vec<Uuid>>,
    pub capacity: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub category: Option<String>,
    pub level: Option<CourseLevel>,
    pub duration_hours: Option<f64>,
    pub language: Option<String>,
    pub image_url: Option<String>,
    pub is_published: Option<bool>,
}

/// Filter parameters accepted by the catalog listing.
#[derive(Debug, Clone, Default)]
pub struct CourseListFilter {
    pub q: Option<String>,
    pub tags: Option<Vec<String>>,
    pub level: Option<CourseLevel>,
    pub instructor: Option<Uuid>,
    pub is_published: Option<bool>,
}

/// Catalog row: the course plus per-viewer enrichment.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CourseResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub currency: String,
    pub created_by: Option<UserSummary>,
    pub instructors: Vec<UserSummary>,
    pub teaching_assistants: Vec<UserSummary>,
    pub capacity: Option<i64>,
    pub tags: Vec<String>,
    pub category: String,
    pub level: CourseLevel,
    pub duration_hours: f64,
    pub language: String,
    pub image_url: String,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub student_count: u64,
    pub is_enrolled: bool,
}

/// Short course projection embedded in enrollment responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CourseSummary {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price: f64,
}

impl From<&Course> for CourseSummary {
    fn from(course: &Course) -> Self {
        CourseSummary {
            id: course.id,
            title: course.title.clone(),
            description: course.description.clone(),
            price: course.price,
        }
    }
}
