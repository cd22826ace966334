use std::collections::{HashMap, HashSet};

use bson::{doc, Bson, Document};
use chrono::Utc;
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument, UpdateOptions};
use mongodb::Database;
use rocket::futures::StreamExt;
use uuid::Uuid;

use super::{
    Course, CourseCreateData, CourseListFilter, CourseResponse, CourseUpdateData,
    COURSE_COLLECTION_NAME,
};
use crate::data::enrollment::{EnrollRole, Enrollment, ENROLLMENT_COLLECTION_NAME};
use crate::data::filter;
use crate::data::store::Store;
use crate::data::user::db::UserStoreExt;
use crate::data::user::{User, UserSummary};
use crate::middleware::paging::PageState;
use crate::resp::error::ApiError;

pub mod fail {
    use crate::resp::error::ApiError;

    #[inline]
    pub fn not_found() -> ApiError {
        ApiError::not_found("Course not found.")
    }

    #[inline]
    pub fn capacity_below_enrolled(enrolled: u64) -> ApiError {
        ApiError::bad_request(format!(
            "Capacity cannot be less than current enrolled ({}).",
            enrolled
        ))
    }
}

/// Filter matching enrollments that occupy a student seat.
pub fn active_students(course: Uuid) -> Document {
    doc! {
        "course": filter::uuid_bson(course),
        "role": "student",
        "status": "active",
    }
}

fn list_filter(filter: &CourseListFilter) -> Document {
    let mut doc = doc! {};

    if let Some(q) = filter.q.as_deref().filter(|q| !q.is_empty()) {
        doc.insert(
            "$or",
            vec![
                filter::regex_contains("title", q),
                filter::regex_contains("description", q),
                filter::regex_contains("tags", q),
            ],
        );
    }
    if let Some(tags) = filter.tags.as_ref().filter(|t| !t.is_empty()) {
        doc.insert("tags", doc! { "$in": tags });
    }
    if let Some(level) = filter.level {
        doc.insert(
            "level",
            bson::to_bson(&level).expect("level is serializable"),
        );
    }
    if let Some(instructor) = filter.instructor {
        doc.insert("instructors", filter::uuid_bson(instructor));
    }
    if let Some(is_published) = filter.is_published {
        doc.insert("is_published", is_published);
    }

    doc
}

/// Batch student-seat counts for a set of courses, keyed by course id.
async fn student_counts(
    db: &Database,
    course_ids: &[Uuid],
) -> Result<HashMap<Uuid, u64>, ApiError> {
    if course_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let pipeline = vec![
        doc! { "$match": {
            "course": { "$in": filter::uuid_bson_array(course_ids) },
            "role": "student",
            "status": "active",
        }},
        doc! { "$group": { "_id": "$course", "count": { "$sum": 1 } } },
    ];

    let mut cursor = db
        .collection::<Document>(ENROLLMENT_COLLECTION_NAME)
        .aggregate(pipeline, None)
        .await?;

    let mut counts = HashMap::new();
    while let Some(row) = cursor.next().await {
        let row = row?;
        let id = match row.get("_id") {
            Some(Bson::Binary(bin)) => Uuid::from_slice(&bin.bytes).ok(),
            _ => None,
        };
        let count = match row.get("count") {
            Some(Bson::Int32(c)) => *c as u64,
            Some(Bson::Int64(c)) => *c as u64,
            _ => 0,
        };
        if let Some(id) = id {
            counts.insert(id, count);
        }
    }
    Ok(counts)
}

/// Course ids (among `course_ids`) the viewer holds an active enrollment in.
async fn viewer_enrollments(
    db: &Database,
    viewer: Uuid,
    course_ids: &[Uuid],
) -> Result<HashSet<Uuid>, ApiError> {
    if course_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let mut cursor = db
        .collection::<Enrollment>(ENROLLMENT_COLLECTION_NAME)
        .find(
            doc! {
                "user": filter::uuid_bson(viewer),
                "course": { "$in": filter::uuid_bson_array(course_ids) },
                "status": "active",
            },
            None,
        )
        .await?;

    let mut enrolled = HashSet::new();
    while let Some(enrollment) = cursor.next().await {
        enrolled.insert(enrollment?.course);
    }
    Ok(enrolled)
}

/// Populates creator/staff summaries and per-viewer enrichment for a page of
/// courses. One `$in` user query serves all rows.
async fn enrich_courses(
    db: &Database,
    courses: Vec<Course>,
    viewer: Option<Uuid>,
) -> Result<Vec<CourseResponse>, ApiError> {
    let course_ids: Vec<Uuid> = courses.iter().map(|c| c.id).collect();

    let counts = student_counts(db, &course_ids).await?;
    let enrolled = match viewer {
        Some(viewer) => viewer_enrollments(db, viewer, &course_ids).await?,
        None => HashSet::new(),
    };

    let mut user_ids: Vec<Uuid> = vec![];
    for course in &courses {
        user_ids.push(course.created_by);
        user_ids.extend(&course.instructors);
        user_ids.extend(&course.teaching_assistants);
    }
    user_ids.sort_unstable();
    user_ids.dedup();

    let users: HashMap<Uuid, UserSummary> = db
        .find_users_by_ids(&user_ids)
        .await?
        .iter()
        .map(|u: &User| (u.id, UserSummary::from(u)))
        .collect();

    let summaries = |ids: &[Uuid]| -> Vec<UserSummary> {
        ids.iter().filter_map(|id| users.get(id).cloned()).collect()
    };

    Ok(courses
        .into_iter()
        .map(|course| CourseResponse {
            student_count: counts.get(&course.id).copied().unwrap_or(0),
            is_enrolled: enrolled.contains(&course.id),
            created_by: users.get(&course.created_by).cloned(),
            instructors: summaries(&course.instructors),
            teaching_assistants: summaries(&course.teaching_assistants),
            id: course.id,
            title: course.title,
            description: course.description,
            price: course.price,
            currency: course.currency,
            capacity: course.capacity,
            tags: course.tags,
            category: course.category,
            level: course.level,
            duration_hours: course.duration_hours,
            language: course.language,
            image_url: course.image_url,
            is_published: course.is_published,
            created_at: course.created_at,
        })
        .collect())
}

pub trait CourseStoreExt {
    async fn list_courses(
        &self,
        filter: CourseListFilter,
        page: PageState,
        viewer: Option<Uuid>,
    ) -> Result<(Vec<CourseResponse>, u64), ApiError>;

    async fn get_course(
        &self,
        id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<Option<CourseResponse>, ApiError>;

    async fn get_course_record(&self, id: Uuid) -> Result<Option<Course>, ApiError>;

    async fn count_courses(&self) -> Result<u64, ApiError>;

    /// Drops ids that don't reference an existing user; the remainder is
    /// stored as-is.
    async fn validate_user_ids(&self, ids: &[Uuid]) -> Result<Vec<Uuid>, ApiError>;
}

impl CourseStoreExt for Database {
    async fn list_courses(
        &self,
        filter: CourseListFilter,
        page: PageState,
        viewer: Option<Uuid>,
    ) -> Result<(Vec<CourseResponse>, u64), ApiError> {
        let filter_doc = list_filter(&filter);

        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .skip(page.skip())
            .limit(page.limit as i64)
            .build();

        let mut cursor = self
            .collection::<Course>(COURSE_COLLECTION_NAME)
            .find(filter_doc.clone(), options)
            .await?;

        let mut courses = vec![];
        while let Some(course) = cursor.next().await {
            match course {
                Ok(course) => courses.push(course),
                Err(e) => tracing::warn!("Unable to deserialize Course document: {}", e),
            }
        }

        let total = self
            .collection::<Course>(COURSE_COLLECTION_NAME)
            .count_documents(filter_doc, None)
            .await?;

        Ok((enrich_courses(self, courses, viewer).await?, total))
    }

    async fn get_course(
        &self,
        id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<Option<CourseResponse>, ApiError> {
        let course = match self.get_course_record(id).await? {
            Some(course) => course,
            None => return Ok(None),
        };

        let mut enriched = enrich_courses(self, vec![course], viewer).await?;
        Ok(enriched.pop())
    }

    async fn get_course_record(&self, id: Uuid) -> Result<Option<Course>, ApiError> {
        self.collection(COURSE_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(ApiError::from)
    }

    async fn count_courses(&self) -> Result<u64, ApiError> {
        self.collection::<Course>(COURSE_COLLECTION_NAME)
            .count_documents(None, None)
            .await
            .map_err(ApiError::from)
    }

    async fn validate_user_ids(&self, ids: &[Uuid]) -> Result<Vec<Uuid>, ApiError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let found: HashSet<Uuid> = self
            .find_users_by_ids(ids)
            .await?
            .into_iter()
            .map(|u| u.id)
            .collect();
        Ok(ids.iter().copied().filter(|id| found.contains(id)).collect())
    }
}

pub trait CourseTxExt {
    /// Inserts the course and seeds active instructor/ta enrollments in a
    /// single transaction so the roster never lags the catalog.
    async fn create_course(
        &self,
        data: CourseCreateData,
        created_by: Uuid,
    ) -> Result<Course, ApiError>;

    /// Transactional update. Capacity may not drop below the live student
    /// count; staff added to the course gets an enrollment upserted.
    async fn update_course(
        &self,
        id: Uuid,
        updates: CourseUpdateData,
    ) -> Result<Course, ApiError>;

    /// Removes the course and every enrollment pointing at it.
    async fn delete_course(&self, id: Uuid) -> Result<(), ApiError>;
}

fn staff_enrollments(course: Uuid, staff: &[Uuid], role: EnrollRole) -> Vec<Enrollment> {
    staff
        .iter()
        .map(|user| Enrollment::new(*user, course, role))
        .collect()
}

impl CourseTxExt for Store {
    async fn create_course(
        &self,
        data: CourseCreateData,
        created_by: Uuid,
    ) -> Result<Course, ApiError> {
        data.validate()?;

        let mut data = data;
        data.instructors = self.validate_user_ids(&data.instructors).await?;
        data.teaching_assistants = self.validate_user_ids(&data.teaching_assistants).await?;

        let course = data.into_course(created_by);

        let mut seeds = staff_enrollments(course.id, &course.instructors, EnrollRole::Instructor);
        seeds.extend(staff_enrollments(
            course.id,
            &course.teaching_assistants,
            EnrollRole::Ta,
        ));

        let mut session = self.transaction().await?;

        self.collection::<Course>(COURSE_COLLECTION_NAME)
            .insert_one_with_session(&course, None, &mut session)
            .await?;

        if !seeds.is_empty() {
            self.collection::<Enrollment>(ENROLLMENT_COLLECTION_NAME)
                .insert_many_with_session(&seeds, None, &mut session)
                .await?;
        }

        session.commit_transaction().await?;
        Ok(course)
    }

    async fn update_course(&self, id: Uuid, updates: CourseUpdateData) -> Result<Course, ApiError> {
        let mut updates = updates;

        if let Some(instructors) = updates.instructors.take() {
            updates.instructors = Some(self.validate_user_ids(&instructors).await?);
        }
        if let Some(tas) = updates.teaching_assistants.take() {
            updates.teaching_assistants = Some(self.validate_user_ids(&tas).await?);
        }

        let mut session = self.transaction().await?;

        if let Some(capacity) = updates.capacity {
            if capacity < 0 {
                return Err(ApiError::bad_request("Capacity cannot be negative."));
            }
            let enrolled = self
                .collection::<Enrollment>(ENROLLMENT_COLLECTION_NAME)
                .count_documents_with_session(active_students(id), None, &mut session)
                .await?;
            if (capacity as u64) < enrolled {
                return Err(fail::capacity_below_enrolled(enrolled));
            }
        }

        let set = update_set_document(&updates)?;
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let course = self
            .collection::<Course>(COURSE_COLLECTION_NAME)
            .find_one_and_update_with_session(
                filter::by_id(id),
                doc! { "$set": set },
                options,
                &mut session,
            )
            .await?
            .ok_or_else(fail::not_found)?;

        for (staff, role) in [
            (updates.instructors.as_deref(), EnrollRole::Instructor),
            (updates.teaching_assistants.as_deref(), EnrollRole::Ta),
        ] {
            for seed in staff_enrollments(course.id, staff.unwrap_or(&[]), role) {
                let filter = doc! {
                    "user": filter::uuid_bson(seed.user),
                    "course": filter::uuid_bson(seed.course),
                    "role": bson::to_bson(&seed.role).expect("role is serializable"),
                };
                let update = doc! {
                    "$setOnInsert": bson::to_document(&seed)
                        .expect("enrollment is serializable"),
                };
                let options = UpdateOptions::builder().upsert(true).build();
                self.collection::<Enrollment>(ENROLLMENT_COLLECTION_NAME)
                    .update_one_with_session(filter, update, options, &mut session)
                    .await?;
            }
        }

        session.commit_transaction().await?;
        Ok(course)
    }

    async fn delete_course(&self, id: Uuid) -> Result<(), ApiError> {
        let mut session = self.transaction().await?;

        let deleted = self
            .collection::<Course>(COURSE_COLLECTION_NAME)
            .find_one_and_delete_with_session(filter::by_id(id), None, &mut session)
            .await?;

        if deleted.is_none() {
            return Err(fail::not_found());
        }

        self.collection::<Enrollment>(ENROLLMENT_COLLECTION_NAME)
            .delete_many_with_session(
                doc! { "course": filter::uuid_bson(id) },
                None,
                &mut session,
            )
            .await?;

        session.commit_transaction().await?;
        Ok(())
    }
}

fn update_set_document(updates: &CourseUpdateData) -> Result<Document, ApiError> {
    let mut set = doc! {};

    if let Some(title) = &updates.title {
        if title.trim().is_empty() {
            return Err(ApiError::bad_request("Title cannot be empty."));
        }
        set.insert("title", title);
    }
    if let Some(description) = &updates.description {
        set.insert("description", description);
    }
    if let Some(price) = updates.price {
        set.insert("price", price);
    }
    if let Some(currency) = &updates.currency {
        set.insert("currency", currency);
    }
    if let Some(instructors) = &updates.instructors {
        set.insert("instructors", filter::uuid_bson_array(instructors));
    }
    if let Some(tas) = &updates.teaching_assistants {
        set.insert("teaching_assistants", filter::uuid_bson_array(tas));
    }
    if let Some(capacity) = updates.capacity {
        set.insert("capacity", capacity);
    }
    if let Some(tags) = &updates.tags {
        set.insert("tags", tags.clone());
    }
    if let Some(category) = &updates.category {
        set.insert("category", category);
    }
    if let Some(level) = updates.level {
        set.insert(
            "level",
            bson::to_bson(&level).expect("level is serializable"),
        );
    }
    if let Some(duration_hours) = updates.duration_hours {
        set.insert("duration_hours", duration_hours);
    }
    if let Some(language) = &updates.language {
        set.insert("language", language);
    }
    if let Some(image_url) = &updates.image_url {
        set.insert("image_url", image_url);
    }
    if let Some(is_published) = updates.is_published {
        set.insert("is_published", is_published);
    }

    if set.is_empty() {
        return Err(ApiError::bad_request("No fields to update."));
    }

    set.insert("updated_at", bson::DateTime::from_chrono(Utc::now()));
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::enrollment::EnrollmentStatus;

    #[test]
    fn list_filter_combines_criteria() {
        let filter = list_filter(&CourseListFilter {
            q: Some("rust".into()),
            tags: Some(vec!["systems".into()]),
            level: Some(crate::data::course::CourseLevel::Advanced),
            instructor: None,
            is_published: Some(true),
        });

        assert!(filter.contains_key("$or"));
        assert!(filter.contains_key("tags"));
        assert_eq!(filter.get_str("level").unwrap(), "advanced");
        assert_eq!(filter.get_bool("is_published").unwrap(), true);
    }

    #[test]
    fn empty_update_is_rejected() {
        assert!(update_set_document(&CourseUpdateData::default()).is_err());
    }

    #[test]
    fn active_students_filter_shape() {
        let course = Uuid::new_v4();
        let filter = active_students(course);
        assert_eq!(filter.get_str("role").unwrap(), "student");
        assert_eq!(filter.get_str("status").unwrap(), "active");
        assert!(filter.get("course").is_some());
    }

    #[test]
    fn staff_enrollments_carry_role() {
        let course = Uuid::new_v4();
        let staff = vec![Uuid::new_v4(), Uuid::new_v4()];
        let seeds = staff_enrollments(course, &staff, EnrollRole::Ta);
        assert_eq!(seeds.len(), 2);
        assert!(seeds.iter().all(|e| e.role == EnrollRole::Ta));
        assert!(seeds
            .iter()
            .all(|e| e.status == EnrollmentStatus::Active && e.course == course));
    }
}
