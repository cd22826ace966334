use std::collections::{HashMap, HashSet};

use bson::{doc, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::Database;
use rocket::futures::StreamExt;
use uuid::Uuid;

use super::{
    build_comment_tree, CommentCreateData, CommentNode, Project, ProjectComment,
    ProjectCreateData, ProjectLike, ProjectMember, ProjectMemberResponse, ProjectResponse,
    ProjectSaved, ProjectUpdateData, COMMENT_COLLECTION_NAME, LIKE_COLLECTION_NAME,
    PROJECT_COLLECTION_NAME, SAVED_COLLECTION_NAME,
};
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
        ApiError::not_found("Project not found.")
    }

    #[inline]
    pub fn already_exists() -> ApiError {
        ApiError::conflict("Project already exists.")
    }

    #[inline]
    pub fn comment_not_found() -> ApiError {
        ApiError::not_found("Comment not found.")
    }
}

/// Adjusts one of the embedded stats counters alongside a like/save/comment
/// record mutation. Counters are best-effort denormalizations; a failed
/// increment is logged, not compensated.
async fn bump_counter(db: &Database, project: Uuid, field: &str, by: i64) -> Result<(), ApiError> {
    db.collection::<Project>(PROJECT_COLLECTION_NAME)
        .update_one(
            filter::by_id(project),
            doc! { "$inc": { field: by } },
            None,
        )
        .await?;
    Ok(())
}

async fn collect_projects(
    db: &Database,
    filter: Document,
    options: impl Into<Option<FindOptions>>,
) -> Result<Vec<Project>, ApiError> {
    let mut cursor = db
        .collection::<Project>(PROJECT_COLLECTION_NAME)
        .find(filter, options)
        .await?;

    let mut projects = vec![];
    while let Some(project) = cursor.next().await {
        match project {
            Ok(project) => projects.push(project),
            Err(e) => tracing::warn!("Unable to deserialize Project document: {}", e),
        }
    }
    Ok(projects)
}

/// Project ids (among `ids`) present in `collection` for this user. Serves
/// the is_liked/is_saved flags with one query per collection.
async fn flagged_ids(
    db: &Database,
    collection: &str,
    user: Uuid,
    ids: &[Uuid],
) -> Result<HashSet<Uuid>, ApiError> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }

    let mut cursor = db
        .collection::<Document>(collection)
        .find(
            doc! {
                "user": filter::uuid_bson(user),
                "project": { "$in": filter::uuid_bson_array(ids) },
            },
            None,
        )
        .await?;

    let mut flagged = HashSet::new();
    while let Some(record) = cursor.next().await {
        if let Some(bson::Bson::Binary(bin)) = record?.get("project") {
            if let Ok(id) = Uuid::from_slice(&bin.bytes) {
                flagged.insert(id);
            }
        }
    }
    Ok(flagged)
}

async fn enrich_projects(
    db: &Database,
    projects: Vec<Project>,
    viewer: Option<Uuid>,
) -> Result<Vec<ProjectResponse>, ApiError> {
    let project_ids: Vec<Uuid> = projects.iter().map(|p| p.id).collect();

    let (liked, saved) = match viewer {
        Some(viewer) => (
            flagged_ids(db, LIKE_COLLECTION_NAME, viewer, &project_ids).await?,
            flagged_ids(db, SAVED_COLLECTION_NAME, viewer, &project_ids).await?,
        ),
        None => (HashSet::new(), HashSet::new()),
    };

    let mut user_ids: Vec<Uuid> = vec![];
    for project in &projects {
        user_ids.push(project.owner_id);
        user_ids.extend(project.members.iter().map(|m| m.user_id));
    }
    user_ids.sort_unstable();
    user_ids.dedup();

    let users: HashMap<Uuid, UserSummary> = db
        .find_users_by_ids(&user_ids)
        .await?
        .iter()
        .map(|u| (u.id, UserSummary::from(u)))
        .collect();

    Ok(projects
        .into_iter()
        .map(|project| ProjectResponse {
            is_liked: liked.contains(&project.id),
            is_saved: saved.contains(&project.id),
            owner: users.get(&project.owner_id).cloned(),
            members: project
                .members
                .iter()
                .map(|m| ProjectMemberResponse {
                    user_id: m.user_id,
                    user: users.get(&m.user_id).cloned(),
                    role: m.role.clone(),
                    joined_at: m.joined_at,
                })
                .collect(),
            id: project.id,
            owner_id: project.owner_id,
            title: project.title,
            description: project.description,
            is_group: project.is_group,
            repo_url: project.repo_url,
            live_demo_url: project.live_demo_url,
            image_url: project.image_url,
            project_url: project.project_url,
            tags: project.tags,
            stats: project.stats,
            status: project.status,
            created_at: project.created_at,
            updated_at: project.updated_at,
        })
        .collect())
}

fn newest_first(page: Option<PageState>) -> FindOptions {
    let builder = FindOptions::builder().sort(doc! { "created_at": -1 });
    match page {
        Some(page) => builder.skip(page.skip()).limit(page.limit as i64).build(),
        None => builder.build(),
    }
}

pub trait ProjectStoreExt {
    async fn create_project(
        &self,
        data: ProjectCreateData,
        owner: Uuid,
    ) -> Result<Project, ApiError>;

    async fn get_project_record(&self, id: Uuid) -> Result<Option<Project>, ApiError>;

    /// Single project with owner/member summaries and viewer flags.
    async fn get_project(
        &self,
        id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<Option<ProjectResponse>, ApiError>;

    /// Owner's projects, newest first, paged.
    async fn my_projects(
        &self,
        owner: Uuid,
        page: PageState,
    ) -> Result<(Vec<ProjectResponse>, u64), ApiError>;

    async fn projects_by_owner(
        &self,
        owner: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<Vec<ProjectResponse>, ApiError>;

    async fn projects_by_tag(
        &self,
        tag: &str,
        viewer: Option<Uuid>,
    ) -> Result<Vec<ProjectResponse>, ApiError>;

    async fn search_projects(
        &self,
        q: &str,
        viewer: Option<Uuid>,
    ) -> Result<Vec<ProjectResponse>, ApiError>;

    /// Owner-scoped update; 404 when the id doesn't belong to `owner`.
    async fn update_project(
        &self,
        id: Uuid,
        owner: Uuid,
        updates: ProjectUpdateData,
    ) -> Result<Project, ApiError>;

    async fn like_project(&self, project: Uuid, user: Uuid) -> Result<(), ApiError>;
    async fn unlike_project(&self, project: Uuid, user: Uuid) -> Result<(), ApiError>;
    async fn save_project(&self, project: Uuid, user: Uuid) -> Result<(), ApiError>;
    async fn unsave_project(&self, project: Uuid, user: Uuid) -> Result<(), ApiError>;

    async fn liked_projects(&self, user: Uuid) -> Result<Vec<ProjectResponse>, ApiError>;
    async fn saved_projects(&self, user: Uuid) -> Result<Vec<ProjectResponse>, ApiError>;

    async fn add_comment(
        &self,
        project: Uuid,
        user: Uuid,
        data: CommentCreateData,
    ) -> Result<ProjectComment, ApiError>;

    /// Deletes a comment; non-admin callers can only delete their own.
    async fn delete_comment(&self, id: Uuid, user: Uuid, admin: bool) -> Result<(), ApiError>;

    async fn project_comments(&self, project: Uuid) -> Result<Vec<CommentNode>, ApiError>;

    async fn add_member(
        &self,
        project: Uuid,
        owner: Uuid,
        member: ProjectMember,
    ) -> Result<Project, ApiError>;

    async fn remove_member(
        &self,
        project: Uuid,
        owner: Uuid,
        user: Uuid,
    ) -> Result<Project, ApiError>;

    async fn update_member_role(
        &self,
        project: Uuid,
        owner: Uuid,
        user: Uuid,
        role: &str,
    ) -> Result<Project, ApiError>;
}

impl ProjectStoreExt for Database {
    async fn create_project(
        &self,
        data: ProjectCreateData,
        owner: Uuid,
    ) -> Result<Project, ApiError> {
        data.validate()?;

        let clash = self
            .collection::<Project>(PROJECT_COLLECTION_NAME)
            .find_one(
                doc! {
                    "owner_id": filter::uuid_bson(owner),
                    "title": &data.title,
                },
                None,
            )
            .await?;
        if clash.is_some() {
            return Err(fail::already_exists());
        }

        let project = data.into_project(owner);
        self.collection::<Project>(PROJECT_COLLECTION_NAME)
            .insert_one(&project, None)
            .await?;
        Ok(project)
    }

    async fn get_project_record(&self, id: Uuid) -> Result<Option<Project>, ApiError> {
        self.collection(PROJECT_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(ApiError::from)
    }

    async fn get_project(
        &self,
        id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<Option<ProjectResponse>, ApiError> {
        let project = match self.get_project_record(id).await? {
            Some(project) => project,
            None => return Ok(None),
        };
        let mut enriched = enrich_projects(self, vec![project], viewer).await?;
        Ok(enriched.pop())
    }

    async fn my_projects(
        &self,
        owner: Uuid,
        page: PageState,
    ) -> Result<(Vec<ProjectResponse>, u64), ApiError> {
        let filter = doc! { "owner_id": filter::uuid_bson(owner) };

        let projects = collect_projects(self, filter.clone(), newest_first(Some(page))).await?;

        let total = self
            .collection::<Project>(PROJECT_COLLECTION_NAME)
            .count_documents(filter, None)
            .await?;

        Ok((enrich_projects(self, projects, Some(owner)).await?, total))
    }

    async fn projects_by_owner(
        &self,
        owner: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<Vec<ProjectResponse>, ApiError> {
        let projects = collect_projects(
            self,
            doc! { "owner_id": filter::uuid_bson(owner) },
            newest_first(None),
        )
        .await?;
        enrich_projects(self, projects, viewer).await
    }

    async fn projects_by_tag(
        &self,
        tag: &str,
        viewer: Option<Uuid>,
    ) -> Result<Vec<ProjectResponse>, ApiError> {
        let projects =
            collect_projects(self, doc! { "tags": tag }, newest_first(None)).await?;
        enrich_projects(self, projects, viewer).await
    }

    async fn search_projects(
        &self,
        q: &str,
        viewer: Option<Uuid>,
    ) -> Result<Vec<ProjectResponse>, ApiError> {
        let filter = doc! {
            "$or": [
                filter::regex_contains("title", q),
                filter::regex_contains("description", q),
                filter::regex_contains("tags", q),
            ],
        };
        let projects = collect_projects(self, filter, newest_first(None)).await?;
        enrich_projects(self, projects, viewer).await
    }

    async fn update_project(
        &self,
        id: Uuid,
        owner: Uuid,
        updates: ProjectUpdateData,
    ) -> Result<Project, ApiError> {
        let set = updates.set_document()?;

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.collection::<Project>(PROJECT_COLLECTION_NAME)
            .find_one_and_update(
                doc! {
                    "_id": filter::uuid_bson(id),
                    "owner_id": filter::uuid_bson(owner),
                },
                doc! { "$set": set },
                options,
            )
            .await?
            .ok_or_else(fail::not_found)
    }

    async fn like_project(&self, project: Uuid, user: Uuid) -> Result<(), ApiError> {
        if self.get_project_record(project).await?.is_none() {
            return Err(fail::not_found());
        }

        // The unique (project, user) index turns a second like into a 409.
        self.collection::<ProjectLike>(LIKE_COLLECTION_NAME)
            .insert_one(ProjectLike::new(project, user), None)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    ApiError::conflict("Project already liked.")
                } else {
                    ApiError::from(e)
                }
            })?;

        bump_counter(self, project, "stats.likes_count", 1).await
    }

    async fn unlike_project(&self, project: Uuid, user: Uuid) -> Result<(), ApiError> {
        let deleted = self
            .collection::<ProjectLike>(LIKE_COLLECTION_NAME)
            .delete_one(
                doc! {
                    "project": filter::uuid_bson(project),
                    "user": filter::uuid_bson(user),
                },
                None,
            )
            .await?;

        if deleted.deleted_count == 0 {
            return Err(ApiError::not_found("Like not found."));
        }

        bump_counter(self, project, "stats.likes_count", -1).await
    }

    async fn save_project(&self, project: Uuid, user: Uuid) -> Result<(), ApiError> {
        if self.get_project_record(project).await?.is_none() {
            return Err(fail::not_found());
        }

        self.collection::<ProjectSaved>(SAVED_COLLECTION_NAME)
            .insert_one(ProjectSaved::new(project, user), None)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    ApiError::conflict("Project already saved.")
                } else {
                    ApiError::from(e)
                }
            })?;

        bump_counter(self, project, "stats.saves_count", 1).await
    }

    async fn unsave_project(&self, project: Uuid, user: Uuid) -> Result<(), ApiError> {
        let deleted = self
            .collection::<ProjectSaved>(SAVED_COLLECTION_NAME)
            .delete_one(
                doc! {
                    "project": filter::uuid_bson(project),
                    "user": filter::uuid_bson(user),
                },
                None,
            )
            .await?;

        if deleted.deleted_count == 0 {
            return Err(ApiError::not_found("Save not found."));
        }

        bump_counter(self, project, "stats.saves_count", -1).await
    }

    async fn liked_projects(&self, user: Uuid) -> Result<Vec<ProjectResponse>, ApiError> {
        let mut cursor = self
            .collection::<ProjectLike>(LIKE_COLLECTION_NAME)
            .find(doc! { "user": filter::uuid_bson(user) }, None)
            .await?;

        let mut ids = vec![];
        while let Some(like) = cursor.next().await {
            ids.push(like?.project);
        }

        let projects = collect_projects(self, filter::by_ids(&ids), newest_first(None)).await?;
        enrich_projects(self, projects, Some(user)).await
    }

    async fn saved_projects(&self, user: Uuid) -> Result<Vec<ProjectResponse>, ApiError> {
        let mut cursor = self
            .collection::<ProjectSaved>(SAVED_COLLECTION_NAME)
            .find(doc! { "user": filter::uuid_bson(user) }, None)
            .await?;

        let mut ids = vec![];
        while let Some(saved) = cursor.next().await {
            ids.push(saved?.project);
        }

        let projects = collect_projects(self, filter::by_ids(&ids), newest_first(None)).await?;
        enrich_projects(self, projects, Some(user)).await
    }

    async fn add_comment(
        &self,
        project: Uuid,
        user: Uuid,
        data: CommentCreateData,
    ) -> Result<ProjectComment, ApiError> {
        data.validate()?;

        if self.get_project_record(project).await?.is_none() {
            return Err(fail::not_found());
        }

        let comment = ProjectComment::new(project, user, data.comment_text, data.parent);
        self.collection::<ProjectComment>(COMMENT_COLLECTION_NAME)
            .insert_one(&comment, None)
            .await?;

        bump_counter(self, project, "stats.comments_count", 1).await?;
        Ok(comment)
    }

    async fn delete_comment(&self, id: Uuid, user: Uuid, admin: bool) -> Result<(), ApiError> {
        let mut filter = filter::by_id(id);
        if !admin {
            filter.insert("user", filter::uuid_bson(user));
        }

        let comment = self
            .collection::<ProjectComment>(COMMENT_COLLECTION_NAME)
            .find_one_and_delete(filter, None)
            .await?
            .ok_or_else(fail::comment_not_found)?;

        bump_counter(self, comment.project, "stats.comments_count", -1).await
    }

    async fn project_comments(&self, project: Uuid) -> Result<Vec<CommentNode>, ApiError> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": 1 })
            .build();

        let mut cursor = self
            .collection::<ProjectComment>(COMMENT_COLLECTION_NAME)
            .find(doc! { "project": filter::uuid_bson(project) }, options)
            .await?;

        let mut comments = vec![];
        while let Some(comment) = cursor.next().await {
            match comment {
                Ok(comment) => comments.push(comment),
                Err(e) => tracing::warn!("Unable to deserialize ProjectComment document: {}", e),
            }
        }

        let mut tree = build_comment_tree(&comments);

        let mut user_ids: Vec<Uuid> = comments.iter().map(|c| c.user).collect();
        user_ids.sort_unstable();
        user_ids.dedup();
        let users: HashMap<Uuid, UserSummary> = self
            .find_users_by_ids(&user_ids)
            .await?
            .iter()
            .map(|u| (u.id, UserSummary::from(u)))
            .collect();

        fn attach_summaries(nodes: &mut [CommentNode], users: &HashMap<Uuid, UserSummary>) {
            for node in nodes {
                node.user = users.get(&node.user_id).cloned();
                attach_summaries(&mut node.replies, users);
            }
        }
        attach_summaries(&mut tree, &users);

        Ok(tree)
    }

    async fn add_member(
        &self,
        project: Uuid,
        owner: Uuid,
        member: ProjectMember,
    ) -> Result<Project, ApiError> {
        let record = self
            .get_project_record(project)
            .await?
            .filter(|p| p.owner_id == owner)
            .ok_or_else(fail::not_found)?;

        if record.members.iter().any(|m| m.user_id == member.user_id) {
            return Err(ApiError::conflict("User is already a member."));
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.collection::<Project>(PROJECT_COLLECTION_NAME)
            .find_one_and_update(
                doc! {
                    "_id": filter::uuid_bson(project),
                    "owner_id": filter::uuid_bson(owner),
                },
                doc! { "$push": {
                    "members": bson::to_bson(&member).expect("member is serializable"),
                }},
                options,
            )
            .await?
            .ok_or_else(fail::not_found)
    }

    async fn remove_member(
        &self,
        project: Uuid,
        owner: Uuid,
        user: Uuid,
    ) -> Result<Project, ApiError> {
        let record = self
            .get_project_record(project)
            .await?
            .filter(|p| p.owner_id == owner)
            .ok_or_else(fail::not_found)?;

        if !record.members.iter().any(|m| m.user_id == user) {
            return Err(ApiError::not_found("Member not found."));
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.collection::<Project>(PROJECT_COLLECTION_NAME)
            .find_one_and_update(
                doc! {
                    "_id": filter::uuid_bson(project),
                    "owner_id": filter::uuid_bson(owner),
                },
                doc! { "$pull": {
                    "members": { "user_id": filter::uuid_bson(user) },
                }},
                options,
            )
            .await?
            .ok_or_else(fail::not_found)
    }

    async fn update_member_role(
        &self,
        project: Uuid,
        owner: Uuid,
        user: Uuid,
        role: &str,
    ) -> Result<Project, ApiError> {
        if role.trim().is_empty() {
            return Err(ApiError::bad_request("Role is required."));
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .array_filters(vec![doc! { "m.user_id": filter::uuid_bson(user) }])
            .build();

        let updated = self
            .collection::<Project>(PROJECT_COLLECTION_NAME)
            .find_one_and_update(
                doc! {
                    "_id": filter::uuid_bson(project),
                    "owner_id": filter::uuid_bson(owner),
                    "members.user_id": filter::uuid_bson(user),
                },
                doc! { "$set": { "members.$[m].role": role } },
                options,
            )
            .await?;

        updated.ok_or_else(|| ApiError::not_found("Member not found."))
    }
}

pub trait ProjectTxExt {
    /// Removes a project and its likes, saves and comments in one
    /// transaction. Only the owner (or an admin) may delete.
    async fn delete_project(&self, id: Uuid, owner: Uuid, admin: bool) -> Result<(), ApiError>;
}

impl ProjectTxExt for Store {
    async fn delete_project(&self, id: Uuid, owner: Uuid, admin: bool) -> Result<(), ApiError> {
        let mut filter = filter::by_id(id);
        if !admin {
            filter.insert("owner_id", filter::uuid_bson(owner));
        }

        let mut session = self.transaction().await?;

        let deleted = self
            .collection::<Project>(PROJECT_COLLECTION_NAME)
            .find_one_and_delete_with_session(filter, None, &mut session)
            .await?;

        if deleted.is_none() {
            return Err(fail::not_found());
        }

        let by_project = doc! { "project": filter::uuid_bson(id) };
        for name in [
            LIKE_COLLECTION_NAME,
            SAVED_COLLECTION_NAME,
            COMMENT_COLLECTION_NAME,
        ] {
            self.collection::<Document>(name)
                .delete_many_with_session(by_project.clone(), None, &mut session)
                .await?;
        }

        session.commit_transaction().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_first_applies_paging_when_present() {
        let options = newest_first(Some(PageState { page: 3, limit: 10 }));
        assert_eq!(options.sort, Some(doc! { "created_at": -1 }));
        assert_eq!(options.skip, Some(20));
        assert_eq!(options.limit, Some(10));

        let options = newest_first(None);
        assert_eq!(options.sort, Some(doc! { "created_at": -1 }));
        assert_eq!(options.skip, None);
        assert_eq!(options.limit, None);
    }
}
