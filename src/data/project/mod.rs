use chrono::{DateTime, Utc};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod db;

use crate::data::serde_helpers::uuid_opt_as_binary;
use crate::data::user::UserSummary;
use crate::resp::error::ApiError;
use crate::util::is_http_url;

pub static PROJECT_COLLECTION_NAME: &str = "project";
pub static LIKE_COLLECTION_NAME: &str = "project.like";
pub static SAVED_COLLECTION_NAME: &str = "project.saved";
pub static COMMENT_COLLECTION_NAME: &str = "project.comment";

pub static DEFAULT_MEMBER_ROLE: &str = "Developer";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Ongoing,
    Completed,
    Archived,
}

impl Default for ProjectStatus {
    fn default() -> Self {
        ProjectStatus::Ongoing
    }
}

/// Embedded membership entry; `role` is free-form text, not
/// [`crate::role::Role`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectMember {
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    #[schema(value_type = Uuid)]
    pub user_id: Uuid,
    pub role: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub joined_at: DateTime<Utc>,
}

impl ProjectMember {
    pub fn new(user_id: Uuid, role: Option<String>) -> ProjectMember {
        ProjectMember {
            user_id,
            role: role.unwrap_or_else(|| DEFAULT_MEMBER_ROLE.to_string()),
            joined_at: Utc::now(),
        }
    }
}

/// Denormalized counters, kept in step with the like/save/comment collections
/// by the mutation paths.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
pub struct ProjectStats {
    #[serde(default)]
    pub likes_count: i64,
    #[serde(default)]
    pub comments_count: i64,
    #[serde(default)]
    pub saves_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub owner_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub live_demo_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub project_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub members: Vec<ProjectMember>,
    #[serde(default)]
    pub stats: ProjectStats,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

fn check_url(label: &str, url: &Option<String>) -> Result<(), ApiError> {
    match url.as_deref() {
        Some(url) if !is_http_url(url) => Err(ApiError::bad_request(format!(
            "{} must be an http(s) URL.",
            label
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProjectCreateData {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub live_demo_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub project_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub members: Vec<ProjectMemberData>,
    #[serde(default)]
    pub status: ProjectStatus,
}

/// Member entry as accepted in request bodies; `joined_at` is stamped on the
/// server.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProjectMemberData {
    pub user_id: Uuid,
    #[serde(default)]
    pub role: Option<String>,
}

impl ProjectCreateData {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.title.trim().len() < 3 {
            return Err(ApiError::bad_request(
                "Title must be at least 3 characters long.",
            ));
        }
        check_url("Repository URL", &self.repo_url)?;
        check_url("Live demo URL", &self.live_demo_url)?;
        check_url("Project URL", &self.project_url)?;
        Ok(())
    }

    pub fn into_project(self, owner_id: Uuid) -> Project {
        let now = Utc::now();
        Project {
            id: Uuid::new_v4(),
            owner_id,
            title: self.title,
            description: self.description,
            is_group: self.is_group,
            repo_url: self.repo_url,
            live_demo_url: self.live_demo_url,
            image_url: self.image_url,
            project_url: self.project_url,
            tags: self.tags,
            members: self
                .members
                .into_iter()
                .map(|m| ProjectMember::new(m.user_id, m.role))
                .collect(),
            stats: ProjectStats::default(),
            status: self.status,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; members and stats have dedicated mutation paths and are
/// deliberately absent here.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProjectUpdateData {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_group: Option<bool>,
    pub repo_url: Option<String>,
    pub live_demo_url: Option<String>,
    pub image_url: Option<String>,
    pub project_url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<ProjectStatus>,
}

impl ProjectUpdateData {
    pub fn set_document(&self) -> Result<bson::Document, ApiError> {
        let mut set = bson::doc! {};

        if let Some(title) = &self.title {
            if title.trim().len() < 3 {
                return Err(ApiError::bad_request(
                    "Title must be at least 3 characters long.",
                ));
            }
            set.insert("title", title);
        }
        if let Some(description) = &self.description {
            set.insert("description", description);
        }
        if let Some(is_group) = self.is_group {
            set.insert("is_group", is_group);
        }
        for (field, label, url) in [
            ("repo_url", "Repository URL", &self.repo_url),
            ("live_demo_url", "Live demo URL", &self.live_demo_url),
            ("image_url", "Image URL", &self.image_url),
            ("project_url", "Project URL", &self.project_url),
        ] {
            if let Some(value) = url {
                if field != "image_url" {
                    check_url(label, url)?;
                }
                set.insert(field, value);
            }
        }
        if let Some(tags) = &self.tags {
            set.insert("tags", tags.clone());
        }
        if let Some(status) = self.status {
            set.insert(
                "status",
                bson::to_bson(&status).expect("status is serializable"),
            );
        }

        if set.is_empty() {
            return Err(ApiError::bad_request("No fields to update."));
        }
        set.insert("updated_at", bson::DateTime::from_chrono(Utc::now()));
        Ok(set)
    }
}

/// One like per (project, user); existence is the signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectLike {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub project: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub user: Uuid,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub liked_at: DateTime<Utc>,
}

impl ProjectLike {
    pub fn new(project: Uuid, user: Uuid) -> ProjectLike {
        ProjectLike {
            id: Uuid::new_v4(),
            project,
            user,
            liked_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSaved {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub project: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub user: Uuid,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub saved_at: DateTime<Utc>,
}

impl ProjectSaved {
    pub fn new(project: Uuid, user: Uuid) -> ProjectSaved {
        ProjectSaved {
            id: Uuid::new_v4(),
            project,
            user,
            saved_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectComment {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub project: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub user: Uuid,
    pub comment_text: String,
    #[serde(default, with = "uuid_opt_as_binary")]
    pub parent: Option<Uuid>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl ProjectComment {
    pub fn new(
        project: Uuid,
        user: Uuid,
        comment_text: String,
        parent: Option<Uuid>,
    ) -> ProjectComment {
        ProjectComment {
            id: Uuid::new_v4(),
            project,
            user,
            comment_text,
            parent,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CommentCreateData {
    pub comment_text: String,
    #[serde(default)]
    pub parent: Option<Uuid>,
}

impl CommentCreateData {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.comment_text.trim().is_empty() {
            return Err(ApiError::bad_request("Comment text is required."));
        }
        Ok(())
    }
}

/// Project as returned to clients; ids as plain UUIDs, owner populated, plus
/// per-viewer like/save flags.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<UserSummary>,
    pub title: String,
    pub description: String,
    pub is_group: bool,
    pub repo_url: Option<String>,
    pub live_demo_url: Option<String>,
    pub image_url: Option<String>,
    pub project_url: Option<String>,
    pub tags: Vec<String>,
    pub members: Vec<ProjectMemberResponse>,
    pub stats: ProjectStats,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_liked: bool,
    pub is_saved: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectMemberResponse {
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

/// A comment with the replies attached to it; replies nest to any depth.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommentNode {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
    pub comment_text: String,
    pub created_at: DateTime<Utc>,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    fn leaf(comment: &ProjectComment) -> CommentNode {
        CommentNode {
            id: comment.id,
            user_id: comment.user,
            user: None,
            comment_text: comment.comment_text.clone(),
            created_at: comment.created_at,
            replies: vec![],
        }
    }
}

/// Reduces the flat comment records of one project to a reply tree. A comment
/// whose parent is found among the records joins that comment's reply list,
/// wherever it sits in the tree; a parent pointing at a missing comment
/// degrades the comment to top-level.
pub fn build_comment_tree(comments: &[ProjectComment]) -> Vec<CommentNode> {
    use std::collections::{HashMap, HashSet};

    let ids: HashSet<Uuid> = comments.iter().map(|c| c.id).collect();

    let mut replies_of: HashMap<Uuid, Vec<&ProjectComment>> = HashMap::new();
    let mut roots: Vec<&ProjectComment> = vec![];
    for comment in comments {
        match comment.parent.filter(|p| *p != comment.id && ids.contains(p)) {
            Some(parent) => replies_of.entry(parent).or_default().push(comment),
            None => roots.push(comment),
        }
    }

    fn assemble(
        comment: &ProjectComment,
        replies_of: &HashMap<Uuid, Vec<&ProjectComment>>,
    ) -> CommentNode {
        let mut node = CommentNode::leaf(comment);
        if let Some(replies) = replies_of.get(&comment.id) {
            node.replies = replies.iter().map(|r| assemble(r, replies_of)).collect();
        }
        node
    }

    roots.iter().map(|c| assemble(c, &replies_of)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(project: Uuid, parent: Option<Uuid>) -> ProjectComment {
        ProjectComment::new(project, Uuid::new_v4(), "text".into(), parent)
    }

    #[test]
    fn create_data_validates_title_and_urls() {
        let mut data = ProjectCreateData {
            title: "Atelier".into(),
            description: String::new(),
            is_group: false,
            repo_url: Some("https://example.com/repo".into()),
            live_demo_url: None,
            image_url: None,
            project_url: None,
            tags: vec![],
            members: vec![],
            status: ProjectStatus::Ongoing,
        };
        assert!(data.validate().is_ok());

        data.repo_url = Some("ftp://example.com".into());
        assert!(data.validate().is_err());

        data.repo_url = None;
        data.title = "ab".into();
        assert!(data.validate().is_err());
    }

    #[test]
    fn members_get_default_role_and_join_stamp() {
        let member = ProjectMember::new(Uuid::new_v4(), None);
        assert_eq!(member.role, DEFAULT_MEMBER_ROLE);

        let member = ProjectMember::new(Uuid::new_v4(), Some("Designer".into()));
        assert_eq!(member.role, "Designer");
    }

    #[test]
    fn comment_tree_attaches_direct_replies() {
        let project = Uuid::new_v4();
        let root = comment(project, None);
        let reply = comment(project, Some(root.id));
        let other_root = comment(project, None);

        let tree = build_comment_tree(&[root.clone(), reply.clone(), other_root.clone()]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].id, root.id);
        assert_eq!(tree[0].replies.len(), 1);
        assert_eq!(tree[0].replies[0].id, reply.id);
        assert!(tree[1].replies.is_empty());
    }

    #[test]
    fn reply_to_reply_nests_under_the_reply() {
        let project = Uuid::new_v4();
        let root = comment(project, None);
        let reply = comment(project, Some(root.id));
        let nested = comment(project, Some(reply.id));

        let tree = build_comment_tree(&[root.clone(), reply.clone(), nested.clone()]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, root.id);
        assert_eq!(tree[0].replies.len(), 1);
        assert_eq!(tree[0].replies[0].id, reply.id);
        assert_eq!(tree[0].replies[0].replies.len(), 1);
        assert_eq!(tree[0].replies[0].replies[0].id, nested.id);
    }

    #[test]
    fn orphaned_replies_become_top_level() {
        let project = Uuid::new_v4();
        let root = comment(project, None);
        let orphan = comment(project, Some(Uuid::new_v4()));

        let tree = build_comment_tree(&[root.clone(), orphan.clone()]);
        let top_ids: Vec<Uuid> = tree.iter().map(|n| n.id).collect();
        assert_eq!(top_ids, vec![root.id, orphan.id]);
        assert!(tree.iter().all(|n| n.replies.is_empty()));
    }

    #[test]
    fn no_comments_build_an_empty_tree() {
        assert!(build_comment_tree(&[]).is_empty());
    }

    #[test]
    fn empty_update_is_rejected() {
        assert!(ProjectUpdateData::default().set_document().is_err());
    }

    #[test]
    fn stats_default_to_zero() {
        let project = ProjectCreateData {
            title: "Atelier".into(),
            description: String::new(),
            is_group: false,
            repo_url: None,
            live_demo_url: None,
            image_url: None,
            project_url: None,
            tags: vec![],
            members: vec![],
            status: ProjectStatus::Ongoing,
        }
        .into_project(Uuid::new_v4());

        assert_eq!(project.stats.likes_count, 0);
        assert_eq!(project.stats.comments_count, 0);
        assert_eq!(project.stats.saves_count, 0);
    }
}
