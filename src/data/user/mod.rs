use chrono::{DateTime, NaiveDate, Utc};
use crypto::bcrypt::bcrypt;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod db;

use crate::role::Role;

pub static USER_COLLECTION_NAME: &str = "user";

/// Bcrypt digest over a sha256 pre-hash of the password, salted with the
/// server-wide salt. Pre-hashing sidesteps bcrypt's 72-byte input limit.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PasswordHash([u8; 24]);

const BCRYPT_COST: u32 = 10;

impl PasswordHash {
    pub fn new(password: impl AsRef<str>) -> PasswordHash {
        let mut pw_hash: [u8; 24] = [0; 24];

        let mut sha = Sha256::new();
        sha2::Digest::update(&mut sha, password.as_ref().as_bytes());

        bcrypt(
            BCRYPT_COST,
            &crate::SECURITY.salt,
            sha.finalize().as_slice(),
            &mut pw_hash,
        );

        PasswordHash(pw_hash)
    }

    pub fn matches(&self, password: impl AsRef<str>) -> bool {
        *self == PasswordHash::new(password)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
    PreferNotToSay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub pw_hash: PasswordHash,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub user_role: Role,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(data: db::UserSignupData, role: Role) -> User {
        let id = Uuid::new_v4();
        tracing::info!("Creating a new user with UUID: {}", id);

        let now = Utc::now();
        User {
            id,
            full_name: data.full_name,
            username: data.username,
            email: data.email,
            pw_hash: PasswordHash::new(data.password),
            date_of_birth: data.date_of_birth,
            gender: data.gender,
            user_role: role,
            avatar_url: String::new(),
            refresh_token: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// User projection safe to return to clients: no password hash, no refresh
/// token.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub role: Role,
    pub avatar_url: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        UserResponse {
            id: user.id,
            full_name: user.full_name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            date_of_birth: user.date_of_birth,
            gender: user.gender,
            role: user.user_role,
            avatar_url: user.avatar_url.clone(),
            created_at: user.created_at,
        }
    }
}

/// Short user projection embedded in course and enrollment responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: Uuid,
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub avatar_url: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id,
            full_name: user.full_name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            avatar_url: user.avatar_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_matches_only_same_password() {
        let hash = PasswordHash::new("correct horse battery");
        assert!(hash.matches("correct horse battery"));
        assert!(!hash.matches("correct horse battery!"));
    }

    #[test]
    fn user_response_drops_credentials() {
        let body = serde_json::to_value(UserResponse::from(&User::new(
            db::UserSignupData {
                full_name: "A B".into(),
                username: "ab_cd".into(),
                email: "ab@example.com".into(),
                password: "long_enough_pw".into(),
                date_of_birth: NaiveDate::from_ymd_opt(1999, 5, 1).unwrap(),
                gender: Gender::Other,
            },
            Role::Student,
        )))
        .unwrap();

        assert!(body.get("pw_hash").is_none());
        assert!(body.get("refresh_token").is_none());
        assert_eq!(body["role"], "student");
    }
}
