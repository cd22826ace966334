use bson::doc;
use chrono::{NaiveDate, Utc};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use mongodb::Database;
use rocket::futures::StreamExt;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{Gender, PasswordHash, User, USER_COLLECTION_NAME};
use crate::data::filter;
use crate::resp::error::{is_duplicate_key, ApiError};
use crate::role::Role;

pub mod fail {
    use crate::resp::error::ApiError;
    use uuid::Uuid;

    #[inline]
    pub fn not_found(id: Uuid) -> ApiError {
        ApiError::not_found(format!("User '{}' not found.", id))
    }

    #[inline]
    pub fn already_exists() -> ApiError {
        ApiError::conflict("Username or email already in use.")
    }

    #[inline]
    pub fn wrong_password() -> ApiError {
        ApiError::bad_request("Wrong password.")
    }

    #[inline]
    pub fn bad_field(detail: impl ToString) -> ApiError {
        ApiError::bad_request(detail)
    }
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct UserSignupData {
    pub full_name: String,
    pub username: String,
    pub email: String,
    #[schema(format = "password")]
    pub password: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
}

impl std::fmt::Debug for UserSignupData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserSignupData:{}", self.username)
    }
}

impl UserSignupData {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.full_name.trim().is_empty() {
            return Err(fail::bad_field("Full name is required."));
        }

        if !self.email.contains('@') || !self.email.contains('.') {
            return Err(fail::bad_field("Invalid email format."));
        }

        if self.username.len() < 3 || self.username.len() > 32 {
            return Err(fail::bad_field(
                "Username must be between 3 and 32 characters long.",
            ));
        }

        if self.password.len() < 8 {
            return Err(fail::bad_field(
                "Password must be at least 8 characters long.",
            ));
        }

        if self.password.len() > 1024 {
            return Err(fail::bad_field(
                "Passwords longer than 1024 characters aren't supported.",
            ));
        }

        Ok(())
    }
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct UserLoginData {
    pub username: Option<String>,
    pub email: Option<String>,
    #[schema(format = "password")]
    pub password: String,
}

impl std::fmt::Debug for UserLoginData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "UserLoginData:{}",
            self.username.as_deref().or(self.email.as_deref()).unwrap_or("?")
        )
    }
}

impl UserLoginData {
    /// Login accepts either field; email wins when both are present.
    pub fn identifier(&self) -> Result<(&str, bool), ApiError> {
        if let Some(email) = self.email.as_deref() {
            return Ok((email, true));
        }
        self.username
            .as_deref()
            .map(|u| (u, false))
            .ok_or_else(|| fail::bad_field("Username or email is required."))
    }
}

/// Partial update; only provided fields are written.
#[derive(Clone, Default, Deserialize, ToSchema)]
pub struct UserUpdateData {
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    #[schema(format = "password")]
    pub password: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub avatar_url: Option<String>,
    pub role: Option<Role>,
}

impl std::fmt::Debug for UserUpdateData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserUpdateData")
    }
}

impl UserUpdateData {
    /// Builds the `$set` document. `allow_role` is only true on the admin
    /// path; everyone else silently keeps their role.
    pub fn set_document(&self, allow_role: bool) -> Result<bson::Document, ApiError> {
        let mut set = doc! {};

        if let Some(full_name) = &self.full_name {
            if full_name.trim().is_empty() {
                return Err(fail::bad_field("Full name cannot be empty."));
            }
            set.insert("full_name", full_name);
        }
        if let Some(username) = &self.username {
            if username.len() < 3 || username.len() > 32 {
                return Err(fail::bad_field(
                    "Username must be between 3 and 32 characters long.",
                ));
            }
            set.insert("username", username);
        }
        if let Some(email) = &self.email {
            if !email.contains('@') || !email.contains('.') {
                return Err(fail::bad_field("Invalid email format."));
            }
            set.insert("email", email);
        }
        if let Some(password) = &self.password {
            if password.len() < 8 {
                return Err(fail::bad_field(
                    "Password must be at least 8 characters long.",
                ));
            }
            set.insert(
                "pw_hash",
                bson::to_bson(&PasswordHash::new(password))
                    .expect("password hash must be serializable to BSON"),
            );
        }
        if let Some(date_of_birth) = &self.date_of_birth {
            set.insert(
                "date_of_birth",
                bson::to_bson(date_of_birth).expect("date must be serializable to BSON"),
            );
        }
        if let Some(gender) = &self.gender {
            set.insert(
                "gender",
                bson::to_bson(gender).expect("gender must be serializable to BSON"),
            );
        }
        if let Some(avatar_url) = &self.avatar_url {
            set.insert("avatar_url", avatar_url);
        }
        if let Some(role) = &self.role {
            if !allow_role {
                return Err(ApiError::forbidden("Only admins can change roles."));
            }
            if !Role::ASSIGNABLE.contains(role) {
                return Err(fail::bad_field("Role not allowed."));
            }
            set.insert(
                "user_role",
                bson::to_bson(role).expect("role must be serializable to BSON"),
            );
        }

        if set.is_empty() {
            return Err(fail::bad_field("No fields to update."));
        }

        set.insert(
            "updated_at",
            bson::DateTime::from_chrono(Utc::now()),
        );
        Ok(set)
    }
}

pub trait UserStoreExt {
    /// Inserts a new user. Usernames found in `admin_usernames` are promoted
    /// to admin; `role` applies otherwise.
    async fn create_user(
        &self,
        data: UserSignupData,
        role: Role,
        admin_usernames: &[String],
    ) -> Result<User, ApiError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, ApiError>;
    async fn list_users(&self) -> Result<Vec<User>, ApiError>;
    async fn count_users(&self) -> Result<u64, ApiError>;
    async fn find_users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>, ApiError>;

    async fn find_user_by_username(&self, username: impl AsRef<str>)
        -> Result<Option<User>, ApiError>;
    async fn find_user_by_email(&self, email: impl AsRef<str>) -> Result<Option<User>, ApiError>;
    async fn find_user_by_refresh_token(
        &self,
        token: impl AsRef<str>,
    ) -> Result<Option<User>, ApiError>;

    /// Persists (or clears, with `None`) the user's refresh token.
    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), ApiError>;
    /// Revokes a refresh token by value, wherever it is stored.
    async fn revoke_refresh_token(&self, token: impl AsRef<str>) -> Result<(), ApiError>;

    async fn update_user(
        &self,
        id: Uuid,
        data: UserUpdateData,
        allow_role: bool,
    ) -> Result<Option<User>, ApiError>;
}

impl UserStoreExt for Database {
    async fn create_user(
        &self,
        data: UserSignupData,
        role: Role,
        admin_usernames: &[String],
    ) -> Result<User, ApiError> {
        data.validate()?;

        if self.find_user_by_username(&data.username).await?.is_some()
            || self.find_user_by_email(&data.email).await?.is_some()
        {
            return Err(fail::already_exists());
        }

        let role = if admin_usernames.contains(&data.username) {
            Role::Admin
        } else {
            role
        };

        let user = User::new(data, role);

        // The unique index wins the race if two signups pass the check above.
        self.collection::<User>(USER_COLLECTION_NAME)
            .insert_one(&user, None)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    fail::already_exists()
                } else {
                    ApiError::from(e)
                }
            })?;

        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, ApiError> {
        self.collection(USER_COLLECTION_NAME)
            .find_one(filter::by_id(id), None)
            .await
            .map_err(ApiError::from)
    }

    async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        let mut cursor = self
            .collection::<User>(USER_COLLECTION_NAME)
            .find(None, None)
            .await?;

        let mut users = vec![];
        while let Some(user) = cursor.next().await {
            match user {
                Ok(user) => users.push(user),
                Err(e) => tracing::warn!("Unable to deserialize User document: {}", e),
            }
        }
        Ok(users)
    }

    async fn count_users(&self) -> Result<u64, ApiError> {
        self.collection::<User>(USER_COLLECTION_NAME)
            .count_documents(None, None)
            .await
            .map_err(ApiError::from)
    }

    async fn find_users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>, ApiError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let mut cursor = self
            .collection::<User>(USER_COLLECTION_NAME)
            .find(filter::by_ids(ids), None)
            .await?;

        let mut users = vec![];
        while let Some(user) = cursor.next().await {
            match user {
                Ok(user) => users.push(user),
                Err(e) => tracing::warn!("Unable to deserialize User document: {}", e),
            }
        }
        Ok(users)
    }

    async fn find_user_by_username(
        &self,
        username: impl AsRef<str>,
    ) -> Result<Option<User>, ApiError> {
        self.collection(USER_COLLECTION_NAME)
            .find_one(doc! { "username": username.as_ref() }, None)
            .await
            .map_err(ApiError::from)
    }

    async fn find_user_by_email(&self, email: impl AsRef<str>) -> Result<Option<User>, ApiError> {
        self.collection(USER_COLLECTION_NAME)
            .find_one(doc! { "email": email.as_ref() }, None)
            .await
            .map_err(ApiError::from)
    }

    async fn find_user_by_refresh_token(
        &self,
        token: impl AsRef<str>,
    ) -> Result<Option<User>, ApiError> {
        self.collection(USER_COLLECTION_NAME)
            .find_one(doc! { "refresh_token": token.as_ref() }, None)
            .await
            .map_err(ApiError::from)
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), ApiError> {
        self.collection::<User>(USER_COLLECTION_NAME)
            .update_one(
                filter::by_id(id),
                doc! { "$set": { "refresh_token": token } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn revoke_refresh_token(&self, token: impl AsRef<str>) -> Result<(), ApiError> {
        self.collection::<User>(USER_COLLECTION_NAME)
            .update_one(
                doc! { "refresh_token": token.as_ref() },
                doc! { "$set": { "refresh_token": bson::Bson::Null } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn update_user(
        &self,
        id: Uuid,
        data: UserUpdateData,
        allow_role: bool,
    ) -> Result<Option<User>, ApiError> {
        let set = data.set_document(allow_role)?;

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.collection::<User>(USER_COLLECTION_NAME)
            .find_one_and_update(filter::by_id(id), doc! { "$set": set }, options)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    ApiError::bad_request("Duplicate field value.")
                } else {
                    ApiError::from(e)
                }
            })
    }
}

pub trait UserTxExt {
    /// Removes the account and every enrollment it holds in one transaction.
    async fn delete_user(&self, id: Uuid) -> Result<(), ApiError>;
}

impl UserTxExt for crate::data::store::Store {
    async fn delete_user(&self, id: Uuid) -> Result<(), ApiError> {
        use crate::data::enrollment::{Enrollment, ENROLLMENT_COLLECTION_NAME};

        let mut session = self.transaction().await?;

        let deleted = self
            .collection::<User>(USER_COLLECTION_NAME)
            .find_one_and_delete_with_session(filter::by_id(id), None, &mut session)
            .await?;

        if deleted.is_none() {
            return Err(fail::not_found(id));
        }

        self.collection::<Enrollment>(ENROLLMENT_COLLECTION_NAME)
            .delete_many_with_session(
                doc! { "user": filter::uuid_bson(id) },
                None,
                &mut session,
            )
            .await?;

        session.commit_transaction().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup() -> UserSignupData {
        UserSignupData {
            full_name: "Jane Roe".into(),
            username: "jane_roe".into(),
            email: "jane@example.com".into(),
            password: "pw_is_long_enough".into(),
            date_of_birth: NaiveDate::from_ymd_opt(2001, 7, 3).unwrap(),
            gender: Gender::Female,
        }
    }

    #[test]
    fn signup_validation() {
        assert!(signup().validate().is_ok());

        let mut bad = signup();
        bad.email = "not-an-email".into();
        assert!(bad.validate().is_err());

        let mut bad = signup();
        bad.password = "short".into();
        assert!(bad.validate().is_err());

        let mut bad = signup();
        bad.username = "ab".into();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn login_identifier_prefers_email() {
        let login = UserLoginData {
            username: Some("jane_roe".into()),
            email: Some("jane@example.com".into()),
            password: "x".into(),
        };
        assert_eq!(login.identifier().unwrap(), ("jane@example.com", true));

        let login = UserLoginData {
            username: Some("jane_roe".into()),
            email: None,
            password: "x".into(),
        };
        assert_eq!(login.identifier().unwrap(), ("jane_roe", false));

        let login = UserLoginData {
            username: None,
            email: None,
            password: "x".into(),
        };
        assert!(login.identifier().is_err());
    }

    #[test]
    fn role_update_requires_admin_path() {
        let update = UserUpdateData {
            role: Some(Role::Instructor),
            ..Default::default()
        };
        assert!(update.set_document(false).is_err());
        let set = update.set_document(true).unwrap();
        assert!(set.contains_key("user_role"));
        assert!(set.contains_key("updated_at"));
    }

    #[test]
    fn empty_update_is_rejected() {
        assert!(UserUpdateData::default().set_document(true).is_err());
    }
}
