use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rocket::http::{Cookie, Status};
use rocket::outcome::Outcome::{Error as Failure, Success};
use rocket::request::{self, FromRequest, Request};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::util::date_time_as_unix_seconds;
use crate::data::user::User;
use crate::resp::error::ApiError;
use crate::role::Role;
use crate::security::Secret;

pub static REFRESH_COOKIE_NAME: &str = "refresh_token";
pub static ACCESS_COOKIE_NAME: &str = "access_token";

fn access_token_lifetime() -> Duration {
    Duration::minutes(15)
}

fn refresh_token_lifetime() -> Duration {
    Duration::days(7)
}

/// Signed claims carried by both token kinds; the two are told apart by the
/// secret they are signed with, not by shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    #[serde(with = "date_time_as_unix_seconds")]
    iat: DateTime<Utc>,
    #[serde(with = "date_time_as_unix_seconds")]
    exp: DateTime<Utc>,
    pub user: Uuid,
    pub username: String,
    pub role: Role,
}

impl UserClaims {
    fn new(user: &User, lifetime: Duration) -> UserClaims {
        let now = Utc::now();
        UserClaims {
            iat: now,
            exp: now + lifetime,
            user: user.id,
            username: user.username.clone(),
            role: user.user_role,
        }
    }

    pub fn access(user: &User) -> UserClaims {
        UserClaims::new(user, access_token_lifetime())
    }

    pub fn refresh(user: &User) -> UserClaims {
        UserClaims::new(user, refresh_token_lifetime())
    }

    pub fn encode_jwt(&self, secret: &Secret) -> Result<String, jsonwebtoken::errors::Error> {
        encode(
            &Header::new(Algorithm::HS256),
            &self,
            &EncodingKey::from_secret(secret),
        )
    }

    pub fn decode_jwt(
        token: impl AsRef<str>,
        secret: &Secret,
    ) -> Result<UserClaims, jsonwebtoken::errors::Error> {
        decode::<UserClaims>(
            token.as_ref(),
            &DecodingKey::from_secret(secret),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
    }

    /// Role allow-list check used at the top of protected handlers.
    pub fn require(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.role) {
            return Ok(());
        }
        let names: Vec<String> = allowed.iter().map(Role::to_string).collect();
        Err(ApiError::forbidden(format!(
            "Access denied: only [{}] allowed.",
            names.join(", ")
        )))
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.exp
    }
}

/// Access + refresh token pair issued on login and on rotation.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl TokenPair {
    pub fn issue(user: &User) -> Result<TokenPair, ApiError> {
        let secrets = &crate::SECURITY.secrets;
        Ok(TokenPair {
            access: UserClaims::access(user).encode_jwt(&secrets.access)?,
            refresh: UserClaims::refresh(user).encode_jwt(&secrets.refresh)?,
        })
    }

    /// The httpOnly cookie carrying the refresh token.
    pub fn refresh_cookie(&self) -> Cookie<'static> {
        Cookie::build((REFRESH_COOKIE_NAME, self.refresh.clone()))
            .http_only(true)
            .path("/")
            .max_age(rocket::time::Duration::days(7))
            .build()
    }
}

pub fn auth_missing() -> ApiError {
    ApiError::unauthorized("Access token not provided.")
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for UserClaims {
    type Error = ApiError;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        tracing::trace!("extracting access token from request");

        let bearer = req
            .headers()
            .get_one("Authorization")
            .and_then(|header| header.strip_prefix("Bearer "))
            .map(str::to_owned);

        let token = match bearer.or_else(|| {
            req.cookies()
                .get(ACCESS_COOKIE_NAME)
                .map(|c| c.value().to_owned())
        }) {
            Some(token) => token,
            None => return Failure((Status::Unauthorized, auth_missing())),
        };

        match UserClaims::decode_jwt(&token, &crate::SECURITY.secrets.access) {
            Ok(claims) => {
                tracing::debug!("decoded access token for user: {}", claims.user);
                Success(claims)
            }
            Err(e) => {
                tracing::debug!("unable to decode access token: {}", e);
                Failure((
                    Status::Forbidden,
                    ApiError::forbidden("Invalid or expired access token."),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::user::db::UserSignupData;
    use chrono::SubsecRound;

    fn example_user() -> User {
        User::new(
            UserSignupData {
                full_name: "Test User".into(),
                username: "test_user".into(),
                email: "test@example.com".into(),
                password: "s3cret_pw!".into(),
                date_of_birth: chrono::NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
                gender: crate::data::user::Gender::PreferNotToSay,
            },
            Role::Student,
        )
    }

    #[test]
    fn claims_roundtrip() {
        let secret: Secret = rand::random();
        let user = example_user();

        let mut claims = UserClaims::access(&user);
        claims.iat = claims.iat.round_subsecs(0);
        claims.exp = claims.exp.round_subsecs(0);

        let token = claims.encode_jwt(&secret).expect("encoding should work");
        let decoded = UserClaims::decode_jwt(token, &secret).expect("decoding should work");

        assert_eq!(decoded.user, user.id);
        assert_eq!(decoded.username, user.username);
        assert_eq!(decoded.role, Role::Student);
        assert_eq!(decoded.iat, claims.iat);
        assert_eq!(decoded.exp, claims.exp);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let user = example_user();
        let token = UserClaims::access(&user)
            .encode_jwt(&rand::random())
            .unwrap();

        assert!(UserClaims::decode_jwt(token, &rand::random()).is_err());
    }

    #[test]
    fn expired_claims_are_rejected() {
        let secret: Secret = rand::random();
        let user = example_user();

        let mut claims = UserClaims::access(&user);
        claims.iat = Utc::now() - Duration::hours(2);
        claims.exp = Utc::now() - Duration::hours(1);

        let token = claims.encode_jwt(&secret).unwrap();
        let err = UserClaims::decode_jwt(token, &secret).unwrap_err();
        assert!(matches!(
            err.kind(),
            jsonwebtoken::errors::ErrorKind::ExpiredSignature
        ));
    }

    #[test]
    fn allow_list_rejects_missing_role() {
        let user = example_user();
        let claims = UserClaims::access(&user);

        assert!(claims.require(&[Role::Student, Role::Ta]).is_ok());
        let err = claims.require(&[Role::Admin, Role::Instructor]).unwrap_err();
        assert_eq!(err.status, Status::Forbidden);
    }
}
