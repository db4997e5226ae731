use std::future::Future;
use std::pin::Pin;

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use anyhow::anyhow;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ApiError;
use crate::model::{Role, User};
use crate::settings::{AuthSettings, Settings};
use crate::{db, DbPool};

const ISSUER: &str = "ReviewsBackend";
const SUBJECT: &str = "ReviewsClient";

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub sub: String,
    pub jti: String,
    pub user_id: i32,
}

pub fn generate_access_token(user_id: i32, settings: &AuthSettings) -> anyhow::Result<String> {
    let header = Header::new(Algorithm::HS256);
    let now = chrono::Utc::now();
    let expiration = now + chrono::Duration::seconds(settings.access_token_exp_sec);
    let claims = TokenClaims {
        sub: SUBJECT.to_string(),
        iss: ISSUER.to_string(),
        exp: expiration.timestamp(),
        iat: now.timestamp(),
        jti: Uuid::new_v4().to_string(),
        user_id,
    };
    encode(
        &header,
        &claims,
        &EncodingKey::from_secret(settings.secret.as_bytes()),
    )
    .map_err(|e| anyhow!("{}", e))
}

pub fn get_claims_and_validate(token: &str, settings: &AuthSettings) -> Result<TokenClaims, ApiError> {
    let token = token.trim_start_matches("Bearer ");
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(settings.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        log::debug!("Rejected access token: {}", e);
        ApiError::Unauthorized
    })
}

/// The authenticated user behind a request, with the role as currently stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser {
    pub id: i32,
    pub username: String,
    pub role: Role,
    pub is_superuser: bool,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin() || self.is_superuser
    }
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
            is_superuser: user.is_superuser,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Caller {
    Anonymous,
    User(CurrentUser),
}

impl Caller {
    pub fn user(&self) -> Option<&CurrentUser> {
        match self {
            Caller::Anonymous => None,
            Caller::User(user) => Some(user),
        }
    }

    pub fn require_user(&self) -> Result<&CurrentUser, ApiError> {
        self.user().ok_or(ApiError::Unauthorized)
    }
}

impl FromRequest for Caller {
    type Error = ApiError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        if !req.headers().contains_key(AUTHORIZATION) {
            return Box::pin(async { Ok(Caller::Anonymous) });
        }

        let credentials = BearerAuth::from_request(req, payload);
        let settings = req.app_data::<web::Data<Settings>>().cloned();
        let pool = req.app_data::<web::Data<DbPool>>().cloned();

        Box::pin(async move {
            let credentials = credentials.await.map_err(|_| ApiError::Unauthorized)?;
            let settings =
                settings.ok_or_else(|| anyhow!("Settings are not registered"))?;
            let pool = pool.ok_or_else(|| anyhow!("Database pool is not registered"))?;

            let claims = get_claims_and_validate(credentials.token(), &settings.auth)?;
            let user = db::with_conn(&pool, move |conn| db::users::find_by_id(conn, claims.user_id))
                .await
                .map_err(|e| match e {
                    ApiError::NotFound(_) => ApiError::Unauthorized,
                    other => other,
                })?;

            Ok(Caller::User(CurrentUser::from(&user)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_settings(exp_sec: i64) -> AuthSettings {
        AuthSettings {
            secret: "test-secret".to_string(),
            access_token_exp_sec: exp_sec,
            confirmation_code_ttl_min: 60,
        }
    }

    #[test]
    fn issued_token_decodes_to_the_same_user() {
        let settings = auth_settings(3600);
        let token = generate_access_token(42, &settings).unwrap();
        let claims = get_claims_and_validate(&token, &settings).unwrap();

        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.iss, ISSUER);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn bearer_prefix_is_tolerated() {
        let settings = auth_settings(3600);
        let token = generate_access_token(7, &settings).unwrap();
        let claims = get_claims_and_validate(&format!("Bearer {}", token), &settings).unwrap();
        assert_eq!(claims.user_id, 7);
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let token = generate_access_token(1, &auth_settings(3600)).unwrap();
        let other = AuthSettings {
            secret: "another-secret".to_string(),
            ..auth_settings(3600)
        };
        assert!(matches!(
            get_claims_and_validate(&token, &other),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        // Default validation leeway is 60 seconds.
        let settings = auth_settings(-600);
        let token = generate_access_token(1, &settings).unwrap();
        assert!(get_claims_and_validate(&token, &settings).is_err());
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(get_claims_and_validate("not-a-jwt", &auth_settings(3600)).is_err());
    }

    #[test]
    fn superusers_count_as_admins() {
        let mut user = CurrentUser {
            id: 1,
            username: "root".to_string(),
            role: Role::User,
            is_superuser: true,
        };
        assert!(user.is_admin());
        user.is_superuser = false;
        assert!(!user.is_admin());
        user.role = Role::Admin;
        assert!(user.is_admin());
    }
}
