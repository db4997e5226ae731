use actix_web::http::Method;
use actix_web::{delete, get, patch, post, web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{self, Caller, CurrentUser};
use crate::errors::{FieldErrors, Result};
use crate::mail::Mailer;
use crate::model::{NewUser, Role, User, UserChangeset};
use crate::permissions::{self, AdminOnly};
use crate::settings::Settings;
use crate::{db, validators, DbPool};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
}

impl SignupRequest {
    fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::new();
        errors.check("username", validators::validate_username(&self.username));
        errors.check("email", validators::validate_email(&self.email));
        errors.into_result()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignupResponse {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenRequest {
    pub username: String,
    pub confirmation_code: String,
}

impl TokenRequest {
    fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::new();
        errors.check("username", validators::validate_not_blank(&self.username));
        errors.check(
            "confirmation_code",
            validators::validate_not_blank(&self.confirmation_code),
        );
        errors.into_result()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub role: Role,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            bio: user.bio,
            role: user.role,
        }
    }
}

/// User fields accepted by the admin endpoints and the self-profile.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPayload {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub role: Option<Role>,
}

impl UserPayload {
    fn validate(&self, creating: bool) -> Result<()> {
        let mut errors = FieldErrors::new();
        match &self.username {
            Some(username) => errors.check("username", validators::validate_username(username)),
            None if creating => errors.add("username", "This field is required."),
            None => {}
        }
        match &self.email {
            Some(email) => errors.check("email", validators::validate_email(email)),
            None if creating => errors.add("email", "This field is required."),
            None => {}
        }
        for (field, value) in [("first_name", &self.first_name), ("last_name", &self.last_name)] {
            if let Some(value) = value {
                errors.check(
                    field,
                    validators::validate_max_len(value, validators::MAX_PERSON_NAME_LEN),
                );
            }
        }
        errors.into_result()
    }

    fn into_changeset(self) -> UserChangeset {
        UserChangeset {
            username: self.username,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            bio: self.bio,
            role: self.role,
        }
    }
}

/// Changes a user may apply to their own profile: the role is only kept when
/// the caller is already an admin.
pub fn self_update_changes(caller: &CurrentUser, mut changes: UserChangeset) -> UserChangeset {
    if !caller.is_admin() {
        changes.role = None;
    }
    changes
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

#[post("/auth/signup")]
pub async fn signup(
    pool: web::Data<DbPool>,
    settings: web::Data<Settings>,
    mailer: web::Data<Mailer>,
    request: web::Json<SignupRequest>,
) -> Result<HttpResponse> {
    let request = request.into_inner();
    request.validate()?;

    let ttl = settings.auth.confirmation_code_ttl_min;
    let username = request.username.clone();
    let email = request.email.clone();
    let (user, code) =
        db::with_conn(&pool, move |conn| db::users::signup(conn, &username, &email, ttl)).await?;

    mailer
        .send_confirmation_code(&user.email, &user.username, &code)
        .await?;
    log::info!("Issued confirmation code for {}", user.username);

    Ok(HttpResponse::Ok().json(SignupResponse {
        username: user.username,
        email: user.email,
    }))
}

#[post("/auth/token")]
pub async fn obtain_token(
    pool: web::Data<DbPool>,
    settings: web::Data<Settings>,
    request: web::Json<TokenRequest>,
) -> Result<HttpResponse> {
    let request = request.into_inner();
    request.validate()?;

    let user = db::with_conn(&pool, move |conn| {
        db::users::redeem_confirmation_code(conn, &request.username, &request.confirmation_code)
    })
    .await?;

    let token = auth::generate_access_token(user.id, &settings.auth)?;
    log::info!("Issued access token for {}", user.username);
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}

#[get("")]
pub async fn list_users(
    caller: Caller,
    pool: web::Data<DbPool>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse> {
    permissions::check(&AdminOnly, &caller, &Method::GET)?;

    let search = query.into_inner().search;
    let users = db::with_conn(&pool, move |conn| db::users::list(conn, search)).await?;
    let body: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

#[post("")]
pub async fn create_user(
    caller: Caller,
    pool: web::Data<DbPool>,
    payload: web::Json<UserPayload>,
) -> Result<HttpResponse> {
    permissions::check(&AdminOnly, &caller, &Method::POST)?;

    let payload = payload.into_inner();
    payload.validate(true)?;
    let new_user = NewUser {
        username: payload.username.unwrap_or_default(),
        email: payload.email.unwrap_or_default(),
        first_name: payload.first_name.unwrap_or_default(),
        last_name: payload.last_name.unwrap_or_default(),
        bio: payload.bio.unwrap_or_default(),
        role: payload.role.unwrap_or_default(),
        is_superuser: false,
    };
    let user = db::with_conn(&pool, move |conn| db::users::create(conn, new_user)).await?;
    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}

#[get("/me")]
pub async fn get_me(caller: Caller, pool: web::Data<DbPool>) -> Result<HttpResponse> {
    let user_id = caller.require_user()?.id;
    let user = db::with_conn(&pool, move |conn| db::users::find_by_id(conn, user_id)).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

#[patch("/me")]
pub async fn update_me(
    caller: Caller,
    pool: web::Data<DbPool>,
    payload: web::Json<UserPayload>,
) -> Result<HttpResponse> {
    let current = caller.require_user()?.clone();
    let payload = payload.into_inner();
    payload.validate(false)?;

    let changes = self_update_changes(&current, payload.into_changeset());
    let user = db::with_conn(&pool, move |conn| {
        let user = db::users::find_by_id(conn, current.id)?;
        db::users::update(conn, &user, changes)
    })
    .await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

#[get("/{username}")]
pub async fn get_user(
    caller: Caller,
    pool: web::Data<DbPool>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    permissions::check(&AdminOnly, &caller, &Method::GET)?;

    let username = path.into_inner();
    let user =
        db::with_conn(&pool, move |conn| db::users::find_by_username(conn, &username)).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

#[patch("/{username}")]
pub async fn update_user(
    caller: Caller,
    pool: web::Data<DbPool>,
    path: web::Path<String>,
    payload: web::Json<UserPayload>,
) -> Result<HttpResponse> {
    permissions::check(&AdminOnly, &caller, &Method::PATCH)?;

    let username = path.into_inner();
    let payload = payload.into_inner();
    payload.validate(false)?;

    let user = db::with_conn(&pool, move |conn| {
        let user = db::users::find_by_username(conn, &username)?;
        db::users::update(conn, &user, payload.into_changeset())
    })
    .await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

#[delete("/{username}")]
pub async fn delete_user(
    caller: Caller,
    pool: web::Data<DbPool>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    permissions::check(&AdminOnly, &caller, &Method::DELETE)?;

    let username = path.into_inner();
    db::with_conn(&pool, move |conn| db::users::delete(conn, &username)).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(signup).service(obtain_token).service(
        web::scope("/users")
            .service(list_users)
            .service(create_user)
            .service(get_me)
            .service(update_me)
            .service(get_user)
            .service(update_user)
            .service(delete_user),
    );
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test::{call_service, init_service, read_body_json, TestRequest};

    use super::*;
    use crate::test_support;

    fn current(role: Role, is_superuser: bool) -> CurrentUser {
        CurrentUser {
            id: 1,
            username: "bob".to_string(),
            role,
            is_superuser,
        }
    }

    fn promote_to_admin() -> UserChangeset {
        UserChangeset {
            bio: Some("critic".to_string()),
            role: Some(Role::Admin),
            ..Default::default()
        }
    }

    #[test]
    fn self_update_ignores_role_for_regular_users() {
        for role in [Role::User, Role::Moderator] {
            let changes = self_update_changes(&current(role, false), promote_to_admin());
            assert_eq!(changes.role, None);
            assert_eq!(changes.bio.as_deref(), Some("critic"));
        }
    }

    #[test]
    fn self_update_keeps_role_for_admins() {
        let changes = self_update_changes(&current(Role::Admin, false), promote_to_admin());
        assert_eq!(changes.role, Some(Role::Admin));

        let changes = self_update_changes(&current(Role::User, true), promote_to_admin());
        assert_eq!(changes.role, Some(Role::Admin));
    }

    #[test]
    fn creating_a_user_requires_username_and_email() {
        let error = UserPayload::default().validate(true).unwrap_err();
        let crate::errors::ApiError::Validation(errors) = error else {
            panic!("expected validation error");
        };
        assert!(errors.get("username").is_some());
        assert!(errors.get("email").is_some());
        assert!(UserPayload::default().validate(false).is_ok());
    }

    #[test]
    fn person_names_are_capped_at_their_own_limit() {
        let payload = UserPayload {
            first_name: Some("a".repeat(validators::MAX_PERSON_NAME_LEN)),
            last_name: Some("b".repeat(validators::MAX_PERSON_NAME_LEN + 1)),
            ..Default::default()
        };
        let crate::errors::ApiError::Validation(errors) = payload.validate(false).unwrap_err() else {
            panic!("expected validation error");
        };
        assert!(errors.get("first_name").is_none());
        assert!(errors.get("last_name").is_some());
    }

    #[actix_web::test]
    async fn signup_rejects_reserved_username() {
        let app = init_service(test_support::app()).await;
        let req = TestRequest::post()
            .uri("/api/v1/auth/signup")
            .set_json(serde_json::json!({"username": "me", "email": "me@x.com"}))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = read_body_json(resp).await;
        assert!(body["errors"]["username"][0]
            .as_str()
            .unwrap()
            .contains("reserved"));
    }

    #[actix_web::test]
    async fn signup_reports_every_invalid_field() {
        let app = init_service(test_support::app()).await;
        let req = TestRequest::post()
            .uri("/api/v1/auth/signup/")
            .set_json(serde_json::json!({"username": "bob smith"}))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = read_body_json(resp).await;
        assert!(body["errors"]["username"].is_array());
        assert!(body["errors"]["email"].is_array());
    }

    #[actix_web::test]
    async fn token_requires_both_fields() {
        let app = init_service(test_support::app()).await;
        let req = TestRequest::post()
            .uri("/api/v1/auth/token")
            .set_json(serde_json::json!({"username": "bob"}))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = read_body_json(resp).await;
        assert!(body["errors"]["confirmation_code"].is_array());
        assert!(body.get("token").is_none());
    }

    #[actix_web::test]
    async fn malformed_json_is_a_bad_request() {
        let app = init_service(test_support::app()).await;
        let req = TestRequest::post()
            .uri("/api/v1/auth/token")
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = read_body_json(resp).await;
        assert_eq!(body["internal_code"], "MR-00400");
    }

    #[actix_web::test]
    async fn user_management_requires_a_token() {
        let app = init_service(test_support::app()).await;
        for uri in ["/api/v1/users", "/api/v1/users/me", "/api/v1/users/bob"] {
            let req = TestRequest::get().uri(uri).to_request();
            let resp = call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", uri);
            assert!(resp.headers().contains_key("WWW-Authenticate"), "{}", uri);

            let body: serde_json::Value = read_body_json(resp).await;
            assert_eq!(body["internal_code"], "UA-00401", "{}", uri);
        }
    }

    #[actix_web::test]
    async fn forged_token_is_rejected_before_reaching_handlers() {
        let app = init_service(test_support::app()).await;
        let forged = auth::generate_access_token(
            1,
            &crate::settings::AuthSettings {
                secret: "someone-else".to_string(),
                access_token_exp_sec: 3600,
                confirmation_code_ttl_min: 60,
            },
        )
        .unwrap();
        let req = TestRequest::get()
            .uri("/api/v1/users/me")
            .insert_header(("Authorization", format!("Bearer {}", forged)))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: serde_json::Value = read_body_json(resp).await;
        assert_eq!(body["internal_code"], "UA-00401");
    }

    #[actix_web::test]
    async fn malformed_authorization_header_is_a_json_unauthorized() {
        let app = init_service(test_support::app()).await;
        let req = TestRequest::get()
            .uri("/api/v1/users/me")
            .insert_header(("Authorization", "Basic Ym9iOnNlY3JldA=="))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: serde_json::Value = read_body_json(resp).await;
        assert_eq!(body["internal_code"], "UA-00401");
    }
}
