use actix_web::http::Method;
use actix_web::{delete, get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::Caller;
use crate::errors::{FieldErrors, Result};
use crate::model::{Category, Genre, NewCategory, NewGenre};
use crate::permissions::{self, AdminOrReadOnly, Unowned};
use crate::users::SearchQuery;
use crate::{db, validators, DbPool};

/// Wire form shared by genres and categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonResponse {
    pub name: String,
    pub slug: String,
}

impl From<Genre> for TaxonResponse {
    fn from(genre: Genre) -> Self {
        Self {
            name: genre.name,
            slug: genre.slug,
        }
    }
}

impl From<Category> for TaxonResponse {
    fn from(category: Category) -> Self {
        Self {
            name: category.name,
            slug: category.slug,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonPayload {
    pub name: String,
    pub slug: String,
}

impl TaxonPayload {
    fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::new();
        errors.check("name", validators::validate_name(&self.name));
        errors.check("slug", validators::validate_slug(&self.slug));
        errors.into_result()
    }
}

#[get("/genres")]
pub async fn list_genres(
    pool: web::Data<DbPool>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse> {
    let search = query.into_inner().search;
    let genres = db::with_conn(&pool, move |conn| db::catalog::list_genres(conn, search)).await?;
    let body: Vec<TaxonResponse> = genres.into_iter().map(TaxonResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

#[post("/genres")]
pub async fn create_genre(
    caller: Caller,
    pool: web::Data<DbPool>,
    payload: web::Json<TaxonPayload>,
) -> Result<HttpResponse> {
    permissions::check(&AdminOrReadOnly, &caller, &Method::POST)?;
    let payload = payload.into_inner();
    payload.validate()?;

    let genre = db::with_conn(&pool, move |conn| {
        db::catalog::create_genre(
            conn,
            NewGenre {
                name: payload.name,
                slug: payload.slug,
            },
        )
    })
    .await?;
    Ok(HttpResponse::Created().json(TaxonResponse::from(genre)))
}

#[delete("/genres/{slug}")]
pub async fn delete_genre(
    caller: Caller,
    pool: web::Data<DbPool>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    permissions::check_object(&AdminOrReadOnly, &caller, &Method::DELETE, &Unowned)?;

    let slug = path.into_inner();
    db::with_conn(&pool, move |conn| db::catalog::delete_genre(conn, &slug)).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/categories")]
pub async fn list_categories(
    pool: web::Data<DbPool>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse> {
    let search = query.into_inner().search;
    let categories =
        db::with_conn(&pool, move |conn| db::catalog::list_categories(conn, search)).await?;
    let body: Vec<TaxonResponse> = categories.into_iter().map(TaxonResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

#[post("/categories")]
pub async fn create_category(
    caller: Caller,
    pool: web::Data<DbPool>,
    payload: web::Json<TaxonPayload>,
) -> Result<HttpResponse> {
    permissions::check(&AdminOrReadOnly, &caller, &Method::POST)?;
    let payload = payload.into_inner();
    payload.validate()?;

    let category = db::with_conn(&pool, move |conn| {
        db::catalog::create_category(
            conn,
            NewCategory {
                name: payload.name,
                slug: payload.slug,
            },
        )
    })
    .await?;
    Ok(HttpResponse::Created().json(TaxonResponse::from(category)))
}

#[delete("/categories/{slug}")]
pub async fn delete_category(
    caller: Caller,
    pool: web::Data<DbPool>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    permissions::check_object(&AdminOrReadOnly, &caller, &Method::DELETE, &Unowned)?;

    let slug = path.into_inner();
    db::with_conn(&pool, move |conn| db::catalog::delete_category(conn, &slug)).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(list_genres)
        .service(create_genre)
        .service(delete_genre)
        .service(list_categories)
        .service(create_category)
        .service(delete_category);
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test::{call_service, init_service, TestRequest};

    use super::*;
    use crate::test_support;

    #[test]
    fn taxon_payload_checks_name_and_slug() {
        let payload = TaxonPayload {
            name: " ".to_string(),
            slug: "sci fi".to_string(),
        };
        let Err(crate::errors::ApiError::Validation(errors)) = payload.validate() else {
            panic!("expected validation error");
        };
        assert!(errors.get("name").is_some());
        assert!(errors.get("slug").is_some());

        let payload = TaxonPayload {
            name: "Science fiction".to_string(),
            slug: "sci-fi".to_string(),
        };
        assert!(payload.validate().is_ok());
    }

    #[actix_web::test]
    async fn anonymous_writes_are_unauthorized() {
        let app = init_service(test_support::app()).await;
        for uri in ["/api/v1/genres", "/api/v1/categories"] {
            let req = TestRequest::post()
                .uri(uri)
                .set_json(serde_json::json!({"name": "Drama", "slug": "drama"}))
                .to_request();
            let resp = call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }

        let req = TestRequest::delete()
            .uri("/api/v1/genres/drama")
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn invalid_token_is_unauthorized_on_public_routes() {
        let app = init_service(test_support::app()).await;
        let req = TestRequest::post()
            .uri("/api/v1/categories")
            .insert_header(("Authorization", "Bearer not-a-jwt"))
            .set_json(serde_json::json!({"name": "Books", "slug": "books"}))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
