use actix_web::http::Method;
use actix_web::{delete, get, patch, post, web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::Caller;
use crate::catalog::TaxonResponse;
use crate::db::titles::{TitleFilter, TitleInput, TitleRecord};
use crate::errors::{FieldErrors, Result};
use crate::permissions::{self, AdminOrReadOnly, Unowned};
use crate::{db, validators, DbPool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleResponse {
    pub id: i32,
    pub name: String,
    pub year: i32,
    pub rating: Option<f64>,
    pub description: Option<String>,
    pub genre: Vec<TaxonResponse>,
    pub category: Option<TaxonResponse>,
}

impl From<TitleRecord> for TitleResponse {
    fn from(record: TitleRecord) -> Self {
        Self {
            id: record.title.id,
            name: record.title.name,
            year: record.title.year,
            rating: record.rating,
            description: record.title.description,
            genre: record.genres.into_iter().map(TaxonResponse::from).collect(),
            category: record.category.map(TaxonResponse::from),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TitleQuery {
    pub name: Option<String>,
    pub year: Option<i32>,
    pub category: Option<String>,
    pub genre: Option<String>,
}

impl From<TitleQuery> for TitleFilter {
    fn from(query: TitleQuery) -> Self {
        Self {
            name: query.name,
            year: query.year,
            category: query.category,
            genre: query.genre,
        }
    }
}

/// Write form of a title: category and genres are referenced by slug.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TitlePayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub year: Option<i32>,
    pub category: Option<String>,
    pub genre: Option<Vec<String>>,
}

impl TitlePayload {
    fn validate(&self, creating: bool, current_year: i32) -> Result<()> {
        let mut errors = FieldErrors::new();
        match &self.name {
            Some(name) => errors.check("name", validators::validate_not_blank(name)),
            None if creating => errors.add("name", "This field is required."),
            None => {}
        }
        match self.year {
            Some(year) => errors.check("year", validators::validate_year(year, current_year)),
            None if creating => errors.add("year", "This field is required."),
            None => {}
        }
        if let Some(description) = &self.description {
            errors.check(
                "description",
                validators::validate_max_len(description, validators::MAX_DESCRIPTION_LEN),
            );
        }
        errors.into_result()
    }
}

impl From<TitlePayload> for TitleInput {
    fn from(payload: TitlePayload) -> Self {
        Self {
            name: payload.name,
            description: payload.description,
            year: payload.year,
            category: payload.category,
            genre: payload.genre,
        }
    }
}

#[get("/titles")]
pub async fn list_titles(
    pool: web::Data<DbPool>,
    query: web::Query<TitleQuery>,
) -> Result<HttpResponse> {
    let filter = TitleFilter::from(query.into_inner());
    let titles = db::with_conn(&pool, move |conn| db::titles::list(conn, filter)).await?;
    let body: Vec<TitleResponse> = titles.into_iter().map(TitleResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

#[post("/titles")]
pub async fn create_title(
    caller: Caller,
    pool: web::Data<DbPool>,
    payload: web::Json<TitlePayload>,
) -> Result<HttpResponse> {
    permissions::check(&AdminOrReadOnly, &caller, &Method::POST)?;
    let payload = payload.into_inner();
    payload.validate(true, validators::current_year())?;

    let title =
        db::with_conn(&pool, move |conn| db::titles::create(conn, payload.into())).await?;
    log::info!("Created title {} ({})", title.title.name, title.title.id);
    Ok(HttpResponse::Created().json(TitleResponse::from(title)))
}

#[get("/titles/{title_id}")]
pub async fn get_title(pool: web::Data<DbPool>, path: web::Path<i32>) -> Result<HttpResponse> {
    let title_id = path.into_inner();
    let title = db::with_conn(&pool, move |conn| db::titles::find(conn, title_id)).await?;
    Ok(HttpResponse::Ok().json(TitleResponse::from(title)))
}

#[patch("/titles/{title_id}")]
pub async fn update_title(
    caller: Caller,
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
    payload: web::Json<TitlePayload>,
) -> Result<HttpResponse> {
    permissions::check_object(&AdminOrReadOnly, &caller, &Method::PATCH, &Unowned)?;
    let title_id = path.into_inner();
    let payload = payload.into_inner();
    payload.validate(false, validators::current_year())?;

    let title = db::with_conn(&pool, move |conn| {
        db::titles::update(conn, title_id, payload.into())
    })
    .await?;
    Ok(HttpResponse::Ok().json(TitleResponse::from(title)))
}

#[delete("/titles/{title_id}")]
pub async fn delete_title(
    caller: Caller,
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
) -> Result<HttpResponse> {
    permissions::check_object(&AdminOrReadOnly, &caller, &Method::DELETE, &Unowned)?;
    let title_id = path.into_inner();
    db::with_conn(&pool, move |conn| db::titles::delete(conn, title_id)).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(list_titles)
        .service(create_title)
        .service(get_title)
        .service(update_title)
        .service(delete_title);
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test::{call_service, init_service, TestRequest};

    use super::*;
    use crate::errors::ApiError;
    use crate::model::{Category, Genre, Title};

    fn field_errors(result: Result<()>) -> FieldErrors {
        match result {
            Err(ApiError::Validation(errors)) => errors,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn create_requires_name_and_year() {
        let errors = field_errors(TitlePayload::default().validate(true, 2024));
        assert!(errors.get("name").is_some());
        assert!(errors.get("year").is_some());
        assert!(TitlePayload::default().validate(false, 2024).is_ok());
    }

    #[test]
    fn future_year_is_rejected() {
        let payload = TitlePayload {
            name: Some("Dune".to_string()),
            year: Some(2025),
            ..Default::default()
        };
        let errors = field_errors(payload.validate(true, 2024));
        assert!(errors.get("year").is_some());

        let payload = TitlePayload {
            year: Some(2024),
            ..payload
        };
        assert!(payload.validate(true, 2024).is_ok());
    }

    #[test]
    fn long_description_is_rejected() {
        let payload = TitlePayload {
            description: Some("d".repeat(201)),
            ..Default::default()
        };
        let errors = field_errors(payload.validate(false, 2024));
        assert!(errors.get("description").is_some());
    }

    #[test]
    fn response_nests_category_and_genres() {
        let record = TitleRecord {
            title: Title {
                id: 3,
                name: "Dune".to_string(),
                description: None,
                year: 1965,
                category_id: Some(1),
            },
            category: Some(Category {
                id: 1,
                name: "Books".to_string(),
                slug: "books".to_string(),
            }),
            genres: vec![Genre {
                id: 2,
                name: "Science fiction".to_string(),
                slug: "sci-fi".to_string(),
            }],
            rating: None,
        };
        let json = serde_json::to_value(TitleResponse::from(record)).unwrap();

        assert_eq!(json["id"], 3);
        assert!(json["rating"].is_null());
        assert_eq!(json["category"]["slug"], "books");
        assert_eq!(json["genre"][0]["name"], "Science fiction");
        assert!(json["category"].get("id").is_none());
    }

    #[actix_web::test]
    async fn non_numeric_title_id_is_not_found() {
        let app = init_service(crate::test_support::app()).await;
        let req = TestRequest::get().uri("/api/v1/titles/abc").to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn non_numeric_year_filter_is_a_bad_request() {
        let app = init_service(crate::test_support::app()).await;
        let req = TestRequest::get()
            .uri("/api/v1/titles?year=last")
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn anonymous_cannot_create_titles() {
        let app = init_service(crate::test_support::app()).await;
        let req = TestRequest::post()
            .uri("/api/v1/titles")
            .set_json(serde_json::json!({"name": "Dune", "year": 1965}))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
