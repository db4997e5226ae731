use actix_web::http::Method;
use actix_web::{delete, get, patch, post, web, HttpResponse};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::auth::Caller;
use crate::db::reviews::{CommentRecord, ReviewRecord};
use crate::errors::{FieldErrors, Result};
use crate::model::{NewComment, NewReview, ReviewChangeset};
use crate::permissions::{self, OwnerOrPrivileged};
use crate::{db, validators, DbPool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub id: i32,
    pub text: String,
    pub author: String,
    pub score: i32,
    pub pub_date: NaiveDateTime,
}

impl From<ReviewRecord> for ReviewResponse {
    fn from(record: ReviewRecord) -> Self {
        Self {
            id: record.review.id,
            text: record.review.text,
            author: record.author,
            score: record.review.score,
            pub_date: record.review.pub_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentResponse {
    pub id: i32,
    pub author: String,
    pub text: String,
    pub pub_date: NaiveDateTime,
}

impl From<CommentRecord> for CommentResponse {
    fn from(record: CommentRecord) -> Self {
        Self {
            id: record.comment.id,
            author: record.author,
            text: record.comment.text,
            pub_date: record.comment.pub_date,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewPayload {
    pub text: Option<String>,
    pub score: Option<i32>,
}

impl ReviewPayload {
    fn validate(&self, creating: bool) -> Result<()> {
        let mut errors = FieldErrors::new();
        match &self.text {
            Some(text) => errors.check("text", validators::validate_not_blank(text)),
            None if creating => errors.add("text", "This field is required."),
            None => {}
        }
        match self.score {
            Some(score) => errors.check("score", validators::validate_score(score)),
            None if creating => errors.add("score", "This field is required."),
            None => {}
        }
        errors.into_result()
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentPayload {
    pub text: Option<String>,
}

impl CommentPayload {
    fn validate(&self, creating: bool) -> Result<()> {
        let mut errors = FieldErrors::new();
        match &self.text {
            Some(text) => errors.check("text", validators::validate_not_blank(text)),
            None if creating => errors.add("text", "This field is required."),
            None => {}
        }
        errors.into_result()
    }
}

#[get("/titles/{title_id}/reviews")]
pub async fn list_reviews(pool: web::Data<DbPool>, path: web::Path<i32>) -> Result<HttpResponse> {
    let title_id = path.into_inner();
    let reviews = db::with_conn(&pool, move |conn| db::reviews::list_reviews(conn, title_id)).await?;
    let body: Vec<ReviewResponse> = reviews.into_iter().map(ReviewResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

#[post("/titles/{title_id}/reviews")]
pub async fn create_review(
    caller: Caller,
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
    payload: web::Json<ReviewPayload>,
) -> Result<HttpResponse> {
    permissions::check(&OwnerOrPrivileged, &caller, &Method::POST)?;
    let author = caller.require_user()?.clone();
    let title_id = path.into_inner();
    let payload = payload.into_inner();
    payload.validate(true)?;

    let new_review = NewReview {
        title_id,
        author_id: author.id,
        text: payload.text.unwrap_or_default(),
        score: payload.score.unwrap_or_default(),
    };
    let review = db::with_conn(&pool, move |conn| db::reviews::create_review(conn, new_review)).await?;
    Ok(HttpResponse::Created().json(ReviewResponse::from(ReviewRecord {
        review,
        author: author.username,
    })))
}

#[get("/titles/{title_id}/reviews/{review_id}")]
pub async fn get_review(
    pool: web::Data<DbPool>,
    path: web::Path<(i32, i32)>,
) -> Result<HttpResponse> {
    let (title_id, review_id) = path.into_inner();
    let review = db::with_conn(&pool, move |conn| {
        db::reviews::find_review(conn, title_id, review_id)
    })
    .await?;
    Ok(HttpResponse::Ok().json(ReviewResponse::from(review)))
}

#[patch("/titles/{title_id}/reviews/{review_id}")]
pub async fn update_review(
    caller: Caller,
    pool: web::Data<DbPool>,
    path: web::Path<(i32, i32)>,
    payload: web::Json<ReviewPayload>,
) -> Result<HttpResponse> {
    permissions::check(&OwnerOrPrivileged, &caller, &Method::PATCH)?;
    let (title_id, review_id) = path.into_inner();
    let payload = payload.into_inner();
    payload.validate(false)?;

    let review = db::with_conn(&pool, move |conn| {
        let record = db::reviews::find_review(conn, title_id, review_id)?;
        permissions::check_object(&OwnerOrPrivileged, &caller, &Method::PATCH, &record.review)?;
        let changes = ReviewChangeset {
            text: payload.text,
            score: payload.score,
        };
        let review = db::reviews::update_review(conn, &record.review, changes)?;
        Ok(ReviewRecord {
            review,
            author: record.author,
        })
    })
    .await?;
    Ok(HttpResponse::Ok().json(ReviewResponse::from(review)))
}

#[delete("/titles/{title_id}/reviews/{review_id}")]
pub async fn delete_review(
    caller: Caller,
    pool: web::Data<DbPool>,
    path: web::Path<(i32, i32)>,
) -> Result<HttpResponse> {
    permissions::check(&OwnerOrPrivileged, &caller, &Method::DELETE)?;
    let (title_id, review_id) = path.into_inner();

    db::with_conn(&pool, move |conn| {
        let record = db::reviews::find_review(conn, title_id, review_id)?;
        permissions::check_object(&OwnerOrPrivileged, &caller, &Method::DELETE, &record.review)?;
        db::reviews::delete_review(conn, record.review.id)
    })
    .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/titles/{title_id}/reviews/{review_id}/comments")]
pub async fn list_comments(
    pool: web::Data<DbPool>,
    path: web::Path<(i32, i32)>,
) -> Result<HttpResponse> {
    let (title_id, review_id) = path.into_inner();
    let comments = db::with_conn(&pool, move |conn| {
        db::reviews::list_comments(conn, title_id, review_id)
    })
    .await?;
    let body: Vec<CommentResponse> = comments.into_iter().map(CommentResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

#[post("/titles/{title_id}/reviews/{review_id}/comments")]
pub async fn create_comment(
    caller: Caller,
    pool: web::Data<DbPool>,
    path: web::Path<(i32, i32)>,
    payload: web::Json<CommentPayload>,
) -> Result<HttpResponse> {
    permissions::check(&OwnerOrPrivileged, &caller, &Method::POST)?;
    let author = caller.require_user()?.clone();
    let (title_id, review_id) = path.into_inner();
    let payload = payload.into_inner();
    payload.validate(true)?;

    let new_comment = NewComment {
        title_id,
        review_id,
        author_id: author.id,
        text: payload.text.unwrap_or_default(),
    };
    let comment =
        db::with_conn(&pool, move |conn| db::reviews::create_comment(conn, new_comment)).await?;
    Ok(HttpResponse::Created().json(CommentResponse::from(CommentRecord {
        comment,
        author: author.username,
    })))
}

#[get("/titles/{title_id}/reviews/{review_id}/comments/{comment_id}")]
pub async fn get_comment(
    pool: web::Data<DbPool>,
    path: web::Path<(i32, i32, i32)>,
) -> Result<HttpResponse> {
    let (title_id, review_id, comment_id) = path.into_inner();
    let comment = db::with_conn(&pool, move |conn| {
        db::reviews::find_comment(conn, title_id, review_id, comment_id)
    })
    .await?;
    Ok(HttpResponse::Ok().json(CommentResponse::from(comment)))
}

#[patch("/titles/{title_id}/reviews/{review_id}/comments/{comment_id}")]
pub async fn update_comment(
    caller: Caller,
    pool: web::Data<DbPool>,
    path: web::Path<(i32, i32, i32)>,
    payload: web::Json<CommentPayload>,
) -> Result<HttpResponse> {
    permissions::check(&OwnerOrPrivileged, &caller, &Method::PATCH)?;
    let (title_id, review_id, comment_id) = path.into_inner();
    let payload = payload.into_inner();
    payload.validate(false)?;

    let comment = db::with_conn(&pool, move |conn| {
        let record = db::reviews::find_comment(conn, title_id, review_id, comment_id)?;
        permissions::check_object(&OwnerOrPrivileged, &caller, &Method::PATCH, &record.comment)?;
        let comment = db::reviews::update_comment(conn, &record.comment, payload.text)?;
        Ok(CommentRecord {
            comment,
            author: record.author,
        })
    })
    .await?;
    Ok(HttpResponse::Ok().json(CommentResponse::from(comment)))
}

#[delete("/titles/{title_id}/reviews/{review_id}/comments/{comment_id}")]
pub async fn delete_comment(
    caller: Caller,
    pool: web::Data<DbPool>,
    path: web::Path<(i32, i32, i32)>,
) -> Result<HttpResponse> {
    permissions::check(&OwnerOrPrivileged, &caller, &Method::DELETE)?;
    let (title_id, review_id, comment_id) = path.into_inner();

    db::with_conn(&pool, move |conn| {
        let record = db::reviews::find_comment(conn, title_id, review_id, comment_id)?;
        permissions::check_object(&OwnerOrPrivileged, &caller, &Method::DELETE, &record.comment)?;
        db::reviews::delete_comment(conn, record.comment.id)
    })
    .await?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(list_reviews)
        .service(create_review)
        .service(get_review)
        .service(update_review)
        .service(delete_review)
        .service(list_comments)
        .service(create_comment)
        .service(get_comment)
        .service(update_comment)
        .service(delete_comment);
}
