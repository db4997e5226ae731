use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::{
    ExpressionMethods, OptionalExtension, PgConnection, QueryDsl, RunQueryDsl, SelectableHelper,
};

use crate::db::titles;
use crate::errors::{ApiError, Result, NON_FIELD_ERRORS};
use crate::model::{Comment, NewComment, NewReview, Review, ReviewChangeset};
use crate::schema::{comments, reviews, users};

pub const DUPLICATE_REVIEW: &str = "You have already reviewed this title.";

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRecord {
    pub review: Review,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentRecord {
    pub comment: Comment,
    pub author: String,
}

pub fn list_reviews(conn: &mut PgConnection, title_id: i32) -> Result<Vec<ReviewRecord>> {
    titles::find_title(conn, title_id)?;

    let rows: Vec<(Review, String)> = reviews::table
        .inner_join(users::table)
        .filter(reviews::title_id.eq(title_id))
        .order(reviews::pub_date.asc())
        .select((reviews::all_columns, users::username))
        .load(conn)?;
    Ok(rows
        .into_iter()
        .map(|(review, author)| ReviewRecord { review, author })
        .collect())
}

/// The review `review_id`, provided it belongs to `title_id`.
pub fn find_review(
    conn: &mut PgConnection,
    title_id: i32,
    review_id: i32,
) -> Result<ReviewRecord> {
    reviews::table
        .inner_join(users::table)
        .filter(reviews::id.eq(review_id))
        .filter(reviews::title_id.eq(title_id))
        .select((reviews::all_columns, users::username))
        .first::<(Review, String)>(conn)
        .optional()?
        .map(|(review, author)| ReviewRecord { review, author })
        .ok_or(ApiError::NotFound("Review"))
}

pub fn review_exists_for(conn: &mut PgConnection, author_id: i32, title_id: i32) -> Result<bool> {
    let found: Option<i32> = reviews::table
        .filter(reviews::author_id.eq(author_id))
        .filter(reviews::title_id.eq(title_id))
        .select(reviews::id)
        .first(conn)
        .optional()?;
    Ok(found.is_some())
}

/// Inserts a review, rejecting a second one by the same author on the same
/// title. The unique constraint covers inserts racing past the check.
pub fn create_review(conn: &mut PgConnection, new_review: NewReview) -> Result<Review> {
    titles::find_title(conn, new_review.title_id)?;
    if review_exists_for(conn, new_review.author_id, new_review.title_id)? {
        return Err(ApiError::field(NON_FIELD_ERRORS, DUPLICATE_REVIEW));
    }

    diesel::insert_into(reviews::table)
        .values(&new_review)
        .returning(Review::as_returning())
        .get_result(conn)
        .map_err(|e| match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                ApiError::field(NON_FIELD_ERRORS, DUPLICATE_REVIEW)
            }
            other => ApiError::from(other),
        })
}

pub fn update_review(
    conn: &mut PgConnection,
    review: &Review,
    changes: ReviewChangeset,
) -> Result<Review> {
    if changes.text.is_none() && changes.score.is_none() {
        return Ok(review.clone());
    }
    Ok(diesel::update(reviews::table.find(review.id))
        .set(&changes)
        .returning(Review::as_returning())
        .get_result(conn)?)
}

pub fn delete_review(conn: &mut PgConnection, review_id: i32) -> Result<()> {
    let deleted = diesel::delete(reviews::table.find(review_id)).execute(conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("Review"));
    }
    Ok(())
}

pub fn list_comments(
    conn: &mut PgConnection,
    title_id: i32,
    review_id: i32,
) -> Result<Vec<CommentRecord>> {
    find_review(conn, title_id, review_id)?;

    let rows: Vec<(Comment, String)> = comments::table
        .inner_join(users::table)
        .filter(comments::review_id.eq(review_id))
        .order(comments::pub_date.asc())
        .select((comments::all_columns, users::username))
        .load(conn)?;
    Ok(rows
        .into_iter()
        .map(|(comment, author)| CommentRecord { comment, author })
        .collect())
}

pub fn find_comment(
    conn: &mut PgConnection,
    title_id: i32,
    review_id: i32,
    comment_id: i32,
) -> Result<CommentRecord> {
    find_review(conn, title_id, review_id)?;

    comments::table
        .inner_join(users::table)
        .filter(comments::id.eq(comment_id))
        .filter(comments::review_id.eq(review_id))
        .select((comments::all_columns, users::username))
        .first::<(Comment, String)>(conn)
        .optional()?
        .map(|(comment, author)| CommentRecord { comment, author })
        .ok_or(ApiError::NotFound("Comment"))
}

pub fn create_comment(conn: &mut PgConnection, new_comment: NewComment) -> Result<Comment> {
    find_review(conn, new_comment.title_id, new_comment.review_id)?;

    Ok(diesel::insert_into(comments::table)
        .values(&new_comment)
        .returning(Comment::as_returning())
        .get_result(conn)?)
}

pub fn update_comment(
    conn: &mut PgConnection,
    comment: &Comment,
    text: Option<String>,
) -> Result<Comment> {
    let Some(text) = text else {
        return Ok(comment.clone());
    };
    Ok(diesel::update(comments::table.find(comment.id))
        .set(comments::text.eq(text))
        .returning(Comment::as_returning())
        .get_result(conn)?)
}

pub fn delete_comment(conn: &mut PgConnection, comment_id: i32) -> Result<()> {
    let deleted = diesel::delete(comments::table.find(comment_id)).execute(conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("Comment"));
    }
    Ok(())
}
