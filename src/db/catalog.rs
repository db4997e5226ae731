use diesel::{
    ExpressionMethods, OptionalExtension, PgConnection, PgTextExpressionMethods, QueryDsl,
    RunQueryDsl, SelectableHelper,
};

use crate::errors::{ApiError, FieldErrors, Result};
use crate::model::{Category, Genre, NewCategory, NewGenre};

pub const SLUG_TAKEN: &str = "An object with this slug already exists.";

pub fn list_genres(conn: &mut PgConnection, search: Option<String>) -> Result<Vec<Genre>> {
    use crate::schema::genres::dsl::*;

    let mut query = genres.select(Genre::as_select()).order(name.asc()).into_boxed();
    if let Some(search) = search {
        query = query.filter(name.ilike(super::contains_pattern(&search)));
    }
    Ok(query.load(conn)?)
}

pub fn create_genre(conn: &mut PgConnection, new_genre: NewGenre) -> Result<Genre> {
    use crate::schema::genres::dsl::*;

    let taken = genres
        .filter(slug.eq(&new_genre.slug))
        .select(id)
        .first::<i32>(conn)
        .optional()?;
    if taken.is_some() {
        return Err(ApiError::field("slug", SLUG_TAKEN));
    }

    Ok(diesel::insert_into(genres)
        .values(&new_genre)
        .returning(Genre::as_returning())
        .get_result(conn)?)
}

pub fn delete_genre(conn: &mut PgConnection, genre_slug: &str) -> Result<()> {
    use crate::schema::genres::dsl::*;

    let deleted = diesel::delete(genres.filter(slug.eq(genre_slug))).execute(conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("Genre"));
    }
    Ok(())
}

/// Resolves every slug; unknown ones are reported as `genre` field errors.
pub fn genres_by_slugs(conn: &mut PgConnection, slugs: &[String]) -> Result<Vec<Genre>> {
    use crate::schema::genres::dsl::*;

    let found = genres
        .filter(slug.eq_any(slugs))
        .select(Genre::as_select())
        .load(conn)?;

    let mut errors = FieldErrors::new();
    for wanted in slugs {
        if !found.iter().any(|genre| &genre.slug == wanted) {
            errors.add("genre", missing_slug(wanted));
        }
    }
    errors.into_result()?;
    Ok(found)
}

pub fn missing_slug(wanted: &str) -> String {
    format!("Object with slug={} does not exist.", wanted)
}

pub fn list_categories(conn: &mut PgConnection, search: Option<String>) -> Result<Vec<Category>> {
    use crate::schema::categories::dsl::*;

    let mut query = categories
        .select(Category::as_select())
        .order(name.asc())
        .into_boxed();
    if let Some(search) = search {
        query = query.filter(name.ilike(super::contains_pattern(&search)));
    }
    Ok(query.load(conn)?)
}

pub fn create_category(conn: &mut PgConnection, new_category: NewCategory) -> Result<Category> {
    use crate::schema::categories::dsl::*;

    let taken = categories
        .filter(slug.eq(&new_category.slug))
        .select(id)
        .first::<i32>(conn)
        .optional()?;
    if taken.is_some() {
        return Err(ApiError::field("slug", SLUG_TAKEN));
    }

    Ok(diesel::insert_into(categories)
        .values(&new_category)
        .returning(Category::as_returning())
        .get_result(conn)?)
}

pub fn delete_category(conn: &mut PgConnection, category_slug: &str) -> Result<()> {
    use crate::schema::categories::dsl::*;

    let deleted = diesel::delete(categories.filter(slug.eq(category_slug))).execute(conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("Category"));
    }
    Ok(())
}

pub fn category_by_slug(conn: &mut PgConnection, category_slug: &str) -> Result<Option<Category>> {
    use crate::schema::categories::dsl::*;

    Ok(categories
        .filter(slug.eq(category_slug))
        .select(Category::as_select())
        .first(conn)
        .optional()?)
}
