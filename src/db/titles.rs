use std::collections::HashMap;

use diesel::{
    Connection, ExpressionMethods, NullableExpressionMethods, OptionalExtension, PgConnection,
    QueryDsl, RunQueryDsl, SelectableHelper, TextExpressionMethods,
};

use crate::db::catalog;
use crate::errors::{ApiError, FieldErrors, Result, NON_FIELD_ERRORS};
use crate::model::{Category, Genre, NewGenreTitle, NewTitle, Title, TitleChangeset};
use crate::schema::{categories, genre_titles, genres, reviews, titles};

/// A title with its category, genres and mean review score.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleRecord {
    pub title: Title,
    pub category: Option<Category>,
    pub genres: Vec<Genre>,
    pub rating: Option<f64>,
}

#[derive(Debug, Default, Clone)]
pub struct TitleFilter {
    pub name: Option<String>,
    pub year: Option<i32>,
    pub category: Option<String>,
    pub genre: Option<String>,
}

/// Title fields as submitted, with the category and genres given by slug.
#[derive(Debug, Default, Clone)]
pub struct TitleInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub year: Option<i32>,
    pub category: Option<String>,
    pub genre: Option<Vec<String>>,
}

/// Mean score per title id. Titles without reviews are absent.
pub fn average_scores(scores: &[(i32, i32)]) -> HashMap<i32, f64> {
    let mut sums: HashMap<i32, (i64, i64)> = HashMap::new();
    for &(title_id, score) in scores {
        let entry = sums.entry(title_id).or_insert((0, 0));
        entry.0 += i64::from(score);
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(title_id, (sum, count))| (title_id, sum as f64 / count as f64))
        .collect()
}

pub fn list(conn: &mut PgConnection, filter: TitleFilter) -> Result<Vec<TitleRecord>> {
    let mut query = titles::table
        .select(Title::as_select())
        .order((titles::year.asc(), titles::id.asc()))
        .into_boxed();

    if let Some(name) = filter.name {
        query = query.filter(titles::name.like(super::contains_pattern(&name)));
    }
    if let Some(year) = filter.year {
        query = query.filter(titles::year.eq(year));
    }
    if let Some(category) = filter.category {
        query = query.filter(
            titles::category_id.eq_any(
                categories::table
                    .filter(categories::slug.like(super::contains_pattern(&category)))
                    .select(categories::id.nullable()),
            ),
        );
    }
    if let Some(genre) = filter.genre {
        query = query.filter(
            titles::id.eq_any(
                genre_titles::table
                    .inner_join(genres::table)
                    .filter(genres::slug.like(super::contains_pattern(&genre)))
                    .select(genre_titles::title_id),
            ),
        );
    }

    let found = query.load(conn)?;
    hydrate(conn, found)
}

pub fn find(conn: &mut PgConnection, title_id: i32) -> Result<TitleRecord> {
    let title = find_title(conn, title_id)?;
    hydrate(conn, vec![title])?
        .pop()
        .ok_or(ApiError::NotFound("Title"))
}

pub fn find_title(conn: &mut PgConnection, title_id: i32) -> Result<Title> {
    titles::table
        .find(title_id)
        .select(Title::as_select())
        .first(conn)
        .optional()?
        .ok_or(ApiError::NotFound("Title"))
}

fn hydrate(conn: &mut PgConnection, found: Vec<Title>) -> Result<Vec<TitleRecord>> {
    let title_ids: Vec<i32> = found.iter().map(|title| title.id).collect();
    let category_ids: Vec<i32> = found.iter().filter_map(|title| title.category_id).collect();

    let found_categories: HashMap<i32, Category> = categories::table
        .filter(categories::id.eq_any(&category_ids))
        .select(Category::as_select())
        .load(conn)?
        .into_iter()
        .map(|category| (category.id, category))
        .collect();

    let links: Vec<(i32, Genre)> = genre_titles::table
        .inner_join(genres::table)
        .filter(genre_titles::title_id.eq_any(&title_ids))
        .order(genres::name.asc())
        .select((genre_titles::title_id, genres::all_columns))
        .load(conn)?;
    let mut genres_by_title: HashMap<i32, Vec<Genre>> = HashMap::new();
    for (title_id, genre) in links {
        genres_by_title.entry(title_id).or_default().push(genre);
    }

    let scores: Vec<(i32, i32)> = reviews::table
        .filter(reviews::title_id.eq_any(&title_ids))
        .select((reviews::title_id, reviews::score))
        .load(conn)?;
    let ratings = average_scores(&scores);

    Ok(found
        .into_iter()
        .map(|title| TitleRecord {
            category: title
                .category_id
                .and_then(|category_id| found_categories.get(&category_id).cloned()),
            genres: genres_by_title.remove(&title.id).unwrap_or_default(),
            rating: ratings.get(&title.id).copied(),
            title,
        })
        .collect())
}

/// Resolves the category and genre slugs of `input`, reporting every unknown
/// slug at once.
fn resolve_relations(
    conn: &mut PgConnection,
    input: &TitleInput,
) -> Result<(Option<Category>, Option<Vec<Genre>>)> {
    let mut errors = FieldErrors::new();

    let category = match &input.category {
        Some(slug) => {
            let category = catalog::category_by_slug(conn, slug)?;
            if category.is_none() {
                errors.add("category", catalog::missing_slug(slug));
            }
            category
        }
        None => None,
    };

    let genres = match &input.genre {
        Some(slugs) => match catalog::genres_by_slugs(conn, slugs) {
            Ok(genres) => Some(genres),
            Err(ApiError::Validation(genre_errors)) => {
                for message in genre_errors.get("genre").cloned().unwrap_or_default() {
                    errors.add("genre", message);
                }
                None
            }
            Err(other) => return Err(other),
        },
        None => None,
    };

    errors.into_result()?;
    Ok((category, genres))
}

fn link_genres(conn: &mut PgConnection, title_id: i32, genres: &[Genre]) -> Result<()> {
    diesel::delete(genre_titles::table.filter(genre_titles::title_id.eq(title_id))).execute(conn)?;
    let links: Vec<NewGenreTitle> = genres
        .iter()
        .map(|genre| NewGenreTitle {
            genre_id: genre.id,
            title_id,
        })
        .collect();
    diesel::insert_into(genre_titles::table)
        .values(&links)
        .on_conflict_do_nothing()
        .execute(conn)?;
    Ok(())
}

/// Inserts a title. `name` and `year` are required and already validated.
pub fn create(conn: &mut PgConnection, input: TitleInput) -> Result<TitleRecord> {
    conn.transaction::<_, ApiError, _>(|conn| {
        let (category, genres) = resolve_relations(conn, &input)?;
        let (Some(name), Some(year)) = (input.name, input.year) else {
            return Err(ApiError::field(
                NON_FIELD_ERRORS,
                "name and year are required.",
            ));
        };

        let title = diesel::insert_into(titles::table)
            .values(NewTitle {
                name,
                description: input.description,
                year,
                category_id: category.map(|category| category.id),
            })
            .returning(Title::as_returning())
            .get_result(conn)?;
        link_genres(conn, title.id, &genres.unwrap_or_default())?;

        find(conn, title.id)
    })
}

pub fn update(conn: &mut PgConnection, title_id: i32, input: TitleInput) -> Result<TitleRecord> {
    conn.transaction::<_, ApiError, _>(|conn| {
        find_title(conn, title_id)?;
        let (category, genres) = resolve_relations(conn, &input)?;

        let changes = TitleChangeset {
            name: input.name,
            description: input.description,
            year: input.year,
            category_id: category.map(|category| category.id),
        };
        if !changes.is_empty() {
            diesel::update(titles::table.find(title_id))
                .set(&changes)
                .execute(conn)?;
        }
        if let Some(genres) = genres {
            link_genres(conn, title_id, &genres)?;
        }

        find(conn, title_id)
    })
}

pub fn delete(conn: &mut PgConnection, title_id: i32) -> Result<()> {
    let deleted = diesel::delete(titles::table.find(title_id)).execute(conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("Title"));
    }
    Ok(())
}
