use anyhow::anyhow;
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use diesel::{
    BelongingToDsl, Connection, ExpressionMethods, OptionalExtension, PgConnection,
    PgTextExpressionMethods, QueryDsl, RunQueryDsl, SelectableHelper,
};
use rand::Rng;

use crate::errors::{ApiError, FieldErrors, Result};
use crate::model::{ConfirmationCode, NewConfirmationCode, NewUser, Role, User, UserChangeset};

pub const CONFIRMATION_CODE_LEN: usize = 16;
pub const USERNAME_TAKEN: &str = "A user with that username already exists.";
pub const EMAIL_TAKEN: &str = "A user with that email already exists.";
pub const INVALID_CONFIRMATION_CODE: &str = "Invalid or expired confirmation code.";

#[cfg(not(test))]
const CODE_HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const CODE_HASH_COST: u32 = 4;

pub fn generate_confirmation_code() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(CONFIRMATION_CODE_LEN)
        .map(char::from)
        .collect()
}

pub fn find_by_id(conn: &mut PgConnection, user_id: i32) -> Result<User> {
    use crate::schema::users::dsl::*;

    users
        .filter(id.eq(user_id))
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or(ApiError::NotFound("User"))
}

pub fn find_by_username(conn: &mut PgConnection, name: &str) -> Result<User> {
    use crate::schema::users::dsl::*;

    users
        .filter(username.eq(name))
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or(ApiError::NotFound("User"))
}

pub fn list(conn: &mut PgConnection, search: Option<String>) -> Result<Vec<User>> {
    use crate::schema::users::dsl::*;

    let mut query = users.select(User::as_select()).order(username.asc()).into_boxed();
    if let Some(search) = search {
        query = query.filter(username.ilike(super::contains_pattern(&search)));
    }
    Ok(query.load(conn)?)
}

/// Field errors for a username/email already held by a user other than `except`.
fn uniqueness_errors(
    conn: &mut PgConnection,
    new_username: Option<&str>,
    new_email: Option<&str>,
    except: Option<i32>,
) -> Result<FieldErrors> {
    use crate::schema::users::dsl::*;

    let mut errors = FieldErrors::new();
    if let Some(new_username) = new_username {
        let holder: Option<i32> = users
            .filter(username.eq(new_username))
            .select(id)
            .first(conn)
            .optional()?;
        if holder.is_some() && holder != except {
            errors.add("username", USERNAME_TAKEN);
        }
    }
    if let Some(new_email) = new_email {
        let holder: Option<i32> = users
            .filter(email.eq(new_email))
            .select(id)
            .first(conn)
            .optional()?;
        if holder.is_some() && holder != except {
            errors.add("email", EMAIL_TAKEN);
        }
    }
    Ok(errors)
}

pub fn create(conn: &mut PgConnection, new_user: NewUser) -> Result<User> {
    use crate::schema::users::dsl::*;

    uniqueness_errors(conn, Some(&new_user.username), Some(&new_user.email), None)?
        .into_result()?;

    let user = diesel::insert_into(users)
        .values(&new_user)
        .returning(User::as_returning())
        .get_result(conn)?;
    Ok(user)
}

pub fn update(conn: &mut PgConnection, user: &User, changes: UserChangeset) -> Result<User> {
    use crate::schema::users::dsl::*;

    if changes.is_empty() {
        return Ok(user.clone());
    }
    uniqueness_errors(
        conn,
        changes.username.as_deref(),
        changes.email.as_deref(),
        Some(user.id),
    )?
    .into_result()?;

    let updated = diesel::update(users.filter(id.eq(user.id)))
        .set(&changes)
        .returning(User::as_returning())
        .get_result(conn)?;
    Ok(updated)
}

pub fn delete(conn: &mut PgConnection, name: &str) -> Result<()> {
    use crate::schema::users::dsl::*;

    let deleted = diesel::delete(users.filter(username.eq(name))).execute(conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("User"));
    }
    Ok(())
}

/// Gets or creates the user for the exact (username, email) pair and issues a
/// fresh confirmation code, revoking any code still outstanding. Returns the
/// user and the plain code, which is only ever stored hashed.
pub fn signup(
    conn: &mut PgConnection,
    new_username: &str,
    new_email: &str,
    code_ttl_min: i64,
) -> Result<(User, String)> {
    use crate::schema::confirmation_codes::dsl as codes;
    use crate::schema::users::dsl::*;

    conn.transaction::<_, ApiError, _>(|conn| {
        let existing = users
            .filter(username.eq(new_username))
            .select(User::as_select())
            .first(conn)
            .optional()?;

        let user = match existing {
            Some(user) if user.email == new_email => user,
            Some(_) => return Err(ApiError::field("username", USERNAME_TAKEN)),
            None => {
                let new_user = NewUser {
                    username: new_username.to_string(),
                    email: new_email.to_string(),
                    ..Default::default()
                };
                let user = create(conn, new_user)?;
                log::info!("Created user {}", user.username);
                user
            }
        };

        let now = Utc::now().naive_utc();
        diesel::update(
            codes::confirmation_codes
                .filter(codes::user_id.eq(user.id))
                .filter(codes::used_at.is_null()),
        )
        .set(codes::used_at.eq(now))
        .execute(conn)?;

        let code = generate_confirmation_code();
        let code_hash =
            hash(&code, CODE_HASH_COST).map_err(|e| anyhow!("Failed to hash confirmation code: {}", e))?;
        diesel::insert_into(codes::confirmation_codes)
            .values(NewConfirmationCode {
                user_id: user.id,
                code_hash,
                expires_at: now + Duration::minutes(code_ttl_min),
            })
            .execute(conn)?;

        Ok((user, code))
    })
}

/// Consumes a live confirmation code of `name`. Unknown users are `NotFound`;
/// a wrong, expired or already used code is a field error.
pub fn redeem_confirmation_code(conn: &mut PgConnection, name: &str, code: &str) -> Result<User> {
    use crate::schema::confirmation_codes::dsl::*;

    conn.transaction::<_, ApiError, _>(|conn| {
        let user = find_by_username(conn, name)?;
        let now = Utc::now().naive_utc();

        let candidates = ConfirmationCode::belonging_to(&user)
            .filter(used_at.is_null())
            .filter(expires_at.gt(now))
            .order(created_at.desc())
            .select(ConfirmationCode::as_select())
            .for_update()
            .load(conn)?;

        let matching = candidates
            .into_iter()
            .find(|candidate| verify(code, &candidate.code_hash).unwrap_or(false));

        match matching {
            Some(candidate) => {
                diesel::update(confirmation_codes.filter(id.eq(candidate.id)))
                    .set(used_at.eq(now))
                    .execute(conn)?;
                Ok(user)
            }
            None => {
                log::warn!("Rejected confirmation code for {}", user.username);
                Err(ApiError::field("confirmation_code", INVALID_CONFIRMATION_CODE))
            }
        }
    })
}

/// Gets or promotes the configured superuser.
pub fn ensure_superuser(conn: &mut PgConnection, name: &str, mail: &str) -> Result<User> {
    use crate::schema::users::dsl::*;

    conn.transaction::<_, ApiError, _>(|conn| {
        let existing = users
            .filter(username.eq(name))
            .select(User::as_select())
            .first(conn)
            .optional()?;

        match existing {
            Some(user) => Ok(diesel::update(users.filter(id.eq(user.id)))
                .set((is_superuser.eq(true), role.eq(Role::Admin)))
                .returning(User::as_returning())
                .get_result(conn)?),
            None => create(
                conn,
                NewUser {
                    username: name.to_string(),
                    email: mail.to_string(),
                    role: Role::Admin,
                    is_superuser: true,
                    ..Default::default()
                },
            ),
        }
    })
}
