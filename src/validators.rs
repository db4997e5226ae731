use chrono::{Datelike, Local};
use once_cell::sync::Lazy;
use regex::Regex;

pub const RESERVED_USERNAME: &str = "me";
pub const MAX_USERNAME_LEN: usize = 150;
pub const MAX_PERSON_NAME_LEN: usize = 150;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_NAME_LEN: usize = 200;
pub const MAX_SLUG_LEN: usize = 50;
pub const MAX_DESCRIPTION_LEN: usize = 200;
pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 10;

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.@+-]+$").expect("valid regex"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));
static SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("valid regex"));

pub fn current_year() -> i32 {
    Local::now().year()
}

pub fn validate_year(year: i32, current_year: i32) -> Result<(), String> {
    if year < 0 {
        return Err("Year must not be negative.".to_string());
    }
    if year > current_year {
        return Err("Release year is later than the current year.".to_string());
    }
    Ok(())
}

pub fn validate_score(score: i32) -> Result<(), String> {
    if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(format!(
            "Score must be between {} and {}.",
            MIN_SCORE, MAX_SCORE
        ));
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), String> {
    if username == RESERVED_USERNAME {
        return Err(format!("The username \"{}\" is reserved.", RESERVED_USERNAME));
    }
    if username.is_empty() {
        return Err("This field may not be blank.".to_string());
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(format!(
            "Ensure this field has no more than {} characters.",
            MAX_USERNAME_LEN
        ));
    }
    if !USERNAME_RE.is_match(username) {
        return Err(
            "Enter a valid username. It may contain only letters, numbers, and @/./+/-/_ characters."
                .to_string(),
        );
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.chars().count() > MAX_EMAIL_LEN {
        return Err(format!(
            "Ensure this field has no more than {} characters.",
            MAX_EMAIL_LEN
        ));
    }
    if !EMAIL_RE.is_match(email) {
        return Err("Enter a valid email address.".to_string());
    }
    Ok(())
}

pub fn validate_slug(slug: &str) -> Result<(), String> {
    if slug.chars().count() > MAX_SLUG_LEN {
        return Err(format!(
            "Ensure this field has no more than {} characters.",
            MAX_SLUG_LEN
        ));
    }
    if !SLUG_RE.is_match(slug) {
        return Err(
            "Enter a valid slug consisting of letters, numbers, underscores or hyphens."
                .to_string(),
        );
    }
    Ok(())
}

pub fn validate_max_len(value: &str, max: usize) -> Result<(), String> {
    if value.chars().count() > max {
        return Err(format!(
            "Ensure this field has no more than {} characters.",
            max
        ));
    }
    Ok(())
}

pub fn validate_not_blank(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err("This field may not be blank.".to_string());
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), String> {
    validate_not_blank(name)?;
    validate_max_len(name, MAX_NAME_LEN)
}
