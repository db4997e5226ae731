//! Request permission predicates.
//!
//! Each predicate answers two questions: may the caller act on the collection
//! at all, and may the caller act on one particular object. Failures are
//! turned into `401` for anonymous callers and `403` otherwise by [`check`]
//! and [`check_object`].

use actix_web::http::Method;

use crate::auth::Caller;
use crate::errors::ApiError;
use crate::model::{Comment, Review};

/// Methods that never modify state.
pub fn is_read_only(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS
}

/// Objects that can be owned by a user.
pub trait Authored {
    fn author_id(&self) -> Option<i32> {
        None
    }
}

impl Authored for Review {
    fn author_id(&self) -> Option<i32> {
        Some(self.author_id)
    }
}

impl Authored for Comment {
    fn author_id(&self) -> Option<i32> {
        Some(self.author_id)
    }
}

/// Targets without an author, e.g. titles and taxonomy entries.
pub struct Unowned;

impl Authored for Unowned {}

pub trait Permission {
    fn has_permission(&self, caller: &Caller, method: &Method) -> bool;

    fn has_object_permission(&self, caller: &Caller, method: &Method, _target: &dyn Authored) -> bool {
        self.has_permission(caller, method)
    }
}

/// Reads are public; writes on an object require its author, a moderator,
/// an admin or a superuser.
pub struct OwnerOrPrivileged;

impl Permission for OwnerOrPrivileged {
    fn has_permission(&self, caller: &Caller, method: &Method) -> bool {
        match caller {
            Caller::Anonymous => is_read_only(method),
            Caller::User(_) => true,
        }
    }

    fn has_object_permission(&self, caller: &Caller, method: &Method, target: &dyn Authored) -> bool {
        match caller {
            Caller::Anonymous => is_read_only(method),
            Caller::User(user) => {
                is_read_only(method)
                    || target.author_id() == Some(user.id)
                    || user.role.is_privileged()
                    || user.is_superuser
            }
        }
    }
}

/// Reads are public; writes require an admin or a superuser.
pub struct AdminOrReadOnly;

impl Permission for AdminOrReadOnly {
    fn has_permission(&self, caller: &Caller, method: &Method) -> bool {
        match caller {
            Caller::Anonymous => is_read_only(method),
            Caller::User(user) => is_read_only(method) || user.is_admin(),
        }
    }
}

/// Everything requires an admin or a superuser.
pub struct AdminOnly;

impl Permission for AdminOnly {
    fn has_permission(&self, caller: &Caller, _method: &Method) -> bool {
        match caller {
            Caller::Anonymous => false,
            Caller::User(user) => user.is_admin(),
        }
    }
}

fn denied(caller: &Caller) -> ApiError {
    match caller {
        Caller::Anonymous => ApiError::Unauthorized,
        Caller::User(_) => ApiError::Forbidden,
    }
}

pub fn check(permission: &impl Permission, caller: &Caller, method: &Method) -> Result<(), ApiError> {
    if permission.has_permission(caller, method) {
        Ok(())
    } else {
        Err(denied(caller))
    }
}

pub fn check_object(
    permission: &impl Permission,
    caller: &Caller,
    method: &Method,
    target: &dyn Authored,
) -> Result<(), ApiError> {
    check(permission, caller, method)?;
    if permission.has_object_permission(caller, method, target) {
        Ok(())
    } else {
        Err(denied(caller))
    }
}
