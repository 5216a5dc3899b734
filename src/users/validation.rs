use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{AppError, FieldError};
use crate::users::{
    dto::{CreateUserRequest, Pagination, UpdateUserRequest},
    repo_types::{NewUser, Role, UserChanges},
};

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 50;
pub const NAME_MAX: usize = 50;
pub const EMAIL_MAX: usize = 254;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        // dot-atom local part; dotted domain of hyphen-inner labels
        static ref EMAIL_RE: Regex = Regex::new(
            r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?\.)+[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?$"
        )
        .unwrap();
    }
    email.chars().count() <= EMAIL_MAX && EMAIL_RE.is_match(email)
}

/// Accumulates field errors so a client sees every problem at once.
#[derive(Default)]
struct Errors(Vec<FieldError>);

impl Errors {
    fn username(&mut self, v: &str) {
        let n = v.chars().count();
        if n < USERNAME_MIN {
            self.0.push(FieldError::body(
                "username",
                "string_too_short",
                format!("String should have at least {USERNAME_MIN} characters"),
            ));
        } else if n > USERNAME_MAX {
            self.0.push(FieldError::body(
                "username",
                "string_too_long",
                format!("String should have at most {USERNAME_MAX} characters"),
            ));
        }
    }

    fn email(&mut self, v: &str) {
        if !is_valid_email(v) {
            self.0.push(FieldError::body(
                "email",
                "value_error",
                "value is not a valid email address",
            ));
        }
    }

    fn name(&mut self, field: &str, v: Option<&str>) {
        if v.is_some_and(|s| s.chars().count() > NAME_MAX) {
            self.0.push(FieldError::body(
                field,
                "string_too_long",
                format!("String should have at most {NAME_MAX} characters"),
            ));
        }
    }

    fn role(&mut self, v: &str) -> Option<Role> {
        match v.parse::<Role>() {
            Ok(role) => Some(role),
            Err(_) => {
                self.0.push(FieldError::body(
                    "role",
                    "string_pattern_mismatch",
                    "String should match pattern '^(admin|user|guest)$'",
                ));
                None
            }
        }
    }

    fn finish<T>(self, value: T) -> Result<T, AppError> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(AppError::Validation(self.0))
        }
    }
}

pub fn validate_create(req: CreateUserRequest) -> Result<NewUser, AppError> {
    let mut errs = Errors::default();
    let email = req.email.trim().to_string();
    errs.username(&req.username);
    errs.email(&email);
    errs.name("first_name", req.first_name.as_deref());
    errs.name("last_name", req.last_name.as_deref());
    let role = match req.role.as_deref() {
        Some(r) => errs.role(r).unwrap_or_default(),
        None => Role::default(),
    };

    errs.finish(NewUser {
        username: req.username,
        email,
        first_name: req.first_name,
        last_name: req.last_name,
        role,
        active: req.active.unwrap_or(true),
    })
}

pub fn validate_update(req: UpdateUserRequest) -> Result<UserChanges, AppError> {
    let mut errs = Errors::default();
    let email = req.email.map(|e| e.trim().to_string());
    if let Some(u) = &req.username {
        errs.username(u);
    }
    if let Some(e) = &email {
        errs.email(e);
    }
    if let Some(v) = &req.first_name {
        errs.name("first_name", v.as_deref());
    }
    if let Some(v) = &req.last_name {
        errs.name("last_name", v.as_deref());
    }
    let role = req.role.as_deref().and_then(|r| errs.role(r));

    errs.finish(UserChanges {
        username: req.username,
        email,
        first_name: req.first_name,
        last_name: req.last_name,
        role,
        active: req.active,
    })
}

pub fn validate_page(p: &Pagination) -> Result<(), AppError> {
    let mut errors = Vec::new();
    if p.skip < 0 {
        errors.push(FieldError::query(
            "skip",
            "greater_than_equal",
            "Input should be greater than or equal to 0",
        ));
    }
    if p.limit < 0 {
        errors.push(FieldError::query(
            "limit",
            "greater_than_equal",
            "Input should be greater than or equal to 0",
        ));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}
