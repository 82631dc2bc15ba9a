//! Client-side validation of user input before it is sent to the API.

use crate::api::Multipart;
use crate::models::Orchid;
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::PathBuf;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\S+@\S+\.\S+$").expect("email pattern"));
static WEB_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(https?://|www\.)[a-z0-9][a-z0-9-]*\.\S{2,}").expect("url pattern"));

/// A problem with one input field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub type Validation = std::result::Result<(), Vec<FieldError>>;

#[derive(Default)]
struct Errors(Vec<FieldError>);

impl Errors {
    fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    fn finish(self) -> Validation {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self.0)
        }
    }
}

/// Join field errors into one line per problem
pub fn describe(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn validate_login(username: &str, password: &str) -> Validation {
    let mut errors = Errors::default();
    if username.trim().is_empty() {
        errors.add("username", "username is required");
    }
    if password.is_empty() {
        errors.add("password", "password is required");
    } else if password.chars().count() < 3 {
        errors.add("password", "password must be at least 3 characters");
    }
    errors.finish()
}

pub fn validate_registration(name: &str, email: &str, password: &str, confirm: &str) -> Validation {
    let mut errors = Errors::default();
    let name_len = name.trim().chars().count();
    if name_len == 0 {
        errors.add("accountName", "account name is required");
    } else if name_len < 2 {
        errors.add("accountName", "account name must be at least 2 characters");
    } else if name_len > 50 {
        errors.add("accountName", "account name must be at most 50 characters");
    }

    if email.trim().is_empty() {
        errors.add("email", "email is required");
    } else if !EMAIL_RE.is_match(email.trim()) {
        errors.add("email", "please enter a valid email address");
    }

    let password_len = password.chars().count();
    if password_len == 0 {
        errors.add("password", "password is required");
    } else if password_len < 3 {
        errors.add("password", "password must be at least 3 characters");
    } else if password_len > 50 {
        errors.add("password", "password must be at most 50 characters");
    }

    if confirm.is_empty() {
        errors.add("confirmPassword", "please confirm your password");
    } else if confirm != password {
        errors.add("confirmPassword", "passwords do not match");
    }
    errors.finish()
}

pub fn validate_category_name(name: &str) -> Validation {
    let mut errors = Errors::default();
    let len = name.trim().chars().count();
    if len == 0 {
        errors.add("categoryName", "category name is required");
    } else if len > 100 {
        errors.add("categoryName", "category name must be at most 100 characters");
    }
    errors.finish()
}

pub fn validate_quantity(quantity: i64) -> Validation {
    let mut errors = Errors::default();
    if quantity < 1 {
        errors.add("quantity", "quantity must be at least 1");
    }
    errors.finish()
}

pub fn validate_employee(name: &str, url: &str, designation: &str) -> Validation {
    let mut errors = Errors::default();
    if name.trim().is_empty() {
        errors.add("name", "name is required");
    }
    if url.trim().is_empty() {
        errors.add("url", "image url is required");
    } else if !WEB_URL_RE.is_match(url.trim()) {
        errors.add("url", "image url must start with http(s):// or www.");
    }
    if designation.trim().is_empty() {
        errors.add("designation", "designation is required");
    }
    errors.finish()
}

/// Orchid fields collected from `key=value` arguments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrchidForm {
    pub name: String,
    pub description: String,
    pub price: String,
    pub is_natural: bool,
    pub category_id: String,
    pub image: Option<PathBuf>,
}

impl OrchidForm {
    /// Start an edit from the stored orchid. The image is kept unless a new
    /// file is given.
    pub fn from_orchid(orchid: &Orchid) -> Self {
        Self {
            name: orchid.orchid_name.clone(),
            description: orchid.description().to_string(),
            price: orchid.price.to_string(),
            is_natural: orchid.is_natural.unwrap_or(false),
            category_id: orchid.category_id.map(|id| id.to_string()).unwrap_or_default(),
            image: None,
        }
    }

    /// Apply `key=value` pairs. Keys: name, description, price, natural,
    /// category, image.
    pub fn apply<S: AsRef<str>>(&mut self, pairs: &[S]) -> Validation {
        let mut errors = Errors::default();
        for pair in pairs {
            let pair = pair.as_ref();
            let Some((key, value)) = pair.split_once('=') else {
                errors.add("form", format!("expected key=value, got '{}'", pair));
                continue;
            };
            match key.trim() {
                "name" => self.name = value.to_string(),
                "description" | "desc" => self.description = value.to_string(),
                "price" => self.price = value.trim().to_string(),
                "category" | "categoryId" => self.category_id = value.trim().to_string(),
                "image" => self.image = Some(PathBuf::from(value.trim())),
                "natural" => match value.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" | "1" => self.is_natural = true,
                    "false" | "no" | "0" => self.is_natural = false,
                    _ => errors.add("isNatural", "natural must be true or false"),
                },
                other => errors.add("form", format!("unknown field '{}'", other)),
            }
        }
        errors.finish()
    }

    /// `creating` requires an image file.
    pub fn validate(&self, creating: bool) -> Validation {
        let mut errors = Errors::default();
        let name_len = self.name.trim().chars().count();
        if name_len == 0 {
            errors.add("orchidName", "orchid name is required");
        } else if name_len > 100 {
            errors.add("orchidName", "orchid name must be at most 100 characters");
        }

        let description_len = self.description.trim().chars().count();
        if description_len == 0 {
            errors.add("orchidDescription", "description is required");
        } else if description_len > 500 {
            errors.add("orchidDescription", "description must be at most 500 characters");
        }

        match self.price.parse::<f64>() {
            Ok(price) if price.is_finite() && price > 0.0 => {}
            _ => errors.add("price", "a price greater than 0 is required"),
        }

        if self.category_id.parse::<i64>().is_err() {
            errors.add("categoryId", "a category is required");
        }

        if creating && self.image.is_none() {
            errors.add("orchidUrl", "an image file is required");
        }
        errors.finish()
    }

    /// Build the multipart body. Reads the image file when one is set.
    pub fn to_multipart(&self) -> Result<Multipart> {
        let form = Multipart::new()
            .text("orchidName", self.name.trim())
            .text("orchidDescription", self.description.trim())
            .text("price", &self.price)
            .text("isNatural", self.is_natural)
            .text("categoryId", &self.category_id);
        match &self.image {
            Some(path) => form.file("orchidUrl", path),
            None => Ok(form),
        }
    }
}
