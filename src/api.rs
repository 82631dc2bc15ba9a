//! REST client for the orchid catalog API.
//!
//! `Transport` moves JSON (or multipart forms) over HTTP and classifies
//! failures into `ApiError`; `Client` adds typed endpoints on top of it.

use crate::models::{
    Account, AccountRequest, AccountResponse, AccountUpdate, AuthResponse, Category,
    CategoryRequest, Employee, EmployeeRequest, LoginRequest, Order, OrderRequest, Orchid, Role,
};
use reqwest::blocking::multipart;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("session rejected by the server, please log in again")]
    Unauthorized,
    #[error("permission denied: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request rejected ({status}): {message}")]
    Validation { status: u16, message: String },
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("cannot reach the server: {0}")]
    Network(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("cannot read upload: {0}")]
    Upload(String),
}

impl ApiError {
    /// Classify a non-success status. The message comes from the body's
    /// `error` or `message` field, else the raw body text.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = server_message(body).unwrap_or_else(|| default_reason(status).to_string());
        match status {
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden(message),
            404 => ApiError::NotFound(message),
            400..=499 => ApiError::Validation { status, message },
            _ => ApiError::Server { status, message },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

fn server_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(body) {
        Ok(value) => ["error", "message"]
            .iter()
            .find_map(|key| value.get(key).and_then(|v| v.as_str()))
            .filter(|s| !s.is_empty())
            .map(String::from),
        Err(_) => Some(body.to_string()),
    }
}

fn default_reason(status: u16) -> &'static str {
    match status {
        400 => "bad request",
        403 => "forbidden",
        404 => "no such resource",
        409 => "conflict",
        500..=599 => "internal error",
        _ => "request failed",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(Value),
    Multipart(Multipart),
}

/// `multipart/form-data` body: text fields plus files attached by path.
/// Files are read when the form is sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Multipart {
    fields: Vec<(String, String)>,
    files: Vec<(String, PathBuf)>,
}

impl Multipart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: impl ToString) -> Self {
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    pub fn file(mut self, field: &str, path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            anyhow::bail!("cannot read image {}: no such file", path.display());
        }
        self.files.push((field.to_string(), path.to_path_buf()));
        Ok(self)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn files(&self) -> &[(String, PathBuf)] {
        &self.files
    }

    /// File name and content type are taken from the path.
    fn into_form(self) -> std::io::Result<multipart::Form> {
        let mut form = multipart::Form::new();
        for (name, value) in self.fields {
            form = form.text(name, value);
        }
        for (name, path) in self.files {
            form = form.file(name, path)?;
        }
        Ok(form)
    }
}

/// Trait for HTTP transports to allow mocking
pub trait Transport {
    /// Send a request to an absolute URL. `authorization` is the full header
    /// value. An empty success body comes back as `Value::Null`.
    fn send(
        &self,
        method: Method,
        url: &str,
        authorization: Option<&str>,
        body: Body,
    ) -> Result<Value, ApiError>;
}

/// JSON requests go through `ureq`; multipart uploads through `reqwest`.
pub struct HttpTransport {
    agent: ureq::Agent,
    uploads: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let uploads = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("cannot build upload client: {}", e))?;
        Ok(Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            uploads,
        })
    }

    fn upload(
        &self,
        method: Method,
        url: &str,
        authorization: Option<&str>,
        form: Multipart,
    ) -> Result<Value, ApiError> {
        let form = form
            .into_form()
            .map_err(|e| ApiError::Upload(e.to_string()))?;
        let mut request = self.uploads.request(http_method(method), url);
        if let Some(value) = authorization {
            request = request.header("Authorization", value);
        }

        let resp = request
            .multipart(form)
            .send()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let status = resp.status();
        let text = resp.text().map_err(|e| ApiError::Decode(e.to_string()))?;
        if !status.is_success() {
            debug!(status = status.as_u16(), "api error response");
            return Err(ApiError::from_status(status.as_u16(), &text));
        }
        Ok(parse_body(&text))
    }
}

fn http_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        method: Method,
        url: &str,
        authorization: Option<&str>,
        body: Body,
    ) -> Result<Value, ApiError> {
        debug!(method = method.as_str(), url = url, "api request");
        let mut request = self.agent.request(method.as_str(), url);
        if let Some(value) = authorization {
            request = request.set("Authorization", value);
        }

        let resp = match body {
            Body::Empty => request.call(),
            Body::Json(value) => request
                .set("Content-Type", "application/json")
                .send_json(value),
            Body::Multipart(form) => return self.upload(method, url, authorization, form),
        };

        match resp {
            Ok(r) => {
                let text = r
                    .into_string()
                    .map_err(|e| ApiError::Decode(e.to_string()))?;
                Ok(parse_body(&text))
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                debug!(status = code, "api error response");
                Err(ApiError::from_status(code, &body))
            }
            Err(e) => Err(ApiError::Network(e.to_string())),
        }
    }
}

/// JSON when possible; some endpoints answer with plain text.
fn parse_body(text: &str) -> Value {
    let text = text.trim();
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

fn json<T: Serialize>(body: &T) -> Result<Body, ApiError> {
    serde_json::to_value(body)
        .map(Body::Json)
        .map_err(|e| ApiError::Decode(e.to_string()))
}

pub struct Client {
    base_url: String,
    transport: Box<dyn Transport>,
}

impl Client {
    pub fn new(base_url: &str, transport: Box<dyn Transport>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn send(
        &self,
        method: Method,
        path: &str,
        auth: Option<&str>,
        body: Body,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        self.transport.send(method, &url, auth, body)
    }

    fn get<T: DeserializeOwned>(&self, path: &str, auth: Option<&str>) -> Result<T, ApiError> {
        decode(self.send(Method::Get, path, auth, Body::Empty)?)
    }

    /// Sign in and return the issued credential
    pub fn login(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let body = json(&LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })?;
        let resp: AuthResponse = decode(self.send(Method::Post, "/accounts/login", None, body)?)?;
        if resp.token.is_empty() {
            return Err(ApiError::Decode("login response has no token".to_string()));
        }
        Ok(resp.token)
    }

    pub fn register(&self, request: &AccountRequest) -> Result<AccountResponse, ApiError> {
        decode(self.send(Method::Post, "/accounts/register", None, json(request)?)?)
    }

    pub fn register_admin(
        &self,
        auth: Option<&str>,
        request: &AccountRequest,
    ) -> Result<Value, ApiError> {
        self.send(Method::Post, "/accounts/register/admin", auth, json(request)?)
    }

    pub fn accounts(&self, auth: Option<&str>) -> Result<Vec<Account>, ApiError> {
        self.get("/accounts", auth)
    }

    pub fn update_account(
        &self,
        auth: Option<&str>,
        id: i64,
        update: &AccountUpdate,
    ) -> Result<Value, ApiError> {
        self.send(Method::Put, &format!("/accounts/{}", id), auth, json(update)?)
    }

    pub fn delete_account(&self, auth: Option<&str>, id: i64) -> Result<(), ApiError> {
        self.send(Method::Delete, &format!("/accounts/{}", id), auth, Body::Empty)?;
        Ok(())
    }

    pub fn roles(&self, auth: Option<&str>) -> Result<Vec<Role>, ApiError> {
        self.get("/roles", auth)
    }

    pub fn orchids(&self, auth: Option<&str>) -> Result<Vec<Orchid>, ApiError> {
        self.get("/orchids", auth)
    }

    pub fn orchid(&self, auth: Option<&str>, id: &str) -> Result<Orchid, ApiError> {
        self.get(&format!("/orchids/{}", id), auth)
    }

    pub fn orchids_by_category(
        &self,
        auth: Option<&str>,
        category_id: i64,
    ) -> Result<Vec<Orchid>, ApiError> {
        self.get(&format!("/orchids/category/{}", category_id), auth)
    }

    pub fn create_orchid(&self, auth: Option<&str>, form: Multipart) -> Result<Value, ApiError> {
        self.send(Method::Post, "/orchids", auth, Body::Multipart(form))
    }

    pub fn update_orchid(
        &self,
        auth: Option<&str>,
        id: i64,
        form: Multipart,
    ) -> Result<Value, ApiError> {
        self.send(Method::Put, &format!("/orchids/{}", id), auth, Body::Multipart(form))
    }

    pub fn delete_orchid(&self, auth: Option<&str>, id: i64) -> Result<(), ApiError> {
        self.send(Method::Delete, &format!("/orchids/{}", id), auth, Body::Empty)?;
        Ok(())
    }

    pub fn categories(&self, auth: Option<&str>) -> Result<Vec<Category>, ApiError> {
        self.get("/categories", auth)
    }

    pub fn category(&self, auth: Option<&str>, id: i64) -> Result<Category, ApiError> {
        self.get(&format!("/categories/{}", id), auth)
    }

    pub fn create_category(&self, auth: Option<&str>, name: &str) -> Result<Value, ApiError> {
        let body = json(&CategoryRequest {
            category_name: name.to_string(),
        })?;
        self.send(Method::Post, "/categories", auth, body)
    }

    pub fn update_category(
        &self,
        auth: Option<&str>,
        id: i64,
        name: &str,
    ) -> Result<Value, ApiError> {
        let body = json(&CategoryRequest {
            category_name: name.to_string(),
        })?;
        self.send(Method::Put, &format!("/categories/{}", id), auth, body)
    }

    pub fn delete_category(&self, auth: Option<&str>, id: i64) -> Result<(), ApiError> {
        self.send(Method::Delete, &format!("/categories/{}", id), auth, Body::Empty)?;
        Ok(())
    }

    pub fn orders(&self, auth: Option<&str>) -> Result<Vec<Order>, ApiError> {
        self.get("/orders", auth)
    }

    pub fn my_orders(&self, auth: Option<&str>) -> Result<Vec<Order>, ApiError> {
        self.get("/orders/my", auth)
    }

    pub fn create_order(&self, auth: Option<&str>, order: &OrderRequest) -> Result<Value, ApiError> {
        self.send(Method::Post, "/orders", auth, json(order)?)
    }

    pub fn update_order(
        &self,
        auth: Option<&str>,
        key: &str,
        order: &Order,
    ) -> Result<Value, ApiError> {
        self.send(Method::Put, &format!("/orders/{}", key), auth, json(order)?)
    }

    pub fn delete_order(&self, auth: Option<&str>, key: &str) -> Result<(), ApiError> {
        self.send(Method::Delete, &format!("/orders/{}", key), auth, Body::Empty)?;
        Ok(())
    }
}

/// Staff directory hosted apart from the catalog API. Requests carry no
/// credential.
pub struct EmployeeDirectory {
    url: String,
    transport: Box<dyn Transport>,
}

impl EmployeeDirectory {
    pub fn new(url: &str, transport: Box<dyn Transport>) -> Self {
        Self {
            url: url.to_string(),
            transport,
        }
    }

    pub fn list(&self) -> Result<Vec<Employee>, ApiError> {
        decode(self.transport.send(Method::Get, &self.url, None, Body::Empty)?)
    }

    pub fn add(&self, employee: &EmployeeRequest) -> Result<Value, ApiError> {
        self.transport
            .send(Method::Post, &self.url, None, json(employee)?)
    }
}
