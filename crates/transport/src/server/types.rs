use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use crate::error::Error;

pub const SESSION_COOKIE: &str = "sessionid";
pub const FLASH_COOKIE: &str = "flash";

/// JSON error body used by every non-page endpoint.
#[derive(Debug, Serialize)]
pub struct ApiErrorType {
    #[serde(skip)]
    status: StatusCode,
    error: String,
    context: Option<String>,
}

impl From<(StatusCode, &str, Option<String>)> for ApiErrorType {
    fn from((status, error, context): (StatusCode, &str, Option<String>)) -> Self {
        Self {
            status,
            error: error.to_string(),
            context,
        }
    }
}

impl IntoResponse for ApiErrorType {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Maps a domain error onto the API error body.
pub fn error_to_response(err: Error) -> Response {
    let (status, message) = match &err {
        Error::Validation(_) => (StatusCode::BAD_REQUEST, "Invalid input"),
        Error::Authentication => (StatusCode::UNAUTHORIZED, "Invalid credentials"),
        Error::NotFound { .. } => (StatusCode::NOT_FOUND, "Not found"),
        Error::Notification { .. } => (
            StatusCode::BAD_GATEWAY,
            "Saved, but the update email could not be sent",
        ),
        _ => {
            error!("Request failed: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    };
    ApiErrorType::from((status, message, Some(err.to_string()))).into_response()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Error,
}

impl FlashLevel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// A one-shot message carried across a redirect in a cookie and shown on
/// the next page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Error,
            message: message.into(),
        }
    }

    fn encode(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("level", self.level.as_str())
            .append_pair("message", &self.message)
            .finish()
    }

    fn decode(value: &str) -> Option<Self> {
        let mut level = None;
        let mut message = None;
        for (key, val) in url::form_urlencoded::parse(value.as_bytes()) {
            match key.as_ref() {
                "level" => level = FlashLevel::parse(&val),
                "message" => message = Some(val.into_owned()),
                _ => {}
            }
        }
        Some(Self {
            level: level?,
            message: message?,
        })
    }

    /// The pending flash on a request, if any.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        cookie_value(headers, FLASH_COOKIE).and_then(|v| Self::decode(&v))
    }
}

/// Finds a cookie by name in the request's `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// A `Set-Cookie` value. `max_age == Some(0)` deletes the cookie.
pub fn set_cookie(name: &str, value: &str, max_age: Option<u64>, secure: bool) -> HeaderValue {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax");
    if let Some(max_age) = max_age {
        cookie.push_str(&format!("; Max-Age={max_age}"));
    }
    if secure {
        cookie.push_str("; Secure");
    }
    // Names and values are token characters or urlencoded.
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}

pub fn clear_cookie(name: &str) -> HeaderValue {
    set_cookie(name, "", Some(0), false)
}

/// A 303 redirect that carries `flash` to the next page.
pub fn redirect_with_flash(to: &str, flash: Flash) -> Response {
    let mut response = Redirect::to(to).into_response();
    response.headers_mut().append(
        header::SET_COOKIE,
        set_cookie(FLASH_COOKIE, &flash.encode(), None, false),
    );
    response
}

/// A page as a JSON document with the pending flash folded in under
/// `messages`. The flash cookie is consumed.
pub fn render_page(page: &str, headers: &HeaderMap, mut data: Value) -> Response {
    let flash = Flash::from_headers(headers);
    let messages: Vec<Flash> = flash.into_iter().collect();

    if let Value::Object(map) = &mut data {
        map.insert("page".to_string(), json!(page));
        map.insert("messages".to_string(), json!(messages));
    }

    let mut response = (StatusCode::OK, Json(data)).into_response();
    if !messages.is_empty() {
        response
            .headers_mut()
            .append(header::SET_COOKIE, clear_cookie(FLASH_COOKIE));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_cookie(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_cookie_value() {
        let headers = headers_with_cookie("a=1; sessionid=tok; b=2");
        assert_eq!(cookie_value(&headers, SESSION_COOKIE).as_deref(), Some("tok"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_flash_survives_cookie() {
        let flash = Flash::error("Invalid credentials. Please try again.");
        let headers = headers_with_cookie(&format!("{FLASH_COOKIE}={}", flash.encode()));
        assert_eq!(Flash::from_headers(&headers), Some(flash));
        assert_eq!(Flash::from_headers(&headers_with_cookie("flash=garbage")), None);
    }

    #[test]
    fn test_redirect_with_flash() {
        let response = redirect_with_flash("/login/", Flash::success("Login successful!"));
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login/");
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("flash=level=success&message=Login+successful%21"));
    }

    #[test]
    fn test_set_cookie_attributes() {
        let value = set_cookie(SESSION_COOKIE, "tok", Some(60), true);
        assert_eq!(
            value.to_str().unwrap(),
            "sessionid=tok; Path=/; HttpOnly; SameSite=Lax; Max-Age=60; Secure"
        );
        assert!(clear_cookie(FLASH_COOKIE).to_str().unwrap().contains("Max-Age=0"));
    }
}
