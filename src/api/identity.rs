//! Viewer identity resolution
//!
//! Identity is cookie-based and deliberately lightweight: a self-chosen
//! display name plus an optional admin key checked against the configured
//! password. Handlers never authenticate beyond this; they only consume the
//! resolved identity.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

use super::server::AppContext;
use crate::error::{Error, Result};

/// Cookie carrying the viewer's display name
pub const USER_COOKIE: &str = "karabox_user";
/// Cookie carrying the admin key
pub const ADMIN_COOKIE: &str = "karabox_admin_key";

/// Resolved identity of one request
#[derive(Debug, Clone)]
pub struct Identity {
    pub username: Option<String>,
    pub is_admin: bool,
}

impl Identity {
    /// The display name, or `Unauthorized` when none was supplied
    pub fn require_user(&self) -> Result<&str> {
        self.username.as_deref().ok_or(Error::Unauthorized)
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(Error::PermissionDenied(
                "admin access required".to_string(),
            ))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for Identity {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &AppContext,
    ) -> std::result::Result<Self, Self::Rejection> {
        let cookie_header = parts
            .headers
            .get(axum::http::header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        let username = cookie_value(cookie_header, USER_COOKIE)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);
        let is_admin = cookie_value(cookie_header, ADMIN_COOKIE)
            .map(|key| key == ctx.config.admin_password)
            .unwrap_or(false);

        Ok(Identity { username, is_admin })
    }
}

/// Extract one cookie's value from a `Cookie:` header
fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        if k.trim() == name {
            Some(v.trim())
        } else {
            None
        }
    })
}
