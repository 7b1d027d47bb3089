use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::{
    domain::{ObjectId, Party},
    error::AppError,
};

/// Identity headers set by the upstream auth proxy.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Performer,
    Admin,
}

#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: ObjectId,
    pub role: Role,
}

impl CurrentUser {
    /// The buyer for a purchase made by this caller.
    pub fn party(&self) -> Party {
        match self.role {
            Role::Performer => Party::Performer(self.id.clone()),
            Role::User | Role::Admin => Party::User(self.id.clone()),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

fn identify(headers: &HeaderMap) -> Result<CurrentUser, AppError> {
    let id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| ObjectId::parse(v.trim()).ok())
        .ok_or(AppError::Unauthorized)?;

    let role = match headers
        .get(USER_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase())
        .as_deref()
    {
        Some("admin") => Role::Admin,
        Some("performer") => Role::Performer,
        _ => Role::User,
    };

    Ok(CurrentUser { id, role })
}

pub async fn require_auth(mut request: Request, next: Next) -> Result<Response, AppError> {
    let user = identify(request.headers())?;
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

pub async fn require_admin(mut request: Request, next: Next) -> Result<Response, AppError> {
    let user = identify(request.headers())?;
    if !user.is_admin() {
        return Err(AppError::Forbidden);
    }
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}
