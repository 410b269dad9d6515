use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::{AppError, AppResult};
use crate::session::{Principal, Session};
use crate::state::AppState;

/// Message carried by every guard denial.
pub const DENIED: &str = "Unauthorized";

/// What a route or resolver requires of the resolved session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Public,
    Authenticated,
    Admin,
}

impl Guard {
    /// Returns the principal when the session satisfies the guard.
    ///
    /// Denials surface as `AppError::Forbidden`, which the exception filter turns into
    /// a login redirect (HTTP) or a GraphQL error.
    pub fn check(self, session: Option<&Session>) -> AppResult<Option<Principal>> {
        let principal = session.and_then(|s| s.principal());
        match self {
            Guard::Public => Ok(principal),
            Guard::Authenticated => match principal {
                Some(principal) => Ok(Some(principal)),
                None => Err(AppError::Forbidden(DENIED.to_string())),
            },
            Guard::Admin => match (principal, session) {
                (Some(principal), Some(session)) if session.is_admin() => Ok(Some(principal)),
                _ => Err(AppError::Forbidden(DENIED.to_string())),
            },
        }
    }
}

async fn enforce(guard: Guard, state: AppState, req: Request, next: Next) -> Response {
    match guard.check(req.extensions().get::<Session>()) {
        Ok(_) => next.run(req).await,
        Err(e) => {
            state.metrics.inc_auth_denied();
            tracing::debug!("{:?} guard denied {} {}", guard, req.method(), req.uri().path());
            e.into_response()
        }
    }
}

/// Route layer: a principal must be attached to the session.
pub async fn require_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    enforce(Guard::Authenticated, state, req, next).await
}

/// Route layer: the principal must carry the admin claim.
pub async fn require_admin(State(state): State<AppState>, req: Request, next: Next) -> Response {
    enforce(Guard::Admin, state, req, next).await
}

/// The authenticated principal of the current request.
pub struct CurrentUser(pub Principal);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match Guard::Authenticated.check(parts.extensions.get::<Session>())? {
            Some(principal) => Ok(CurrentUser(principal)),
            None => Err(AppError::Forbidden(DENIED.to_string())),
        }
    }
}

/// The principal of the current request, required to be an administrator.
pub struct AdminUser(pub Principal);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match Guard::Admin.check(parts.extensions.get::<Session>())? {
            Some(principal) => Ok(AdminUser(principal)),
            None => Err(AppError::Forbidden(DENIED.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionRecord;
    use crate::session::SessionId;
    use std::time::Duration;
    use uuid::Uuid;

    fn session_for(is_admin: bool) -> Session {
        let mut record = SessionRecord::new(SessionId::generate(), Duration::from_secs(60));
        record.principal = Some(Principal {
            id: Uuid::new_v4(),
            login: "jdoe".to_string(),
            display_name: "John Doe".to_string(),
            is_admin,
        });
        Session::from_record(record)
    }

    #[test]
    fn test_guard_without_session_denies() {
        assert!(matches!(Guard::Authenticated.check(None), Err(AppError::Forbidden(m)) if m == DENIED));
        assert!(matches!(Guard::Admin.check(None), Err(AppError::Forbidden(_))));
        assert!(matches!(Guard::Public.check(None), Ok(None)));
    }

    #[test]
    fn test_guard_anonymous_session_denies() {
        let record = SessionRecord::new(SessionId::generate(), Duration::from_secs(60));
        let session = Session::from_record(record);
        assert!(Guard::Authenticated.check(Some(&session)).is_err());
    }

    #[test]
    fn test_guard_admin_claim() {
        let user = session_for(false);
        assert!(Guard::Authenticated.check(Some(&user)).is_ok());
        assert!(Guard::Admin.check(Some(&user)).is_err());

        let admin = session_for(true);
        let principal = Guard::Admin.check(Some(&admin)).unwrap().unwrap();
        assert_eq!(principal.login, "jdoe");
    }

    #[test]
    fn test_guard_after_destroy_denies() {
        let user = session_for(false);
        user.destroy();
        assert!(Guard::Authenticated.check(Some(&user)).is_err());
    }
}
