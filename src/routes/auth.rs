use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    Json,
};

use crate::directory::UserProfile;
use crate::error::{validation, AppError, AppResult, OptionExt};
use crate::middleware::CurrentUser;
use crate::session::Session;
use crate::state::AppState;
use crate::types::{LoginRequest, UserView};

const LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Sign in to the portal</title></head>
<body>
<h1>Sign in</h1>
<form id="login">
  <label>Login <input name="login" autocomplete="username" required></label>
  <label>Password <input name="password" type="password" autocomplete="current-password" required></label>
  <button type="submit">Sign in</button>
  <p id="error" role="alert"></p>
</form>
<script>
document.getElementById('login').addEventListener('submit', async (event) => {
  event.preventDefault();
  const form = new FormData(event.target);
  const res = await fetch('/auth/login', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ login: form.get('login'), password: form.get('password') }),
  });
  if (res.ok) { window.location.href = '/'; return; }
  const body = await res.json().catch(() => null);
  document.getElementById('error').textContent = body?.error?.message ?? 'Sign in failed';
});
</script>
</body>
</html>
"#;

pub async fn login_page() -> Html<&'static str> {
    Html(LOGIN_PAGE)
}

pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<UserView>> {
    validation::validate_required(&req.login, "login")?;
    validation::validate_required(&req.password, "password")?;

    let login = req.login.trim();
    match state.directory.authenticate(login, &req.password).await? {
        Some(principal) => {
            state.metrics.inc_logins_succeeded();
            tracing::info!("User {} signed in", principal.login);
            // The password doubles as the document backend credential for this session
            session.login(principal, Some(req.password));
            let principal = session
                .principal()
                .ok_or_else(|| AppError::Internal(anyhow::anyhow!("principal missing after login")))?;
            Ok(Json(UserView::new(&principal, session.is_admin())))
        }
        None => {
            state.metrics.inc_logins_failed();
            tracing::warn!("Rejected sign-in for {}", login);
            Err(AppError::Unauthorized("Invalid login or password".to_string()))
        }
    }
}

pub async fn logout(session: Session) -> impl IntoResponse {
    if let Some(principal) = session.principal() {
        tracing::info!("User {} signed out", principal.login);
    }
    session.destroy();
    StatusCode::NO_CONTENT
}

pub async fn me(CurrentUser(principal): CurrentUser, session: Session) -> Json<UserView> {
    Json(UserView::new(&principal, session.is_admin()))
}

pub async fn profile(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> AppResult<Json<UserProfile>> {
    let profile = state.directory.profile(&principal.login).await?.ok_or_not_found("Profile")?;
    Ok(Json(profile))
}
