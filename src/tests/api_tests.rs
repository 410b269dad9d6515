#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::{header, Method, StatusCode};
    use serde_json::json;

    use crate::session::{SessionId, SessionRecord, SessionStore};
    use crate::tests::support::*;

    #[tokio::test]
    async fn test_protected_route_without_session_redirects_to_login() {
        let app = test_app();
        let res = send(&app.router, get("/api/files?path=/docs", None)).await;

        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/auth/login");
        assert_eq!(app.backend.calls(), 0);
        assert_eq!(app.state.metrics.get_snapshot().auth_denied, 1);
    }

    #[tokio::test]
    async fn test_tampered_cookie_is_treated_as_anonymous() {
        let app = test_app();
        let cookie = login(&app, "jdoe", "secret").await;
        let forged = format!("{}0", cookie);

        let res = send(&app.router, get("/api/me", Some(&forged))).await;
        assert_eq!(res.status(), StatusCode::FOUND);
    }

    #[tokio::test]
    async fn test_login_sets_cookie_and_resolves_principal() {
        let app = test_app();
        let res = send(
            &app.router,
            json_request(
                Method::POST,
                "/auth/login",
                json!({ "login": "jdoe", "password": "secret" }),
                None,
            ),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);

        let set_cookie = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap().to_string();
        assert!(set_cookie.starts_with("portal="));
        assert!(set_cookie.contains("Path=/"));
        assert!(set_cookie.contains("Max-Age=28800"));
        assert!(!set_cookie.to_ascii_lowercase().contains("httponly"));

        let body = body_json(res).await;
        assert_eq!(body["login"], "jdoe");
        assert_eq!(body["isAdmin"], false);

        let cookie = set_cookie.split(';').next().unwrap().to_string();
        let res = send(&app.router, get("/api/me", Some(&cookie))).await;
        assert_eq!(res.status(), StatusCode::OK);
        // Unchanged sessions are not rewritten
        assert!(res.headers().get(header::SET_COOKIE).is_none());
        let body = body_json(res).await;
        assert_eq!(body["displayName"], "jdoe (test)");
        assert_eq!(app.store.live_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_login_keeps_json_error() {
        let app = test_app();
        let res = send(
            &app.router,
            json_request(
                Method::POST,
                "/auth/login",
                json!({ "login": "jdoe", "password": "wrong" }),
                None,
            ),
        )
        .await;

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(res.headers().get(header::SET_COOKIE).is_none());
        let body = body_json(res).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
        assert_eq!(body["error"]["message"], "Invalid login or password");
        assert_eq!(app.state.metrics.get_snapshot().logins_failed, 1);
    }

    #[tokio::test]
    async fn test_login_requires_fields() {
        let app = test_app();
        let res = send(
            &app.router,
            json_request(Method::POST, "/auth/login", json!({ "login": " ", "password": "x" }), None),
        )
        .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert_eq!(body["error"]["details"]["field"], "login");
    }

    #[tokio::test]
    async fn test_logout_destroys_session() {
        let app = test_app();
        let cookie = login(&app, "jdoe", "secret").await;

        let res = send(&app.router, json_request(Method::POST, "/auth/logout", json!({}), Some(&cookie))).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        let cleared = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cleared.contains("Max-Age=0"));
        assert_eq!(app.store.live_count().await, 0);

        let res = send(&app.router, get("/api/me", Some(&cookie))).await;
        assert_eq!(res.status(), StatusCode::FOUND);
    }

    #[tokio::test]
    async fn test_profile_of_signed_in_user() {
        let app = test_app();
        let cookie = login(&app, "jdoe", "secret").await;

        let res = send(&app.router, get("/api/profile", Some(&cookie))).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["login"], "jdoe");
        assert_eq!(body["email"], "jdoe@example.test");
        assert_eq!(body["department"], "IT");
    }

    #[tokio::test]
    async fn test_file_operations_forward_user_credential() {
        let app = test_app();
        let cookie = login(&app, "jdoe", "secret").await;

        let res = send(&app.router, get("/api/files?path=/docs", Some(&cookie))).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body[0]["path"], "/docs/report.pdf");
        assert_eq!(body[0]["isFolder"], false);

        let credential = app.backend.last_credential().unwrap();
        assert_eq!(credential.username, "jdoe");
        assert_eq!(credential.secret, "secret");

        let upload = axum::http::Request::builder()
            .method(Method::PUT)
            .uri("/api/files?path=/docs/notes.txt")
            .header(header::COOKIE, &cookie)
            .body(axum::body::Body::from("hello"))
            .unwrap();
        let res = send(&app.router, upload).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(body_json(res).await["size"], 5);

        let res = send(&app.router, get("/api/files/content?path=/docs/notes.txt", Some(&cookie))).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_bytes(res).await, b"hello");

        let res = send(&app.router, get("/api/files/url?path=/docs/notes.txt", Some(&cookie))).await;
        assert_eq!(body_json(res).await["url"], "https://docs.example.test/share/docs/notes.txt");
        assert_eq!(app.backend.calls(), 4);
    }

    #[tokio::test]
    async fn test_file_operation_without_credential_never_reaches_backend() {
        let app = test_app();
        let mut record = SessionRecord::new(SessionId::generate(), Duration::from_secs(60));
        record.principal = Some(principal("jdoe", false));
        app.store.save(&record, Duration::from_secs(60)).await.unwrap();
        let cookie = format!("portal={}", app.state.sessions.signer().sign(&record.id));

        let res = send(&app.router, get("/api/files?path=/docs", Some(&cookie))).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(res).await;
        assert_eq!(body["error"]["message"], "Not authorized");
        assert_eq!(app.backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_file_operation_without_path_is_not_authorized() {
        let app = test_app();
        let cookie = login(&app, "jdoe", "secret").await;

        let res = send(&app.router, get("/api/files", Some(&cookie))).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(app.backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_backend_not_found_passes_through_as_json() {
        let app = test_app();
        let cookie = login(&app, "jdoe", "secret").await;

        let res = send(&app.router, get("/api/files?path=/nope", Some(&cookie))).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body = body_json(res).await;
        assert_eq!(body["error"]["code"], "UPSTREAM_ERROR");
        assert_eq!(body["error"]["message"], "No such folder: /nope");
    }

    #[tokio::test]
    async fn test_server_error_renders_error_page() {
        let app = test_app();
        let cookie = login(&app, "jdoe", "secret").await;
        let (logs, _guard) = capture_logs();

        let res = send(&app.router, get("/api/files?path=/boom", Some(&cookie))).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(res.headers().get(header::LOCATION).is_none());
        let content_type = res.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap();
        assert!(content_type.starts_with("text/html"));
        let page = body_text(res).await;
        assert!(page.contains("500"));
        assert!(!page.contains("backend exploded"));

        let logged = logs.contents();
        assert!(logged.contains("ERROR"));
        assert!(!logged.contains("WARN"));
        assert!(logged.contains("GET /api/files failed: backend exploded\nbackend exploded"));
    }

    #[tokio::test]
    async fn test_panic_is_logged_with_detail_and_rendered() {
        let app = test_app();
        let cookie = login(&app, "jdoe", "secret").await;
        let (logs, _guard) = capture_logs();

        let res = send(&app.router, get("/api/files?path=/panic", Some(&cookie))).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(res).await.contains("Internal Server Error"));

        let logged = logs.contents();
        assert!(logged.contains("ERROR"));
        assert!(logged.contains("Handler panicked"));
        assert!(logged.contains("document backend panicked"));
        assert_eq!(app.state.metrics.get_snapshot().faults, 1);
    }

    #[tokio::test]
    async fn test_denials_are_logged_at_debug_only() {
        let app = test_app();
        let (logs, _guard) = capture_logs();

        let res = send(&app.router, get("/api/me", None)).await;
        assert_eq!(res.status(), StatusCode::FOUND);

        let logged = logs.contents();
        assert!(logged.contains("GET /api/me denied: Unauthorized"));
        assert!(!logged.contains("WARN"));
        assert!(!logged.contains("ERROR"));
        assert_eq!(app.state.metrics.get_snapshot().faults, 0);
    }

    #[tokio::test]
    async fn test_sync_requires_admin() {
        let app = test_app();
        let cookie = login(&app, "jdoe", "secret").await;

        let res = send(&app.router, json_request(Method::POST, "/admin/ldap/sync", json!({}), Some(&cookie))).await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(app.sync.calls(), 0);

        let cookie = login(&app, "admin", "admin-pass").await;
        let res = send(&app.router, json_request(Method::POST, "/admin/ldap/sync", json!({}), Some(&cookie))).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["requestedBy"], "admin");
        assert_eq!(body["result"]["users"], 3);
        assert_eq!(app.sync.calls(), 1);
    }

    #[tokio::test]
    async fn test_session_store_outage_is_service_unavailable() {
        let (state, backend, _) = build_state(test_config(), Arc::new(FailingStore));
        let router = crate::routes::router(state.clone());
        let cookie = format!("portal={}", state.sessions.signer().sign(&SessionId::generate()));

        let res = send(&router, get("/api/files?path=/docs", Some(&cookie))).await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        let content_type = res.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap();
        assert!(content_type.starts_with("text/html"));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_login_page_is_public() {
        let app = test_app();
        let res = send(&app.router, get("/auth/login", None)).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_text(res).await.contains("<form id=\"login\">"));
    }
}
