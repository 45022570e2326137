//! Redirect-сервер: страница отсчёта и возврат в бот.
//!
//! `/redirect?token=` — точка входа после шортлинка, фиксирует визит и
//! показывает отсчёт. `/return?token=` — завершение отсчёта, разрешает
//! исход и отправляет пользователя в бот подписанным deep-link-ом.
//! Ошибки наружу не детализируются: любой дефект токена — одна и та же
//! страница.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect};
use axum::routing::get;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::settings_keys;
use crate::token::build_start_link;
use crate::verification::VerificationProtocol;

#[derive(Clone)]
pub struct RedirectState {
    pub protocol: Arc<VerificationProtocol>,
    pub config: Arc<Config>,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    token: Option<String>,
}

pub fn router(state: RedirectState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/redirect", get(redirect_page))
        .route("/return", get(return_redirect))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn redirect_page(
    State(state): State<RedirectState>,
    Query(query): Query<TokenQuery>,
) -> impl IntoResponse {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        return error_page();
    };

    if let Err(e) = state.protocol.record_visit(&token).await {
        warn!("redirect entry rejected: {}", e);
        return error_page();
    }

    let countdown = state
        .protocol
        .db()
        .setting_i64(
            settings_keys::COUNTDOWN_SECONDS,
            state.config.countdown_seconds,
        )
        .await
        .unwrap_or(state.config.countdown_seconds)
        .max(1);

    (StatusCode::OK, Html(countdown_page(&token, countdown))).into_response()
}

async fn return_redirect(
    State(state): State<RedirectState>,
    Query(query): Query<TokenQuery>,
) -> impl IntoResponse {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        return error_page();
    };

    match state.protocol.resolve(&token).await {
        Ok(resolution) => {
            info!(
                user_id = resolution.user_id,
                outcome = ?resolution.outcome,
                "redirect return resolved"
            );
            let link = build_start_link(&state.config.bot_username, &resolution.deep_link_arg);
            Redirect::to(&link).into_response()
        }
        Err(e) => {
            warn!("redirect return rejected: {}", e);
            error_page()
        }
    }
}

fn error_page() -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Html(
            r#"<!doctype html>
<html lang="ru"><head><meta charset="utf-8"><title>Ссылка недействительна</title></head>
<body style="font-family:sans-serif;text-align:center;padding-top:4em">
<h2>Ссылка недействительна или устарела</h2>
<p>Вернитесь в бот и запросите файл заново.</p>
</body></html>"#
                .to_string(),
        ),
    )
        .into_response()
}

/// Страница отсчёта. Токен подставляется только в URL через
/// encodeURIComponent, в разметку он не попадает.
fn countdown_page(token: &str, seconds: i64) -> String {
    format!(
        r#"<!doctype html>
<html lang="ru">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Проверка...</title>
<style>
body {{ font-family: sans-serif; text-align: center; padding-top: 4em; background: #f5f5f5; }}
#count {{ font-size: 4em; font-weight: bold; }}
</style>
</head>
<body>
<h2>Подождите, идёт проверка</h2>
<div id="count">{seconds}</div>
<p>Не закрывайте страницу: по окончании отсчёта вы вернётесь в бот.</p>
<script>
var left = {seconds};
var token = {token_json};
var timer = setInterval(function() {{
  left -= 1;
  document.getElementById("count").textContent = left;
  if (left <= 0) {{
    clearInterval(timer);
    window.location.href = "/return?token=" + encodeURIComponent(token);
  }}
}}, 1000);
</script>
</body>
</html>"#,
        seconds = seconds,
        token_json = serde_json::to_string(token).unwrap_or_else(|_| "\"\"".to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_page_embeds_token_and_seconds() {
        let page = countdown_page("abcDEF_-123", 10);
        assert!(page.contains("var left = 10;"));
        assert!(page.contains(r#"var token = "abcDEF_-123";"#));
        assert!(page.contains("/return?token="));
    }

    #[test]
    fn countdown_page_escapes_token() {
        let page = countdown_page(r#"a"</script>"#, 5);
        assert!(!page.contains(r#"var token = "a"</script>";"#));
    }
}
