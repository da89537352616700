use crate::games::{Game, GameStore, Page, PageError, StoreError};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Shared state for the games API
#[derive(Clone)]
pub struct GamesAppState {
    pub store: Arc<dyn GameStore>,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

/// Query parameters for `GET /games`
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create games API router
pub fn create_games_router(state: GamesAppState) -> Router {
    Router::new()
        .route("/games", get(list_games).post(create_game))
        .route("/games/", get(list_games).post(create_game))
        .route(
            "/games/:id",
            get(get_game).put(update_game).delete(delete_game),
        )
        .with_state(Arc::new(state))
}

/// Resource ids must match `[a-z0-9]+` and parse as an integer.
fn parse_game_id(raw: &str) -> Result<i64, GamesError> {
    if raw.is_empty()
        || !raw
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(GamesError::NotFound);
    }
    raw.parse::<i64>()
        .map_err(|_| GamesError::BadRequest(format!("Invalid game id '{}'", raw)))
}

/// POST /games - Create a game
async fn create_game(
    State(state): State<Arc<GamesAppState>>,
    body: Result<Json<Game>, JsonRejection>,
) -> Result<(StatusCode, Json<Game>), GamesError> {
    let Json(game) = body?;

    let created = state.store.add(&game)?;
    info!(id = created.id, name = %created.name, "Game created");

    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /games?page=N&size=M - List one page of games
async fn list_games(
    State(state): State<Arc<GamesAppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Game>>, GamesError> {
    let page = Page::new(
        query.page.unwrap_or(0),
        query.size.unwrap_or(i64::from(state.default_page_size)),
        state.max_page_size,
    )?;

    let games = state.store.list(page)?;
    Ok(Json(games))
}

/// GET /games/:id - Fetch one game
async fn get_game(
    State(state): State<Arc<GamesAppState>>,
    Path(id): Path<String>,
) -> Result<Json<Game>, GamesError> {
    let id = parse_game_id(&id)?;
    let game = state.store.get(id)?;
    Ok(Json(game))
}

/// PUT /games/:id - Replace a game's fields
async fn update_game(
    State(state): State<Arc<GamesAppState>>,
    Path(id): Path<String>,
    body: Result<Json<Game>, JsonRejection>,
) -> Result<StatusCode, GamesError> {
    let id = parse_game_id(&id)?;
    let Json(game) = body?;

    state.store.update(id, &game)?;
    info!(id, "Game updated");

    Ok(StatusCode::OK)
}

/// DELETE /games/:id - Delete a game
async fn delete_game(
    State(state): State<Arc<GamesAppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, GamesError> {
    let id = parse_game_id(&id)?;

    state.store.remove(id)?;
    info!(id, "Game deleted");

    Ok(StatusCode::OK)
}

/// Games API error types
#[derive(Debug)]
enum GamesError {
    NotFound,
    BadRequest(String),
    Internal(anyhow::Error),
}

impl From<StoreError> for GamesError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => GamesError::NotFound,
            StoreError::Internal(e) => GamesError::Internal(e),
        }
    }
}

impl From<PageError> for GamesError {
    fn from(e: PageError) -> Self {
        GamesError::BadRequest(e.to_string())
    }
}

impl From<JsonRejection> for GamesError {
    fn from(e: JsonRejection) -> Self {
        GamesError::BadRequest(format!("Invalid game payload: {}", e.body_text()))
    }
}

impl IntoResponse for GamesError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            GamesError::NotFound => (StatusCode::NOT_FOUND, "Game not found".to_string()),
            GamesError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            GamesError::Internal(e) => {
                error!(error = %format!("{:#}", e), "Games store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::SqliteGameStore;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::util::ServiceExt;

    /// Store whose every call fails, for the 500 path
    struct BrokenStore;

    impl GameStore for BrokenStore {
        fn add(&self, _game: &Game) -> Result<Game, StoreError> {
            Err(StoreError::Internal(anyhow::anyhow!("disk on fire")))
        }
        fn get(&self, _id: i64) -> Result<Game, StoreError> {
            Err(StoreError::Internal(anyhow::anyhow!("disk on fire")))
        }
        fn list(&self, _page: Page) -> Result<Vec<Game>, StoreError> {
            Err(StoreError::Internal(anyhow::anyhow!("disk on fire")))
        }
        fn update(&self, _id: i64, _game: &Game) -> Result<(), StoreError> {
            Err(StoreError::Internal(anyhow::anyhow!("disk on fire")))
        }
        fn remove(&self, _id: i64) -> Result<(), StoreError> {
            Err(StoreError::Internal(anyhow::anyhow!("disk on fire")))
        }
    }

    fn create_test_app_with_store(store: Arc<dyn GameStore>) -> Router {
        create_games_router(GamesAppState {
            store,
            default_page_size: 20,
            max_page_size: 100,
        })
    }

    fn create_test_app() -> Router {
        create_test_app_with_store(Arc::new(SqliteGameStore::in_memory().unwrap()))
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_parse_game_id() {
        assert_eq!(parse_game_id("42").unwrap(), 42);
        assert!(matches!(parse_game_id("abc"), Err(GamesError::BadRequest(_))));
        assert!(matches!(parse_game_id("ABC"), Err(GamesError::NotFound)));
        assert!(matches!(parse_game_id("-1"), Err(GamesError::NotFound)));
    }

    #[tokio::test]
    async fn test_get_non_numeric_id_returns_400() {
        let app = create_test_app();

        let response = app.oneshot(request("GET", "/games/abc")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_id_outside_pattern_returns_404() {
        let app = create_test_app();

        let response = app.oneshot(request("GET", "/games/Zelda")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_malformed_json_returns_400() {
        let app = create_test_app();

        let response = app
            .oneshot(json_request("POST", "/games", json!({"name": "no year"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().starts_with("Invalid game payload"));
    }

    #[tokio::test]
    async fn test_list_rejects_invalid_page_size() {
        let app = create_test_app();

        for uri in ["/games?size=0", "/games?size=101", "/games?page=-1&size=5"] {
            let response = app.clone().oneshot(request("GET", uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri: {}", uri);
        }
    }

    #[tokio::test]
    async fn test_list_defaults_when_params_omitted() {
        let app = create_test_app();

        let response = app.oneshot(request("GET", "/games")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"[]");
    }

    #[tokio::test]
    async fn test_store_failure_returns_500_without_detail() {
        let app = create_test_app_with_store(Arc::new(BrokenStore));

        let response = app.oneshot(request("GET", "/games/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_delete_store_failure_returns_500() {
        let app = create_test_app_with_store(Arc::new(BrokenStore));

        let response = app.oneshot(request("DELETE", "/games/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
