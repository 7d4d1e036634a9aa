//! HTTP boundary
//!
//! Routes:
//! - `GET  /health`
//! - `GET  /api/v1/users/{user_id}/similar?k=N`
//! - `POST /api/v1/admin/rebuild`

use actix_web::{web, HttpResponse, Responder, ResponseError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::config::DatasetConfig;
use crate::engine::SimilarityService;
use crate::error::SimilarityError;
use crate::loader::load_event_tables;
use crate::types::UserId;

/// Application state shared across all handlers
pub struct AppState {
    pub service: Arc<SimilarityService>,
    pub datasets: DatasetConfig,
}

#[derive(Debug, Deserialize)]
pub struct SimilarQuery {
    /// Number of similar users (default: configured k)
    pub k: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SimilarUsersResponse {
    pub user_id: UserId,
    pub k: usize,
    pub similar_users: Vec<UserId>,
}

impl ResponseError for SimilarityError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;

        match self {
            SimilarityError::NotFound { .. } => StatusCode::NOT_FOUND,
            _ if self.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.code(),
            "error_description": self.to_string()
        }))
    }
}

async fn health(state: web::Data<AppState>) -> impl Responder {
    let snapshot = state.service.snapshot();
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "similarity-service",
        "version": env!("CARGO_PKG_VERSION"),
        "generation": state.service.generation(),
        "algorithm": snapshot.algorithm(),
        "distance_exponent": state.service.config().distance_exponent,
        "users": snapshot.num_users(),
        "built_at": snapshot.built_at(),
    }))
}

/// GET /api/v1/users/{user_id}/similar - users nearest in feature space
#[instrument(skip_all, fields(user_id = %path))]
async fn similar_users(
    state: web::Data<AppState>,
    path: web::Path<UserId>,
    query: web::Query<SimilarQuery>,
) -> Result<HttpResponse, SimilarityError> {
    let user_id = path.into_inner();
    let engine = state.service.snapshot();

    let k = match query.k {
        None => engine.default_k(),
        Some(k) if k > 0 => k as usize,
        Some(k) => {
            return Err(SimilarityError::invalid_argument(format!(
                "k must be a positive integer, got {}",
                k
            )))
        }
    };

    let similar_users = engine.similar_users(user_id, k)?;
    info!(k, returned = similar_users.len(), "Served similar users");

    Ok(HttpResponse::Ok().json(SimilarUsersResponse {
        user_id,
        k,
        similar_users,
    }))
}

/// POST /api/v1/admin/rebuild - reload event tables and swap in a new index
async fn rebuild(state: web::Data<AppState>) -> Result<HttpResponse, SimilarityError> {
    let service = Arc::clone(&state.service);
    let datasets = state.datasets.clone();

    let report = web::block(move || {
        let tables = load_event_tables(&datasets)?;
        service.rebuild(&tables)
    })
    .await
    .map_err(|e| {
        error!(error = %e, "Rebuild task failed");
        SimilarityError::Internal(format!("rebuild task failed: {}", e))
    })??;

    Ok(HttpResponse::Ok().json(report))
}

/// Configure application routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health)).service(
        web::scope("/api/v1")
            .route("/users/{user_id}/similar", web::get().to(similar_users))
            .route("/admin/rebuild", web::post().to(rebuild)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NeighborConfig;
    use crate::engine::SimilarityEngine;
    use crate::features::FeatureMatrix;
    use crate::types::{FeatureColumn, FeatureKind, FeatureSource};
    use actix_web::{test, App};

    fn state() -> web::Data<AppState> {
        let column = FeatureColumn::new(FeatureSource::Views, FeatureKind::ViewCount);
        let matrix = FeatureMatrix::from_rows(
            vec![column],
            (1..=5).map(|id| (id, vec![id as f64])).collect(),
        )
        .unwrap();
        let config = NeighborConfig::default();
        let engine = SimilarityEngine::from_matrix(matrix, &config).unwrap();

        web::Data::new(AppState {
            service: Arc::new(SimilarityService::new(engine, config)),
            datasets: DatasetConfig::in_dir("/nonexistent/similarity"),
        })
    }

    #[actix_web::test]
    async fn test_health_endpoint() {
        let app =
            test::init_service(App::new().app_data(state()).configure(configure_routes)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }

    #[actix_web::test]
    async fn test_similar_users_endpoint() {
        let app =
            test::init_service(App::new().app_data(state()).configure(configure_routes)).await;

        let req = test::TestRequest::get()
            .uri("/api/v1/users/1/similar?k=2")
            .to_request();
        let body: SimilarUsersResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body.user_id, 1);
        assert_eq!(body.similar_users, vec![2, 3]);
    }

    #[actix_web::test]
    async fn test_default_k_truncates() {
        let app =
            test::init_service(App::new().app_data(state()).configure(configure_routes)).await;

        let req = test::TestRequest::get()
            .uri("/api/v1/users/5/similar")
            .to_request();
        let body: SimilarUsersResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body.k, 10);
        assert_eq!(body.similar_users, vec![4, 3, 2, 1]);
    }

    #[actix_web::test]
    async fn test_error_statuses() {
        let app =
            test::init_service(App::new().app_data(state()).configure(configure_routes)).await;

        let req = test::TestRequest::get()
            .uri("/api/v1/users/404/similar")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);

        let req = test::TestRequest::get()
            .uri("/api/v1/users/1/similar?k=0")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);

        let req = test::TestRequest::get()
            .uri("/api/v1/users/1/similar?k=-3")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    #[::core::prelude::v1::test]
    fn test_status_codes_follow_error_kind() {
        use actix_web::http::StatusCode;

        assert_eq!(
            SimilarityError::NotFound { user_id: 3 }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SimilarityError::invalid_argument("k must be a positive integer").status_code(),
            StatusCode::BAD_REQUEST
        );
        for err in [
            SimilarityError::EmptyDataset,
            SimilarityError::Ingestion("views.csv: bad row".to_string()),
            SimilarityError::Internal("rebuild task failed".to_string()),
        ] {
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[actix_web::test]
    async fn test_rebuild_failure_keeps_serving() {
        let state = state();
        let app =
            test::init_service(App::new().app_data(state.clone()).configure(configure_routes))
                .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/admin/rebuild")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 500);
        assert_eq!(state.service.generation(), 1);

        let req = test::TestRequest::get()
            .uri("/api/v1/users/1/similar?k=1")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }
}
