use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;

/// Health check response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChecks {
    pub database: String,
    pub application: String,
}

/// GET /health
///
/// 200 while the process is up and, when a pool is registered, the database
/// answers `SELECT 1`. 503 otherwise.
pub async fn health_check(pool: Option<web::Data<MySqlPool>>) -> impl Responder {
    let database = match pool {
        None => "not_configured".to_string(),
        Some(pool) => match sqlx::query("SELECT 1").fetch_one(pool.get_ref()).await {
            Ok(_) => "healthy".to_string(),
            Err(e) => {
                tracing::error!(error = %e, "Database health check failed");
                "unhealthy".to_string()
            }
        },
    };

    let healthy = database != "unhealthy";
    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        checks: HealthChecks {
            database,
            application: "healthy".to_string(),
        },
    };

    if healthy {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

/// Configure health check routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check));
}
