use axum::{http::StatusCode, response::Json};
use serde_json::{Value, json};

/// Health check handler
/// Reports liveness plus the service name and version, so deploy tooling can
/// confirm which build is answering
pub async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(json!({
        "status": "OK",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_check_reports_service_identity() {
        let Json(body) = health_check().await.unwrap();
        assert_eq!(body["status"], "OK");
        assert_eq!(body["service"], "mayamind");
        assert!(body["version"].is_string());
    }
}
