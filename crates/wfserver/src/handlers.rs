use actix_web::{delete, get, post, web, HttpResponse, Responder, Result as ActixResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};
use wfruntime::{DurableRuntime, RuntimeError};

pub const SERVICE_NAME: &str = "employee_onboarding_workflow Service";

/// Reported by `GET /`; tracks the service API, not the crate release
pub const SERVICE_VERSION: &str = "1.0.0";

/// Application state shared across handlers
pub struct AppState {
    pub runtime: DurableRuntime,
}

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    instance_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    instance_id: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Empty bodies are treated as `{}`
fn parse_body(body: &[u8]) -> Result<Value, HttpResponse> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body).map_err(|e| {
        HttpResponse::BadRequest().json(ErrorResponse {
            error: format!("Invalid JSON body: {}", e),
        })
    })
}

fn error_response(err: &RuntimeError) -> HttpResponse {
    let body = ErrorResponse {
        error: err.to_string(),
    };
    match err {
        RuntimeError::InstanceNotFound(_) | RuntimeError::UnknownWorkflow(_) => {
            HttpResponse::NotFound().json(body)
        }
        RuntimeError::InstanceExists(_)
        | RuntimeError::InstanceNotRunning(_)
        | RuntimeError::InstanceRunning(_) => {
            HttpResponse::Conflict().json(body)
        }
        RuntimeError::Timeout(_) => HttpResponse::GatewayTimeout().json(body),
        RuntimeError::ShutDown => HttpResponse::ServiceUnavailable().json(body),
    }
}

/// Service information
#[get("/")]
async fn root() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "service": SERVICE_NAME,
        "status": "running",
        "version": SERVICE_VERSION,
    }))
}

/// Health check endpoint
#[get("/healthz")]
async fn healthz() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "healthy" }))
}

/// Start a workflow instance
#[post("/workflows/{name}/instances")]
async fn start_instance(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<StartQuery>,
    body: web::Bytes,
) -> ActixResult<HttpResponse> {
    let workflow = path.into_inner();
    let input = match parse_body(&body) {
        Ok(input) => input,
        Err(response) => return Ok(response),
    };

    match data
        .runtime
        .start_instance(&workflow, query.into_inner().instance_id, input)
        .await
    {
        Ok(instance_id) => {
            info!("Scheduled {} instance {}", workflow, instance_id);
            Ok(HttpResponse::Accepted().json(StartResponse { instance_id }))
        }
        Err(e) => {
            error!("Failed to start {}: {}", workflow, e);
            Ok(error_response(&e))
        }
    }
}

/// List all instances
#[get("/instances")]
async fn list_instances(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    Ok(HttpResponse::Ok().json(data.runtime.list_instances().await))
}

/// Get instance status
#[get("/instances/{id}")]
async fn get_instance(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let instance_id = path.into_inner();
    match data.runtime.get_instance(&instance_id).await {
        Ok(status) => Ok(HttpResponse::Ok().json(status)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Forget a completed or failed instance
#[delete("/instances/{id}")]
async fn purge_instance(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let instance_id = path.into_inner();
    match data.runtime.purge_instance(&instance_id).await {
        Ok(status) => Ok(HttpResponse::Ok().json(status)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Deliver an external event to an instance
#[post("/instances/{id}/events/{event}")]
async fn raise_event(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Bytes,
) -> ActixResult<HttpResponse> {
    let (instance_id, event) = path.into_inner();
    let payload = match parse_body(&body) {
        Ok(payload) => payload,
        Err(response) => return Ok(response),
    };

    match data.runtime.raise_event(&instance_id, &event, payload).await {
        Ok(()) => Ok(HttpResponse::Accepted().finish()),
        Err(e) => Ok(error_response(&e)),
    }
}

/// List registered workflows and activities
#[get("/workflows")]
async fn list_workflows(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let activities = data.runtime.activities();
    let activity_list: Vec<_> = activities
        .list_activities()
        .iter()
        .filter_map(|name| activities.get_metadata(name))
        .map(|metadata| {
            serde_json::json!({
                "name": metadata.name,
                "description": metadata.description,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "workflows": data.runtime.orchestrators().list_workflows(),
        "activities": activity_list,
    })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(root)
        .service(healthz)
        .service(list_workflows)
        .service(start_instance)
        .service(list_instances)
        .service(get_instance)
        .service(purge_instance)
        .service(raise_event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};
    use serde_json::json;
    use std::time::Duration;
    use wfruntime::{ActivityRegistry, OrchestratorRegistry};

    fn state() -> web::Data<AppState> {
        let mut activities = ActivityRegistry::new();
        wfactivities::register_all(&mut activities, Duration::from_millis(1));
        let mut orchestrators = OrchestratorRegistry::new();
        wfactivities::register_workflows(&mut orchestrators, false);
        web::Data::new(AppState {
            runtime: DurableRuntime::new(activities, orchestrators),
        })
    }

    #[actix_web::test]
    async fn test_service_info_and_health() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;

        let info: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/").to_request())
                .await;
        assert_eq!(info["service"], json!(SERVICE_NAME));
        assert_eq!(info["status"], json!("running"));
        assert_eq!(info["version"], json!("1.0.0"));

        let health: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/healthz").to_request(),
        )
        .await;
        assert_eq!(health, json!({"status": "healthy"}));
    }

    #[actix_web::test]
    async fn test_start_and_query_instance() {
        let state = state();
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/workflows/employee_onboarding_workflow/instances?instance_id=emp-7")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"instanceId": "emp-7"}));

        let status = state
            .runtime
            .wait_for_completion("emp-7", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(
            status.output,
            Some(json!({"success": true, "data": {}, "activityHistory": []}))
        );

        let req = test::TestRequest::get().uri("/instances/emp-7").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], json!("completed"));
        assert_eq!(body["workflow"], json!("employee_onboarding_workflow"));

        let req = test::TestRequest::delete().uri("/instances/emp-7").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/instances/emp-7").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_error_statuses() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;

        let req = test::TestRequest::post().uri("/workflows/nope/instances").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get().uri("/instances/missing").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri("/workflows/employee_onboarding_workflow/instances")
            .set_payload("{not json")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/instances/missing/events/approve")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
