use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use super::{auth, classroom_websocket};
use crate::classroom::{HubHandle, Task};
use crate::config::{AdminConfig, Config};
use crate::error::HubError;

const MAX_TASK_BODY_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct JoinQuery {
    name: Option<String>,
}

/// Every route the server exposes
pub fn classroom_routes(
    hub: HubHandle,
    config: Arc<Config>,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    classroom_websocket_route(hub.clone(), config.room.outbound_queue_capacity)
        .or(classroom_health_check())
        .or(tasks_api(hub.clone(), config.admin.clone()))
        .or(stats_api(hub, config.admin.clone()))
        .or(admin_page(&config))
        .or(index_page(&config))
        .recover(handle_rejection)
}

/// `/ws?name=<display name>`
pub fn classroom_websocket_route(
    hub: HubHandle,
    queue_capacity: usize,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(warp::query::<JoinQuery>())
        .and(with_hub(hub))
        .map(move |ws: warp::ws::Ws, query: JoinQuery, hub: HubHandle| {
            let name = classroom_websocket::display_name(query.name.as_deref());
            ws.on_upgrade(move |websocket| {
                classroom_websocket::handle_classroom_websocket(websocket, hub, name, queue_capacity)
            })
        })
}

pub fn classroom_health_check() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            warp::reply::json(&serde_json::json!({
                "status": "healthy",
                "service": "Classroom Hub",
                "version": env!("CARGO_PKG_VERSION")
            }))
        })
}

/// `GET /api/tasks` returns the full catalog, `POST /api/tasks` publishes one task
pub fn tasks_api(
    hub: HubHandle,
    admin: AdminConfig,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let list = warp::path!("api" / "tasks")
        .and(warp::get())
        .and(with_admin(admin.clone()))
        .and(with_hub(hub.clone()))
        .and_then(list_tasks);

    let publish = warp::path!("api" / "tasks")
        .and(warp::post())
        .and(with_admin(admin))
        .and(warp::body::content_length_limit(MAX_TASK_BODY_BYTES))
        .and(warp::body::json())
        .and(with_hub(hub))
        .and_then(publish_task);

    list.or(publish)
}

/// `GET /api/stats`: every progress record, the dashboard feed over HTTP
pub fn stats_api(
    hub: HubHandle,
    admin: AdminConfig,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "stats")
        .and(warp::get())
        .and(with_admin(admin))
        .and(with_hub(hub))
        .and_then(|hub: HubHandle| async move {
            let records = hub.snapshot().await.map_err(warp::reject::custom)?;
            Ok::<_, Rejection>(warp::reply::json(&records))
        })
}

fn admin_page(config: &Config) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("admin")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_admin(config.admin.clone()))
        .and(warp::fs::file(config.server.static_dir.join("admin.html")))
}

fn index_page(config: &Config) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path::end()
        .and(warp::get())
        .and(warp::fs::file(config.server.static_dir.join("index.html")))
}

async fn list_tasks(hub: HubHandle) -> Result<impl Reply, Rejection> {
    let tasks = hub.tasks().await.map_err(warp::reject::custom)?;
    Ok(warp::reply::json(&tasks))
}

async fn publish_task(task: Task, hub: HubHandle) -> Result<Box<dyn Reply>, Rejection> {
    if task.id.trim().is_empty() {
        return Ok(Box::new(error_reply(StatusCode::BAD_REQUEST, "task id must not be empty")));
    }

    let id = task.id.clone();
    let replaced = hub.upsert_task(task).await.map_err(warp::reject::custom)?;
    Ok(Box::new(warp::reply::json(&serde_json::json!({
        "status": "ok",
        "id": id,
        "replaced": replaced
    }))))
}

fn with_hub(hub: HubHandle) -> impl Filter<Extract = (HubHandle,), Error = Infallible> + Clone {
    warp::any().map(move || hub.clone())
}

fn with_admin(admin: AdminConfig) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and_then(move |header: Option<String>| {
            let allowed = auth::authorize(header.as_deref(), &admin);
            async move {
                if allowed {
                    Ok(())
                } else {
                    Err(warp::reject::custom(HubError::Unauthorized))
                }
            }
        })
        .untuple_one()
}

fn error_reply(status: StatusCode, message: &str) -> impl Reply {
    warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "error": message })),
        status,
    )
}

async fn handle_rejection(err: Rejection) -> Result<Box<dyn Reply>, Infallible> {
    if let Some(hub_error) = err.find::<HubError>() {
        return Ok(match hub_error {
            HubError::Unauthorized => {
                tracing::warn!("Rejected admin request without valid credentials");
                Box::new(warp::reply::with_header(
                    error_reply(StatusCode::UNAUTHORIZED, "Unauthorized"),
                    "WWW-Authenticate",
                    auth::REALM,
                ))
            }
            HubError::HubClosed => Box::new(error_reply(
                StatusCode::SERVICE_UNAVAILABLE,
                "room hub is not running",
            )),
            other => {
                tracing::error!(error = %other, "Request failed");
                Box::new(error_reply(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"))
            }
        });
    }

    if err.is_not_found() {
        return Ok(Box::new(error_reply(StatusCode::NOT_FOUND, "Not found")));
    }

    if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        return Ok(Box::new(error_reply(StatusCode::BAD_REQUEST, &e.to_string())));
    }

    if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(Box::new(error_reply(StatusCode::PAYLOAD_TOO_LARGE, "Payload too large")));
    }

    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(Box::new(error_reply(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")));
    }

    tracing::debug!(rejection = ?err, "Unhandled rejection");
    Ok(Box::new(error_reply(StatusCode::BAD_REQUEST, "Bad request")))
}
