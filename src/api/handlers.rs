use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::clock::now_millis;
use crate::feed::log_activity;
use crate::session::{validate_label, SpawnRequest};
use crate::store::{Comment, NewActivity, NewTask, Task, TaskPatch, TaskStatus};

use super::auth::TOKEN_TTL_SECS;
use super::error::ApiError;
use super::AppContext;

/// Actor recorded for dashboard-originated mutations. The dashboard is
/// single-user; the JWT subject is always the admin login.
const DASHBOARD_ACTOR: &str = "admin";

// ── Health ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub(super) struct HealthResponse {
    status: &'static str,
    connectivity: crate::connectivity::ConnectivityState,
    timestamp: u64,
}

pub(super) async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connectivity: ctx.monitor.state(),
        timestamp: now_millis(),
    })
}

// ── Auth ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct LoginRequest {
    password: Option<String>,
}

pub(super) async fn login(
    State(ctx): State<AppContext>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let password = body
        .password
        .ok_or_else(|| ApiError::InvalidRequest("password required".into()))?;
    if !ctx.auth.check_password(&password) {
        return Err(ApiError::LoginFailed);
    }
    let token = ctx
        .auth
        .issue(DASHBOARD_ACTOR)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    Ok(Json(json!({
        "token": token,
        "expiresIn": TOKEN_TTL_SECS,
        "user": { "username": DASHBOARD_ACTOR, "role": "admin" },
    })))
}

pub(super) async fn verify(State(ctx): State<AppContext>, headers: HeaderMap) -> Response {
    let claims = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .and_then(|token| ctx.auth.verify(token).ok());

    match claims {
        Some(claims) => Json(json!({
            "valid": true,
            "user": { "username": claims.sub, "role": claims.role },
        }))
        .into_response(),
        None => (StatusCode::UNAUTHORIZED, Json(json!({ "valid": false }))).into_response(),
    }
}

// ── Agents ─────────────────────────────────────────────────────────

pub(super) async fn agents_list(State(ctx): State<AppContext>) -> Json<Value> {
    let sessions = ctx.view.sessions().await;
    Json(json!(sessions))
}

pub(super) async fn agent_get(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match ctx.view.session(&id).await {
        Some(session) => Ok(Json(json!(session))),
        None => Err(ApiError::SessionNotFound(id)),
    }
}

pub(super) async fn agent_spawn(
    State(ctx): State<AppContext>,
    Json(body): Json<SpawnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.label.is_empty() || body.task.is_empty() {
        return Err(ApiError::InvalidRequest("label and task required".into()));
    }
    validate_label(&body.label).map_err(ApiError::InvalidRequest)?;

    let session = ctx.view.spawn(&body).await?;

    log_activity(
        &ctx.store,
        &ctx.broadcaster,
        NewActivity {
            kind: "agent".into(),
            actor: DASHBOARD_ACTOR.into(),
            action: "spawned".into(),
            target_type: Some("agent".into()),
            target_id: Some(session.id.clone()),
            metadata: json!({ "task": body.task, "model": body.model }),
        },
    );
    ctx.broadcaster.push_snapshot().await;

    Ok((StatusCode::CREATED, Json(json!(session))))
}

pub(super) async fn agent_kill(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    ctx.view.kill(&id).await?;

    log_activity(
        &ctx.store,
        &ctx.broadcaster,
        NewActivity {
            kind: "agent".into(),
            actor: DASHBOARD_ACTOR.into(),
            action: "killed".into(),
            target_type: Some("agent".into()),
            target_id: Some(id),
            metadata: Value::Null,
        },
    );
    ctx.broadcaster.push_snapshot().await;

    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize)]
pub(super) struct SendMessageRequest {
    message: Option<String>,
}

pub(super) async fn agent_send(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<Value>, ApiError> {
    let message = body
        .message
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::InvalidRequest("message required".into()))?;
    ctx.gateway.send_message(&id, &message).await?;
    Ok(Json(json!({ "success": true })))
}

pub(super) async fn agent_transcript(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let messages = ctx.view.transcript(&id).await?;
    Ok(Json(json!(messages)))
}

// ── Tasks ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TaskListQuery {
    status: Option<TaskStatus>,
    assigned_agent: Option<String>,
}

pub(super) async fn tasks_list(
    State(ctx): State<AppContext>,
    Query(query): Query<TaskListQuery>,
) -> Json<Vec<Task>> {
    Json(
        ctx.store
            .list_tasks(query.status, query.assigned_agent.as_deref()),
    )
}

#[derive(Serialize)]
pub(super) struct TaskWithComments {
    #[serde(flatten)]
    task: Task,
    comments: Vec<Comment>,
}

pub(super) async fn task_get(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<TaskWithComments>, ApiError> {
    let task = ctx
        .store
        .get_task(&id)
        .ok_or_else(|| ApiError::TaskNotFound(id.clone()))?;
    let comments = ctx.store.comments_for(&id);
    Ok(Json(TaskWithComments { task, comments }))
}

pub(super) async fn task_create(
    State(ctx): State<AppContext>,
    Json(body): Json<NewTask>,
) -> Result<impl IntoResponse, ApiError> {
    if body.title.is_empty() {
        return Err(ApiError::InvalidRequest("title required".into()));
    }

    let task = ctx.store.create_task(body)?;

    log_activity(
        &ctx.store,
        &ctx.broadcaster,
        NewActivity {
            kind: "task".into(),
            actor: DASHBOARD_ACTOR.into(),
            action: "created".into(),
            target_type: Some("task".into()),
            target_id: Some(task.id.clone()),
            metadata: json!({ "title": task.title.clone() }),
        },
    );
    ctx.broadcaster.push_task_update(json!(&task));

    Ok((StatusCode::CREATED, Json(task)))
}

pub(super) async fn task_update(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<Task>, ApiError> {
    let changed = patch.changed_fields();
    let task = ctx.store.update_task(&id, patch)?;

    log_activity(
        &ctx.store,
        &ctx.broadcaster,
        NewActivity {
            kind: "task".into(),
            actor: DASHBOARD_ACTOR.into(),
            action: "updated".into(),
            target_type: Some("task".into()),
            target_id: Some(task.id.clone()),
            metadata: json!({ "changes": changed }),
        },
    );
    ctx.broadcaster.push_task_update(json!(&task));

    Ok(Json(task))
}

pub(super) async fn task_delete(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let task = ctx.store.delete_task(&id)?;

    log_activity(
        &ctx.store,
        &ctx.broadcaster,
        NewActivity {
            kind: "task".into(),
            actor: DASHBOARD_ACTOR.into(),
            action: "deleted".into(),
            target_type: Some("task".into()),
            target_id: Some(task.id.clone()),
            metadata: json!({ "title": task.title.clone() }),
        },
    );
    ctx.broadcaster
        .push_task_update(json!({ "id": task.id, "deleted": true }));

    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize)]
pub(super) struct NewComment {
    content: Option<String>,
    #[serde(default = "default_author")]
    author: String,
}

fn default_author() -> String {
    DASHBOARD_ACTOR.to_string()
}

pub(super) async fn task_comment(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Json(body): Json<NewComment>,
) -> Result<impl IntoResponse, ApiError> {
    let content = body
        .content
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::InvalidRequest("content required".into()))?;

    let comment = ctx.store.add_comment(&id, &body.author, &content)?;

    log_activity(
        &ctx.store,
        &ctx.broadcaster,
        NewActivity {
            kind: "comment".into(),
            actor: body.author.clone(),
            action: "commented".into(),
            target_type: Some("task".into()),
            target_id: Some(id.clone()),
            metadata: json!({ "commentId": comment.id.clone() }),
        },
    );
    ctx.broadcaster
        .push_task_update(json!({ "taskId": id, "newComment": &comment }));

    Ok((StatusCode::CREATED, Json(comment)))
}

// ── Activity feed ──────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct FeedQuery {
    #[serde(default = "default_feed_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
    #[serde(rename = "type")]
    kind: Option<String>,
}

fn default_feed_limit() -> usize {
    50
}

pub(super) async fn feed_list(
    State(ctx): State<AppContext>,
    Query(query): Query<FeedQuery>,
) -> Json<Value> {
    let entries = ctx
        .store
        .list_activity(query.limit, query.offset, query.kind.as_deref());
    Json(json!(entries))
}

pub(super) async fn feed_stats(State(ctx): State<AppContext>) -> Json<Value> {
    Json(json!(ctx.store.activity_stats()))
}
