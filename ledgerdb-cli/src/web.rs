// SPDX-License-Identifier: AGPL-3.0-or-later
// LedgerDB - Event-Sourced Relational Database
// Copyright (C) 2026 LedgerDB Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! HTTP adapter
//!
//! A thin REST surface over the executor: a task-list demo API backed by a
//! `tasks` table, plus `POST /query` for raw SQL. Everything here is glue;
//! the database semantics live below the façade.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use ledgerdb::{Column, ColumnType, Database, Row, Value, WhereClause};

use crate::executor::Executor;

struct AppState {
    executor: Executor,
}

#[derive(Serialize)]
struct Task {
    id: i64,
    title: String,
    completed: bool,
}

#[derive(Deserialize)]
struct CreateTask {
    id: i64,
    title: String,
    #[serde(default)]
    completed: bool,
}

#[derive(Deserialize)]
struct UpdateTask {
    id: i64,
    title: Option<String>,
    completed: Option<bool>,
}

#[derive(Deserialize)]
struct TaskSelector {
    id: i64,
}

#[derive(Deserialize)]
struct QueryRequest {
    sql: String,
}

#[derive(Serialize)]
struct QueryResponse {
    output: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn bad_request(err: impl std::fmt::Display) -> HandlerError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// Ensure the demo `tasks` table exists.
fn initialize(db: &Database) -> ledgerdb::Result<()> {
    if db.table_exists("tasks") {
        return Ok(());
    }
    db.create_table(
        "tasks",
        vec![
            Column::new("id", ColumnType::Int).primary_key(),
            Column::new("title", ColumnType::Text),
            Column::new("completed", ColumnType::Bool),
        ],
    )?;
    Ok(())
}

fn row_to_task(row: &Row) -> Task {
    Task {
        id: row.get("id").and_then(Value::as_int).unwrap_or_default(),
        title: row
            .get("title")
            .and_then(Value::as_text)
            .unwrap_or_default()
            .to_string(),
        completed: row
            .get("completed")
            .and_then(Value::as_bool)
            .unwrap_or_default(),
    }
}

async fn list_tasks(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Task>>, HandlerError> {
    let rows = state.executor.db().select("tasks", None).map_err(bad_request)?;
    Ok(Json(rows.iter().map(row_to_task).collect()))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTask>,
) -> Result<(StatusCode, Json<Task>), HandlerError> {
    let row: Row = [
        ("id".to_string(), Value::Int(req.id)),
        ("title".to_string(), Value::Text(req.title.clone())),
        ("completed".to_string(), Value::Bool(req.completed)),
    ]
    .into_iter()
    .collect();
    state.executor.db().insert("tasks", row).map_err(bad_request)?;
    Ok((
        StatusCode::CREATED,
        Json(Task {
            id: req.id,
            title: req.title,
            completed: req.completed,
        }),
    ))
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateTask>,
) -> Result<Json<QueryResponse>, HandlerError> {
    let db = state.executor.db();
    let selector = WhereClause::new("id", Value::Int(req.id));
    let mut updated = 0;
    if let Some(title) = req.title {
        updated += db
            .update("tasks", "title", Value::Text(title), Some(&selector))
            .map_err(bad_request)?;
    }
    if let Some(completed) = req.completed {
        updated += db
            .update("tasks", "completed", Value::Bool(completed), Some(&selector))
            .map_err(bad_request)?;
    }
    Ok(Json(QueryResponse {
        output: format!("Updated {} field(s)", updated),
    }))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    Query(selector): Query<TaskSelector>,
) -> Result<Json<QueryResponse>, HandlerError> {
    let clause = WhereClause::new("id", Value::Int(selector.id));
    let count = state
        .executor
        .db()
        .delete("tasks", Some(&clause))
        .map_err(bad_request)?;
    Ok(Json(QueryResponse {
        output: format!("Deleted {} row(s)", count),
    }))
}

async fn run_query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, HandlerError> {
    let output = state.executor.execute(&req.sql).map_err(bad_request)?;
    Ok(Json(QueryResponse { output }))
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/tasks",
            get(list_tasks)
                .post(create_task)
                .put(update_task)
                .delete(delete_task),
        )
        .route("/query", post(run_query))
        .with_state(state)
}

/// Run the HTTP adapter until the process is stopped.
pub fn serve(db: Arc<Database>, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    initialize(&db)?;
    let state = Arc::new(AppState {
        executor: Executor::new(db),
    });

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
        info!(port, "http adapter listening");
        axum::serve(listener, router(state)).await?;
        Ok(())
    })
}
