use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use subseq_dataroom::api::RoomApp;
use subseq_dataroom::config::{StoreConfig, env_flag};
use subseq_dataroom::db::SqliteRecordStore;
use subseq_dataroom::models::{CreateFolderPayload, CreateRoomPayload, OwnerId};
use subseq_dataroom::operations::RoomStore;

const DEMO_OWNER_ID: &str = "00000000-0000-0000-0000-000000000001";

#[derive(Clone)]
struct ExampleApp {
    rooms: RoomStore,
}

impl RoomApp for ExampleApp {
    fn room_store(&self) -> &RoomStore {
        &self.rooms
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind = env::var("DATAROOM_EXAMPLE_BIND").unwrap_or_else(|_| "127.0.0.1:4020".to_string());
    let bind_addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid DATAROOM_EXAMPLE_BIND '{}'", bind))?;

    let config = StoreConfig::from_env().context("invalid store configuration")?;
    let records = SqliteRecordStore::connect(&config)
        .await
        .context("failed to open room database")?;

    let rooms = RoomStore::new(Arc::new(records)).with_config(config.clone());
    #[cfg(feature = "pdf")]
    let rooms = rooms.with_extractor(Arc::new(subseq_dataroom::metadata::LopdfExtractor));
    let app_state = ExampleApp { rooms };

    if env_flag("DATAROOM_EXAMPLE_SEED") {
        seed_demo_room(&app_state.rooms)
            .await
            .context("failed to seed demo room")?;
    }

    let api_v1 = Router::new()
        .route("/healthz", get(health_handler))
        .merge(subseq_dataroom::api::routes::<ExampleApp>())
        .fallback(unknown_route_handler);

    let app = Router::new().nest("/api/v1", api_v1).with_state(app_state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", bind_addr))?;

    println!(
        "subseq_dataroom example server listening on http://{}",
        bind_addr
    );
    println!("api base path: /api/v1");
    println!("database: {}", config.database_url);
    println!("set DATAROOM_EXAMPLE_SEED=true to create a demo room for owner {DEMO_OWNER_ID}");

    axum::serve(listener, app)
        .await
        .context("example server failed")
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "ok": true
    }))
}

async fn seed_demo_room(rooms: &RoomStore) -> subseq_dataroom::error::Result<()> {
    let owner_id = DEMO_OWNER_ID.parse::<OwnerId>().unwrap_or_default();
    let room = rooms
        .create_room(
            owner_id,
            CreateRoomPayload {
                name: "Demo".to_string(),
            },
        )
        .await?;
    let docs = rooms
        .create_folder(
            room.id,
            CreateFolderPayload {
                name: "Docs".to_string(),
                parent_id: None,
            },
        )
        .await?;
    println!("seeded room {} with folder {}", room.id, docs.id);
    Ok(())
}

async fn unknown_route_handler() -> Response {
    json_error(
        StatusCode::NOT_FOUND,
        "unknown_route",
        "no such route on this server",
    )
}

fn json_error(status: StatusCode, code: &'static str, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        })),
    )
        .into_response()
}
