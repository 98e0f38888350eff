use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use crate::algorithms::{SortDirection, SortField, sort_nodes};
use crate::error::{ErrorKind, LibError};
use crate::models::{
    CreateFilePayload, CreateFolderPayload, CreateRoomPayload, MoveNodePayload, Node, NodeId,
    OwnerId, RenameRoomPayload, RoomId, RoomSummary, UpdateNodePayload,
};
use crate::operations::{RoomOperation, RoomStore};

#[derive(Debug)]
pub struct AppError(pub LibError);

impl From<LibError> for AppError {
    fn from(value: LibError) -> Self {
        Self(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Cycle => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::error!(kind = ?self.0.kind, code = self.0.code, error = %self.0.source, "room api request failed");
        (
            status,
            Json(json!({
                "error": {
                    "code": self.0.code,
                    "message": self.0.public
                }
            })),
        )
            .into_response()
    }
}

/// Application state that can hand out the room store.
pub trait RoomApp {
    fn room_store(&self) -> &RoomStore;
}

impl RoomApp for RoomStore {
    fn room_store(&self) -> &RoomStore {
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingQuery {
    #[serde(default)]
    pub sort: Option<SortField>,
    #[serde(default)]
    pub direction: SortDirection,
}

impl ListingQuery {
    fn apply(&self, mut nodes: Vec<Node>) -> Vec<Node> {
        if let Some(field) = self.sort {
            sort_nodes(&mut nodes, field, self.direction);
        }
        nodes
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameNodeBody {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveNodeBody {
    #[serde(default)]
    pub new_parent_id: Option<NodeId>,
}

async fn list_rooms_handler<S>(
    State(app): State<S>,
    Path(owner_id): Path<OwnerId>,
) -> Result<impl IntoResponse, AppError>
where
    S: RoomApp + Clone + Send + Sync + 'static,
{
    let rooms = app.room_store().list_rooms(owner_id).await?;
    Ok(Json(rooms.iter().map(RoomSummary::from).collect::<Vec<_>>()))
}

async fn create_room_handler<S>(
    State(app): State<S>,
    Path(owner_id): Path<OwnerId>,
    Json(payload): Json<CreateRoomPayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: RoomApp + Clone + Send + Sync + 'static,
{
    let room = app.room_store().create_room(owner_id, payload).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

async fn get_room_handler<S>(
    State(app): State<S>,
    Path(room_id): Path<RoomId>,
) -> Result<impl IntoResponse, AppError>
where
    S: RoomApp + Clone + Send + Sync + 'static,
{
    let room = app.room_store().get_room(room_id).await?;
    Ok(Json(room))
}

async fn rename_room_handler<S>(
    State(app): State<S>,
    Path(room_id): Path<RoomId>,
    Json(payload): Json<RenameRoomPayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: RoomApp + Clone + Send + Sync + 'static,
{
    let room = app.room_store().rename_room(room_id, payload).await?;
    Ok(Json(room))
}

async fn delete_room_handler<S>(
    State(app): State<S>,
    Path(room_id): Path<RoomId>,
) -> Result<impl IntoResponse, AppError>
where
    S: RoomApp + Clone + Send + Sync + 'static,
{
    app.room_store().delete_room(room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_root_nodes_handler<S>(
    State(app): State<S>,
    Path(room_id): Path<RoomId>,
    Query(listing): Query<ListingQuery>,
) -> Result<impl IntoResponse, AppError>
where
    S: RoomApp + Clone + Send + Sync + 'static,
{
    let nodes = app.room_store().get_root_nodes(room_id).await?;
    Ok(Json(listing.apply(nodes)))
}

async fn create_folder_handler<S>(
    State(app): State<S>,
    Path(room_id): Path<RoomId>,
    Json(payload): Json<CreateFolderPayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: RoomApp + Clone + Send + Sync + 'static,
{
    let node = app.room_store().create_folder(room_id, payload).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

async fn create_file_handler<S>(
    State(app): State<S>,
    Path(room_id): Path<RoomId>,
    Json(payload): Json<CreateFilePayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: RoomApp + Clone + Send + Sync + 'static,
{
    let node = app.room_store().create_file(room_id, payload).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

async fn get_node_handler<S>(
    State(app): State<S>,
    Path((room_id, node_id)): Path<(RoomId, NodeId)>,
) -> Result<impl IntoResponse, AppError>
where
    S: RoomApp + Clone + Send + Sync + 'static,
{
    let node = app.room_store().fetch_node(room_id, node_id).await?;
    Ok(Json(node))
}

async fn rename_node_handler<S>(
    State(app): State<S>,
    Path((room_id, node_id)): Path<(RoomId, NodeId)>,
    Json(body): Json<RenameNodeBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: RoomApp + Clone + Send + Sync + 'static,
{
    let node = app
        .room_store()
        .update_node(
            room_id,
            UpdateNodePayload {
                id: node_id,
                name: body.name,
            },
        )
        .await?;
    Ok(Json(node))
}

async fn delete_node_handler<S>(
    State(app): State<S>,
    Path((room_id, node_id)): Path<(RoomId, NodeId)>,
) -> Result<impl IntoResponse, AppError>
where
    S: RoomApp + Clone + Send + Sync + 'static,
{
    let removed = app.room_store().delete_node(room_id, node_id).await?;
    Ok(Json(removed))
}

async fn list_children_handler<S>(
    State(app): State<S>,
    Path((room_id, node_id)): Path<(RoomId, NodeId)>,
    Query(listing): Query<ListingQuery>,
) -> Result<impl IntoResponse, AppError>
where
    S: RoomApp + Clone + Send + Sync + 'static,
{
    let nodes = app.room_store().get_children(room_id, Some(node_id)).await?;
    Ok(Json(listing.apply(nodes)))
}

async fn node_path_handler<S>(
    State(app): State<S>,
    Path((room_id, node_id)): Path<(RoomId, NodeId)>,
) -> Result<impl IntoResponse, AppError>
where
    S: RoomApp + Clone + Send + Sync + 'static,
{
    let path = app.room_store().get_path(room_id, node_id).await?;
    Ok(Json(path))
}

async fn move_node_handler<S>(
    State(app): State<S>,
    Path((room_id, node_id)): Path<(RoomId, NodeId)>,
    Json(body): Json<MoveNodeBody>,
) -> Result<impl IntoResponse, AppError>
where
    S: RoomApp + Clone + Send + Sync + 'static,
{
    let node = app
        .room_store()
        .move_node(
            room_id,
            MoveNodePayload {
                node_id,
                new_parent_id: body.new_parent_id,
            },
        )
        .await?;
    Ok(Json(node))
}

async fn search_handler<S>(
    State(app): State<S>,
    Path(room_id): Path<RoomId>,
    Query(search): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError>
where
    S: RoomApp + Clone + Send + Sync + 'static,
{
    let nodes = app.room_store().search_nodes(room_id, &search.q).await?;
    Ok(Json(nodes))
}

async fn execute_operation_handler<S>(
    State(app): State<S>,
    Json(operation): Json<RoomOperation>,
) -> Result<impl IntoResponse, AppError>
where
    S: RoomApp + Clone + Send + Sync + 'static,
{
    let result = app.room_store().execute(operation).await?;
    Ok(Json(result))
}

pub fn routes<S>() -> Router<S>
where
    S: RoomApp + Clone + Send + Sync + 'static,
{
    tracing::info!("Registering route /owners/{{owner_id}}/rooms [GET,POST]");
    tracing::info!("Registering route /rooms/{{room_id}} [GET,PUT,DELETE]");
    tracing::info!("Registering route /rooms/{{room_id}}/nodes [GET,POST]");
    tracing::info!("Registering route /rooms/{{room_id}}/files [POST]");
    tracing::info!("Registering route /rooms/{{room_id}}/nodes/{{node_id}} [GET,PUT,DELETE]");
    tracing::info!("Registering route /rooms/{{room_id}}/nodes/{{node_id}}/children [GET]");
    tracing::info!("Registering route /rooms/{{room_id}}/nodes/{{node_id}}/path [GET]");
    tracing::info!("Registering route /rooms/{{room_id}}/nodes/{{node_id}}/move [POST]");
    tracing::info!("Registering route /rooms/{{room_id}}/search [GET]");
    tracing::info!("Registering route /operations [POST]");

    Router::new()
        .route(
            "/owners/{owner_id}/rooms",
            get(list_rooms_handler::<S>).post(create_room_handler::<S>),
        )
        .route(
            "/rooms/{room_id}",
            get(get_room_handler::<S>)
                .put(rename_room_handler::<S>)
                .delete(delete_room_handler::<S>),
        )
        .route(
            "/rooms/{room_id}/nodes",
            get(list_root_nodes_handler::<S>).post(create_folder_handler::<S>),
        )
        .route("/rooms/{room_id}/files", post(create_file_handler::<S>))
        .route(
            "/rooms/{room_id}/nodes/{node_id}",
            get(get_node_handler::<S>)
                .put(rename_node_handler::<S>)
                .delete(delete_node_handler::<S>),
        )
        .route(
            "/rooms/{room_id}/nodes/{node_id}/children",
            get(list_children_handler::<S>),
        )
        .route(
            "/rooms/{room_id}/nodes/{node_id}/path",
            get(node_path_handler::<S>),
        )
        .route(
            "/rooms/{room_id}/nodes/{node_id}/move",
            post(move_node_handler::<S>),
        )
        .route("/rooms/{room_id}/search", get(search_handler::<S>))
        .route("/operations", post(execute_operation_handler::<S>))
}
