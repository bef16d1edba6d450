/// Project endpoints (agency tier)
///
/// - `GET /v1/projects` - Accessible projects (viewer+, or `projects:read`)
/// - `POST /v1/projects` - Create (admin+, or `projects:write`)
/// - `POST /v1/projects/:id/move` - Reparent (admin+, or `projects:write`)
/// - `POST /v1/projects/:id/members` - Add or update a project member (admin+)
/// - `DELETE /v1/projects/:id/members/:user_id` - Remove a project member (admin+)
///
/// Every endpoint requires the `projects` feature.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tollgate_shared::auth::actor::{Actor, RequestContext};
use tollgate_shared::features::Feature;
use tollgate_shared::gate::{Executed, Operation};
use tollgate_shared::models::member::AccountRole;
use tollgate_shared::models::project::{CreateProject, Project, ProjectMember, ProjectRole};
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    error::{json_body, validate_request, ApiResult},
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,

    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct MoveProjectRequest {
    /// `null` moves the project to the top level
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AddProjectMemberRequest {
    pub user_id: Uuid,
    pub role: ProjectRole,
}

#[derive(Debug, Serialize)]
pub struct ListProjectsResponse {
    pub projects: Vec<Project>,
}

/// Admins and owners see every project; other members only those they belong to.
/// API keys with `projects:read` see every project of their account.
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<ListProjectsResponse>> {
    let account_id = ctx.account_id();
    let op = Operation::new("project.listed", "project")
        .feature(Feature::Projects)
        .scope("projects:read");

    let resolver = state.gate.resolver();
    let actor = &ctx.actor;
    let projects = state
        .gate
        .run(&ctx, op, || async move {
            let projects = match actor {
                Actor::User { user_id, .. } => {
                    resolver.list_accessible_projects(account_id, *user_id).await?
                }
                Actor::ApiKey { .. } => resolver.list_projects(account_id).await?,
            };
            let details = json!({ "count": projects.len() });
            Ok(Executed::new(projects).with_details(details))
        })
        .await?;

    Ok(Json(ListProjectsResponse { projects }))
}

pub async fn create_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let account_id = ctx.account_id();
    let op = Operation::new("project.created", "project")
        .min_role(AccountRole::Admin)
        .feature(Feature::Projects)
        .scope("projects:write");

    let resolver = state.gate.resolver();
    let project = state
        .gate
        .run(&ctx, op, || async move {
            let req = json_body(payload)?;
            validate_request(&req)?;
            let project = resolver
                .create_project(CreateProject {
                    account_id,
                    name: req.name,
                    parent_id: req.parent_id,
                })
                .await?;
            let details = json!({ "name": project.name, "parent_id": project.parent_id });
            Ok(Executed::new(project.clone())
                .with_resource_id(project.id)
                .with_details(details))
        })
        .await?;

    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn move_project(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(project_id): Path<Uuid>,
    payload: Result<Json<MoveProjectRequest>, JsonRejection>,
) -> ApiResult<Json<Project>> {
    let account_id = ctx.account_id();
    let op = Operation::new("project.moved", "project")
        .resource_id(project_id)
        .min_role(AccountRole::Admin)
        .feature(Feature::Projects)
        .scope("projects:write");

    let resolver = state.gate.resolver();
    let project = state
        .gate
        .run(&ctx, op, || async move {
            let req = json_body(payload)?;
            let before = resolver.get_project(account_id, project_id).await?;
            let project = resolver
                .move_project(account_id, project_id, req.parent_id)
                .await?;
            let details = json!({ "from": before.parent_id, "to": project.parent_id });
            Ok(Executed::new(project).with_details(details))
        })
        .await?;

    Ok(Json(project))
}

pub async fn add_project_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(project_id): Path<Uuid>,
    payload: Result<Json<AddProjectMemberRequest>, JsonRejection>,
) -> ApiResult<Json<ProjectMember>> {
    let account_id = ctx.account_id();
    let op = Operation::new("project.member_added", "project")
        .resource_id(project_id)
        .min_role(AccountRole::Admin)
        .feature(Feature::Projects);

    let resolver = state.gate.resolver();
    let member = state
        .gate
        .run(&ctx, op, || async move {
            let req = json_body(payload)?;
            let member = resolver
                .add_project_member(account_id, project_id, req.user_id, req.role)
                .await?;
            let details = json!({ "user_id": member.user_id, "role": member.role });
            Ok(Executed::new(member).with_details(details))
        })
        .await?;

    Ok(Json(member))
}

pub async fn remove_project_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let account_id = ctx.account_id();
    let op = Operation::new("project.member_removed", "project")
        .resource_id(project_id)
        .min_role(AccountRole::Admin)
        .feature(Feature::Projects);

    let resolver = state.gate.resolver();
    state
        .gate
        .run(&ctx, op, || async move {
            resolver
                .remove_project_member(account_id, project_id, user_id)
                .await?;
            Ok(Executed::new(()).with_details(json!({ "user_id": user_id })))
        })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
