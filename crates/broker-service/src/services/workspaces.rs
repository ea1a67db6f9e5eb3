//! Workspace and reservation pass-throughs.
//!
//! The broker adds two things on top of the provider: caller local times are
//! converted to UTC before they leave, and workspace listings can be narrowed
//! to one location.

use crate::config::MAX_PAGE_SIZE;
use crate::errors::BrokerError;
use crate::models::{
    CreateReservationRequest, JsonObject, LocationQuery, LocationsQuery, LocationsResponse,
    ReservationPayload, ReservationQuery, ReservationsQuery, WorkspacesResponse,
};
use crate::services::provider_client::ProviderApi;
use crate::time::{format_utc, parse_local, parse_timezone, TimeWindow};
use chrono_tz::Tz;
use serde_json::Value;
use tracing::instrument;

/// Stateless workspace service.
pub struct WorkspaceService;

fn resolve_timezone(name: Option<&str>, default: Tz) -> Result<Tz, BrokerError> {
    match name.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => Ok(parse_timezone(name)?),
        None => Ok(default),
    }
}

fn local_to_utc(raw: Option<&str>, tz: Tz) -> Result<Option<String>, BrokerError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            parse_local(s, tz)
                .map(|t| format_utc(t.with_timezone(&chrono::Utc)))
                .map_err(BrokerError::from)
        })
        .transpose()
}

/// `location_id` as a string, whatever JSON type the provider used.
fn location_of(workspace: &JsonObject) -> Option<String> {
    match workspace.get("location_id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl WorkspaceService {
    /// All workspaces, optionally only those at `location_id`.
    #[instrument(skip_all, fields(location_id = ?location_id))]
    pub async fn list_workspaces(
        provider: &dyn ProviderApi,
        location_id: Option<&str>,
        page_size: u32,
    ) -> Result<WorkspacesResponse, BrokerError> {
        let all = provider.list_workspaces(page_size).await?;

        let workspaces: Vec<JsonObject> = match location_id.map(str::trim).filter(|s| !s.is_empty())
        {
            Some(wanted) => all
                .into_iter()
                .filter(|ws| location_of(ws).as_deref() == Some(wanted))
                .collect(),
            None => all,
        };

        Ok(WorkspacesResponse {
            total: workspaces.len(),
            workspaces,
        })
    }

    /// Provider reservations for a workspace, tagged with `workspace_id`.
    #[instrument(skip_all, fields(workspace_id = %workspace_id))]
    pub async fn list_reservations(
        provider: &dyn ProviderApi,
        workspace_id: &str,
        query: &ReservationsQuery,
        default_timezone: Tz,
    ) -> Result<JsonObject, BrokerError> {
        let tz = resolve_timezone(query.timezone.as_deref(), default_timezone)?;
        let provider_query = ReservationQuery {
            from: local_to_utc(query.from.as_deref(), tz)?,
            to: local_to_utc(query.to.as_deref(), tz)?,
            user_id: non_empty(query.user_id.as_ref()),
        };

        let body = provider
            .list_reservations(workspace_id, &provider_query)
            .await?;

        let mut tagged = JsonObject::new();
        tagged.insert(
            "workspace_id".to_string(),
            Value::String(workspace_id.to_string()),
        );
        tagged.extend(body);
        Ok(tagged)
    }

    /// Book a workspace. Times are local in the request's timezone.
    ///
    /// Both times are required and `end_time` must be after `start_time`;
    /// nothing is sent to the provider otherwise.
    #[instrument(skip_all, fields(workspace_id = %workspace_id))]
    pub async fn create_reservation(
        provider: &dyn ProviderApi,
        workspace_id: &str,
        request: &CreateReservationRequest,
        default_timezone: Tz,
    ) -> Result<JsonObject, BrokerError> {
        let (Some(start), Some(end)) = (
            non_empty(request.start_time.as_ref()),
            non_empty(request.end_time.as_ref()),
        ) else {
            return Err(BrokerError::BadRequest(
                "start_time and end_time are required".to_string(),
            ));
        };

        let tz = resolve_timezone(request.timezone.as_deref(), default_timezone)?;
        let window = TimeWindow::from_local(&start, &end, tz).map_err(|e| match e {
            crate::time::TimeError::EmptyWindow => {
                BrokerError::BadRequest("end_time must be after start_time".to_string())
            }
            other => BrokerError::from(other),
        })?;

        let payload = ReservationPayload {
            start_time: format_utc(window.start()),
            end_time: format_utc(window.end()),
            topic: non_empty(request.topic.as_ref()),
            reserve_for: non_empty(request.reserve_for.as_ref()),
            meeting: request.meeting.clone().filter(|m| !m.is_null()),
        };

        let created = provider.create_reservation(workspace_id, &payload).await?;

        tracing::info!(
            target: "broker.service.workspaces",
            workspace_id = %workspace_id,
            start = %payload.start_time,
            "Reservation created"
        );

        Ok(created)
    }

    #[instrument(skip_all, fields(workspace_id = %workspace_id, reservation_id = %reservation_id))]
    pub async fn delete_reservation(
        provider: &dyn ProviderApi,
        workspace_id: &str,
        reservation_id: &str,
    ) -> Result<(), BrokerError> {
        provider
            .delete_reservation(workspace_id, reservation_id)
            .await?;

        tracing::info!(
            target: "broker.service.workspaces",
            workspace_id = %workspace_id,
            reservation_id = %reservation_id,
            "Reservation deleted"
        );
        Ok(())
    }

    /// Room locations, optionally under one parent and of one type.
    #[instrument(skip_all)]
    pub async fn list_room_locations(
        provider: &dyn ProviderApi,
        query: &LocationsQuery,
        default_page_size: u32,
    ) -> Result<LocationsResponse, BrokerError> {
        if let Some(size) = query.page_size {
            if size == 0 || size > MAX_PAGE_SIZE {
                return Err(BrokerError::BadRequest(format!(
                    "page_size must be between 1 and {MAX_PAGE_SIZE}"
                )));
            }
        }

        let provider_query = LocationQuery {
            parent_location_id: non_empty(query.parent_location_id.as_ref()),
            location_type: non_empty(query.location_type.as_ref()),
            page_size: query.page_size,
        };

        let locations = provider
            .list_room_locations(&provider_query, default_page_size)
            .await?;

        Ok(LocationsResponse {
            total: locations.len(),
            locations,
        })
    }
}
