//! HTTP request handlers for the meeting broker.

pub mod health;
pub mod meetings;
pub mod metrics;
pub mod reports;
pub mod workspaces;

pub use health::{health_check, readiness_check};
pub use meetings::{auto_create_meeting, delete_meeting, list_licensed_users};
pub use metrics::metrics_handler;
pub use reports::{last_meeting_by_topic, list_recordings, meetings_for_hosts};
pub use workspaces::{
    create_reservation, delete_reservation, list_reservations, list_room_locations,
    list_workspaces,
};

use crate::config::split_hosts;
use crate::errors::BrokerError;
use crate::hosts::HostList;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::Query;
use serde::de::DeserializeOwned;

/// Deserialize a JSON body by hand so a malformed one is a 400, not a 422.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, BrokerError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(target: "broker.handlers", error = %e, "Invalid request body");
        BrokerError::BadRequest(format!("Invalid request body: {e}"))
    })
}

/// Unwrap a query string, turning any rejection into a 400.
pub(crate) fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, BrokerError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| BrokerError::BadRequest(rejection.body_text()))
}

/// The request's `hosts` override when it names any host, else `configured`.
pub(crate) fn effective_hosts(configured: &HostList, requested: Option<&str>) -> HostList {
    match requested.map(split_hosts).filter(|hosts| !hosts.is_empty()) {
        Some(hosts) => HostList::new(hosts),
        None => configured.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_hosts_override() {
        let configured = HostList::new(["a@x.com", "b@x.com"]);

        let same = effective_hosts(&configured, None);
        assert_eq!(same.as_slice(), configured.as_slice());

        let blank = effective_hosts(&configured, Some(" , "));
        assert_eq!(blank.as_slice(), configured.as_slice());

        let chosen = effective_hosts(&configured, Some("c@x.com, a@x.com"));
        assert_eq!(chosen.as_slice(), ["c@x.com", "a@x.com"]);
    }
}
