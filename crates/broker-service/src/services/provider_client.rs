//! Provider REST client.
//!
//! Wraps the provider's v2 REST API behind [`ProviderApi`] so the overlap
//! detector, allocator and reporters can run against [`mock::MockProvider`].
//!
//! Every request carries a bearer token from the shared [`TokenCache`], a fixed
//! timeout, and is recorded in `broker_provider_requests_total`. Listings walk
//! the `next_page_token` cursor; an empty token ends the walk. Non-2xx
//! responses become [`BrokerError::Upstream`] carrying the provider's body.
//! Nothing here retries.

use crate::config::Config;
use crate::errors::BrokerError;
use crate::models::provider::LICENSED_USER_TYPE;
use crate::models::{
    CreateMeetingRequest, JsonObject, LocationQuery, MeetingListKind, ProviderMeeting,
    ProviderUser, ReservationPayload, ReservationQuery,
};
use crate::observability::metrics;
use async_trait::async_trait;
use chrono::NaiveDate;
use common::secret::ExposeSecret;
use common::token_cache::{TokenCache, TokenCacheConfig, TokenError};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, trace, warn};

/// Connect timeout for provider requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Operations the broker performs against the provider.
#[async_trait]
pub trait ProviderApi: Send + Sync {
    /// List a host's meetings of one kind.
    ///
    /// With `stop_at`, stops requesting pages once at least that many
    /// meetings have accumulated. The last page is kept whole, so the result
    /// may exceed `stop_at`.
    async fn list_meetings(
        &self,
        host: &str,
        kind: MeetingListKind,
        page_size: u32,
        stop_at: Option<usize>,
    ) -> Result<Vec<ProviderMeeting>, BrokerError>;

    /// Create a meeting owned by `host`.
    async fn create_meeting(
        &self,
        host: &str,
        request: &CreateMeetingRequest,
    ) -> Result<ProviderMeeting, BrokerError>;

    async fn delete_meeting(&self, meeting_id: &str) -> Result<(), BrokerError>;

    /// Active users with a paid license.
    async fn list_licensed_users(&self, page_size: u32) -> Result<Vec<ProviderUser>, BrokerError>;

    /// Cloud recordings for `host` between two dates, inclusive.
    async fn list_recordings(
        &self,
        host: &str,
        from: NaiveDate,
        to: NaiveDate,
        page_size: u32,
    ) -> Result<Vec<JsonObject>, BrokerError>;

    async fn list_workspaces(&self, page_size: u32) -> Result<Vec<JsonObject>, BrokerError>;

    /// Provider response for a workspace's reservations, unchanged.
    async fn list_reservations(
        &self,
        workspace_id: &str,
        query: &ReservationQuery,
    ) -> Result<JsonObject, BrokerError>;

    async fn create_reservation(
        &self,
        workspace_id: &str,
        payload: &ReservationPayload,
    ) -> Result<JsonObject, BrokerError>;

    async fn delete_reservation(
        &self,
        workspace_id: &str,
        reservation_id: &str,
    ) -> Result<(), BrokerError>;

    async fn list_room_locations(
        &self,
        query: &LocationQuery,
        default_page_size: u32,
    ) -> Result<Vec<JsonObject>, BrokerError>;
}

/// reqwest-backed [`ProviderApi`].
pub struct ProviderClient {
    http: Client,
    base_url: Url,
    tokens: TokenCache,
}

impl ProviderClient {
    /// Create a client for `base_url` (e.g. `https://api.zoom.us/v2`).
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Configuration` for an unusable base URL or if
    /// the HTTP client cannot be built.
    pub fn new(base_url: &str, tokens: TokenCache, timeout: Duration) -> Result<Self, BrokerError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            BrokerError::Configuration(format!("Invalid provider base URL '{base_url}': {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(BrokerError::Configuration(format!(
                "Provider base URL '{base_url}' cannot carry a path"
            )));
        }

        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                BrokerError::Configuration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            base_url,
            tokens,
        })
    }

    /// Build the token cache and client from service configuration.
    pub fn from_config(config: &Config) -> Result<Self, BrokerError> {
        let token_config = TokenCacheConfig::new(
            config.oauth_url.clone(),
            config.account_id.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
        )
        .with_refresh_margin(config.token_refresh_margin)
        .with_http_timeout(config.provider_http_timeout);

        let tokens = TokenCache::new(token_config)
            .map_err(|e| BrokerError::Configuration(e.to_string()))?;

        Self::new(&config.api_base_url, tokens, config.provider_http_timeout)
    }

    /// Base URL plus percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, BrokerError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| BrokerError::Internal)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Attach a bearer token, send, and turn non-2xx into `Upstream`.
    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, BrokerError> {
        let token = self.tokens.token().await.map_err(|e| {
            metrics::record_token_failure(token_error_type(&e));
            BrokerError::from(e)
        })?;

        let start = Instant::now();
        let result = request.bearer_auth(token.expose_secret()).send().await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let status = if e.is_timeout() { "timeout" } else { "error" };
                metrics::record_provider_request(operation, status, start.elapsed());
                warn!(target: "broker.provider", operation, error = %e, "Provider request failed");
                return Err(BrokerError::upstream(format!(
                    "Provider request '{operation}' failed: {e}"
                )));
            }
        };

        let status = response.status();
        if status.is_success() {
            metrics::record_provider_request(operation, "success", start.elapsed());
            return Ok(response);
        }

        metrics::record_provider_request(operation, "error", start.elapsed());

        // The rejected token is dropped so the next call re-authenticates,
        // unless another call has already replaced it.
        if status == reqwest::StatusCode::UNAUTHORIZED {
            let dropped = self.tokens.invalidate(&token).await;
            debug!(target: "broker.provider", operation, dropped, "Provider rejected bearer token");
        }

        let body = response.text().await.unwrap_or_else(|e| {
            trace!(target: "broker.provider", error = %e, "Failed to read error body");
            String::new()
        });
        let detail = if body.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(&body).unwrap_or(Value::String(body)))
        };

        warn!(
            target: "broker.provider",
            operation,
            status = status.as_u16(),
            "Provider returned an error status"
        );

        Err(BrokerError::Upstream {
            status: Some(status.as_u16()),
            message: format!("Provider request '{operation}' returned {status}"),
            detail,
        })
    }

    async fn read_json<T: DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> Result<T, BrokerError> {
        response.json::<T>().await.map_err(|e| {
            warn!(target: "broker.provider", operation, error = %e, "Malformed provider response");
            BrokerError::upstream(format!("Malformed provider response for '{operation}': {e}"))
        })
    }

    /// Walk a cursor-paginated listing, collecting `items_key` from each page.
    async fn paginate<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: Url,
        query: &[(&str, String)],
        items_key: &str,
        page_size: u32,
        stop_at: Option<usize>,
    ) -> Result<Vec<T>, BrokerError> {
        let mut items: Vec<T> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0_usize;

        loop {
            let mut request = self
                .http
                .get(url.clone())
                .query(query)
                .query(&[("page_size", page_size.to_string())]);
            if let Some(token) = cursor.as_deref() {
                request = request.query(&[("next_page_token", token)]);
            }

            let response = self.send(operation, request).await?;
            let page: Value = Self::read_json(operation, response).await?;
            pages += 1;

            if let Some(entries) = page.get(items_key).and_then(Value::as_array) {
                for entry in entries {
                    let item = serde_json::from_value(entry.clone()).map_err(|e| {
                        BrokerError::upstream(format!(
                            "Malformed '{items_key}' entry in '{operation}' response: {e}"
                        ))
                    })?;
                    items.push(item);
                }
            }

            if stop_at.is_some_and(|limit| items.len() >= limit) {
                debug!(target: "broker.provider", operation, pages, "Stopping pagination early");
                break;
            }

            cursor = page
                .get("next_page_token")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string);

            if cursor.is_none() {
                break;
            }
        }

        trace!(target: "broker.provider", operation, pages, count = items.len(), "Listing complete");
        Ok(items)
    }
}

fn token_error_type(err: &TokenError) -> &'static str {
    match err {
        TokenError::HttpError(_) => "http",
        TokenError::AuthenticationRejected(_) => "auth_rejected",
        TokenError::InvalidResponse(_) => "invalid_response",
        TokenError::Configuration(_) => "configuration",
    }
}

fn push_opt(query: &mut Vec<(&'static str, String)>, key: &'static str, value: Option<&String>) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        query.push((key, v.clone()));
    }
}

#[async_trait]
impl ProviderApi for ProviderClient {
    #[instrument(skip(self, kind), fields(kind = %kind))]
    async fn list_meetings(
        &self,
        host: &str,
        kind: MeetingListKind,
        page_size: u32,
        stop_at: Option<usize>,
    ) -> Result<Vec<ProviderMeeting>, BrokerError> {
        let url = self.endpoint(&["users", host, "meetings"])?;
        self.paginate(
            "list_meetings",
            url,
            &[("type", kind.as_str().to_string())],
            "meetings",
            page_size,
            stop_at,
        )
        .await
    }

    #[instrument(skip(self, request), fields(duration = request.duration))]
    async fn create_meeting(
        &self,
        host: &str,
        request: &CreateMeetingRequest,
    ) -> Result<ProviderMeeting, BrokerError> {
        let url = self.endpoint(&["users", host, "meetings"])?;
        let response = self
            .send("create_meeting", self.http.post(url).json(request))
            .await?;
        Self::read_json("create_meeting", response).await
    }

    #[instrument(skip(self))]
    async fn delete_meeting(&self, meeting_id: &str) -> Result<(), BrokerError> {
        let url = self.endpoint(&["meetings", meeting_id])?;
        self.send("delete_meeting", self.http.request(Method::DELETE, url))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_licensed_users(&self, page_size: u32) -> Result<Vec<ProviderUser>, BrokerError> {
        let url = self.endpoint(&["users"])?;
        let users: Vec<ProviderUser> = self
            .paginate(
                "list_users",
                url,
                &[("status", "active".to_string())],
                "users",
                page_size,
                None,
            )
            .await?;

        Ok(users
            .into_iter()
            .filter(|u| u.user_type == LICENSED_USER_TYPE)
            .collect())
    }

    #[instrument(skip(self, from, to), fields(from = %from, to = %to))]
    async fn list_recordings(
        &self,
        host: &str,
        from: NaiveDate,
        to: NaiveDate,
        page_size: u32,
    ) -> Result<Vec<JsonObject>, BrokerError> {
        let url = self.endpoint(&["users", host, "recordings"])?;
        self.paginate(
            "list_recordings",
            url,
            &[
                ("from", from.format("%Y-%m-%d").to_string()),
                ("to", to.format("%Y-%m-%d").to_string()),
            ],
            "meetings",
            page_size,
            None,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn list_workspaces(&self, page_size: u32) -> Result<Vec<JsonObject>, BrokerError> {
        let url = self.endpoint(&["workspaces"])?;
        self.paginate("list_workspaces", url, &[], "workspaces", page_size, None)
            .await
    }

    #[instrument(skip(self, query))]
    async fn list_reservations(
        &self,
        workspace_id: &str,
        query: &ReservationQuery,
    ) -> Result<JsonObject, BrokerError> {
        let url = self.endpoint(&["workspaces", workspace_id, "reservations"])?;

        let mut params: Vec<(&'static str, String)> = Vec::new();
        push_opt(&mut params, "from", query.from.as_ref());
        push_opt(&mut params, "to", query.to.as_ref());
        push_opt(&mut params, "user_id", query.user_id.as_ref());

        let response = self
            .send("list_reservations", self.http.get(url).query(&params))
            .await?;
        Self::read_json("list_reservations", response).await
    }

    #[instrument(skip(self, payload))]
    async fn create_reservation(
        &self,
        workspace_id: &str,
        payload: &ReservationPayload,
    ) -> Result<JsonObject, BrokerError> {
        let url = self.endpoint(&["workspaces", workspace_id, "reservations"])?;
        let response = self
            .send("create_reservation", self.http.post(url).json(payload))
            .await?;

        let body = response.text().await.map_err(|e| {
            BrokerError::upstream(format!("Failed to read reservation response: {e}"))
        })?;
        if body.trim().is_empty() {
            return Ok(JsonObject::new());
        }
        serde_json::from_str(&body).map_err(|e| {
            BrokerError::upstream(format!("Malformed provider response for 'create_reservation': {e}"))
        })
    }

    #[instrument(skip(self))]
    async fn delete_reservation(
        &self,
        workspace_id: &str,
        reservation_id: &str,
    ) -> Result<(), BrokerError> {
        let url = self.endpoint(&["workspaces", workspace_id, "reservations", reservation_id])?;
        self.send("delete_reservation", self.http.request(Method::DELETE, url))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, query))]
    async fn list_room_locations(
        &self,
        query: &LocationQuery,
        default_page_size: u32,
    ) -> Result<Vec<JsonObject>, BrokerError> {
        let url = self.endpoint(&["rooms", "locations"])?;

        let mut params: Vec<(&'static str, String)> = Vec::new();
        push_opt(&mut params, "parent_location_id", query.parent_location_id.as_ref());
        push_opt(&mut params, "type", query.location_type.as_ref());

        self.paginate(
            "list_room_locations",
            url,
            &params,
            "locations",
            query.page_size.unwrap_or(default_page_size),
            None,
        )
        .await
    }
}

/// In-memory [`ProviderApi`] for unit and integration tests.
pub mod mock {
    use super::*;
    use crate::time::{parse_local, parse_timezone};
    use chrono::{DateTime, Utc};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    /// Build a listed meeting with a fixed start.
    pub fn meeting(id: u64, topic: &str, start: DateTime<Utc>, duration: Option<u32>) -> ProviderMeeting {
        ProviderMeeting {
            id,
            uuid: None,
            occurrence_id: None,
            topic: topic.to_string(),
            start_time: Some(start),
            duration,
            timezone: None,
            agenda: None,
            join_url: Some(format!("https://provider.test/j/{id}")),
            start_url: None,
            host_id: None,
        }
    }

    /// Canned provider state plus a record of what was asked of it.
    ///
    /// Listings are served in pages of the requested size, honoring
    /// `stop_at` the same way the real client does.
    #[derive(Default)]
    pub struct MockProvider {
        meetings: HashMap<(String, MeetingListKind), Vec<ProviderMeeting>>,
        failing_hosts: HashSet<String>,
        fail_creates: bool,
        users: Vec<ProviderUser>,
        recordings: HashMap<String, Vec<JsonObject>>,
        workspaces: Vec<JsonObject>,
        locations: Vec<JsonObject>,
        reservations: JsonObject,

        next_id: AtomicU64,
        list_calls: Mutex<Vec<(String, MeetingListKind)>>,
        pages_served: Mutex<HashMap<(String, MeetingListKind), usize>>,
        creates: Mutex<Vec<(String, CreateMeetingRequest)>>,
        deletes: Mutex<Vec<String>>,
        reservation_queries: Mutex<Vec<(String, ReservationQuery)>>,
        reservation_creates: Mutex<Vec<(String, ReservationPayload)>>,
        reservation_deletes: Mutex<Vec<(String, String)>>,
        recording_calls: AtomicUsize,
    }

    impl MockProvider {
        pub fn new() -> Self {
            Self {
                next_id: AtomicU64::new(90_000_000_001),
                ..Self::default()
            }
        }

        /// Serve `meetings` for `host`'s `kind` listing.
        pub fn with_meetings(
            mut self,
            host: &str,
            kind: MeetingListKind,
            meetings: Vec<ProviderMeeting>,
        ) -> Self {
            self.meetings.insert((host.to_string(), kind), meetings);
            self
        }

        /// Every call naming `host` fails with a provider 500.
        pub fn with_failing_host(mut self, host: &str) -> Self {
            self.failing_hosts.insert(host.to_string());
            self
        }

        /// Meeting creation fails with a provider 500.
        pub fn failing_creates(mut self) -> Self {
            self.fail_creates = true;
            self
        }

        pub fn with_users(mut self, users: Vec<ProviderUser>) -> Self {
            self.users = users;
            self
        }

        pub fn with_recordings(mut self, host: &str, recordings: Vec<JsonObject>) -> Self {
            self.recordings.insert(host.to_string(), recordings);
            self
        }

        pub fn with_workspaces(mut self, workspaces: Vec<JsonObject>) -> Self {
            self.workspaces = workspaces;
            self
        }

        pub fn with_locations(mut self, locations: Vec<JsonObject>) -> Self {
            self.locations = locations;
            self
        }

        pub fn with_reservations(mut self, reservations: JsonObject) -> Self {
            self.reservations = reservations;
            self
        }

        pub fn create_calls(&self) -> Vec<(String, CreateMeetingRequest)> {
            self.creates
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn create_count(&self) -> usize {
            self.creates
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }

        /// `(host, kind)` for every listing requested, in call order.
        pub fn list_calls(&self) -> Vec<(String, MeetingListKind)> {
            self.list_calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Pages served for one listing across all calls.
        pub fn pages_served(&self, host: &str, kind: MeetingListKind) -> usize {
            self.pages_served
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&(host.to_string(), kind))
                .copied()
                .unwrap_or(0)
        }

        pub fn deleted_meetings(&self) -> Vec<String> {
            self.deletes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn reservation_queries(&self) -> Vec<(String, ReservationQuery)> {
            self.reservation_queries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn reservation_creates(&self) -> Vec<(String, ReservationPayload)> {
            self.reservation_creates
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn reservation_deletes(&self) -> Vec<(String, String)> {
            self.reservation_deletes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn recording_calls(&self) -> usize {
            self.recording_calls.load(Ordering::SeqCst)
        }

        fn check_host(&self, host: &str) -> Result<(), BrokerError> {
            if self.failing_hosts.contains(host) {
                return Err(BrokerError::Upstream {
                    status: Some(500),
                    message: format!("Mock provider failure for host {host}"),
                    detail: None,
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ProviderApi for MockProvider {
        async fn list_meetings(
            &self,
            host: &str,
            kind: MeetingListKind,
            page_size: u32,
            stop_at: Option<usize>,
        ) -> Result<Vec<ProviderMeeting>, BrokerError> {
            self.list_calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((host.to_string(), kind));
            self.check_host(host)?;

            let key = (host.to_string(), kind);
            let all = self.meetings.get(&key).cloned().unwrap_or_default();
            let page_size = usize::try_from(page_size).unwrap_or(usize::MAX).max(1);

            let mut out = Vec::new();
            let mut pages = 0;
            for chunk in all.chunks(page_size) {
                pages += 1;
                out.extend_from_slice(chunk);
                if stop_at.is_some_and(|limit| out.len() >= limit) {
                    break;
                }
            }
            // An empty listing is still one page.
            pages = pages.max(1);

            *self
                .pages_served
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(key)
                .or_insert(0) += pages;

            Ok(out)
        }

        async fn create_meeting(
            &self,
            host: &str,
            request: &CreateMeetingRequest,
        ) -> Result<ProviderMeeting, BrokerError> {
            self.creates
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((host.to_string(), request.clone()));

            if self.fail_creates {
                return Err(BrokerError::Upstream {
                    status: Some(500),
                    message: "Mock provider create failure".to_string(),
                    detail: None,
                });
            }

            let tz = parse_timezone(&request.timezone)?;
            let start = parse_local(&request.start_time, tz)?.with_timezone(&Utc);
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);

            Ok(ProviderMeeting {
                id,
                uuid: Some(format!("uuid-{id}")),
                occurrence_id: None,
                topic: request.topic.clone(),
                start_time: Some(start),
                duration: u32::try_from(request.duration).ok(),
                timezone: Some(request.timezone.clone()),
                agenda: request.agenda.clone(),
                join_url: Some(format!("https://provider.test/j/{id}")),
                start_url: Some(format!("https://provider.test/s/{id}")),
                host_id: Some(host.to_string()),
            })
        }

        async fn delete_meeting(&self, meeting_id: &str) -> Result<(), BrokerError> {
            self.deletes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(meeting_id.to_string());
            Ok(())
        }

        async fn list_licensed_users(
            &self,
            _page_size: u32,
        ) -> Result<Vec<ProviderUser>, BrokerError> {
            Ok(self
                .users
                .iter()
                .filter(|u| u.user_type == LICENSED_USER_TYPE)
                .cloned()
                .collect())
        }

        async fn list_recordings(
            &self,
            host: &str,
            _from: NaiveDate,
            _to: NaiveDate,
            _page_size: u32,
        ) -> Result<Vec<JsonObject>, BrokerError> {
            self.recording_calls.fetch_add(1, Ordering::SeqCst);
            self.check_host(host)?;
            Ok(self.recordings.get(host).cloned().unwrap_or_default())
        }

        async fn list_workspaces(&self, _page_size: u32) -> Result<Vec<JsonObject>, BrokerError> {
            Ok(self.workspaces.clone())
        }

        async fn list_reservations(
            &self,
            workspace_id: &str,
            query: &ReservationQuery,
        ) -> Result<JsonObject, BrokerError> {
            self.reservation_queries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((workspace_id.to_string(), query.clone()));
            Ok(self.reservations.clone())
        }

        async fn create_reservation(
            &self,
            workspace_id: &str,
            payload: &ReservationPayload,
        ) -> Result<JsonObject, BrokerError> {
            self.reservation_creates
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((workspace_id.to_string(), payload.clone()));

            let mut created = JsonObject::new();
            created.insert("id".to_string(), Value::String(format!("res-{workspace_id}")));
            created.insert("start_time".to_string(), Value::String(payload.start_time.clone()));
            created.insert("end_time".to_string(), Value::String(payload.end_time.clone()));
            Ok(created)
        }

        async fn delete_reservation(
            &self,
            workspace_id: &str,
            reservation_id: &str,
        ) -> Result<(), BrokerError> {
            self.reservation_deletes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((workspace_id.to_string(), reservation_id.to_string()));
            Ok(())
        }

        async fn list_room_locations(
            &self,
            _query: &LocationQuery,
            _default_page_size: u32,
        ) -> Result<Vec<JsonObject>, BrokerError> {
            Ok(self.locations.clone())
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use common::secret::SecretString;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> ProviderClient {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "test-bearer",
                "expires_in": 3600
            })))
            .mount(server)
            .await;

        let tokens = TokenCache::new(TokenCacheConfig::new(
            format!("{}/oauth/token", server.uri()),
            "acct".to_string(),
            "client".to_string(),
            SecretString::from("secret"),
        ))
        .unwrap();

        ProviderClient::new(
            &format!("{}/v2", server.uri()),
            tokens,
            Duration::from_secs(2),
        )
        .unwrap()
    }

    fn listed(id: u64) -> Value {
        json!({
            "id": id,
            "topic": format!("meeting {id}"),
            "start_time": "2030-01-01T10:00:00Z",
            "duration": 30
        })
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        let tokens = TokenCache::new(TokenCacheConfig::new(
            "http://localhost/oauth".to_string(),
            "a".to_string(),
            "b".to_string(),
            SecretString::from("c"),
        ))
        .unwrap();

        let result = ProviderClient::new("mailto:nobody", tokens, Duration::from_secs(1));
        assert!(matches!(result, Err(BrokerError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_list_meetings_follows_cursor_until_empty_token() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;

        Mock::given(method("GET"))
            .and(path("/v2/users/host-a/meetings"))
            .and(query_param("type", "scheduled"))
            .and(query_param("next_page_token", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meetings": [listed(3)],
                "next_page_token": ""
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2/users/host-a/meetings"))
            .and(query_param("type", "scheduled"))
            .and(query_param("page_size", "2"))
            .and(header("authorization", "Bearer test-bearer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meetings": [listed(1), listed(2)],
                "next_page_token": "page-2"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let meetings = client
            .list_meetings("host-a", MeetingListKind::Scheduled, 2, None)
            .await
            .unwrap();

        let ids: Vec<u64> = meetings.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_list_meetings_stops_early_without_fetching_next_page() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;

        Mock::given(method("GET"))
            .and(path("/v2/users/host-a/meetings"))
            .and(query_param("next_page_token", "more"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meetings": [listed(9)],
                "next_page_token": ""
            })))
            .expect(0)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2/users/host-a/meetings"))
            .and(query_param("type", "live"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meetings": [listed(1), listed(2)],
                "next_page_token": "more"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let meetings = client
            .list_meetings("host-a", MeetingListKind::Live, 30, Some(2))
            .await
            .unwrap();

        assert_eq!(meetings.len(), 2);
    }

    #[tokio::test]
    async fn test_create_meeting_posts_scheduled_payload() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;

        Mock::given(method("POST"))
            .and(path("/v2/users/host-b/meetings"))
            .and(body_partial_json(json!({
                "topic": "Planning",
                "type": 2,
                "start_time": "2030-01-01T09:00:00",
                "duration": 45,
                "timezone": "America/Lima",
                "settings": { "join_before_host": false, "waiting_room": true }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 123,
                "topic": "Planning",
                "start_time": "2030-01-01T14:00:00Z",
                "duration": 45,
                "join_url": "https://zoom.us/j/123",
                "start_url": "https://zoom.us/s/123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = CreateMeetingRequest::scheduled(
            "Planning".to_string(),
            None,
            "2030-01-01T09:00:00".to_string(),
            45,
            "America/Lima".to_string(),
        );
        let created = client.create_meeting("host-b", &request).await.unwrap();

        assert_eq!(created.id, 123);
        assert_eq!(created.start_url.as_deref(), Some("https://zoom.us/s/123"));
    }

    #[tokio::test]
    async fn test_error_status_carries_provider_body() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;

        Mock::given(method("DELETE"))
            .and(path("/v2/meetings/404404"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "code": 3001,
                "message": "Meeting does not exist: 404404."
            })))
            .mount(&server)
            .await;

        let err = client.delete_meeting("404404").await.unwrap_err();

        match err {
            BrokerError::Upstream { status, detail, .. } => {
                assert_eq!(status, Some(404));
                assert_eq!(detail.unwrap()["code"], 3001);
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_token_is_refetched_on_next_call() {
        let server = MockServer::start().await;
        let issued = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = issued.clone();

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(move |_: &wiremock::Request| {
                let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                ResponseTemplate::new(200).set_body_json(json!({
                    "access_token": format!("tok-{n}"),
                    "expires_in": 3600
                }))
            })
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v2/meetings/55"))
            .and(header("authorization", "Bearer tok-0"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": 124,
                "message": "Invalid access token."
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v2/meetings/55"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = TokenCache::new(TokenCacheConfig::new(
            format!("{}/oauth/token", server.uri()),
            "acct".to_string(),
            "client".to_string(),
            SecretString::from("secret"),
        ))
        .unwrap();
        let client =
            ProviderClient::new(&format!("{}/v2", server.uri()), tokens, Duration::from_secs(2))
                .unwrap();

        let err = client.delete_meeting("55").await.unwrap_err();
        assert!(matches!(err, BrokerError::Upstream { status: Some(401), .. }));

        client.delete_meeting("55").await.unwrap();
        assert_eq!(issued.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_licensed_users_keeps_type_two() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;

        Mock::given(method("GET"))
            .and(path("/v2/users"))
            .and(query_param("status", "active"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [
                    { "id": "u1", "email": "basic@x.com", "first_name": "B", "last_name": "Asic", "type": 1 },
                    { "id": "u2", "email": "pro@x.com", "first_name": "P", "last_name": "Ro", "type": 2 }
                ],
                "next_page_token": ""
            })))
            .mount(&server)
            .await;

        let users = client.list_licensed_users(30).await.unwrap();

        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, "pro@x.com");
    }

    #[tokio::test]
    async fn test_token_failure_is_upstream_and_makes_no_api_call() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2/workspaces"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "workspaces": [] })))
            .expect(0)
            .mount(&server)
            .await;

        let tokens = TokenCache::new(TokenCacheConfig::new(
            format!("{}/oauth/token", server.uri()),
            "acct".to_string(),
            "client".to_string(),
            SecretString::from("wrong"),
        ))
        .unwrap();
        let client =
            ProviderClient::new(&format!("{}/v2", server.uri()), tokens, Duration::from_secs(2))
                .unwrap();

        let err = client.list_workspaces(30).await.unwrap_err();
        assert!(matches!(err, BrokerError::Upstream { status: None, .. }));
    }

    #[tokio::test]
    async fn test_timeout_is_upstream() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "t", "expires_in": 3600
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2/workspaces"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "workspaces": [] }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let tokens = TokenCache::new(TokenCacheConfig::new(
            format!("{}/oauth/token", server.uri()),
            "acct".to_string(),
            "client".to_string(),
            SecretString::from("secret"),
        ))
        .unwrap();
        let client = ProviderClient::new(
            &format!("{}/v2", server.uri()),
            tokens,
            Duration::from_millis(200),
        )
        .unwrap();

        let err = client.list_workspaces(30).await.unwrap_err();
        assert!(matches!(err, BrokerError::Upstream { .. }));
    }

    #[tokio::test]
    async fn test_create_reservation_tolerates_empty_body() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;

        Mock::given(method("POST"))
            .and(path("/v2/workspaces/ws-1/reservations"))
            .and(body_partial_json(json!({
                "start_time": "2030-01-01T15:00:00Z",
                "end_time": "2030-01-01T16:00:00Z"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let payload = ReservationPayload {
            start_time: "2030-01-01T15:00:00Z".to_string(),
            end_time: "2030-01-01T16:00:00Z".to_string(),
            topic: None,
            reserve_for: None,
            meeting: None,
        };
        let created = client.create_reservation("ws-1", &payload).await.unwrap();
        assert!(created.is_empty());
    }

    #[tokio::test]
    async fn test_room_locations_pass_filters() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;

        Mock::given(method("GET"))
            .and(path("/v2/rooms/locations"))
            .and(query_param("parent_location_id", "campus-1"))
            .and(query_param("type", "building"))
            .and(query_param("page_size", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "locations": [{ "id": "loc-1", "name": "North", "type": "building" }],
                "next_page_token": ""
            })))
            .expect(1)
            .mount(&server)
            .await;

        let query = LocationQuery {
            parent_location_id: Some("campus-1".to_string()),
            location_type: Some("building".to_string()),
            page_size: Some(50),
        };
        let locations = client.list_room_locations(&query, 20).await.unwrap();

        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0]["name"], "North");
    }

    #[tokio::test]
    async fn test_mock_pages_honor_stop_at() {
        let start = chrono::Utc::now();
        let provider = mock::MockProvider::new().with_meetings(
            "h",
            MeetingListKind::Upcoming,
            (1..=5).map(|i| mock::meeting(i, "t", start, None)).collect(),
        );

        let got = provider
            .list_meetings("h", MeetingListKind::Upcoming, 2, Some(2))
            .await
            .unwrap();

        assert_eq!(got.len(), 2);
        assert_eq!(provider.pages_served("h", MeetingListKind::Upcoming), 1);
    }
}
