use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::scheduling::{
    Appointment, AppointmentStatus, AvailabilityRule, AvailabilitySnapshot, DayOff, Notification,
    QueueStatus, WaitingQueueEntry,
};

use crate::store::{
    AppointmentFilter, BookingGuard, QueueFilter, SchedulingStore, StoreError, StoreResult,
};

/// Non-2xx answer from PostgREST, attached to the `anyhow::Error` so callers
/// can downcast it.
#[derive(Error, Debug, Clone)]
#[error("Supabase API error ({status}): {body}")]
pub struct SupabaseApiError {
    pub status: u16,
    pub body: String,
}

impl SupabaseApiError {
    /// Message of a `RAISE EXCEPTION` from one of the scheduling functions.
    pub fn raised_reason(&self) -> Option<String> {
        let body: Value = serde_json::from_str(&self.body).ok()?;
        body.get("message")?.as_str().map(str::to_string)
    }
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            service_key: config.supabase_service_role_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }

        Ok(headers)
    }

    /// Token for server-side writes. Falls back to the anon key when no
    /// service role key is configured.
    pub fn service_token(&self) -> &str {
        if self.service_key.is_empty() {
            &self.anon_key
        } else {
            &self.service_key
        }
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!("API error ({}): {}", status, text);
            return Err(SupabaseApiError {
                status: status.as_u16(),
                body: text,
            }
            .into());
        }

        // `return=minimal` answers carry no body.
        let payload = if text.trim().is_empty() { "null" } else { text.as_str() };
        Ok(serde_json::from_str(payload)?)
    }

    /// Calls a Postgres function exposed under `/rest/v1/rpc`.
    pub async fn rpc<T>(&self, function: &str, args: Value) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let path = format!("/rest/v1/rpc/{}", function);
        self.request(Method::POST, &path, Some(self.service_token()), Some(args))
            .await
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

/// `SchedulingStore` over PostgREST. Guarded and cross-table writes go
/// through the functions in `migrations/0001_scheduling.sql`, which run in a
/// single transaction.
pub struct SupabaseStore {
    client: Arc<SupabaseClient>,
}

#[derive(Deserialize)]
struct PromotionRow {
    entry: WaitingQueueEntry,
    appointment: Appointment,
}

fn representation() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

fn encode_instant(instant: &DateTime<Utc>) -> String {
    urlencoding::encode(&instant.to_rfc3339()).into_owned()
}

fn map_error(err: anyhow::Error) -> StoreError {
    if let Some(api) = err.downcast_ref::<SupabaseApiError>() {
        if let Some(reason) = api.raised_reason() {
            match reason.as_str() {
                "availability_changed" => return StoreError::StaleSnapshot,
                "not_found" => return StoreError::NotFound(api.body.clone()),
                "slot_taken" | "terminal_state" | "status_changed" | "entry_not_waiting"
                | "entry_changed" => {
                    return StoreError::Conflict(reason)
                }
                _ => {}
            }
        }
        if api.status == 404 {
            return StoreError::NotFound(api.body.clone());
        }
    }
    StoreError::Backend(err.to_string())
}

fn first_row<T>(rows: Vec<T>, kind: &str, id: Uuid) -> StoreResult<T> {
    rows.into_iter()
        .next()
        .ok_or_else(|| StoreError::NotFound(format!("{} {}", kind, id)))
}

fn to_body<T: serde::Serialize>(value: &T) -> StoreResult<Value> {
    serde_json::to_value(value).map_err(|e| StoreError::Backend(e.to_string()))
}

impl SupabaseStore {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self { client }
    }

    async fn select<T: DeserializeOwned>(&self, path: &str) -> StoreResult<Vec<T>> {
        self.client
            .request(Method::GET, path, Some(self.client.service_token()), None)
            .await
            .map_err(map_error)
    }

    async fn write<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> StoreResult<Vec<T>> {
        self.client
            .request_with_headers(
                method,
                path,
                Some(self.client.service_token()),
                body,
                Some(representation()),
            )
            .await
            .map_err(map_error)
    }

    async fn rpc<T: DeserializeOwned>(&self, function: &str, args: Value) -> StoreResult<T> {
        self.client.rpc(function, args).await.map_err(map_error)
    }
}

#[async_trait]
impl SchedulingStore for SupabaseStore {
    async fn list_rules(&self, doctor_id: Uuid) -> StoreResult<Vec<AvailabilityRule>> {
        let path = format!(
            "/rest/v1/availability_rules?doctor_id=eq.{}&order=effective_from.asc,created_at.asc",
            doctor_id
        );
        self.select(&path).await
    }

    async fn get_rule(&self, rule_id: Uuid) -> StoreResult<AvailabilityRule> {
        let path = format!("/rest/v1/availability_rules?id=eq.{}", rule_id);
        first_row(self.select(&path).await?, "availability rule", rule_id)
    }

    async fn insert_rule(&self, rule: AvailabilityRule) -> StoreResult<AvailabilityRule> {
        let rows = self
            .write(Method::POST, "/rest/v1/availability_rules", Some(to_body(&rule)?))
            .await?;
        first_row(rows, "availability rule", rule.id)
    }

    async fn update_rule(&self, rule: AvailabilityRule) -> StoreResult<AvailabilityRule> {
        let path = format!("/rest/v1/availability_rules?id=eq.{}", rule.id);
        let rows = self.write(Method::PATCH, &path, Some(to_body(&rule)?)).await?;
        first_row(rows, "availability rule", rule.id)
    }

    async fn delete_rule(&self, rule_id: Uuid) -> StoreResult<()> {
        let path = format!("/rest/v1/availability_rules?id=eq.{}", rule_id);
        let rows: Vec<AvailabilityRule> = self.write(Method::DELETE, &path, None).await?;
        first_row(rows, "availability rule", rule_id).map(|_| ())
    }

    async fn list_days_off(&self, doctor_id: Uuid) -> StoreResult<Vec<DayOff>> {
        let path = format!(
            "/rest/v1/doctor_days_off?doctor_id=eq.{}&order=start_date.asc",
            doctor_id
        );
        self.select(&path).await
    }

    async fn get_day_off(&self, day_off_id: Uuid) -> StoreResult<DayOff> {
        let path = format!("/rest/v1/doctor_days_off?id=eq.{}", day_off_id);
        first_row(self.select(&path).await?, "day off", day_off_id)
    }

    async fn insert_day_off(&self, day_off: DayOff) -> StoreResult<DayOff> {
        let rows = self
            .write(Method::POST, "/rest/v1/doctor_days_off", Some(to_body(&day_off)?))
            .await?;
        first_row(rows, "day off", day_off.id)
    }

    async fn delete_day_off(&self, day_off_id: Uuid) -> StoreResult<()> {
        let path = format!("/rest/v1/doctor_days_off?id=eq.{}", day_off_id);
        let rows: Vec<DayOff> = self.write(Method::DELETE, &path, None).await?;
        first_row(rows, "day off", day_off_id).map(|_| ())
    }

    async fn availability_snapshot(&self, doctor_id: Uuid) -> StoreResult<AvailabilitySnapshot> {
        self.rpc("availability_snapshot", json!({ "p_doctor_id": doctor_id }))
            .await
    }

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Appointment> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        first_row(self.select(&path).await?, "appointment", id)
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> StoreResult<Vec<Appointment>> {
        let mut path = String::from("/rest/v1/appointments?order=appointment_date.asc");
        if let Some(patient_id) = filter.patient_id {
            path.push_str(&format!("&patient_id=eq.{}", patient_id));
        }
        if let Some(doctor_id) = filter.doctor_id {
            path.push_str(&format!("&doctor_id=eq.{}", doctor_id));
        }
        if let Some(status) = filter.status {
            path.push_str(&format!("&status=eq.{}", status));
        }
        if let Some(from) = filter.from {
            path.push_str(&format!("&appointment_date=gte.{}", encode_instant(&from)));
        }
        if let Some(to) = filter.to {
            path.push_str(&format!("&appointment_date=lt.{}", encode_instant(&to)));
        }
        self.select(&path).await
    }

    async fn insert_appointment(
        &self,
        appointment: Appointment,
        guard: BookingGuard,
    ) -> StoreResult<Appointment> {
        self.rpc(
            "book_appointment",
            json!({
                "p_appointment": to_body(&appointment)?,
                "p_schedule_revision": guard.schedule_revision,
                "p_slot_minutes": guard.slot_minutes,
            }),
        )
        .await
    }

    async fn update_appointment(
        &self,
        mut appointment: Appointment,
        expected_status: AppointmentStatus,
        guard: Option<BookingGuard>,
    ) -> StoreResult<Appointment> {
        if let Some(guard) = guard {
            return self
                .rpc(
                    "reschedule_appointment",
                    json!({
                        "p_appointment": to_body(&appointment)?,
                        "p_expected_status": expected_status,
                        "p_schedule_revision": guard.schedule_revision,
                        "p_slot_minutes": guard.slot_minutes,
                    }),
                )
                .await;
        }

        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}&version=eq.{}",
            appointment.id, expected_status, appointment.version
        );
        appointment.version += 1;
        let rows: Vec<Appointment> = self
            .write(Method::PATCH, &path, Some(to_body(&appointment)?))
            .await?;

        if let Some(updated) = rows.into_iter().next() {
            return Ok(updated);
        }

        // Zero rows matched: tell a missing row apart from a lost race.
        let current = self.get_appointment(appointment.id).await?;
        warn!(
            "Appointment {} is {} at version {} (expected {} at {}), update rejected",
            appointment.id,
            current.status,
            current.version,
            expected_status,
            appointment.version - 1
        );
        let reason = if current.status.is_terminal() {
            "terminal_state"
        } else {
            "status_changed"
        };
        Err(StoreError::Conflict(reason.to_string()))
    }

    async fn get_queue_entry(&self, id: Uuid) -> StoreResult<WaitingQueueEntry> {
        let path = format!("/rest/v1/waiting_queue?id=eq.{}", id);
        first_row(self.select(&path).await?, "queue entry", id)
    }

    async fn list_queue_entries(&self, filter: &QueueFilter) -> StoreResult<Vec<WaitingQueueEntry>> {
        let mut path = String::from("/rest/v1/waiting_queue?order=created_at.asc");
        if let Some(doctor_id) = filter.doctor_id {
            path.push_str(&format!("&doctor_id=eq.{}", doctor_id));
        }
        if let Some(patient_id) = filter.patient_id {
            path.push_str(&format!("&patient_id=eq.{}", patient_id));
        }
        if let Some(status) = filter.status {
            path.push_str(&format!("&status=eq.{}", status));
        }
        self.select(&path).await
    }

    async fn insert_queue_entry(&self, entry: WaitingQueueEntry) -> StoreResult<WaitingQueueEntry> {
        let rows = self
            .write(Method::POST, "/rest/v1/waiting_queue", Some(to_body(&entry)?))
            .await?;
        first_row(rows, "queue entry", entry.id)
    }

    async fn update_queue_entry(
        &self,
        mut entry: WaitingQueueEntry,
        expected_status: QueueStatus,
    ) -> StoreResult<WaitingQueueEntry> {
        let path = format!(
            "/rest/v1/waiting_queue?id=eq.{}&status=eq.{}&version=eq.{}",
            entry.id, expected_status, entry.version
        );
        entry.version += 1;
        let rows: Vec<WaitingQueueEntry> = self
            .write(Method::PATCH, &path, Some(to_body(&entry)?))
            .await?;

        if let Some(updated) = rows.into_iter().next() {
            return Ok(updated);
        }

        let current = self.get_queue_entry(entry.id).await?;
        let reason = if current.status != expected_status {
            "entry_not_waiting"
        } else {
            "entry_changed"
        };
        Err(StoreError::Conflict(reason.to_string()))
    }

    async fn promote_queue_entry(
        &self,
        entry_id: Uuid,
        appointment: Appointment,
        guard: BookingGuard,
    ) -> StoreResult<(WaitingQueueEntry, Appointment)> {
        let row: PromotionRow = self
            .rpc(
                "promote_queue_entry",
                json!({
                    "p_entry_id": entry_id,
                    "p_appointment": to_body(&appointment)?,
                    "p_schedule_revision": guard.schedule_revision,
                    "p_slot_minutes": guard.slot_minutes,
                }),
            )
            .await?;
        Ok((row.entry, row.appointment))
    }

    async fn expire_queue_entries(
        &self,
        created_before: DateTime<Utc>,
    ) -> StoreResult<Vec<WaitingQueueEntry>> {
        self.rpc(
            "expire_queue_entries",
            json!({ "p_created_before": created_before }),
        )
        .await
    }

    async fn insert_notification(&self, notification: Notification) -> StoreResult<Notification> {
        let rows = self
            .write(Method::POST, "/rest/v1/notifications", Some(to_body(&notification)?))
            .await?;
        first_row(rows, "notification", notification.id)
    }

    async fn get_notification(&self, id: Uuid) -> StoreResult<Notification> {
        let path = format!("/rest/v1/notifications?id=eq.{}", id);
        first_row(self.select(&path).await?, "notification", id)
    }

    async fn list_notifications(&self, user_id: Uuid, unread_only: bool) -> StoreResult<Vec<Notification>> {
        let mut path = format!(
            "/rest/v1/notifications?user_id=eq.{}&order=created_at.desc",
            user_id
        );
        if unread_only {
            path.push_str("&read=eq.false");
        }
        self.select(&path).await
    }

    async fn mark_notification_read(&self, id: Uuid) -> StoreResult<Notification> {
        let path = format!("/rest/v1/notifications?id=eq.{}", id);
        let rows = self
            .write(Method::PATCH, &path, Some(json!({ "read": true })))
            .await?;
        first_row(rows, "notification", id)
    }
}
