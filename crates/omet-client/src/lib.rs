//! Read-only tenant client for the Orchestrator REST API.
//!
//! The client fetches monitoring data only; it never mutates anything in the
//! remote tenant. Authentication uses the refresh-token grant and the access
//! token is held in a session slot that refreshes itself shortly before
//! expiry.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use omet_core::MISSING_PLACEHOLDER;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

pub const CRATE_NAME: &str = "omet-client";

const AUTH_URL: &str = "https://account.uipath.com/oauth/token";

/// Seconds subtracted from the reported token lifetime before a refresh is
/// forced, so a token never expires mid-request.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("malformed response from {endpoint}: {detail}")]
    Malformed {
        endpoint: &'static str,
        detail: String,
    },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub organisation: String,
    pub tenant: String,
    pub client_id: String,
    pub refresh_token: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Folder {
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(rename = "DisplayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueDefinition {
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(rename = "Name")]
    pub name: String,
}

/// A faulted job composed from the jobs listing plus its per-job fault
/// reason lookup. Serialized field names are the sink column names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaultedJob {
    #[serde(rename = "Process_name")]
    pub process_name: String,
    #[serde(rename = "Organization")]
    pub organization: String,
    #[serde(rename = "Folder")]
    pub folder: String,
    #[serde(rename = "Machine")]
    pub machine: String,
    #[serde(rename = "Started")]
    pub started: String,
    #[serde(rename = "Ended")]
    pub ended: String,
    #[serde(rename = "Reason")]
    pub reason: String,
}

/// A disabled, non-queue process schedule found in one folder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisabledTrigger {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Enabled")]
    pub enabled: bool,
    #[serde(rename = "NextStart")]
    pub next_start: String,
    #[serde(rename = "Folder")]
    pub folder: String,
}

/// Queue definition counters merged across every folder the queue appears
/// in; duplicate queue names concatenate their folder names with `/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueRollup {
    #[serde(rename = "QueueDefinitionName")]
    pub queue_name: String,
    #[serde(rename = "Organization")]
    pub organization: String,
    #[serde(rename = "Folder")]
    pub folder: String,
    #[serde(rename = "SuccessfulTransactionsNo")]
    pub successful: i64,
    #[serde(rename = "ApplicationExceptionsNo")]
    pub application_exceptions: i64,
    #[serde(rename = "BusinessExceptionsNo")]
    pub business_exceptions: i64,
}

#[derive(Debug, Clone)]
struct SessionToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl SessionToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - ChronoDuration::seconds(TOKEN_EXPIRY_MARGIN_SECS) > now
    }
}

#[derive(Debug)]
pub struct TenantClient {
    http: reqwest::Client,
    base_url: String,
    config: ClientConfig,
    session: Mutex<Option<SessionToken>>,
}

impl TenantClient {
    pub fn new(config: ClientConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .build()?;
        let base_url = format!(
            "https://cloud.uipath.com/{}/{}/orchestrator_/",
            config.organisation, config.tenant
        );
        Ok(Self {
            http,
            base_url,
            config,
            session: Mutex::new(None),
        })
    }

    pub fn organisation(&self) -> &str {
        &self.config.organisation
    }

    async fn bearer_token(&self) -> Result<String, FetchError> {
        let mut session = self.session.lock().await;
        if let Some(token) = session.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.access_token.clone());
            }
        }
        let fresh = self.authenticate().await?;
        let access_token = fresh.access_token.clone();
        *session = Some(fresh);
        Ok(access_token)
    }

    async fn authenticate(&self) -> Result<SessionToken, FetchError> {
        let body = serde_json::json!({
            "grant_type": "refresh_token",
            "client_id": self.config.client_id,
            "refresh_token": self.config.refresh_token,
        });
        let response = self
            .http
            .post(AUTH_URL)
            .header("X-UIPATH-TenantName", &self.config.tenant)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Auth(format!(
                "token endpoint returned {status}"
            )));
        }
        let value = response.json::<Value>().await?;
        session_from_auth_json(&value, Utc::now())
    }

    async fn get_json(
        &self,
        url: &str,
        folder_id: Option<i64>,
    ) -> Result<Value, FetchError> {
        let token = self.bearer_token().await?;
        let mut request = self.http.get(url).bearer_auth(token);
        if let Some(folder_id) = folder_id {
            request = request.header("X-UIPATH-OrganizationUnitId", folder_id.to_string());
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        Ok(response.json::<Value>().await?)
    }

    pub async fn folders(&self) -> Result<Vec<Folder>, FetchError> {
        let url = format!("{}odata/Folders", self.base_url);
        let value = self.get_json(&url, None).await?;
        let items = expect_field_array("Folders", value, "value")?;
        items
            .into_iter()
            .map(|item| {
                serde_json::from_value(item).map_err(|err| FetchError::Malformed {
                    endpoint: "Folders",
                    detail: err.to_string(),
                })
            })
            .collect()
    }

    pub async fn queue_definitions(&self) -> Result<Vec<QueueDefinition>, FetchError> {
        let url = format!("{}odata/QueueDefinitions", self.base_url);
        let value = self.get_json(&url, None).await?;
        let items = expect_field_array("QueueDefinitions", value, "value")?;
        items
            .into_iter()
            .map(|item| {
                serde_json::from_value(item).map_err(|err| FetchError::Malformed {
                    endpoint: "QueueDefinitions",
                    detail: err.to_string(),
                })
            })
            .collect()
    }

    /// Last-days processing records for every queue definition, with the
    /// queue name injected into each record for downstream filtering.
    pub async fn queue_processing_records(&self, days: u32) -> Result<Vec<Value>, FetchError> {
        let queues = self.queue_definitions().await?;
        let mut records = Vec::new();
        for queue in &queues {
            let url = format!(
                "{}odata/QueueProcessingRecords/UiPathODataSvc.RetrieveLastDaysProcessingRecords(daysNo={days},queueDefinitionId={})",
                self.base_url, queue.id
            );
            let value = self.get_json(&url, None).await?;
            for mut record in expect_field_array("RetrieveLastDaysProcessingRecords", value, "value")? {
                if let Some(map) = record.as_object_mut() {
                    map.insert("Name".to_string(), Value::String(queue.name.clone()));
                }
                records.push(record);
            }
        }
        Ok(records)
    }

    pub async fn queue_details_table(&self, time_frame_minutes: u32) -> Result<Vec<Value>, FetchError> {
        let url = format!(
            "{}monitoring/QueuesMonitoring/GetQueuesTable?timeFrameMinutes={time_frame_minutes}&pageNo=1&pageSize=1000&orderBy=queueName&direction=asc",
            self.base_url
        );
        let value = self.get_json(&url, None).await?;
        expect_field_array("GetQueuesTable", value, "data")
    }

    pub async fn unprocessed_items(&self, time_frame_minutes: u32) -> Result<Value, FetchError> {
        let url = format!(
            "{}monitoring/QueuesMonitoring/GetUnprocessedItemsCounts?timeFrameMinutes={time_frame_minutes}",
            self.base_url
        );
        self.get_json(&url, None).await
    }

    pub async fn transactions_overview(&self, time_frame_minutes: u32) -> Result<Value, FetchError> {
        let url = format!(
            "{}monitoring/QueuesMonitoring/GetProcessedItemsCounts?timeFrameMinutes={time_frame_minutes}",
            self.base_url
        );
        self.get_json(&url, None).await
    }

    pub async fn transactions_timeline(&self, time_frame_minutes: u32) -> Result<Vec<Value>, FetchError> {
        let url = format!(
            "{}monitoring/QueuesMonitoring/GetProcessedItemsEvolution?timeFrameMinutes={time_frame_minutes}",
            self.base_url
        );
        let value = self.get_json(&url, None).await?;
        expect_array("GetProcessedItemsEvolution", value)
    }

    pub async fn completed_jobs_timeline(&self, time_frame_minutes: u32) -> Result<Vec<Value>, FetchError> {
        let url = format!(
            "{}monitoring/JobsMonitoring/GetFinishedJobsEvolution?timeFrameMinutes={time_frame_minutes}",
            self.base_url
        );
        let value = self.get_json(&url, None).await?;
        expect_array("GetFinishedJobsEvolution", value)
    }

    pub async fn completed_jobs_timeframe(&self, time_frame_minutes: u32) -> Result<Vec<Value>, FetchError> {
        let url = format!(
            "{}monitoring/JobsMonitoring/GetRunningJobsEvolution?timeFrameMinutes={time_frame_minutes}",
            self.base_url
        );
        let value = self.get_json(&url, None).await?;
        expect_array("GetRunningJobsEvolution", value)
    }

    pub async fn triggered_job_states(&self, time_frame_minutes: u32) -> Result<Value, FetchError> {
        let url = format!(
            "{}monitoring/JobsMonitoring/GetJobsCounts?timeFrameMinutes={time_frame_minutes}",
            self.base_url
        );
        self.get_json(&url, None).await
    }

    pub async fn completed_jobs_overview(&self, time_frame_minutes: u32) -> Result<Value, FetchError> {
        let url = format!(
            "{}monitoring/JobsMonitoring/GetFinishedJobsCounts?timeFrameMinutes={time_frame_minutes}",
            self.base_url
        );
        self.get_json(&url, None).await
    }

    pub async fn process_details_table(&self, time_frame_minutes: u32) -> Result<Vec<Value>, FetchError> {
        let url = format!(
            "{}monitoring/JobsMonitoring/GetProcessesTable?timeFrameMinutes={time_frame_minutes}&pageNo=1&pageSize=1000&orderBy=processId&direction=asc",
            self.base_url
        );
        let value = self.get_json(&url, None).await?;
        expect_field_array("GetProcessesTable", value, "data")
    }

    pub async fn job_stats(&self) -> Result<Vec<Value>, FetchError> {
        let url = format!("{}api/Stats/GetJobsStats", self.base_url);
        let value = self.get_json(&url, None).await?;
        expect_array("GetJobsStats", value)
    }

    pub async fn maintenance_mode_status(&self) -> Result<Vec<Value>, FetchError> {
        let url = format!(
            "{}odata/Sessions/UiPath.Server.Configuration.OData.GetMachineSessionRuntimes?runtimeType=Unattended",
            self.base_url
        );
        let value = self.get_json(&url, None).await?;
        expect_field_array("GetMachineSessionRuntimes", value, "value")
    }

    /// Faulted jobs across every folder over the trailing six days. A folder
    /// that fails to list (or a job whose reason lookup fails) is skipped so
    /// one bad folder cannot hide the rest.
    pub async fn faulted_jobs(&self) -> Result<Vec<FaultedJob>, FetchError> {
        let folders = self.folders().await?;
        let url = faulted_jobs_url(&self.base_url, Utc::now() - ChronoDuration::days(6));

        let mut jobs = Vec::new();
        for folder in &folders {
            let value = match self.get_json(&url, Some(folder.id)).await {
                Ok(value) => value,
                Err(err) => {
                    warn!(folder = %folder.display_name, error = %err, "skipping folder while listing faulted jobs");
                    continue;
                }
            };
            let items = match expect_field_array("Jobs", value, "value") {
                Ok(items) => items,
                Err(err) => {
                    warn!(folder = %folder.display_name, error = %err, "skipping folder while listing faulted jobs");
                    continue;
                }
            };
            for item in items {
                let Some(key) = item.get("Key").and_then(Value::as_str) else {
                    continue;
                };
                let reason = match self.fault_reason(key, folder.id).await {
                    Ok(reason) => reason,
                    Err(err) => {
                        warn!(folder = %folder.display_name, job_key = key, error = %err, "skipping faulted job without a reachable reason");
                        continue;
                    }
                };
                jobs.push(FaultedJob {
                    process_name: string_field(&item, "ReleaseName"),
                    organization: string_field(&item, "OrganizationUnitFullyQualifiedName"),
                    folder: folder.display_name.clone(),
                    machine: string_field(&item, "HostMachineName"),
                    started: string_field(&item, "StartTime"),
                    ended: string_field(&item, "EndTime"),
                    reason,
                });
            }
        }
        Ok(jobs)
    }

    async fn fault_reason(&self, key: &str, folder_id: i64) -> Result<String, FetchError> {
        let url = format!(
            "{}odata/Jobs/UiPath.Server.Configuration.OData.GetByKey(identifier={key})?$expand=Robot,Release,Machine",
            self.base_url
        );
        let value = self.get_json(&url, Some(folder_id)).await?;
        let info = value.get("Info").and_then(Value::as_str).unwrap_or_default();
        Ok(truncate_reason(info))
    }

    /// Disabled, non-queue process schedules across every folder. Folders
    /// with no matching schedules (or that fail to answer) are skipped.
    pub async fn disabled_triggers(&self) -> Result<Vec<DisabledTrigger>, FetchError> {
        let folders = self.folders().await?;
        let url = format!(
            "{}odata/ProcessSchedules?$top=100&$filter=((Enabled eq false) and (QueueDefinitionId eq null))&$orderby=Name asc",
            self.base_url
        );

        let mut triggers = Vec::new();
        for folder in &folders {
            let value = match self.get_json(&url, Some(folder.id)).await {
                Ok(value) => value,
                Err(err) => {
                    warn!(folder = %folder.display_name, error = %err, "skipping folder while listing disabled triggers");
                    continue;
                }
            };
            if odata_count(&value) == 0 {
                continue;
            }
            let items = match expect_field_array("ProcessSchedules", value, "value") {
                Ok(items) => items,
                Err(err) => {
                    warn!(folder = %folder.display_name, error = %err, "skipping folder while listing disabled triggers");
                    continue;
                }
            };
            for item in items {
                triggers.push(DisabledTrigger {
                    name: string_field(&item, "Name"),
                    enabled: item.get("Enabled").and_then(Value::as_bool).unwrap_or(false),
                    next_start: string_field(&item, "NextStart"),
                    folder: folder.display_name.clone(),
                });
            }
        }
        Ok(triggers)
    }

    /// Queue definition counters listed per folder and merged by queue name.
    pub async fn queue_data(&self) -> Result<Vec<QueueRollup>, FetchError> {
        let folders = self.folders().await?;
        let url = format!(
            "{}odata/QueueDefinitions/UiPath.Server.Configuration.OData.ListQueues?$top=20&$orderby=QueueDefinitionName%20asc",
            self.base_url
        );

        let mut rollups: Vec<QueueRollup> = Vec::new();
        for folder in &folders {
            let value = match self.get_json(&url, Some(folder.id)).await {
                Ok(value) => value,
                Err(err) => {
                    warn!(folder = %folder.display_name, error = %err, "skipping folder while listing queues");
                    continue;
                }
            };
            if odata_count(&value) == 0 {
                continue;
            }
            let items = match expect_field_array("ListQueues", value, "value") {
                Ok(items) => items,
                Err(err) => {
                    warn!(folder = %folder.display_name, error = %err, "skipping folder while listing queues");
                    continue;
                }
            };
            merge_queue_page(
                &mut rollups,
                &self.config.organisation,
                &folder.display_name,
                &items,
            );
        }
        Ok(rollups)
    }
}

fn session_from_auth_json(value: &Value, now: DateTime<Utc>) -> Result<SessionToken, FetchError> {
    let access_token = value
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or_else(|| FetchError::Auth("token response carried no access_token".to_string()))?
        .to_string();
    let expires_in = value
        .get("expires_in")
        .and_then(Value::as_i64)
        .unwrap_or(3600);
    Ok(SessionToken {
        access_token,
        expires_at: now + ChronoDuration::seconds(expires_in),
    })
}

fn faulted_jobs_url(base_url: &str, since: DateTime<Utc>) -> String {
    let creation_time = since.format("%Y-%m-%dT%H:%M:%S%.3fZ");
    format!(
        "{base_url}odata/Jobs?$top=100&$filter=((CreationTime ge {creation_time}) and (State eq '4') and (ProcessType eq 'Process'))&$expand=Robot,Machine,Release&$orderby=StartTime desc"
    )
}

/// Reasons are truncated to their first 200 characters with a `...` marker,
/// matching what downstream dashboards expect.
fn truncate_reason(info: &str) -> String {
    let mut shortened: String = info.chars().take(200).collect();
    shortened.push_str("...");
    shortened
}

fn merge_queue_page(
    rollups: &mut Vec<QueueRollup>,
    organisation: &str,
    folder_name: &str,
    items: &[Value],
) {
    for item in items {
        let Some(name) = item.get("QueueDefinitionName").and_then(Value::as_str) else {
            continue;
        };
        if let Some(existing) = rollups.iter_mut().find(|r| r.queue_name == name) {
            existing.folder.push('/');
            existing.folder.push_str(folder_name);
        } else {
            rollups.push(QueueRollup {
                queue_name: name.to_string(),
                organization: organisation.to_string(),
                folder: folder_name.to_string(),
                successful: int_field(item, "SuccessfulTransactionsNo"),
                application_exceptions: int_field(item, "ApplicationExceptionsNo"),
                business_exceptions: int_field(item, "BusinessExceptionsNo"),
            });
        }
    }
}

fn string_field(item: &Value, key: &str) -> String {
    match item.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => MISSING_PLACEHOLDER.to_string(),
        Some(other) => other.to_string(),
    }
}

fn int_field(item: &Value, key: &str) -> i64 {
    item.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn odata_count(value: &Value) -> i64 {
    match value.get("@odata.count") {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn expect_array(endpoint: &'static str, value: Value) -> Result<Vec<Value>, FetchError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(FetchError::Malformed {
            endpoint,
            detail: format!("expected an array, got {}", json_kind(&other)),
        }),
    }
}

fn expect_field_array(
    endpoint: &'static str,
    mut value: Value,
    field: &str,
) -> Result<Vec<Value>, FetchError> {
    match value.get_mut(field).map(Value::take) {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(FetchError::Malformed {
            endpoint,
            detail: format!("field {field} held {}, not an array", json_kind(&other)),
        }),
        None => Err(FetchError::Malformed {
            endpoint,
            detail: format!("response carried no {field} field"),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn auth_json_yields_a_session_with_expiry() {
        let now = Utc.with_ymd_and_hms(2026, 8, 4, 12, 0, 0).single().unwrap();
        let session = session_from_auth_json(
            &json!({"access_token": "tok-123", "expires_in": 1800}),
            now,
        )
        .unwrap();
        assert_eq!(session.access_token, "tok-123");
        assert_eq!(session.expires_at, now + ChronoDuration::seconds(1800));
        assert!(session.is_fresh(now));
        assert!(!session.is_fresh(now + ChronoDuration::seconds(1790)));
    }

    #[test]
    fn auth_json_without_token_is_rejected() {
        let now = Utc::now();
        let err = session_from_auth_json(&json!({"expires_in": 3600}), now).unwrap_err();
        assert!(matches!(err, FetchError::Auth(_)));
    }

    #[test]
    fn reasons_truncate_to_200_chars_with_marker() {
        let long = "x".repeat(300);
        let shortened = truncate_reason(&long);
        assert_eq!(shortened.chars().count(), 203);
        assert!(shortened.ends_with("..."));

        assert_eq!(truncate_reason("boom"), "boom...");
    }

    #[test]
    fn duplicate_queue_names_merge_folders_with_slash() {
        let mut rollups = Vec::new();
        let page = vec![json!({
            "QueueDefinitionName": "Invoices",
            "SuccessfulTransactionsNo": 10,
            "ApplicationExceptionsNo": 1,
            "BusinessExceptionsNo": 2,
        })];
        merge_queue_page(&mut rollups, "acme", "Finance", &page);
        merge_queue_page(&mut rollups, "acme", "Shared", &page);

        assert_eq!(rollups.len(), 1);
        assert_eq!(rollups[0].folder, "Finance/Shared");
        assert_eq!(rollups[0].successful, 10);
        assert_eq!(rollups[0].organization, "acme");
    }

    #[test]
    fn distinct_queues_stay_separate_rows() {
        let mut rollups = Vec::new();
        merge_queue_page(
            &mut rollups,
            "acme",
            "Finance",
            &[
                json!({"QueueDefinitionName": "Invoices", "SuccessfulTransactionsNo": 1, "ApplicationExceptionsNo": 0, "BusinessExceptionsNo": 0}),
                json!({"QueueDefinitionName": "Payroll", "SuccessfulTransactionsNo": 2, "ApplicationExceptionsNo": 0, "BusinessExceptionsNo": 0}),
            ],
        );
        assert_eq!(rollups.len(), 2);
        assert_eq!(rollups[1].queue_name, "Payroll");
    }

    #[test]
    fn faulted_jobs_filter_uses_millisecond_timestamps() {
        let since = Utc
            .with_ymd_and_hms(2026, 7, 29, 8, 30, 0)
            .single()
            .unwrap();
        let url = faulted_jobs_url("https://cloud.example/org/tenant/orchestrator_/", since);
        assert!(url.contains("CreationTime ge 2026-07-29T08:30:00.000Z"));
        assert!(url.contains("State eq '4'"));
        assert!(url.contains("$top=100"));
        assert!(url.ends_with("$orderby=StartTime desc"));
    }

    #[test]
    fn odata_counts_accept_numbers_and_strings() {
        assert_eq!(odata_count(&json!({"@odata.count": 3})), 3);
        assert_eq!(odata_count(&json!({"@odata.count": "7"})), 7);
        assert_eq!(odata_count(&json!({})), 0);
    }

    #[test]
    fn absent_string_fields_become_the_placeholder() {
        let item = json!({"Name": "Nightly", "NextStart": null});
        assert_eq!(string_field(&item, "Name"), "Nightly");
        assert_eq!(string_field(&item, "NextStart"), "N/A");
        assert_eq!(string_field(&item, "Missing"), "N/A");
    }

    #[test]
    fn field_array_extraction_reports_shape_problems() {
        let items = expect_field_array("Folders", json!({"value": [1, 2]}), "value").unwrap();
        assert_eq!(items.len(), 2);

        let err = expect_field_array("Folders", json!({"value": 5}), "value").unwrap_err();
        assert!(matches!(err, FetchError::Malformed { endpoint: "Folders", .. }));

        let err = expect_field_array("Folders", json!({}), "value").unwrap_err();
        assert!(err.to_string().contains("no value field"));
    }
}
