//! Clio Manage: matters and time entries

use super::{endpoint, send_json};
use crate::{EmailBillError, Result};
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Matter summary for the matter picker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Matter {
    pub id: u64,
    pub display_name: String,
    pub client_email: String,
}

/// A logged time entry, durations in hours
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub id: u64,
    pub description: String,
    pub date: Option<String>,
    pub duration: f64,
    pub matter_id: Option<u64>,
}

/// Input for a new time entry
#[derive(Debug, Clone, PartialEq)]
pub struct NewTimeEntry {
    pub matter_id: u64,
    pub hours: f64,
    pub description: String,
    pub date: NaiveDate,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct RawMatter {
    id: u64,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    display_number: Option<String>,
    #[serde(default)]
    client: Option<RawClient>,
}

#[derive(Deserialize)]
struct RawClient {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct RawActivity {
    id: u64,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    date: Option<String>,
    /// Seconds
    #[serde(default)]
    quantity: Option<f64>,
    #[serde(default)]
    matter: Option<RawMatterRef>,
}

#[derive(Deserialize)]
struct RawMatterRef {
    id: u64,
}

#[derive(Clone)]
pub struct ClioClient {
    http: Client,
    base_url: String,
}

impl ClioClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub async fn matters(&self, access_token: &str) -> Result<Vec<Matter>> {
        let envelope: DataEnvelope<Vec<RawMatter>> = send_json(
            "clio",
            self.http
                .get(endpoint(&self.base_url, "matters"))
                .bearer_auth(access_token)
                .query(&[("fields", "id,description,display_number,client{email}")]),
        )
        .await?;

        Ok(envelope
            .data
            .into_iter()
            .map(|matter| Matter {
                id: matter.id,
                display_name: matter
                    .description
                    .or(matter.display_number)
                    .unwrap_or_default(),
                client_email: matter.client.and_then(|c| c.email).unwrap_or_default(),
            })
            .collect())
    }

    pub async fn time_entries(&self, access_token: &str) -> Result<Vec<TimeEntry>> {
        let envelope: DataEnvelope<Vec<RawActivity>> = send_json(
            "clio",
            self.http
                .get(endpoint(&self.base_url, "activities"))
                .bearer_auth(access_token)
                .query(&[
                    ("type", "TimeEntry"),
                    ("fields", "id,description,date,quantity,matter{id}"),
                ]),
        )
        .await?;

        Ok(envelope.data.into_iter().map(to_time_entry).collect())
    }

    pub async fn create_time_entry(&self, access_token: &str, entry: &NewTimeEntry) -> Result<TimeEntry> {
        if !(entry.hours.is_finite() && entry.hours > 0.0) {
            return Err(EmailBillError::validation("duration must be a positive number of hours"));
        }

        let body = json!({
            "data": {
                "type": "TimeEntry",
                "matter": {"id": entry.matter_id},
                "quantity": (entry.hours * 3600.0).round() as u64,
                "description": entry.description,
                "date": entry.date.format("%Y-%m-%d").to_string(),
            }
        });

        let envelope: DataEnvelope<RawActivity> = send_json(
            "clio",
            self.http
                .post(endpoint(&self.base_url, "activities"))
                .bearer_auth(access_token)
                .query(&[("fields", "id,description,date,quantity,matter{id}")])
                .json(&body),
        )
        .await?;

        Ok(to_time_entry(envelope.data))
    }
}

fn to_time_entry(activity: RawActivity) -> TimeEntry {
    TimeEntry {
        id: activity.id,
        description: activity.description.unwrap_or_default(),
        date: activity.date,
        duration: activity.quantity.unwrap_or_default() / 3600.0,
        matter_id: activity.matter.map(|m| m.id),
    }
}

#[cfg(test)]
mod clio_test {
    include!("clio_test.rs");
}
