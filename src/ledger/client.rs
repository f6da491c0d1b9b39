use anyhow::{bail, Context, Result};
use log::warn;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::models::DailyStepRecord;

/// Remote source of truth for per-user step baselines and daily records.
#[allow(async_fn_in_trait)]
pub trait StepLedger: Send + Sync {
    /// Last recorded cumulative baseline for the user. Any transport or
    /// parse failure degrades to `0` (logged, never surfaced); callers
    /// cannot distinguish "no prior baseline" from "fetch failed".
    async fn fetch_baseline(&self, user_id: &str) -> u64;

    /// Push one day's record. Non-2xx statuses and transport errors
    /// propagate so the scheduler's retry policy can act.
    async fn submit_daily_record(&self, record: &DailyStepRecord) -> Result<()>;
}

#[derive(Clone)]
pub struct RemoteStepLedger {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct BaselineResponse {
    // Absent field reads as no baseline; a non-integer value fails the
    // whole parse, which the caller also degrades to 0.
    #[serde(default)]
    total_steps: Option<u64>,
}

#[derive(Serialize)]
struct UpdateStepsBody<'a> {
    user_id: &'a str,
    date: String,
    steps: u64,
    midnight_step_count: u64,
}

impl RemoteStepLedger {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn try_fetch_baseline(&self, user_id: &str) -> Result<u64> {
        let url = format!("{}/get-total-sensor-steps", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("id", user_id)])
            .send()
            .await
            .context("baseline request failed")?
            .error_for_status()
            .context("baseline request rejected")?;

        let body: BaselineResponse = response
            .json()
            .await
            .context("baseline response was not the expected JSON shape")?;
        Ok(body.total_steps.unwrap_or(0))
    }
}

impl StepLedger for RemoteStepLedger {
    async fn fetch_baseline(&self, user_id: &str) -> u64 {
        match self.try_fetch_baseline(user_id).await {
            Ok(value) => value,
            Err(err) => {
                warn!("failed to fetch step baseline for {user_id}: {err:#}; assuming 0");
                0
            }
        }
    }

    async fn submit_daily_record(&self, record: &DailyStepRecord) -> Result<()> {
        let url = format!("{}/update-steps", self.base_url);
        let body = UpdateStepsBody {
            user_id: &record.user_id,
            date: record.date.format("%Y-%m-%d").to_string(),
            steps: record.steps,
            midnight_step_count: record.midnight_step_count,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("update-steps request failed for {}", record.date))?;

        if !response.status().is_success() {
            bail!(
                "update-steps returned {} for {}",
                response.status(),
                record.date
            );
        }
        Ok(())
    }
}
