//! HTTP adapter for the OP.GG summoner API

use super::parse::{parse_search, parse_summary, parse_tier_history};
use super::{HistoricalReading, RankReading, SnapshotProvider, SummonerRef};
use crate::config::ProviderSettings;
use crate::error::TrackerError;
use crate::types::RiotId;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

const SITE_ORIGIN: &str = "https://www.op.gg";

/// Statuses the renewal endpoint answers with when it accepts a request
const RENEWAL_ACCEPTED: [StatusCode; 4] = [
    StatusCode::OK,
    StatusCode::CREATED,
    StatusCode::ACCEPTED,
    StatusCode::NO_CONTENT,
];

/// Live provider client. Build once and share; the inner `reqwest::Client`
/// pools connections.
#[derive(Debug, Clone)]
pub struct OpggClient {
    client: Client,
    base_url: String,
    region: String,
}

impl OpggClient {
    pub fn new(settings: &ProviderSettings) -> crate::error::Result<Self> {
        let client = Self::build_client(&settings.user_agent, settings.timeout_seconds)?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            region: settings.region.to_lowercase(),
        })
    }

    fn build_client(user_agent: &str, timeout_secs: u64) -> crate::error::Result<Client> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("ja,en-US;q=0.9,en;q=0.8"),
        );
        headers.insert(ORIGIN, HeaderValue::from_static(SITE_ORIGIN));
        headers.insert(REFERER, HeaderValue::from_static("https://www.op.gg/"));

        Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build HTTP client")
    }

    pub(crate) fn search_url(&self, riot_id: &RiotId) -> String {
        format!(
            "{}/v3/{}/summoners?riot_id={}%23{}",
            self.base_url,
            self.region,
            urlencoding::encode(&riot_id.game_name),
            urlencoding::encode(&riot_id.tag_line)
        )
    }

    pub(crate) fn summoner_url(&self, summoner_id: &str, endpoint: &str) -> String {
        format!(
            "{}/{}/summoners/{}/{}",
            self.base_url,
            self.region,
            urlencoding::encode(summoner_id),
            endpoint
        )
    }

    /// Profile page the renewal request claims to come from
    pub(crate) fn profile_referer(&self, riot_id: &RiotId) -> String {
        format!(
            "{}/summoners/{}/{}-{}",
            SITE_ORIGIN,
            self.region,
            urlencoding::encode(&riot_id.game_name),
            urlencoding::encode(&riot_id.tag_line)
        )
    }

    async fn get_json(&self, url: &str) -> crate::error::Result<Value> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send GET request")?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(TrackerError::ProviderError {
                message: format!("GET {} returned HTTP {}", url, status),
            }
            .into());
        }

        response
            .json::<Value>()
            .await
            .context("Failed to decode provider response")
    }
}

#[async_trait]
impl SnapshotProvider for OpggClient {
    async fn lookup(&self, riot_id: &RiotId) -> crate::error::Result<Option<SummonerRef>> {
        info!("Searching for summoner {} (region {})", riot_id, self.region);
        let payload = self.get_json(&self.search_url(riot_id)).await?;

        Ok(parse_search(&payload).map(|summoner_id| SummonerRef {
            summoner_id,
            riot_id: riot_id.clone(),
        }))
    }

    async fn renew(&self, summoner: &SummonerRef) -> crate::error::Result<bool> {
        let url = self.summoner_url(&summoner.summoner_id, "renewal");
        let referer = HeaderValue::from_str(&self.profile_referer(&summoner.riot_id))
            .context("Invalid referer header")?;

        info!("Requesting data renewal for {}", summoner.riot_id);
        let response = self
            .client
            .post(&url)
            .header(REFERER, referer)
            .send()
            .await
            .context("Failed to send renewal request")?;

        let status = response.status();
        if RENEWAL_ACCEPTED.contains(&status) {
            debug!("Renewal accepted for {} (HTTP {})", summoner.riot_id, status);
            Ok(true)
        } else {
            warn!("Renewal request for {} failed with HTTP {}", summoner.riot_id, status);
            Ok(false)
        }
    }

    async fn current_rank(&self, summoner: &SummonerRef) -> crate::error::Result<RankReading> {
        let url = self.summoner_url(&summoner.summoner_id, "summary");
        let payload = self.get_json(&url).await?;
        let reading = parse_summary(&payload);
        if reading == RankReading::Unranked {
            debug!("No solo-queue rank in summary for {}", summoner.riot_id);
        }
        Ok(reading)
    }

    async fn tier_history(
        &self,
        summoner: &SummonerRef,
    ) -> crate::error::Result<Vec<HistoricalReading>> {
        let url = self.summoner_url(&summoner.summoner_id, "tier-history");
        let payload = self.get_json(&url).await?;
        Ok(parse_tier_history(&payload))
    }
}
