//! Relay synchronisation lag.
//!
//! The lag is derived from the Cosmos REST API in three sequential stages:
//!
//! 1. list bonded validators (`/cosmos/staking/v1beta1/validators`),
//! 2. resolve each validator's delegated orchestrator address
//!    (`/gravity/v1beta/query_delegate_keys_by_validator`),
//! 3. fetch each orchestrator's last observed event nonce
//!    (`/gravity/v1beta/oracle/eventnonce/{address}`).
//!
//! The reading is `max(nonce) - own_nonce`. Calls are made one at a time,
//! without deduplication, so the cycle time grows with the validator set.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{Source, endpoint, ensure_success};
use crate::error::SourceError;

/// Client for the subset of the Cosmos REST API used by [`RelaySync`].
pub struct RelayApi {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ValidatorsPage {
    validators: Vec<Validator>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Validator {
    operator_address: String,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    next_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DelegateKeys {
    orchestrator_address: String,
}

#[derive(Debug, Deserialize)]
struct EventNonce {
    event_nonce: Nonce,
}

/// gRPC-gateway renders `uint64` as a string; accept plain numbers too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Nonce {
    Number(u64),
    Text(String),
}

impl Nonce {
    fn value(&self) -> Result<u64, SourceError> {
        match self {
            Nonce::Number(n) => Ok(*n),
            Nonce::Text(s) => s
                .trim()
                .parse()
                .map_err(|e| SourceError::Data(format!("event nonce {s:?} is not an integer: {e}"))),
        }
    }
}

impl RelayApi {
    pub fn new(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let url = endpoint(&self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| SourceError::Transport(format!("GET {url} failed: {e}")))?;
        Ok(ensure_success(resp, &url)?.json().await?)
    }

    /// Operator addresses of all bonded validators, following pagination.
    pub async fn bonded_validators(&self) -> Result<Vec<String>, SourceError> {
        let mut operators = Vec::new();
        let mut key: Option<String> = None;
        let mut seen = HashSet::new();

        loop {
            let mut query = vec![("status", "BOND_STATUS_BONDED")];
            if let Some(k) = key.as_deref() {
                query.push(("pagination.key", k));
            }
            let page: ValidatorsPage = self
                .get("/cosmos/staking/v1beta1/validators", &query)
                .await?;
            operators.extend(page.validators.into_iter().map(|v| v.operator_address));

            let next = page
                .pagination
                .and_then(|p| p.next_key)
                .filter(|k| !k.is_empty());
            match next {
                Some(next) if !seen.insert(next.clone()) => {
                    return Err(SourceError::Data(format!(
                        "validator pagination repeated key {next:?}"
                    )));
                }
                Some(next) => key = Some(next),
                None => return Ok(operators),
            }
        }
    }

    /// Orchestrator address delegated by validator `operator`.
    pub async fn orchestrator_for(&self, operator: &str) -> Result<String, SourceError> {
        let keys: DelegateKeys = self
            .get(
                "/gravity/v1beta/query_delegate_keys_by_validator",
                &[("validator_address", operator)],
            )
            .await?;
        Ok(keys.orchestrator_address)
    }

    /// Last event nonce observed by `orchestrator`.
    pub async fn event_nonce(&self, orchestrator: &str) -> Result<u64, SourceError> {
        let resp: EventNonce = self
            .get(&format!("/gravity/v1beta/oracle/eventnonce/{orchestrator}"), &[])
            .await?;
        resp.event_nonce.value()
    }
}

/// Lag of `own` behind the most advanced orchestrator.
///
/// Fails when there are no orchestrators or `own` is not one of them. A
/// missing `own` is not read as nonce 0: that would report the full `max`
/// as lag, so the reading fails instead and `peggo_sync` shows the sentinel.
pub fn nonce_lag(own: &str, nonces: &[(String, u64)]) -> Result<u64, SourceError> {
    let max = nonces
        .iter()
        .map(|(_, n)| *n)
        .max()
        .ok_or_else(|| SourceError::Data("no orchestrator nonces".to_string()))?;
    let own_nonce = nonces
        .iter()
        .find(|(addr, _)| addr == own)
        .map(|(_, n)| *n)
        .ok_or_else(|| {
            SourceError::Data(format!("orchestrator {own} is not in the bonded set"))
        })?;
    Ok(max - own_nonce)
}

/// Event nonce lag of our orchestrator.
pub struct RelaySync {
    api: RelayApi,
    own_address: String,
}

impl RelaySync {
    pub fn new(api: RelayApi, own_address: impl Into<String>) -> Self {
        Self {
            api,
            own_address: own_address.into(),
        }
    }
}

#[async_trait]
impl Source for RelaySync {
    async fn fetch(&self) -> Result<f64, SourceError> {
        let validators = self.api.bonded_validators().await?;

        let mut orchestrators = Vec::with_capacity(validators.len());
        for operator in &validators {
            orchestrators.push(self.api.orchestrator_for(operator).await?);
        }

        let mut nonces = Vec::with_capacity(orchestrators.len());
        for orchestrator in orchestrators {
            let nonce = self.api.event_nonce(&orchestrator).await?;
            nonces.push((orchestrator, nonce));
        }

        tracing::debug!(
            validators = validators.len(),
            "collected orchestrator event nonces"
        );
        Ok(nonce_lag(&self.own_address, &nonces)? as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OWN: &str = "umee1own";

    async fn mount_validators(server: &MockServer, operators: &[&str]) {
        let validators: Vec<_> = operators
            .iter()
            .map(|op| json!({ "operator_address": op, "status": "BOND_STATUS_BONDED" }))
            .collect();
        Mock::given(method("GET"))
            .and(path("/cosmos/staking/v1beta1/validators"))
            .and(query_param("status", "BOND_STATUS_BONDED"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "validators": validators,
                "pagination": { "next_key": null, "total": operators.len().to_string() },
            })))
            .mount(server)
            .await;
    }

    async fn mount_delegate(server: &MockServer, operator: &str, orchestrator: &str) {
        Mock::given(method("GET"))
            .and(path("/gravity/v1beta/query_delegate_keys_by_validator"))
            .and(query_param("validator_address", operator))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "eth_address": "0x0000000000000000000000000000000000000000",
                "orchestrator_address": orchestrator,
            })))
            .mount(server)
            .await;
    }

    async fn mount_nonce(server: &MockServer, orchestrator: &str, nonce: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/gravity/v1beta/oracle/eventnonce/{orchestrator}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "event_nonce": nonce.to_string() })),
            )
            .mount(server)
            .await;
    }

    fn source(server: &MockServer) -> RelaySync {
        RelaySync::new(RelayApi::new(server.uri(), Client::new()), OWN)
    }

    #[test]
    fn lag_is_max_minus_own() {
        let nonces = vec![
            (OWN.to_string(), 5),
            ("umee1b".to_string(), 7),
            ("umee1c".to_string(), 3),
        ];
        assert_eq!(nonce_lag(OWN, &nonces).unwrap(), 2);
    }

    #[test]
    fn lag_needs_own_orchestrator_and_at_least_one_nonce() {
        assert!(nonce_lag(OWN, &[]).is_err());
        assert!(nonce_lag(OWN, &[("umee1b".to_string(), 7)]).is_err());
    }

    #[test]
    fn nonce_accepts_string_or_number() {
        let text: EventNonce = serde_json::from_str(r#"{"event_nonce":"42"}"#).unwrap();
        let number: EventNonce = serde_json::from_str(r#"{"event_nonce":42}"#).unwrap();
        assert_eq!(text.event_nonce.value().unwrap(), 42);
        assert_eq!(number.event_nonce.value().unwrap(), 42);
    }

    #[tokio::test]
    async fn fan_out_computes_lag() {
        let server = MockServer::start().await;
        mount_validators(&server, &["umeevaloper1a", "umeevaloper1b", "umeevaloper1c"]).await;
        mount_delegate(&server, "umeevaloper1a", OWN).await;
        mount_delegate(&server, "umeevaloper1b", "umee1b").await;
        mount_delegate(&server, "umeevaloper1c", "umee1c").await;
        mount_nonce(&server, OWN, 5).await;
        mount_nonce(&server, "umee1b", 7).await;
        mount_nonce(&server, "umee1c", 3).await;

        assert_eq!(source(&server).fetch().await.unwrap(), 2.0);
    }

    #[tokio::test]
    async fn any_failed_stage_fails_the_reading() {
        let server = MockServer::start().await;
        mount_validators(&server, &["umeevaloper1a", "umeevaloper1b"]).await;
        mount_delegate(&server, "umeevaloper1a", OWN).await;
        mount_delegate(&server, "umeevaloper1b", "umee1b").await;
        mount_nonce(&server, OWN, 5).await;
        Mock::given(method("GET"))
            .and(path("/gravity/v1beta/oracle/eventnonce/umee1b"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = source(&server).fetch().await.unwrap_err();
        assert!(matches!(err, SourceError::Transport(_)));
    }

    #[tokio::test]
    async fn failed_delegate_lookup_fails_the_reading() {
        let server = MockServer::start().await;
        mount_validators(&server, &["umeevaloper1a", "umeevaloper1b"]).await;
        mount_delegate(&server, "umeevaloper1a", OWN).await;
        Mock::given(method("GET"))
            .and(path("/gravity/v1beta/query_delegate_keys_by_validator"))
            .and(query_param("validator_address", "umeevaloper1b"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        mount_nonce(&server, OWN, 5).await;

        let err = source(&server).fetch().await.unwrap_err();
        assert!(matches!(err, SourceError::Transport(_)));
    }

    #[tokio::test]
    async fn unreachable_api_fails_the_reading() {
        let server = MockServer::start().await;
        // No mocks mounted: every call answers 404.
        let err = source(&server).fetch().await.unwrap_err();
        assert!(matches!(err, SourceError::Transport(_)));
    }

    #[tokio::test]
    async fn validators_are_collected_across_pages() {
        let server = MockServer::start().await;
        // Mounted first so it wins over the unkeyed page below.
        Mock::given(method("GET"))
            .and(path("/cosmos/staking/v1beta1/validators"))
            .and(query_param("pagination.key", "cGFnZTI="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "validators": [{ "operator_address": "umeevaloper1b" }],
                "pagination": { "next_key": null },
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cosmos/staking/v1beta1/validators"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "validators": [{ "operator_address": "umeevaloper1a" }],
                "pagination": { "next_key": "cGFnZTI=" },
            })))
            .mount(&server)
            .await;

        let api = RelayApi::new(server.uri(), Client::new());
        let operators = api.bonded_validators().await.expect("validators");
        assert_eq!(operators, vec!["umeevaloper1a", "umeevaloper1b"]);
    }

    #[tokio::test]
    async fn cyclic_pagination_fails_instead_of_looping() {
        let server = MockServer::start().await;
        // Keyed pages point at each other: QQ== -> Qg== -> QQ==.
        Mock::given(method("GET"))
            .and(path("/cosmos/staking/v1beta1/validators"))
            .and(query_param("pagination.key", "QQ=="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "validators": [{ "operator_address": "umeevaloper1b" }],
                "pagination": { "next_key": "Qg==" },
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cosmos/staking/v1beta1/validators"))
            .and(query_param("pagination.key", "Qg=="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "validators": [{ "operator_address": "umeevaloper1c" }],
                "pagination": { "next_key": "QQ==" },
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cosmos/staking/v1beta1/validators"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "validators": [{ "operator_address": "umeevaloper1a" }],
                "pagination": { "next_key": "QQ==" },
            })))
            .mount(&server)
            .await;

        let api = RelayApi::new(server.uri(), Client::new());
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            api.bonded_validators(),
        )
        .await
        .expect("pagination must terminate");
        assert!(matches!(result, Err(SourceError::Data(_))));
    }
}
