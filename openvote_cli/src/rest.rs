use async_trait::async_trait;
use chrono::{DateTime, Utc};
use num_enum::TryFromPrimitive;
use openvote::*;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug)]
struct NowResp {
    now: DateTime<Utc>,
}

#[derive(Deserialize, Debug)]
struct StateResp {
    state: u8,
}

#[derive(Deserialize, Debug)]
struct DepositResp {
    deposit: u64,
}

#[derive(Deserialize, Debug)]
struct IdResp {
    id: u64,
}

#[derive(Deserialize, Debug)]
struct ValidResp {
    valid: bool,
}

#[derive(Deserialize, Debug)]
struct TallyResp {
    value: u64,
}

#[derive(Serialize, Debug)]
struct VerifyReq<'a> {
    proof: &'a DisjunctiveProof,
    keys: &'a ProofKeys,
    index: u64,
}

/// Ledger client for a JSON gateway in front of the voting contract.
///
/// 5xx responses and transport errors count as unavailable; any other
/// non-success status is a rejection carrying the response body.
pub struct RestLedger {
    base: String,
    client: Client,
}

impl RestLedger {
    pub fn new(uri: &str, contract: &str) -> Self {
        RestLedger {
            base: format!("{}/api/ledger/{}", uri.trim_end_matches('/'), contract),
            client: Client::new(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    async fn get<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
    ) -> Result<T, LedgerError> {
        let url = format!("{}/{}", self.base, path);
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LedgerError::unavailable(operation, e.to_string()))?;
        read(operation, res).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        body: &B,
    ) -> Result<T, LedgerError> {
        let url = format!("{}/{}", self.base, path);
        let res = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| LedgerError::unavailable(operation, e.to_string()))?;
        read(operation, res).await
    }
}

async fn read<T: DeserializeOwned>(
    operation: &'static str,
    res: reqwest::Response,
) -> Result<T, LedgerError> {
    let status = res.status();
    if status.is_server_error() {
        return Err(LedgerError::unavailable(
            operation,
            format!("gateway returned {}", status),
        ));
    }
    if !status.is_success() {
        let reason = match res.text().await {
            Ok(text) if !text.is_empty() => text,
            _ => status.to_string(),
        };
        return Err(LedgerError::rejected(operation, reason));
    }
    res.json::<T>()
        .await
        .map_err(|e| LedgerError::rejected(operation, format!("malformed response: {}", e)))
}

fn phase_from_code(code: u8) -> Result<Phase, LedgerError> {
    match Phase::try_from_primitive(code) {
        // The ledger never reports the local-only aborted phase
        Ok(Phase::Aborted) | Err(_) => Err(LedgerError::rejected(
            "state",
            format!("unknown ledger state {}", code),
        )),
        Ok(phase) => Ok(phase),
    }
}

#[async_trait]
impl LedgerClient for RestLedger {
    async fn submit(&self, call: Signed<LedgerCall>) -> Result<Receipt, LedgerError> {
        let operation = call.operation();
        debug!("submitting {} from {}", operation, call.signer());
        self.post(operation, "transactions", &call).await
    }

    async fn now(&self) -> Result<DateTime<Utc>, LedgerError> {
        let resp: NowResp = self.get("now", "now").await?;
        Ok(resp.now)
    }

    async fn state(&self) -> Result<Phase, LedgerError> {
        let resp: StateResp = self.get("state", "state").await?;
        phase_from_code(resp.state)
    }

    async fn deadlines(&self) -> Result<Deadlines, LedgerError> {
        self.get("deadlines", "deadlines").await
    }

    async fn deposit_required(&self) -> Result<u64, LedgerError> {
        let resp: DepositResp = self.get("depositRequired", "deposit").await?;
        Ok(resp.deposit)
    }

    async fn get_voter(&self, address: Address) -> Result<LedgerVoter, LedgerError> {
        self.get("getVoter", &format!("voters/{}", address)).await
    }

    async fn address_id(&self, address: Address) -> Result<u64, LedgerError> {
        let resp: IdResp = self
            .get("addressid", &format!("voters/{}/id", address))
            .await?;
        Ok(resp.id)
    }

    async fn verify_disjunctive_proof(
        &self,
        proof: &DisjunctiveProof,
        keys: &ProofKeys,
        index: u64,
    ) -> Result<bool, LedgerError> {
        let req = VerifyReq { proof, keys, index };
        let resp: ValidResp = self.post("verify1outof2ZKP", "verify", &req).await?;
        Ok(resp.valid)
    }

    async fn final_tally(&self, index: u8) -> Result<u64, LedgerError> {
        let resp: TallyResp = self
            .get("finaltally", &format!("tally/{}", index))
            .await?;
        Ok(resp.value)
    }

    async fn counters(&self) -> Result<Counters, LedgerError> {
        self.get("counters", "counters").await
    }
}
