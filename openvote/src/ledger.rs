use crate::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use curve25519_dalek::ristretto::RistrettoPoint;
use thiserror::Error;

/// Failure at the ledger boundary
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The ledger evaluated the call and refused it
    #[error("openvote ledger: {operation} rejected: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },

    /// The ledger could not be reached; the call may not have been evaluated
    #[error("openvote ledger: {operation} unavailable: {cause}")]
    Unavailable {
        operation: &'static str,
        cause: String,
    },
}

impl LedgerError {
    pub fn rejected(operation: &'static str, reason: impl Into<String>) -> Self {
        LedgerError::Rejected {
            operation,
            reason: reason.into(),
        }
    }

    pub fn unavailable(operation: &'static str, cause: impl Into<String>) -> Self {
        LedgerError::Unavailable {
            operation,
            cause: cause.into(),
        }
    }
}

/// Result of an accepted state-changing call
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Receipt {
    /// Ledger-specific execution cost (gas)
    pub cost: u64,
}

/// The five ledger deadlines, fixed by `beginSignUp`
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadlines {
    pub voters_finish_signup: DateTime<Utc>,
    pub end_signup: DateTime<Utc>,
    pub end_commitment: DateTime<Utc>,
    pub end_voting: DateTime<Utc>,
    pub end_refund: DateTime<Utc>,
}

impl Deadlines {
    /// Deadlines spaced `gap` apart starting from `now`
    pub fn spaced(now: DateTime<Utc>, gap: std::time::Duration) -> Result<Self, ConfigError> {
        let gap = chrono::Duration::from_std(gap)
            .map_err(|_| ConfigError::InvalidPhaseGap(format!("{:?}", gap)))?;
        Ok(Deadlines {
            voters_finish_signup: now + gap,
            end_signup: now + gap * 2,
            end_commitment: now + gap * 3,
            end_voting: now + gap * 4,
            end_refund: now + gap * 5,
        })
    }

    pub fn as_array(&self) -> [DateTime<Utc>; 5] {
        [
            self.voters_finish_signup,
            self.end_signup,
            self.end_commitment,
            self.end_voting,
            self.end_refund,
        ]
    }

    pub fn is_strictly_increasing(&self) -> bool {
        let all = self.as_array();
        all.windows(2).all(|pair| pair[0] < pair[1])
    }
}

/// A voter record as the ledger stores it
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LedgerVoter {
    pub address: Address,

    /// Voting key in this voter's slot; the delegatee's key once delegated
    #[serde(with = "PointHex")]
    pub x_g: RistrettoPoint,

    /// Reconstructed key, available after `finishRegistrationPhase`
    #[serde(default, with = "opt_point_hex")]
    pub y_g: Option<RistrettoPoint>,

    #[serde(default)]
    pub delegated_to: Option<Address>,

    #[serde(default, with = "opt_hash_hex")]
    pub commitment: Option<CommitmentHash>,

    #[serde(default)]
    pub voted: bool,
}

/// Parameters for `beginSignUp`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SignupParams {
    pub question: String,

    /// Only secret ballots are supported; votes are opened as 1-of-2 proofs
    #[serde(default = "secret_ballot")]
    pub secret_ballot: bool,
    pub deposit: u64,
    pub deadlines: Deadlines,
}

fn secret_ballot() -> bool {
    true
}

/// Progress counters reported by the ledger
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub eligible: u64,
    pub registered: u64,
    pub committed: u64,
    pub voted: u64,
}

impl std::fmt::Display for Counters {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "eligible={} registered={} committed={} voted={}",
            self.eligible, self.registered, self.committed, self.voted
        )
    }
}

/// The voting contract as seen by the orchestrator.
///
/// State-changing operations are submitted as signed [`LedgerCall`]s through
/// [`LedgerClient::submit`]; the provided methods build and sign each call
/// with the caller's credential.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a signed state-changing call
    async fn submit(&self, call: Signed<LedgerCall>) -> Result<Receipt, LedgerError>;

    /// Ledger clock
    async fn now(&self) -> Result<DateTime<Utc>, LedgerError>;

    /// Current ledger phase
    async fn state(&self) -> Result<Phase, LedgerError>;

    /// Deadlines fixed by `beginSignUp`
    async fn deadlines(&self) -> Result<Deadlines, LedgerError>;

    async fn deposit_required(&self) -> Result<u64, LedgerError>;

    async fn get_voter(&self, address: Address) -> Result<LedgerVoter, LedgerError>;

    /// Position of a registered voter, used to bind proofs to their slot
    async fn address_id(&self, address: Address) -> Result<u64, LedgerError>;

    async fn verify_disjunctive_proof(
        &self,
        proof: &DisjunctiveProof,
        keys: &ProofKeys,
        index: u64,
    ) -> Result<bool, LedgerError>;

    /// `0` is the yes count, `1` the number of votes counted
    async fn final_tally(&self, index: u8) -> Result<u64, LedgerError>;

    async fn counters(&self) -> Result<Counters, LedgerError>;

    async fn total_eligible(&self) -> Result<u64, LedgerError> {
        Ok(self.counters().await?.eligible)
    }

    async fn total_registered(&self) -> Result<u64, LedgerError> {
        Ok(self.counters().await?.registered)
    }

    async fn total_committed(&self) -> Result<u64, LedgerError> {
        Ok(self.counters().await?.committed)
    }

    async fn total_voted(&self) -> Result<u64, LedgerError> {
        Ok(self.counters().await?.voted)
    }

    async fn set_eligible(
        &self,
        admin: &Credential,
        addresses: Vec<Address>,
    ) -> Result<Receipt, LedgerError> {
        self.submit(Signed::sign(admin, LedgerCall::SetEligible { addresses }))
            .await
    }

    async fn begin_sign_up(
        &self,
        admin: &Credential,
        params: SignupParams,
    ) -> Result<Receipt, LedgerError> {
        self.submit(Signed::sign(admin, LedgerCall::BeginSignUp(params)))
            .await
    }

    async fn register(
        &self,
        voter: &Credential,
        x_g: RistrettoPoint,
        proof: KnowledgeProof,
        deposit: u64,
    ) -> Result<Receipt, LedgerError> {
        let call = LedgerCall::Register {
            x_g,
            proof,
            deposit,
        };
        self.submit(Signed::sign(voter, call)).await
    }

    async fn delegate(
        &self,
        delegator: &Credential,
        delegatee: Address,
    ) -> Result<Receipt, LedgerError> {
        self.submit(Signed::sign(delegator, LedgerCall::Delegate { delegatee }))
            .await
    }

    async fn finish_registration_phase(&self, admin: &Credential) -> Result<Receipt, LedgerError> {
        self.submit(Signed::sign(admin, LedgerCall::FinishRegistrationPhase))
            .await
    }

    async fn submit_commitment(
        &self,
        signer: &Credential,
        hash: CommitmentHash,
        on_behalf_of: Option<Address>,
    ) -> Result<Receipt, LedgerError> {
        let call = LedgerCall::SubmitCommitment { hash, on_behalf_of };
        self.submit(Signed::sign(signer, call)).await
    }

    async fn submit_vote(
        &self,
        signer: &Credential,
        proof: DisjunctiveProof,
        on_behalf_of: Option<Address>,
    ) -> Result<Receipt, LedgerError> {
        let call = LedgerCall::SubmitVote {
            proof,
            on_behalf_of,
        };
        self.submit(Signed::sign(signer, call)).await
    }

    async fn compute_tally(&self, admin: &Credential) -> Result<Receipt, LedgerError> {
        self.submit(Signed::sign(admin, LedgerCall::ComputeTally))
            .await
    }

    async fn deadline_passed(&self, caller: &Credential) -> Result<Receipt, LedgerError> {
        self.submit(Signed::sign(caller, LedgerCall::DeadlinePassed))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[test]
    fn spaced_deadlines() {
        let now = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
        let deadlines = Deadlines::spaced(now, Duration::from_secs(60)).unwrap();

        assert!(deadlines.is_strictly_increasing());
        assert_eq!(deadlines.voters_finish_signup, Utc.timestamp_opt(1_600_000_060, 0).unwrap());
        assert_eq!(deadlines.end_refund, Utc.timestamp_opt(1_600_000_300, 0).unwrap());

        let mut bad = deadlines;
        bad.end_voting = bad.end_commitment;
        assert!(!bad.is_strictly_increasing());
    }

    #[test]
    fn ledger_voter_json() {
        let x_g = public_point(&random_scalar());
        let voter = LedgerVoter {
            address: Credential::generate().address(),
            x_g,
            y_g: None,
            delegated_to: None,
            commitment: Some([7u8; 32]),
            voted: false,
        };

        let json = serde_json::to_string(&voter).unwrap();
        let back: LedgerVoter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, voter);
    }
}
