use crate::*;
use curve25519_dalek::ristretto::RistrettoPoint;
use ed25519_dalek::ExpandedSecretKey;
use ed25519_dalek::PublicKey;
use ed25519_dalek::Signature;
use std::ops::Deref;

/// A state-changing call against the voting contract
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum LedgerCall {
    SetEligible {
        addresses: Vec<Address>,
    },
    BeginSignUp(SignupParams),
    Register {
        #[serde(with = "PointHex")]
        x_g: RistrettoPoint,
        proof: KnowledgeProof,
        deposit: u64,
    },
    Delegate {
        delegatee: Address,
    },
    FinishRegistrationPhase,
    SubmitCommitment {
        #[serde(with = "HashHex")]
        hash: CommitmentHash,
        #[serde(default)]
        on_behalf_of: Option<Address>,
    },
    SubmitVote {
        proof: DisjunctiveProof,
        #[serde(default)]
        on_behalf_of: Option<Address>,
    },
    ComputeTally,
    DeadlinePassed,
}

impl LedgerCall {
    /// Contract operation name, as used in logs and audit entries
    pub fn operation(&self) -> &'static str {
        match self {
            LedgerCall::SetEligible { .. } => "setEligible",
            LedgerCall::BeginSignUp(_) => "beginSignUp",
            LedgerCall::Register { .. } => "register",
            LedgerCall::Delegate { .. } => "delegate",
            LedgerCall::FinishRegistrationPhase => "finishRegistrationPhase",
            LedgerCall::SubmitCommitment { .. } => "submitCommitment",
            LedgerCall::SubmitVote { .. } => "submitVote",
            LedgerCall::ComputeTally => "computeTally",
            LedgerCall::DeadlinePassed => "deadlinePassed",
        }
    }
}

/// This trait should be considered sealed and should not be implemented outside this crate
#[doc(hidden)]
pub trait Signable: serde::Serialize {
    fn as_bytes(&self) -> Vec<u8> {
        serde_cbor::to_vec(&self).expect("openvote: Unexpected error serializing ledger call")
    }
}

impl Signable for LedgerCall {}

/// A call signed by the account submitting it
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Signed<T: Signable> {
    pub tx: T,

    #[serde(with = "EdPublicKeyHex")]
    pub public: PublicKey,

    #[serde(with = "EdSignatureHex")]
    pub sig: Signature,
}

impl<T: Signable> Signed<T> {
    /// Sign a call with a credential, producing a Signed<T>
    pub fn sign(credential: &Credential, tx: T) -> Self {
        let serialized = tx.as_bytes();

        let expanded: ExpandedSecretKey = credential.secret_key().into();
        let sig = expanded.sign(&serialized, credential.public_key());

        Signed {
            tx,
            public: *credential.public_key(),
            sig,
        }
    }

    /// Verify the signature on a signed call
    pub fn verify_signature(&self) -> Result<(), Error> {
        let serialized = self.tx.as_bytes();
        Ok(self.public.verify_strict(&serialized, &self.sig)?)
    }

    /// Address of the signing account
    pub fn signer(&self) -> Address {
        Address::from_public_key(&self.public)
    }

    /// Get the inner unsigned call
    pub fn inner(&self) -> &T {
        &self.tx
    }
}

impl<T: Signable> AsRef<T> for Signed<T> {
    fn as_ref(&self) -> &T {
        &self.tx
    }
}

impl<T: Signable> Deref for Signed<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let alice = Credential::generate();
        let bob = Credential::generate();

        let signed = Signed::sign(
            &alice,
            LedgerCall::Delegate {
                delegatee: bob.address(),
            },
        );
        assert!(signed.verify_signature().is_ok());
        assert_eq!(signed.signer(), alice.address());
        assert_eq!(signed.operation(), "delegate");

        // Swapping the payload invalidates the signature
        let mut forged = signed.clone();
        forged.tx = LedgerCall::Delegate {
            delegatee: alice.address(),
        };
        assert!(forged.verify_signature().is_err());

        // Claiming another signer invalidates it too
        let mut forged = signed;
        forged.public = *bob.public_key();
        assert!(forged.verify_signature().is_err());
    }

    #[test]
    fn signed_call_json() {
        let alice = Credential::generate();
        let signed = Signed::sign(
            &alice,
            LedgerCall::SubmitCommitment {
                hash: [3u8; 32],
                on_behalf_of: None,
            },
        );

        let json = serde_json::to_string(&signed).unwrap();
        assert!(json.contains("\"type\":\"submit_commitment\""));

        let back: Signed<LedgerCall> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tx, signed.tx);
        assert!(back.verify_signature().is_ok());
    }
}
