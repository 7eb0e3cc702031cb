use crate::*;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;

/// Where a voter is in the protocol. Stages only move forward.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VoterStage {
    Seeded,
    Registered,
    Committed,
    Voted,
}

impl std::fmt::Display for VoterStage {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            VoterStage::Seeded => "seeded",
            VoterStage::Registered => "registered",
            VoterStage::Committed => "committed",
            VoterStage::Voted => "voted",
        };
        write!(f, "{}", name)
    }
}

/// Secret scalars for one voter. Never serialized, never sent to the ledger.
#[derive(Clone)]
pub struct VoterSecrets {
    /// Voting secret key
    pub x: Scalar,
    /// Knowledge-proof nonce
    pub v: Scalar,
    /// Blinding for the real branch of the disjunctive proof
    pub w: Scalar,
    /// Simulated branch response
    pub r: Scalar,
    /// Simulated branch challenge
    pub d: Scalar,
}

impl VoterSecrets {
    pub fn generate() -> Self {
        VoterSecrets {
            x: random_scalar(),
            v: random_scalar(),
            w: random_scalar(),
            r: random_scalar(),
            d: random_scalar(),
        }
    }

    fn erase(&mut self) {
        self.x = Scalar::zero();
        self.v = Scalar::zero();
        self.w = Scalar::zero();
        self.r = Scalar::zero();
        self.d = Scalar::zero();
    }
}

impl std::fmt::Debug for VoterSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("VoterSecrets(..)")
    }
}

/// Everything a commitment produced, kept so the vote can re-open it
#[derive(Clone, Debug, PartialEq)]
pub struct Commitment {
    pub keys: ProofKeys,
    pub proof: DisjunctiveProof,
    pub hash: CommitmentHash,
    /// Account that signed the commitment (the delegatee for delegated slots)
    pub signer: Address,
}

/// A single eligible voter's record
#[derive(Debug)]
pub struct Voter {
    address: Address,
    branch: Branch,
    delegatee: Option<Address>,
    stage: VoterStage,
    secrets: Option<VoterSecrets>,
    erased: bool,
    x_g: Option<RistrettoPoint>,
    knowledge_proof: Option<KnowledgeProof>,
    commitment: Option<Commitment>,
}

impl Voter {
    pub fn new(address: Address, branch: Branch, delegatee: Option<Address>) -> Self {
        Voter {
            address,
            branch,
            delegatee,
            stage: VoterStage::Seeded,
            secrets: None,
            erased: false,
            x_g: None,
            knowledge_proof: None,
            commitment: None,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn branch(&self) -> Branch {
        self.branch
    }

    pub fn delegatee(&self) -> Option<Address> {
        self.delegatee
    }

    pub fn stage(&self) -> VoterStage {
        self.stage
    }

    fn require(&self, expected: VoterStage) -> Result<()> {
        if self.stage < expected {
            return Err(Error::WrongStage {
                address: self.address,
                expected,
                found: self.stage,
            });
        }
        Ok(())
    }

    /// Draw fresh secret material for a registration attempt.
    ///
    /// Only allowed before registration succeeds; afterwards `x` is fixed.
    pub fn fresh_secrets(&mut self) -> Result<VoterSecrets> {
        if self.stage != VoterStage::Seeded {
            return Err(Error::AlreadyRegistered(self.address));
        }
        let secrets = VoterSecrets::generate();
        self.secrets = Some(secrets.clone());
        Ok(secrets)
    }

    pub fn secrets(&self) -> Result<&VoterSecrets> {
        if self.erased {
            return Err(Error::SecretsErased(self.address));
        }
        self.secrets.as_ref().ok_or(Error::WrongStage {
            address: self.address,
            expected: VoterStage::Registered,
            found: self.stage,
        })
    }

    /// Redraw `w`, `r` and `d` after a disjunctive proof failed to verify.
    /// `x` is kept.
    pub(crate) fn refresh_blinding(&mut self) -> Result<VoterSecrets> {
        if self.stage >= VoterStage::Committed {
            return Err(Error::AlreadyCommitted(self.address));
        }
        if self.erased {
            return Err(Error::SecretsErased(self.address));
        }
        let (address, found) = (self.address, self.stage);
        let secrets = self.secrets.as_mut().ok_or(Error::WrongStage {
            address,
            expected: VoterStage::Registered,
            found,
        })?;
        secrets.w = random_scalar();
        secrets.r = random_scalar();
        secrets.d = random_scalar();
        Ok(secrets.clone())
    }

    pub fn x_g(&self) -> Result<RistrettoPoint> {
        self.require(VoterStage::Registered)?;
        self.x_g.ok_or(Error::NotFound(self.address))
    }

    pub fn knowledge_proof(&self) -> Result<&KnowledgeProof> {
        self.require(VoterStage::Registered)?;
        self.knowledge_proof
            .as_ref()
            .ok_or(Error::NotFound(self.address))
    }

    pub fn commitment(&self) -> Result<&Commitment> {
        self.require(VoterStage::Committed)?;
        self.commitment.as_ref().ok_or(Error::NotFound(self.address))
    }

    #[cfg(test)]
    pub(crate) fn commitment_mut(&mut self) -> Option<&mut Commitment> {
        self.commitment.as_mut()
    }

    pub(crate) fn record_registration(
        &mut self,
        x_g: RistrettoPoint,
        proof: KnowledgeProof,
    ) -> Result<()> {
        if self.stage != VoterStage::Seeded {
            return Err(Error::AlreadyRegistered(self.address));
        }
        match &self.secrets {
            Some(secrets) if public_point(&secrets.x) == x_g => {}
            _ => {
                return Err(Error::WrongStage {
                    address: self.address,
                    expected: VoterStage::Seeded,
                    found: self.stage,
                })
            }
        }
        self.x_g = Some(x_g);
        self.knowledge_proof = Some(proof);
        self.stage = VoterStage::Registered;
        Ok(())
    }

    pub(crate) fn record_commitment(&mut self, commitment: Commitment) -> Result<()> {
        match self.stage {
            VoterStage::Registered => {}
            VoterStage::Committed | VoterStage::Voted => {
                return Err(Error::AlreadyCommitted(self.address))
            }
            VoterStage::Seeded => {
                return Err(Error::WrongStage {
                    address: self.address,
                    expected: VoterStage::Registered,
                    found: self.stage,
                })
            }
        }
        self.commitment = Some(commitment);
        self.stage = VoterStage::Committed;
        Ok(())
    }

    pub(crate) fn record_vote_cast(&mut self) -> Result<()> {
        match self.stage {
            VoterStage::Committed => {}
            VoterStage::Voted => return Err(Error::AlreadyVoted(self.address)),
            _ => {
                return Err(Error::WrongStage {
                    address: self.address,
                    expected: VoterStage::Committed,
                    found: self.stage,
                })
            }
        }
        self.stage = VoterStage::Voted;
        Ok(())
    }

    /// Zero all secret scalars. Public state is kept.
    pub(crate) fn erase_secrets(&mut self) {
        if let Some(secrets) = self.secrets.as_mut() {
            secrets.erase();
        }
        self.secrets = None;
        self.erased = true;
    }
}
