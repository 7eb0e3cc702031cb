use crate::*;
use crate::election::fan_out;
use curve25519_dalek::ristretto::RistrettoPoint;

/// Registers every voter during SIGNUP, then records delegations.
pub struct RegistrationWorkflow<'a> {
    ctx: &'a ElectionContext,
}

impl<'a> RegistrationWorkflow<'a> {
    pub fn new(ctx: &'a ElectionContext) -> Self {
        RegistrationWorkflow { ctx }
    }

    /// Register all voters concurrently, then submit delegations.
    ///
    /// Only failing to read the required deposit fails the whole phase.
    pub async fn run(&self) -> Result<PhaseReport> {
        let mut report = PhaseReport::new(Phase::Signup);
        let ledger = &self.ctx.ledger;
        let deposit = self
            .ctx
            .settings
            .retry
            .run("depositRequired", move || async move {
                Ok(ledger.deposit_required().await?)
            })
            .await?;

        let started = self.ctx.audit.start();
        let results = fan_out(
            self.ctx.settings.workers,
            self.ctx.registry.addresses(),
            |address| self.register_voter(address, deposit),
        )
        .await;
        let before = report.cost;
        report.absorb("register", results);
        self.ctx.audit.finish(
            "register",
            self.ctx.registry.len(),
            started,
            report.cost - before,
        );

        let delegators: Vec<Address> = self.ctx.registry.delegations().keys().cloned().collect();
        if !delegators.is_empty() {
            let started = self.ctx.audit.start();
            let count = delegators.len();
            let results = fan_out(self.ctx.settings.workers, delegators, |delegator| {
                self.delegate_voter(delegator)
            })
            .await;
            let before = report.cost;
            report.absorb("delegate", results);
            self.ctx
                .audit
                .finish("delegate", count, started, report.cost - before);
        }

        info!(
            "registration done: {} submitted, {} skipped, {} failed",
            report.completed.len(),
            report.skipped.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Prove knowledge of a fresh voting key and register it.
    pub async fn register_voter(&self, address: Address, deposit: u64) -> Result<Step> {
        let stage = self.ctx.registry.stage_of(&address)?;
        if stage >= VoterStage::Registered {
            return Ok(Step::Skipped);
        }
        let credential = self.ctx.credential(&address)?;

        let (x_g, proof) = self.prove_key(address).await?;

        let ledger = &self.ctx.ledger;
        let submitted = proof.clone();
        let receipt = self
            .ctx
            .settings
            .retry
            .run("register", move || {
                let proof = submitted.clone();
                async move {
                    ledger
                        .register(credential, x_g, proof, deposit)
                        .await
                        .map_err(|e| match e {
                            LedgerError::Rejected { reason, .. } => {
                                Error::RegistrationRejected { address, reason }
                            }
                            other => Error::from_ledger(other, address),
                        })
                }
            })
            .await?;

        self.ctx.registry.record_registration(&address, x_g, proof)?;
        debug!("registered {}", address);
        Ok(Step::Done(receipt.cost))
    }

    // Draws fresh secrets on each attempt
    async fn prove_key(&self, address: Address) -> Result<(RistrettoPoint, KnowledgeProof)> {
        let attempts = self.ctx.settings.proof_attempts.max(1);
        let mut cause = String::new();

        for attempt in 1..=attempts {
            let secrets = self.ctx.registry.get(&address)?.fresh_secrets()?;
            let x_g = public_point(&secrets.x);

            match self
                .ctx
                .crypto
                .create_knowledge_proof(&secrets.x, &secrets.v, &x_g)
                .await
            {
                Ok(proof) => {
                    if self.ctx.crypto.verify_knowledge_proof(&x_g, &proof).await {
                        return Ok((x_g, proof));
                    }
                    cause = "knowledge proof did not verify".to_owned();
                }
                Err(e) => cause = e.to_string(),
            }
            warn!(
                "knowledge proof for {} failed (attempt {}/{}): {}",
                address, attempt, attempts, cause
            );
        }

        Err(Error::Proof {
            operation: "register",
            address,
            attempts,
            cause,
        })
    }

    /// Hand a registered voter's slot to their delegatee.
    pub async fn delegate_voter(&self, delegator: Address) -> Result<Step> {
        let delegatee = self
            .ctx
            .registry
            .delegatee_of(&delegator)
            .ok_or(Error::NotFound(delegator))?;

        // Both sides need a key on the ledger
        for address in &[delegator, delegatee] {
            let address = *address;
            let stage = self.ctx.registry.stage_of(&address)?;
            if stage < VoterStage::Registered {
                return Err(Error::WrongStage {
                    address,
                    expected: VoterStage::Registered,
                    found: stage,
                });
            }
        }

        let ledger = &self.ctx.ledger;
        let slot = self
            .ctx
            .settings
            .retry
            .run("getVoter", move || async move {
                ledger
                    .get_voter(delegator)
                    .await
                    .map_err(|e| Error::from_ledger(e, delegator))
            })
            .await?;
        if slot.delegated_to == Some(delegatee) {
            return Ok(Step::Skipped);
        }

        let credential = self.ctx.credential(&delegator)?;
        let receipt = self
            .ctx
            .settings
            .retry
            .run("delegate", move || async move {
                ledger
                    .delegate(credential, delegatee)
                    .await
                    .map_err(|e| Error::from_ledger(e, delegator))
            })
            .await?;

        info!("{} delegated their vote to {}", delegator, delegatee);
        Ok(Step::Done(receipt.cost))
    }
}
