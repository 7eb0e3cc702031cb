use crate::*;
use crate::election::{fan_out, fan_out_delegated};
use curve25519_dalek::scalar::Scalar;

/// Builds each slot's 1-of-2 proof and commits to its hash.
///
/// Direct voters go first. Delegated slots start only once every direct
/// commitment has finished, and a delegatee works through its slots in order.
pub struct CommitmentWorkflow<'a> {
    ctx: &'a ElectionContext,
}

/// Who proves for a slot, and with which secrets
struct SlotPlan {
    slot: Address,
    signer: Address,
    x: Scalar,
    blinding: VoterSecrets,
    branch: Branch,
}

impl<'a> CommitmentWorkflow<'a> {
    pub fn new(ctx: &'a ElectionContext) -> Self {
        CommitmentWorkflow { ctx }
    }

    pub async fn run(&self) -> PhaseReport {
        let mut report = PhaseReport::new(Phase::Commitment);
        let started = self.ctx.audit.start();
        let workers = self.ctx.settings.workers;

        let direct = self.ctx.registry.direct_voters();
        let results = fan_out(workers, direct, |address| self.commit_direct(address)).await;
        report.absorb("submitCommitment", results);

        let groups = self.ctx.registry.delegated_groups();
        let results = fan_out_delegated(workers, groups, |delegatee, delegator| {
            self.commit_delegated(delegatee, delegator)
        })
        .await;
        report.absorb("submitCommitment", results);

        self.ctx.audit.finish(
            "submitCommitment",
            self.ctx.registry.len(),
            started,
            report.cost,
        );
        report
    }

    /// Commit for a voter who votes for themselves
    pub async fn commit_direct(&self, address: Address) -> Result<Step> {
        let stage = self.ctx.registry.stage_of(&address)?;
        if stage >= VoterStage::Committed {
            return Ok(Step::Skipped);
        }
        let blinding = self.ctx.registry.get(&address)?.secrets()?.clone();
        let x = blinding.x;

        self.commit(SlotPlan {
            slot: address,
            signer: address,
            x,
            blinding,
            branch: self.ctx.registry.branch_for(&address),
        })
        .await
    }

    /// Commit for `delegator`'s slot using the delegatee's key.
    ///
    /// The branch follows the delegator's own preference; the blinding is the
    /// delegator's.
    pub async fn commit_delegated(&self, delegatee: Address, delegator: Address) -> Result<Step> {
        let stage = self.ctx.registry.stage_of(&delegator)?;
        if stage >= VoterStage::Committed {
            return Ok(Step::Skipped);
        }
        // One guard at a time
        let x = self.ctx.registry.get(&delegatee)?.secrets()?.x;
        let blinding = self.ctx.registry.get(&delegator)?.secrets()?.clone();

        self.commit(SlotPlan {
            slot: delegator,
            signer: delegatee,
            x,
            blinding,
            branch: self.ctx.registry.branch_for(&delegator),
        })
        .await
    }

    async fn commit(&self, plan: SlotPlan) -> Result<Step> {
        let SlotPlan {
            slot,
            signer,
            x,
            mut blinding,
            branch,
        } = plan;
        let ledger = &self.ctx.ledger;
        let retry = &self.ctx.settings.retry;

        let keys = retry
            .run("getVoter", move || async move {
                let voter = ledger
                    .get_voter(slot)
                    .await
                    .map_err(|e| Error::from_ledger(e, slot))?;
                match voter.y_g {
                    Some(y_g) => Ok(ProofKeys {
                        x_g: voter.x_g,
                        y_g,
                    }),
                    None => Err(Error::ReconstructionNotReady { address: slot }),
                }
            })
            .await?;
        if keys.x_g != public_point(&x) {
            return Err(Error::TransactionRejected {
                operation: "getVoter",
                address: slot,
                reason: format!("ledger key for this slot does not belong to {}", signer),
            });
        }

        let index = retry
            .run("addressid", move || async move {
                ledger
                    .address_id(slot)
                    .await
                    .map_err(|e| Error::from_ledger(e, slot))
            })
            .await?;

        let attempts = self.ctx.settings.proof_attempts.max(1);
        let mut proof = None;
        let mut cause = String::new();
        for attempt in 1..=attempts {
            if attempt > 1 {
                blinding = self.ctx.registry.get(&slot)?.refresh_blinding()?;
            }
            match self
                .ctx
                .crypto
                .create_disjunctive_proof(
                    &keys,
                    &blinding.w,
                    &blinding.r,
                    &blinding.d,
                    &x,
                    branch,
                    index,
                )
                .await
            {
                Ok(candidate) => {
                    let checked = &candidate;
                    let keys = &keys;
                    let valid = retry
                        .run("verify1outof2ZKP", move || async move {
                            Ok(ledger
                                .verify_disjunctive_proof(checked, keys, index)
                                .await?)
                        })
                        .await?;
                    if valid {
                        proof = Some(candidate);
                        break;
                    }
                    cause = "ledger did not accept the 1-of-2 proof".to_owned();
                }
                Err(e) => cause = e.to_string(),
            }
            warn!(
                "1-of-2 proof for {} failed (attempt {}/{}): {}",
                slot, attempt, attempts, cause
            );
        }
        let proof = proof.ok_or(Error::Proof {
            operation: "submitCommitment",
            address: slot,
            attempts,
            cause,
        })?;

        let hash = self.ctx.crypto.commitment_hash(&proof, &keys).await;
        let credential = self.ctx.credential(&signer)?;
        let on_behalf_of = if signer == slot { None } else { Some(slot) };
        let receipt = retry
            .run("submitCommitment", move || async move {
                ledger
                    .submit_commitment(credential, hash, on_behalf_of)
                    .await
                    .map_err(|e| Error::from_ledger(e, slot))
            })
            .await?;

        self.ctx.registry.record_commitment(
            &slot,
            Commitment {
                keys,
                proof,
                hash,
                signer,
            },
        )?;
        debug!("committed {} (signed by {})", slot, signer);
        Ok(Step::Done(receipt.cost))
    }
}
