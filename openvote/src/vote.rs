use crate::*;
use crate::election::{fan_out, fan_out_delegated};

/// Opens every commitment by submitting the proof it was built from.
pub struct VotingWorkflow<'a> {
    ctx: &'a ElectionContext,
}

impl<'a> VotingWorkflow<'a> {
    pub fn new(ctx: &'a ElectionContext) -> Self {
        VotingWorkflow { ctx }
    }

    pub async fn run(&self) -> PhaseReport {
        let mut report = PhaseReport::new(Phase::Vote);
        let started = self.ctx.audit.start();
        let workers = self.ctx.settings.workers;

        let direct = self.ctx.registry.direct_voters();
        let results = fan_out(workers, direct, |address| self.cast(address)).await;
        report.absorb("submitVote", results);

        let groups = self.ctx.registry.delegated_groups();
        let results =
            fan_out_delegated(workers, groups, |_, delegator| self.cast(delegator)).await;
        report.absorb("submitVote", results);

        self.ctx
            .audit
            .finish("submitVote", self.ctx.registry.len(), started, report.cost);
        report
    }

    /// Submit the committed proof for `slot`, signed by whoever committed it.
    pub async fn cast(&self, slot: Address) -> Result<Step> {
        let commitment = {
            let voter = self.ctx.registry.get(&slot)?;
            match voter.stage() {
                VoterStage::Voted => return Ok(Step::Skipped),
                _ => voter.commitment()?.clone(),
            }
        };
        let signer = commitment.signer;
        let credential = self.ctx.credential(&signer)?;
        let on_behalf_of = if signer == slot { None } else { Some(slot) };

        let ledger = &self.ctx.ledger;
        let proof = &commitment.proof;
        let submitted = self
            .ctx
            .settings
            .retry
            .run("submitVote", move || async move {
                match ledger
                    .submit_vote(credential, proof.clone(), on_behalf_of)
                    .await
                {
                    Ok(receipt) => Ok(Ok(receipt)),
                    Err(LedgerError::Rejected { reason, .. }) => Ok(Err(reason)),
                    Err(e) => Err(Error::from_ledger(e, slot)),
                }
            })
            .await?;

        let receipt = match submitted {
            Ok(receipt) => receipt,
            Err(reason) => {
                // A retried submission may have landed the first time
                if !self.already_voted(slot).await {
                    return Err(Error::OpeningMismatch {
                        address: slot,
                        signer,
                        reason,
                    });
                }
                warn!("vote for {} was already recorded: {}", slot, reason);
                Receipt::default()
            }
        };

        self.ctx.registry.record_vote_cast(&slot)?;
        debug!("vote cast for {} (signed by {})", slot, signer);
        Ok(Step::Done(receipt.cost))
    }

    async fn already_voted(&self, slot: Address) -> bool {
        matches!(self.ctx.ledger.get_voter(slot).await, Ok(voter) if voter.voted)
    }
}
