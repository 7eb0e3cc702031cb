use crate::*;

/// Final count as reported by the ledger
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TallyResult {
    pub yes: u64,
    /// Number of votes counted
    pub total: u64,
}

impl TallyResult {
    pub fn no(&self) -> u64 {
        self.total.saturating_sub(self.yes)
    }
}

impl std::fmt::Display for TallyResult {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} yes, {} no ({} votes)",
            self.yes,
            self.no(),
            self.total
        )
    }
}

/// Closes voting and reads back the result.
pub struct TallyWorkflow<'a> {
    ctx: &'a ElectionContext,
}

impl<'a> TallyWorkflow<'a> {
    pub fn new(ctx: &'a ElectionContext) -> Self {
        TallyWorkflow { ctx }
    }

    /// Have the admin compute the tally, then read both totals.
    pub async fn run(&self, controller: &mut PhaseController) -> Result<TallyResult> {
        let started = self.ctx.audit.start();
        let receipt = controller.advance_to(Phase::Finished).await?;
        self.ctx
            .audit
            .finish("computeTally", self.ctx.registry.len(), started, receipt.cost);

        self.read().await
    }

    /// Read the published totals. Fails unless the election is FINISHED.
    pub async fn read(&self) -> Result<TallyResult> {
        let ledger = &self.ctx.ledger;
        let retry = &self.ctx.settings.retry;
        let yes = retry
            .run("finaltally", move || async move {
                Ok(ledger.final_tally(0).await?)
            })
            .await?;
        let total = retry
            .run("finaltally", move || async move {
                Ok(ledger.final_tally(1).await?)
            })
            .await?;

        Ok(TallyResult { yes, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_display() {
        let tally = TallyResult { yes: 2, total: 3 };
        assert_eq!(tally.no(), 1);
        assert_eq!(tally.to_string(), "2 yes, 1 no (3 votes)");
    }
}
