use crate::*;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use std::future::Future;
use std::sync::Arc;

/// Everything one election run needs, passed explicitly to each workflow
pub struct ElectionContext {
    pub config: ElectionConfig,
    pub keys: KeyStore,
    pub settings: RunSettings,
    pub registry: VoterRegistry,
    pub ledger: Arc<dyn LedgerClient>,
    pub crypto: Arc<dyn CryptoService>,
    pub audit: AuditLog,
}

impl ElectionContext {
    /// Seed the voter registry from the config and key store
    pub fn new(
        config: ElectionConfig,
        keys: KeyStore,
        settings: RunSettings,
        ledger: Arc<dyn LedgerClient>,
        crypto: Arc<dyn CryptoService>,
    ) -> Result<Self, ConfigError> {
        config.validate(&keys)?;
        let registry = VoterRegistry::from_config(&config, &keys)?;
        let audit = AuditLog::new(settings.audit_log.clone());

        Ok(ElectionContext {
            config,
            keys,
            settings,
            registry,
            ledger,
            crypto,
            audit,
        })
    }

    pub fn credential(&self, address: &Address) -> Result<&Credential> {
        self.keys.resolve(address).ok_or(Error::NotFound(*address))
    }

    pub fn admin(&self) -> Result<&Credential> {
        self.credential(&self.config.admin)
    }

    /// Log the ledger's progress counters
    pub async fn log_progress(&self) {
        let ledger = &self.ledger;
        let progress = self
            .settings
            .retry
            .run("counters", move || async move {
                let counters = ledger.counters().await?;
                let state = ledger.state().await?;
                Ok((counters, state))
            })
            .await;
        match progress {
            Ok((counters, state)) => info!("ledger in {}: {}", state, counters),
            Err(e) => warn!("unable to read ledger progress: {}", e),
        }
    }
}

/// Outcome of a single voter's step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Submitted, with the ledger cost
    Done(u64),
    /// Already done earlier; nothing submitted
    Skipped,
}

/// A per-voter failure. Never aborts the phase for other voters.
#[derive(Debug)]
pub struct VoterFailure {
    pub address: Address,
    pub operation: &'static str,
    pub error: Error,
}

impl std::fmt::Display for VoterFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} for {}: {}", self.operation, self.address, self.error)
    }
}

/// What happened to each voter during one phase
#[derive(Debug)]
pub struct PhaseReport {
    pub phase: Phase,
    pub completed: Vec<Address>,
    pub skipped: Vec<Address>,
    pub failures: Vec<VoterFailure>,
    pub cost: u64,
}

impl PhaseReport {
    pub fn new(phase: Phase) -> Self {
        PhaseReport {
            phase,
            completed: vec![],
            skipped: vec![],
            failures: vec![],
            cost: 0,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn absorb(
        &mut self,
        operation: &'static str,
        results: Vec<(Address, Result<Step>)>,
    ) {
        for (address, result) in results {
            match result {
                Ok(Step::Done(cost)) => {
                    self.cost += cost;
                    self.completed.push(address);
                }
                Ok(Step::Skipped) => {
                    debug!("{} skipped for {}", operation, address);
                    self.skipped.push(address);
                }
                Err(error) => {
                    let failure = VoterFailure {
                        address: error.address().unwrap_or(address),
                        operation: error.operation().unwrap_or(operation),
                        error,
                    };
                    error!("{}", failure);
                    self.failures.push(failure);
                }
            }
        }
    }
}

/// Run `f` for each voter on a bounded pool
pub(crate) async fn fan_out<F, Fut>(
    workers: usize,
    addresses: Vec<Address>,
    f: F,
) -> Vec<(Address, Result<Step>)>
where
    F: Fn(Address) -> Fut,
    Fut: Future<Output = Result<Step>>,
{
    let f = &f;
    stream::iter(addresses)
        .map(|address| async move { (address, f(address).await) })
        .buffer_unordered(workers.max(1))
        .collect()
        .await
}

/// Run `f(delegatee, delegator)` for every delegated slot.
///
/// Groups run concurrently; within a group the delegatee's submissions stay
/// in order.
pub(crate) async fn fan_out_delegated<F, Fut>(
    workers: usize,
    groups: IndexMap<Address, Vec<Address>>,
    f: F,
) -> Vec<(Address, Result<Step>)>
where
    F: Fn(Address, Address) -> Fut,
    Fut: Future<Output = Result<Step>>,
{
    let f = &f;
    let per_group: Vec<Vec<(Address, Result<Step>)>> = stream::iter(groups)
        .map(|(delegatee, delegators)| async move {
            let mut results = Vec::with_capacity(delegators.len());
            for delegator in delegators {
                results.push((delegator, f(delegatee, delegator).await));
            }
            results
        })
        .buffer_unordered(workers.max(1))
        .collect()
        .await;
    per_group.into_iter().flatten().collect()
}

/// How a run ended
#[derive(Debug)]
pub enum Outcome {
    Tallied(TallyResult),
    Aborted {
        /// Phase in which the run failed
        phase: Phase,
        cause: Error,
        /// Set if the ledger reset itself failed
        reset_error: Option<Error>,
    },
}

#[derive(Debug)]
pub struct RunSummary {
    pub reports: Vec<PhaseReport>,
    pub outcome: Outcome,
    pub final_phase: Phase,
}

impl RunSummary {
    /// Every phase closed and the tally was read
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Tallied(_))
    }

    pub fn tally(&self) -> Option<&TallyResult> {
        match &self.outcome {
            Outcome::Tallied(tally) => Some(tally),
            _ => None,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &VoterFailure> {
        self.reports.iter().flat_map(|r| r.failures.iter())
    }
}

/// Runs one election from SETUP to FINISHED
pub struct Orchestrator {
    ctx: ElectionContext,
    controller: PhaseController,
}

impl Orchestrator {
    pub fn new(ctx: ElectionContext) -> Result<Self> {
        let admin = ctx.admin()?.clone();
        let plan = SignupPlan {
            eligible: ctx.registry.addresses(),
            question: ctx.settings.question.clone(),
            deposit: ctx.settings.deposit,
            phase_gap: ctx.config.phase_gap,
        };
        let controller = PhaseController::new(ctx.ledger.clone(), admin, plan, &ctx.settings);
        Ok(Orchestrator { ctx, controller })
    }

    pub fn context(&self) -> &ElectionContext {
        &self.ctx
    }

    pub fn controller(&self) -> &PhaseController {
        &self.controller
    }

    pub async fn run(&mut self) -> RunSummary {
        let mut reports = vec![];
        info!(
            "starting election run {} with {} voters",
            self.ctx.audit.run_id(),
            self.ctx.registry.len()
        );

        // SIGNUP
        if let Err(e) = self.advance(Phase::Signup, "beginSignUp").await {
            return self.abort(reports, e).await;
        }
        let registered = RegistrationWorkflow::new(&self.ctx).run().await;
        match registered {
            Ok(report) => reports.push(report),
            Err(e) => return self.abort(reports, e).await,
        }
        self.ctx.log_progress().await;

        // COMMITMENT
        if let Err(e) = self
            .advance(Phase::Commitment, "finishRegistrationPhase")
            .await
        {
            return self.abort(reports, e).await;
        }
        reports.push(CommitmentWorkflow::new(&self.ctx).run().await);
        self.ctx.log_progress().await;

        // VOTE
        if let Err(e) = self.advance(Phase::Vote, "commitmentClosed").await {
            return self.abort(reports, e).await;
        }
        reports.push(VotingWorkflow::new(&self.ctx).run().await);
        self.ctx.log_progress().await;

        // FINISHED
        let tallied = TallyWorkflow::new(&self.ctx)
            .run(&mut self.controller)
            .await;
        let tally = match tallied {
            Ok(tally) => tally,
            Err(e) => return self.abort(reports, e).await,
        };
        info!("election finished: {}", tally);
        self.ctx.registry.erase_secrets();

        RunSummary {
            reports,
            outcome: Outcome::Tallied(tally),
            final_phase: self.controller.current_phase(),
        }
    }

    async fn advance(&mut self, next: Phase, operation: &'static str) -> Result<()> {
        let started = self.ctx.audit.start();
        let receipt = self.controller.advance_to(next).await?;
        self.ctx
            .audit
            .finish(operation, self.ctx.registry.len(), started, receipt.cost);
        Ok(())
    }

    async fn abort(&mut self, reports: Vec<PhaseReport>, cause: Error) -> RunSummary {
        let phase = self.controller.current_phase();
        error!("election failed in {}: {}", phase, cause);

        let started = self.ctx.audit.start();
        let reset_error = match self.controller.reset().await {
            Ok(receipt) => {
                self.ctx
                    .audit
                    .finish("deadlinePassed", self.ctx.registry.len(), started, receipt.cost);
                None
            }
            Err(e) => {
                error!("unable to reset election: {}", e);
                Some(e)
            }
        };
        self.ctx.registry.erase_secrets();

        RunSummary {
            reports,
            outcome: Outcome::Aborted {
                phase,
                cause,
                reset_error,
            },
            final_phase: self.controller.current_phase(),
        }
    }
}
