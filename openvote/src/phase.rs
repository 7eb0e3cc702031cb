use crate::*;
use chrono::{DateTime, Utc};
use num_enum::TryFromPrimitive;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Election phase.
///
/// The first five mirror the ledger's state numbering. `Aborted` is local:
/// after `deadlinePassed` the ledger reports `Setup` again, but this run is
/// over.
#[derive(
    Serialize, Deserialize, TryFromPrimitive, Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Phase {
    Setup = 0,
    Signup = 1,
    Commitment = 2,
    Vote = 3,
    Finished = 4,
    Aborted = 5,
}

impl Phase {
    /// The only phase this one may advance to
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Setup => Some(Phase::Signup),
            Phase::Signup => Some(Phase::Commitment),
            Phase::Commitment => Some(Phase::Vote),
            Phase::Vote => Some(Phase::Finished),
            Phase::Finished | Phase::Aborted => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Finished | Phase::Aborted)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Phase::Setup => "SETUP",
            Phase::Signup => "SIGNUP",
            Phase::Commitment => "COMMITMENT",
            Phase::Vote => "VOTE",
            Phase::Finished => "FINISHED",
            Phase::Aborted => "ABORTED",
        };
        write!(f, "{}", name)
    }
}

/// What the admin posts when opening sign-up
#[derive(Debug, Clone)]
pub struct SignupPlan {
    pub eligible: Vec<Address>,
    pub question: String,
    pub deposit: u64,
    pub phase_gap: Duration,
}

/// Drives the ledger through the election phases on behalf of the admin.
///
/// Phases only move forward one step at a time. Skips and backwards moves are
/// refused locally; ledger rejections leave the phase unchanged.
pub struct PhaseController {
    ledger: Arc<dyn LedgerClient>,
    admin: Credential,
    plan: SignupPlan,
    retry: RetryPolicy,
    buffer: Duration,
    poll_interval: Duration,
    current: Phase,
    deadlines: Option<Deadlines>,
    eligibility_posted: bool,
}

impl PhaseController {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        admin: Credential,
        plan: SignupPlan,
        settings: &RunSettings,
    ) -> Self {
        PhaseController {
            ledger,
            admin,
            plan,
            retry: settings.retry,
            buffer: settings.deadline_buffer,
            poll_interval: settings.poll_interval,
            current: Phase::Setup,
            deadlines: None,
            eligibility_posted: false,
        }
    }

    pub fn current_phase(&self) -> Phase {
        self.current
    }

    /// Deadlines as fetched from the ledger after sign-up began
    pub fn deadlines(&self) -> Option<&Deadlines> {
        self.deadlines.as_ref()
    }

    /// The deadline that closes `phase`
    pub fn deadline_for(&self, phase: Phase) -> Option<DateTime<Utc>> {
        let deadlines = self.deadlines.as_ref()?;
        match phase {
            Phase::Signup => Some(deadlines.voters_finish_signup),
            Phase::Commitment => Some(deadlines.end_commitment),
            Phase::Vote => Some(deadlines.end_voting),
            Phase::Finished => Some(deadlines.end_refund),
            Phase::Setup | Phase::Aborted => None,
        }
    }

    pub async fn is_past_deadline(&self, phase: Phase) -> Result<bool> {
        match self.deadline_for(phase) {
            Some(deadline) => Ok(self.ledger_now().await? > deadline),
            None => Ok(false),
        }
    }

    /// Move to `next`, which must directly follow the current phase
    pub async fn advance_to(&mut self, next: Phase) -> Result<Receipt> {
        let from = self.current;
        if from == Phase::Aborted {
            return Err(Error::Aborted);
        }
        if from.next() != Some(next) {
            return Err(Error::PhaseRejected {
                from,
                to: next,
                reason: "phases advance one step at a time".to_owned(),
            });
        }

        info!("advancing election {} -> {}", from, next);
        let receipt = match next {
            Phase::Signup => self.enter_signup().await?,
            Phase::Commitment => self.enter_commitment().await?,
            Phase::Vote => self.enter_vote().await?,
            Phase::Finished => self.enter_finished().await?,
            Phase::Setup | Phase::Aborted => unreachable!("not reachable through next()"),
        };

        self.current = next;
        Ok(receipt)
    }

    async fn enter_signup(&mut self) -> Result<Receipt> {
        let to = Phase::Signup;
        let (ledger, admin) = (&self.ledger, &self.admin);
        let mut cost = 0;

        let eligible = &self.plan.eligible;
        cost += self
            .transition(to, "setEligible", move || {
                ledger.set_eligible(admin, eligible.clone())
            })
            .await?
            .cost;
        self.eligibility_posted = true;

        let now = self.ledger_now().await?;
        let params = SignupParams {
            question: self.plan.question.clone(),
            secret_ballot: true,
            deposit: self.plan.deposit,
            deadlines: Deadlines::spaced(now, self.plan.phase_gap)?,
        };
        let params = &params;
        cost += self
            .transition(to, "beginSignUp", move || {
                ledger.begin_sign_up(admin, params.clone())
            })
            .await?
            .cost;

        let deadlines = self
            .retry
            .run("deadlines", move || async move { Ok(ledger.deadlines().await?) })
            .await?;
        if !deadlines.is_strictly_increasing() {
            return Err(Error::PhaseRejected {
                from: self.current,
                to,
                reason: format!("ledger deadlines are not increasing: {:?}", deadlines),
            });
        }
        self.deadlines = Some(deadlines);
        self.confirm(to).await?;

        Ok(Receipt { cost })
    }

    async fn enter_commitment(&mut self) -> Result<Receipt> {
        let to = Phase::Commitment;
        self.wait_for_deadline(Phase::Signup).await?;

        let (ledger, admin) = (&self.ledger, &self.admin);
        let receipt = self
            .transition(to, "finishRegistrationPhase", move || {
                ledger.finish_registration_phase(admin)
            })
            .await?;
        self.confirm(to).await?;

        Ok(receipt)
    }

    /// The ledger closes commitment by itself once every registered voter
    /// has committed; this only confirms it happened.
    async fn enter_vote(&mut self) -> Result<Receipt> {
        let to = Phase::Vote;
        let state = self.ledger_state().await?;
        if state != to {
            let counters = self.ledger_counters().await?;
            return Err(Error::PhaseRejected {
                from: self.current,
                to,
                reason: format!(
                    "ledger still in {}: {} of {} registered voters committed",
                    state, counters.committed, counters.registered
                ),
            });
        }
        Ok(Receipt::default())
    }

    async fn enter_finished(&mut self) -> Result<Receipt> {
        let to = Phase::Finished;
        let (ledger, admin) = (&self.ledger, &self.admin);
        let receipt = self
            .transition(to, "computeTally", move || ledger.compute_tally(admin))
            .await?;
        self.confirm(to).await?;

        Ok(receipt)
    }

    /// Abandon the election once the active phase's deadline has lapsed.
    ///
    /// Waits for the deadline if it hasn't passed yet. Leaves the controller
    /// in `Aborted`; there is no way back.
    pub async fn reset(&mut self) -> Result<Receipt> {
        let from = self.current;
        match from {
            Phase::Aborted => return Err(Error::Aborted),
            Phase::Finished => {
                return Err(Error::PhaseRejected {
                    from,
                    to: Phase::Aborted,
                    reason: "election already finished".to_owned(),
                })
            }
            Phase::Setup => {
                // Sign-up never began, so there is no deadline to wait for and
                // nothing for deadlinePassed to undo. The ledger has no call to
                // withdraw an eligibility list already posted by setEligible.
                if self.eligibility_posted {
                    warn!("aborting in SETUP; the posted eligibility list stays on the ledger");
                }
                self.current = Phase::Aborted;
                return Ok(Receipt::default());
            }
            _ => {}
        }

        let deadline = self.reset_deadline().await?;
        if let Some(deadline) = deadline {
            self.wait_until(deadline, false).await?;
        }

        warn!("resetting election in {}", from);
        let (ledger, admin) = (&self.ledger, &self.admin);
        let receipt = self
            .transition(Phase::Aborted, "deadlinePassed", move || {
                ledger.deadline_passed(admin)
            })
            .await?;
        self.current = Phase::Aborted;

        Ok(receipt)
    }

    /// In sign-up a stalled election can be reset as soon as registration
    /// closes without quorum; otherwise only after `endSignup`.
    async fn reset_deadline(&self) -> Result<Option<DateTime<Utc>>> {
        let deadlines = match &self.deadlines {
            Some(deadlines) => deadlines,
            None => return Ok(None),
        };
        if self.current != Phase::Signup {
            return Ok(self.deadline_for(self.current));
        }

        let registered = self.ledger_counters().await?.registered;
        if (registered as usize) < MIN_VOTERS {
            Ok(Some(deadlines.voters_finish_signup))
        } else {
            Ok(Some(deadlines.end_signup))
        }
    }

    /// Sleep until the ledger clock passes the deadline closing `phase`.
    ///
    /// Returns early if the ledger has already left that phase.
    pub async fn wait_for_deadline(&self, phase: Phase) -> Result<()> {
        match self.deadline_for(phase) {
            Some(deadline) => self.wait_until(deadline, true).await,
            None => Ok(()),
        }
    }

    async fn wait_until(&self, deadline: DateTime<Utc>, cancel_on_advance: bool) -> Result<()> {
        loop {
            let now = self.ledger_now().await?;
            if now > deadline {
                return Ok(());
            }

            let remaining = (deadline - now).to_std().unwrap_or_default() + self.buffer;
            let nap = remaining.min(self.poll_interval);
            debug!("waiting {:?} for deadline {}", nap, deadline);
            tokio::time::sleep(nap).await;

            if cancel_on_advance {
                let state = self.ledger_state().await?;
                if state != self.current {
                    debug!("ledger already moved to {}, not waiting", state);
                    return Ok(());
                }
            }
        }
    }

    async fn confirm(&self, expected: Phase) -> Result<()> {
        let state = self.ledger_state().await?;
        if state != expected {
            return Err(Error::PhaseRejected {
                from: self.current,
                to: expected,
                reason: format!("ledger reports {} after the transition", state),
            });
        }
        Ok(())
    }

    async fn transition<F, Fut>(
        &self,
        to: Phase,
        operation: &'static str,
        mut call: F,
    ) -> Result<Receipt>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Receipt, LedgerError>>,
    {
        let from = self.current;
        self.retry
            .run(operation, || {
                let fut = call();
                async move {
                    fut.await.map_err(|e| match e {
                        LedgerError::Rejected { reason, .. } => {
                            Error::PhaseRejected { from, to, reason }
                        }
                        e => Error::from(e),
                    })
                }
            })
            .await
    }

    async fn ledger_now(&self) -> Result<DateTime<Utc>> {
        let ledger = &self.ledger;
        self.retry
            .run("now", move || async move { Ok(ledger.now().await?) })
            .await
    }

    async fn ledger_state(&self) -> Result<Phase> {
        let ledger = &self.ledger;
        self.retry
            .run("state", move || async move { Ok(ledger.state().await?) })
            .await
    }

    async fn ledger_counters(&self) -> Result<Counters> {
        let ledger = &self.ledger;
        self.retry
            .run("counters", move || async move { Ok(ledger.counters().await?) })
            .await
    }
}
