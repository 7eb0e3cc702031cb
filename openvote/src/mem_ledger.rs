use crate::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::traits::Identity;
use indexmap::{IndexMap, IndexSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

// Nominal execution costs, loosely modelled on contract gas usage
const COST_BASE: u64 = 21_000;
const COST_PER_ADDRESS: u64 = 22_000;
const COST_REGISTER: u64 = 180_000;
const COST_DELEGATE: u64 = 45_000;
const COST_RECONSTRUCT_PER_VOTER: u64 = 60_000;
const COST_COMMIT: u64 = 50_000;
const COST_VOTE: u64 = 320_000;
const COST_TALLY_PER_VOTER: u64 = 30_000;

/// An accepted call, as recorded by [`MemLedger`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerEvent {
    pub operation: &'static str,
    pub signer: Address,
    /// Voter slot the call acted on, if any
    pub slot: Option<Address>,
}

#[derive(Clone, Debug)]
struct Slot {
    x_g: RistrettoPoint,
    own_x_g: RistrettoPoint,
    y_g: Option<RistrettoPoint>,
    delegated_to: Option<Address>,
    serving: Option<Address>,
    commitment: Option<CommitmentHash>,
    vote: Option<RistrettoPoint>,
}

#[derive(Clone, Debug, Default)]
struct State {
    phase: Option<Phase>,
    eligible: IndexSet<Address>,
    question: String,
    deposit: u64,
    deadlines: Option<Deadlines>,
    slots: IndexMap<Address, Slot>,
    tally: Option<(u64, u64)>,
}

impl State {
    fn phase(&self) -> Phase {
        self.phase.unwrap_or(Phase::Setup)
    }

    fn deadlines(&self, operation: &'static str) -> Result<Deadlines, LedgerError> {
        self.deadlines
            .ok_or_else(|| LedgerError::rejected(operation, "sign-up has not begun"))
    }

    fn committed(&self) -> usize {
        self.slots.values().filter(|s| s.commitment.is_some()).count()
    }

    fn voted(&self) -> usize {
        self.slots.values().filter(|s| s.vote.is_some()).count()
    }
}

/// An in-process ledger that enforces the voting contract's rules.
///
/// Its clock follows tokio's, so paused-time tests move through deadlines
/// instantly.
pub struct MemLedger {
    owner: Address,
    epoch: DateTime<Utc>,
    started: Instant,
    state: Mutex<State>,
    history: Mutex<Vec<LedgerEvent>>,
    outages: Mutex<IndexMap<&'static str, u32>>,
}

impl MemLedger {
    /// A fresh ledger in `Setup`, administered by `owner`
    pub fn new(owner: Address) -> Self {
        MemLedger {
            owner,
            epoch: Utc::now(),
            started: Instant::now(),
            state: Mutex::new(State::default()),
            history: Mutex::new(vec![]),
            outages: Mutex::new(IndexMap::new()),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Make the next `count` calls to `operation` fail as unreachable
    pub fn inject_outage(&self, operation: &'static str, count: u32) {
        *lock(&self.outages).entry(operation).or_insert(0) += count;
    }

    /// Every accepted state-changing call, in order
    pub fn history(&self) -> Vec<LedgerEvent> {
        lock(&self.history).clone()
    }

    /// Accepted calls signed by `signer`
    pub fn calls_by(&self, signer: &Address) -> Vec<LedgerEvent> {
        self.history()
            .into_iter()
            .filter(|e| &e.signer == signer)
            .collect()
    }

    fn clock(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.started.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.epoch + elapsed
    }

    fn check_outage(&self, operation: &'static str) -> Result<(), LedgerError> {
        let mut outages = lock(&self.outages);
        match outages.get_mut(operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(LedgerError::unavailable(operation, "simulated outage"))
            }
            _ => Ok(()),
        }
    }

    fn require_owner(&self, operation: &'static str, sender: &Address) -> Result<(), LedgerError> {
        if sender != &self.owner {
            return Err(LedgerError::rejected(operation, "only the owner may call this"));
        }
        Ok(())
    }

    fn apply(
        &self,
        state: &mut State,
        sender: Address,
        call: &LedgerCall,
        now: DateTime<Utc>,
    ) -> Result<(Receipt, Option<Address>), LedgerError> {
        let operation = call.operation();
        let reject = |reason: &str| Err(LedgerError::rejected(operation, reason));

        match call {
            LedgerCall::SetEligible { addresses } => {
                self.require_owner(operation, &sender)?;
                if state.phase() != Phase::Setup {
                    return reject("eligibility is fixed once sign-up begins");
                }
                if addresses.contains(&self.owner) {
                    return reject("the owner cannot be eligible");
                }
                state.eligible.extend(addresses.iter().cloned());
                let cost = COST_BASE + COST_PER_ADDRESS * addresses.len() as u64;
                Ok((Receipt { cost }, None))
            }

            LedgerCall::BeginSignUp(params) => {
                self.require_owner(operation, &sender)?;
                if state.phase() != Phase::Setup {
                    return reject("not in SETUP");
                }
                if state.eligible.len() < MIN_VOTERS {
                    return reject("at least 3 eligible voters are required");
                }
                if !params.secret_ballot {
                    return reject("only secret ballots are supported");
                }
                if params.deposit == 0 {
                    return reject("a deposit is required");
                }
                if !params.deadlines.is_strictly_increasing() {
                    return reject("deadlines must be strictly increasing");
                }
                if params.deadlines.voters_finish_signup <= now {
                    return reject("registration deadline is in the past");
                }
                state.question = params.question.clone();
                state.deposit = params.deposit;
                state.deadlines = Some(params.deadlines);
                state.phase = Some(Phase::Signup);
                Ok((Receipt { cost: COST_BASE * 2 }, None))
            }

            LedgerCall::Register {
                x_g,
                proof,
                deposit,
            } => {
                if state.phase() != Phase::Signup {
                    return reject("not in SIGNUP");
                }
                if now > state.deadlines(operation)?.voters_finish_signup {
                    return reject("registration has closed");
                }
                if !state.eligible.contains(&sender) {
                    return reject("sender is not eligible");
                }
                if state.slots.contains_key(&sender) {
                    return reject("sender is already registered");
                }
                if *deposit != state.deposit {
                    return reject("wrong deposit");
                }
                if state.slots.values().any(|s| &s.own_x_g == x_g) {
                    return reject("voting key already in use");
                }
                if !schnorr_verify(x_g, proof) {
                    return reject("invalid proof of knowledge");
                }
                state.slots.insert(
                    sender,
                    Slot {
                        x_g: *x_g,
                        own_x_g: *x_g,
                        y_g: None,
                        delegated_to: None,
                        serving: None,
                        commitment: None,
                        vote: None,
                    },
                );
                Ok((Receipt { cost: COST_REGISTER }, Some(sender)))
            }

            LedgerCall::Delegate { delegatee } => {
                if state.phase() != Phase::Signup {
                    return reject("not in SIGNUP");
                }
                if now > state.deadlines(operation)?.end_signup {
                    return reject("sign-up has closed");
                }
                if delegatee == &sender {
                    return reject("cannot delegate to yourself");
                }
                let delegatee_key = match state.slots.get(delegatee) {
                    Some(slot) if slot.delegated_to.is_some() => {
                        return reject("delegatee has delegated their own vote")
                    }
                    Some(slot) if slot.serving.is_some() => {
                        return reject("delegatee already serves another delegator")
                    }
                    Some(slot) => slot.own_x_g,
                    None => return reject("delegatee is not registered"),
                };
                match state.slots.get_mut(&sender) {
                    Some(slot) if slot.delegated_to.is_some() => {
                        return reject("sender has already delegated")
                    }
                    Some(slot) if slot.serving.is_some() => {
                        return reject("a delegatee cannot delegate")
                    }
                    Some(slot) => {
                        slot.delegated_to = Some(*delegatee);
                        slot.x_g = delegatee_key;
                    }
                    None => return reject("sender is not registered"),
                }
                if let Some(slot) = state.slots.get_mut(delegatee) {
                    slot.serving = Some(sender);
                }
                Ok((Receipt { cost: COST_DELEGATE }, Some(sender)))
            }

            LedgerCall::FinishRegistrationPhase => {
                self.require_owner(operation, &sender)?;
                if state.phase() != Phase::Signup {
                    return reject("not in SIGNUP");
                }
                let deadlines = state.deadlines(operation)?;
                if now <= deadlines.voters_finish_signup {
                    return reject("voter registration is still open");
                }
                if now > deadlines.end_signup {
                    return reject("sign-up deadline has passed");
                }
                if state.slots.len() < MIN_VOTERS {
                    return reject("fewer than 3 voters registered");
                }

                let keys: Vec<RistrettoPoint> = state.slots.values().map(|s| s.x_g).collect();
                let reconstructed = reconstructed_keys(&keys);
                for (slot, y_g) in state.slots.values_mut().zip(reconstructed.into_iter()) {
                    slot.y_g = Some(y_g);
                }
                state.phase = Some(Phase::Commitment);

                let cost = COST_BASE + COST_RECONSTRUCT_PER_VOTER * state.slots.len() as u64;
                Ok((Receipt { cost }, None))
            }

            LedgerCall::SubmitCommitment { hash, on_behalf_of } => {
                if state.phase() != Phase::Commitment {
                    return reject("not in COMMITMENT");
                }
                if now > state.deadlines(operation)?.end_commitment {
                    return reject("commitment deadline has passed");
                }
                let address = resolve_slot(state, operation, sender, *on_behalf_of)?;
                let slot = state
                    .slots
                    .get_mut(&address)
                    .ok_or_else(|| LedgerError::rejected(operation, "not registered"))?;
                if slot.commitment.is_some() {
                    return reject("already committed");
                }
                slot.commitment = Some(*hash);

                if state.committed() == state.slots.len() {
                    state.phase = Some(Phase::Vote);
                }
                Ok((Receipt { cost: COST_COMMIT }, Some(address)))
            }

            LedgerCall::SubmitVote {
                proof,
                on_behalf_of,
            } => {
                if state.phase() != Phase::Vote {
                    return reject("not in VOTE");
                }
                if now > state.deadlines(operation)?.end_voting {
                    return reject("voting deadline has passed");
                }
                let address = resolve_slot(state, operation, sender, *on_behalf_of)?;
                let index = state
                    .slots
                    .get_full(&address)
                    .map(|(i, _, _)| i as u64)
                    .ok_or_else(|| LedgerError::rejected(operation, "not registered"))?;
                let slot = state
                    .slots
                    .get_mut(&address)
                    .ok_or_else(|| LedgerError::rejected(operation, "not registered"))?;
                if slot.vote.is_some() {
                    return reject("already voted");
                }
                let keys = ProofKeys {
                    x_g: slot.x_g,
                    y_g: slot.y_g.unwrap_or_else(RistrettoPoint::identity),
                };
                if !disjunctive_verify(proof, &keys, index) {
                    return reject("invalid 1-of-2 proof");
                }
                if slot.commitment != Some(commitment_hash(proof, &keys)) {
                    return reject("vote does not match commitment");
                }
                slot.vote = Some(proof.y);
                Ok((Receipt { cost: COST_VOTE }, Some(address)))
            }

            LedgerCall::ComputeTally => {
                self.require_owner(operation, &sender)?;
                if state.phase() != Phase::Vote {
                    return reject("not in VOTE");
                }
                if state.voted() != state.slots.len() {
                    return reject("not every registered voter has voted");
                }
                let sum: RistrettoPoint = state.slots.values().filter_map(|s| s.vote).sum();
                let total = state.slots.len() as u64;
                let yes = match count_yes_votes(&sum, total) {
                    Some(yes) => yes,
                    None => return reject("tally out of range"),
                };
                state.tally = Some((yes, total));
                state.phase = Some(Phase::Finished);

                let cost = COST_BASE + COST_TALLY_PER_VOTER * total;
                Ok((Receipt { cost }, None))
            }

            LedgerCall::DeadlinePassed => {
                let phase = state.phase();
                let lapsed = match (phase, state.deadlines) {
                    (Phase::Signup, Some(d)) => {
                        now > d.end_signup
                            || (now > d.voters_finish_signup && state.slots.len() < MIN_VOTERS)
                    }
                    (Phase::Commitment, Some(d)) => now > d.end_commitment,
                    (Phase::Vote, Some(d)) => now > d.end_voting,
                    _ => false,
                };
                if !lapsed {
                    return reject("no deadline has lapsed");
                }
                *state = State::default();
                Ok((Receipt { cost: COST_BASE }, None))
            }
        }
    }
}

/// Which voter slot a commitment or vote acts on.
///
/// A delegator's slot can only be filled by their delegatee, and a delegator
/// can't fill it themselves.
fn resolve_slot(
    state: &State,
    operation: &'static str,
    sender: Address,
    on_behalf_of: Option<Address>,
) -> Result<Address, LedgerError> {
    match on_behalf_of {
        Some(delegator) => match state.slots.get(&delegator) {
            Some(slot) if slot.delegated_to == Some(sender) => Ok(delegator),
            Some(_) => Err(LedgerError::rejected(
                operation,
                "sender is not the delegatee for this voter",
            )),
            None => Err(LedgerError::rejected(operation, "delegator is not registered")),
        },
        None => match state.slots.get(&sender) {
            Some(slot) if slot.delegated_to.is_some() => Err(LedgerError::rejected(
                operation,
                "sender has delegated their vote",
            )),
            Some(_) => Ok(sender),
            None => Err(LedgerError::rejected(operation, "sender is not registered")),
        },
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl LedgerClient for MemLedger {
    async fn submit(&self, call: Signed<LedgerCall>) -> Result<Receipt, LedgerError> {
        let operation = call.operation();
        self.check_outage(operation)?;

        if call.verify_signature().is_err() {
            return Err(LedgerError::rejected(operation, "invalid signature"));
        }
        let sender = call.signer();
        let now = self.clock();

        let mut state = lock(&self.state);
        let (receipt, slot) = self.apply(&mut state, sender, call.inner(), now)?;
        drop(state);

        debug!("ledger accepted {} from {}", operation, sender);
        lock(&self.history).push(LedgerEvent {
            operation,
            signer: sender,
            slot,
        });
        Ok(receipt)
    }

    async fn now(&self) -> Result<DateTime<Utc>, LedgerError> {
        self.check_outage("now")?;
        Ok(self.clock())
    }

    async fn state(&self) -> Result<Phase, LedgerError> {
        self.check_outage("state")?;
        Ok(lock(&self.state).phase())
    }

    async fn deadlines(&self) -> Result<Deadlines, LedgerError> {
        self.check_outage("deadlines")?;
        lock(&self.state).deadlines("deadlines")
    }

    async fn deposit_required(&self) -> Result<u64, LedgerError> {
        self.check_outage("depositRequired")?;
        Ok(lock(&self.state).deposit)
    }

    async fn get_voter(&self, address: Address) -> Result<LedgerVoter, LedgerError> {
        self.check_outage("getVoter")?;
        let state = lock(&self.state);
        let slot = state
            .slots
            .get(&address)
            .ok_or_else(|| LedgerError::rejected("getVoter", "voter is not registered"))?;
        Ok(LedgerVoter {
            address,
            x_g: slot.x_g,
            y_g: slot.y_g,
            delegated_to: slot.delegated_to,
            commitment: slot.commitment,
            voted: slot.vote.is_some(),
        })
    }

    async fn address_id(&self, address: Address) -> Result<u64, LedgerError> {
        self.check_outage("addressid")?;
        lock(&self.state)
            .slots
            .get_full(&address)
            .map(|(index, _, _)| index as u64)
            .ok_or_else(|| LedgerError::rejected("addressid", "voter is not registered"))
    }

    async fn verify_disjunctive_proof(
        &self,
        proof: &DisjunctiveProof,
        keys: &ProofKeys,
        index: u64,
    ) -> Result<bool, LedgerError> {
        self.check_outage("verify1outof2ZKP")?;
        Ok(disjunctive_verify(proof, keys, index))
    }

    async fn final_tally(&self, index: u8) -> Result<u64, LedgerError> {
        self.check_outage("finaltally")?;
        let state = lock(&self.state);
        match (state.tally, index) {
            (Some((yes, _)), 0) => Ok(yes),
            (Some((_, total)), 1) => Ok(total),
            (Some(_), _) => Err(LedgerError::rejected("finaltally", "index out of range")),
            (None, _) => Err(LedgerError::rejected("finaltally", "tally not computed")),
        }
    }

    async fn counters(&self) -> Result<Counters, LedgerError> {
        self.check_outage("counters")?;
        let state = lock(&self.state);
        Ok(Counters {
            eligible: state.eligible.len() as u64,
            registered: state.slots.len() as u64,
            committed: state.committed() as u64,
            voted: state.voted() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve25519_dalek::scalar::Scalar;
    use std::time::Duration;

    struct Account {
        credential: Credential,
        x: Scalar,
    }

    impl Account {
        fn new() -> Self {
            Account {
                credential: Credential::generate(),
                x: random_scalar(),
            }
        }

        fn address(&self) -> Address {
            self.credential.address()
        }

        fn x_g(&self) -> RistrettoPoint {
            public_point(&self.x)
        }

        async fn register(&self, ledger: &MemLedger) -> Result<Receipt, LedgerError> {
            let proof = schnorr_prove(&self.x, &random_scalar(), &self.x_g()).unwrap();
            ledger
                .register(&self.credential, self.x_g(), proof, 10)
                .await
        }
    }

    async fn open_signup(voters: usize) -> (MemLedger, Credential, Vec<Account>) {
        let admin = Credential::generate();
        let ledger = MemLedger::new(admin.address());
        let accounts: Vec<Account> = (0..voters).map(|_| Account::new()).collect();

        ledger
            .set_eligible(&admin, accounts.iter().map(|a| a.address()).collect())
            .await
            .unwrap();
        let now = ledger.now().await.unwrap();
        let params = SignupParams {
            question: "?".to_owned(),
            secret_ballot: true,
            deposit: 10,
            deadlines: Deadlines::spaced(now, Duration::from_secs(60)).unwrap(),
        };
        ledger.begin_sign_up(&admin, params).await.unwrap();
        (ledger, admin, accounts)
    }

    fn is_rejected<T>(result: Result<T, LedgerError>) -> bool {
        matches!(result, Err(LedgerError::Rejected { .. }))
    }

    #[tokio::test(start_paused = true)]
    async fn registration_rules() {
        let (ledger, admin, accounts) = open_signup(3).await;

        // Only the owner administers
        assert!(is_rejected(ledger.compute_tally(&accounts[0].credential).await));

        accounts[0].register(&ledger).await.unwrap();
        assert!(is_rejected(accounts[0].register(&ledger).await));

        // Wrong deposit
        let a = &accounts[1];
        let proof = schnorr_prove(&a.x, &random_scalar(), &a.x_g()).unwrap();
        assert!(is_rejected(
            ledger.register(&a.credential, a.x_g(), proof, 9).await
        ));

        // Strangers can't register
        let stranger = Account::new();
        assert!(is_rejected(stranger.register(&ledger).await));

        // Tampered key fails the knowledge proof
        let proof = schnorr_prove(&a.x, &random_scalar(), &a.x_g()).unwrap();
        let tampered = a.x_g() + public_point(&Scalar::one());
        assert!(is_rejected(
            ledger.register(&a.credential, tampered, proof, 10).await
        ));

        // Registration closes at the first deadline
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(is_rejected(a.register(&ledger).await));

        assert_eq!(ledger.total_registered().await.unwrap(), 1);
        assert!(is_rejected(ledger.finish_registration_phase(&admin).await));
    }

    #[tokio::test(start_paused = true)]
    async fn forged_signature_rejected() {
        let (ledger, _admin, accounts) = open_signup(3).await;
        let mut call = Signed::sign(
            &accounts[0].credential,
            LedgerCall::Delegate {
                delegatee: accounts[1].address(),
            },
        );
        call.public = *accounts[2].credential.public_key();
        assert!(is_rejected(ledger.submit(call).await));
    }

    #[tokio::test(start_paused = true)]
    async fn delegation_substitutes_key() {
        let (ledger, admin, accounts) = open_signup(4).await;
        for account in accounts.iter() {
            account.register(&ledger).await.unwrap();
        }
        let (d, e) = (&accounts[0], &accounts[1]);

        ledger.delegate(&d.credential, e.address()).await.unwrap();
        assert!(is_rejected(
            ledger.delegate(&accounts[2].credential, e.address()).await
        ));
        assert!(is_rejected(
            ledger.delegate(&e.credential, accounts[3].address()).await
        ));
        assert!(is_rejected(
            ledger.delegate(&accounts[3].credential, d.address()).await
        ));

        let voter = ledger.get_voter(d.address()).await.unwrap();
        assert_eq!(voter.x_g, e.x_g());
        assert_eq!(voter.delegated_to, Some(e.address()));
        assert_eq!(voter.y_g, None);

        tokio::time::advance(Duration::from_secs(61)).await;
        ledger.finish_registration_phase(&admin).await.unwrap();
        assert_eq!(ledger.state().await.unwrap(), Phase::Commitment);
        assert!(ledger.get_voter(d.address()).await.unwrap().y_g.is_some());

        // The delegator can't commit for themselves, only the delegatee can
        assert!(is_rejected(
            ledger.submit_commitment(&d.credential, [1; 32], None).await
        ));
        assert!(is_rejected(
            ledger
                .submit_commitment(&accounts[2].credential, [1; 32], Some(d.address()))
                .await
        ));
        ledger
            .submit_commitment(&e.credential, [1; 32], Some(d.address()))
            .await
            .unwrap();
        assert_eq!(
            ledger.calls_by(&e.credential.address()).last().unwrap().slot,
            Some(d.address())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn full_contract_flow() {
        let (ledger, admin, accounts) = open_signup(3).await;
        for account in accounts.iter() {
            account.register(&ledger).await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        ledger.finish_registration_phase(&admin).await.unwrap();

        let branches = [Branch::Yes, Branch::No, Branch::Yes];
        let mut proofs = vec![];
        for (account, branch) in accounts.iter().zip(branches.iter()) {
            let address = account.address();
            let voter = ledger.get_voter(address).await.unwrap();
            let keys = ProofKeys {
                x_g: voter.x_g,
                y_g: voter.y_g.unwrap(),
            };
            let index = ledger.address_id(address).await.unwrap();
            let (w, r, d) = (random_scalar(), random_scalar(), random_scalar());
            let proof = disjunctive_prove(&keys, &w, &r, &d, &account.x, *branch, index).unwrap();
            assert!(ledger
                .verify_disjunctive_proof(&proof, &keys, index)
                .await
                .unwrap());

            let hash = commitment_hash(&proof, &keys);
            ledger
                .submit_commitment(&account.credential, hash, None)
                .await
                .unwrap();
            proofs.push(proof);
        }
        // The last commitment closes the phase
        assert_eq!(ledger.state().await.unwrap(), Phase::Vote);

        // An opening that doesn't match the commitment is refused
        let mut swapped = proofs[0].clone();
        swapped.y = proofs[1].y;
        assert!(is_rejected(
            ledger
                .submit_vote(&accounts[0].credential, swapped, None)
                .await
        ));

        for (account, proof) in accounts.iter().zip(proofs.into_iter()) {
            ledger
                .submit_vote(&account.credential, proof, None)
                .await
                .unwrap();
        }

        ledger.compute_tally(&admin).await.unwrap();
        assert_eq!(ledger.state().await.unwrap(), Phase::Finished);
        assert_eq!(ledger.final_tally(0).await.unwrap(), 2);
        assert_eq!(ledger.final_tally(1).await.unwrap(), 3);
        assert!(is_rejected(ledger.deadline_passed(&admin).await));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_after_deadline() {
        let (ledger, admin, accounts) = open_signup(3).await;
        accounts[0].register(&ledger).await.unwrap();

        // Too early
        assert!(is_rejected(ledger.deadline_passed(&admin).await));

        tokio::time::advance(Duration::from_secs(61)).await;
        ledger.deadline_passed(&accounts[1].credential).await.unwrap();
        assert_eq!(ledger.state().await.unwrap(), Phase::Setup);
        assert_eq!(ledger.total_registered().await.unwrap(), 0);
        assert!(is_rejected(
            ledger.submit_commitment(&accounts[0].credential, [0; 32], None).await
        ));
    }

    #[tokio::test]
    async fn outages_are_unavailable() {
        let ledger = MemLedger::new(Credential::generate().address());
        ledger.inject_outage("state", 2);
        assert!(matches!(
            ledger.state().await,
            Err(LedgerError::Unavailable { .. })
        ));
        assert!(ledger.state().await.is_err());
        assert_eq!(ledger.state().await.unwrap(), Phase::Setup);
    }
}
