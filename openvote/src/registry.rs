use crate::*;
use indexmap::{IndexMap, IndexSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The roster of eligible voters and their delegation relationships.
///
/// Each voter sits behind its own lock so different voters never contend.
/// Callers must not hold two voter guards at once.
#[derive(Debug)]
pub struct VoterRegistry {
    voters: IndexMap<Address, Mutex<Voter>>,
    delegations: IndexMap<Address, Address>,
    no_votes: IndexSet<Address>,
}

impl VoterRegistry {
    /// Build a registry from the roster. Delegators, delegatees and no-voters
    /// must all be on the roster.
    pub fn seed(
        roster: Vec<Address>,
        delegations: IndexMap<Address, Address>,
        no_votes: IndexSet<Address>,
    ) -> Result<Self, ConfigError> {
        let members: IndexSet<Address> = roster.iter().cloned().collect();
        for (delegator, delegatee) in delegations.iter() {
            if !members.contains(delegator) {
                return Err(ConfigError::NotInRoster(*delegator));
            }
            if !members.contains(delegatee) {
                return Err(ConfigError::NotInRoster(*delegatee));
            }
        }
        for address in no_votes.iter() {
            if !members.contains(address) {
                return Err(ConfigError::NotInRoster(*address));
            }
        }
        validate_delegations(&delegations, &[])?;

        if members.len() < MIN_VOTERS {
            return Err(ConfigError::TooFewVoters {
                found: members.len(),
                minimum: MIN_VOTERS,
            });
        }

        let voters = members
            .into_iter()
            .map(|address| {
                let branch = branch_for(&no_votes, &address);
                let voter = Voter::new(address, branch, delegations.get(&address).cloned());
                (address, Mutex::new(voter))
            })
            .collect();

        Ok(VoterRegistry {
            voters,
            delegations,
            no_votes,
        })
    }

    /// Seed from a validated election config
    pub fn from_config(config: &ElectionConfig, keys: &KeyStore) -> Result<Self, ConfigError> {
        VoterRegistry::seed(
            config.roster(keys),
            config.delegations.clone(),
            config.no_votes.clone(),
        )
    }

    /// Lock one voter record
    pub fn get(&self, address: &Address) -> Result<MutexGuard<'_, Voter>> {
        let voter = self.voters.get(address).ok_or(Error::NotFound(*address))?;
        Ok(voter.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.voters.contains_key(address)
    }

    /// All voters in roster order
    pub fn addresses(&self) -> Vec<Address> {
        self.voters.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.voters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voters.is_empty()
    }

    pub fn is_delegator(&self, address: &Address) -> bool {
        self.delegations.contains_key(address)
    }

    pub fn delegatee_of(&self, address: &Address) -> Option<Address> {
        self.delegations.get(address).cloned()
    }

    pub fn delegators_of(&self, delegatee: &Address) -> Vec<Address> {
        self.delegations
            .iter()
            .filter(|(_, e)| *e == delegatee)
            .map(|(d, _)| *d)
            .collect()
    }

    pub fn delegations(&self) -> &IndexMap<Address, Address> {
        &self.delegations
    }

    /// Voters who commit and vote for themselves
    pub fn direct_voters(&self) -> Vec<Address> {
        self.voters
            .keys()
            .filter(|a| !self.is_delegator(a))
            .cloned()
            .collect()
    }

    /// Delegated slots grouped by the delegatee that serves them
    pub fn delegated_groups(&self) -> IndexMap<Address, Vec<Address>> {
        let mut groups: IndexMap<Address, Vec<Address>> = IndexMap::new();
        for (delegator, delegatee) in self.delegations.iter() {
            groups.entry(*delegatee).or_default().push(*delegator);
        }
        groups
    }

    pub fn branch_for(&self, address: &Address) -> Branch {
        branch_for(&self.no_votes, address)
    }

    pub fn stage_of(&self, address: &Address) -> Result<VoterStage> {
        Ok(self.get(address)?.stage())
    }

    pub fn record_registration(
        &self,
        address: &Address,
        x_g: curve25519_dalek::ristretto::RistrettoPoint,
        proof: KnowledgeProof,
    ) -> Result<()> {
        self.get(address)?.record_registration(x_g, proof)
    }

    pub fn record_commitment(&self, address: &Address, commitment: Commitment) -> Result<()> {
        self.get(address)?.record_commitment(commitment)
    }

    pub fn record_vote_cast(&self, address: &Address) -> Result<()> {
        self.get(address)?.record_vote_cast()
    }

    /// Zero every voter's secrets
    pub fn erase_secrets(&self) {
        for voter in self.voters.values() {
            voter
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .erase_secrets();
        }
    }

    /// Number of voters at or beyond `stage`
    pub fn count_at_least(&self, stage: VoterStage) -> usize {
        self.voters
            .values()
            .filter(|v| v.lock().unwrap_or_else(PoisonError::into_inner).stage() >= stage)
            .count()
    }
}

fn branch_for(no_votes: &IndexSet<Address>, address: &Address) -> Branch {
    if no_votes.contains(address) {
        Branch::No
    } else {
        Branch::Yes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses(n: usize) -> Vec<Address> {
        (0..n).map(|_| Credential::generate().address()).collect()
    }

    #[test]
    fn seed_registry() {
        let a = addresses(5);
        let mut delegations = IndexMap::new();
        delegations.insert(a[3], a[4]);
        let mut no_votes = IndexSet::new();
        no_votes.insert(a[2]);

        let registry = VoterRegistry::seed(a.clone(), delegations, no_votes).unwrap();
        assert_eq!(registry.len(), 5);
        assert!(registry.is_delegator(&a[3]));
        assert!(!registry.is_delegator(&a[4]));
        assert_eq!(registry.delegatee_of(&a[3]), Some(a[4]));
        assert_eq!(registry.delegators_of(&a[4]), vec![a[3]]);
        assert_eq!(registry.direct_voters(), vec![a[0], a[1], a[2], a[4]]);

        assert_eq!(registry.branch_for(&a[2]), Branch::No);
        assert_eq!(registry.branch_for(&a[0]), Branch::Yes);
        assert_eq!(registry.get(&a[2]).unwrap().branch(), Branch::No);
        assert_eq!(registry.stage_of(&a[0]).unwrap(), VoterStage::Seeded);
    }

    #[test]
    fn seed_rejects_duplicate_delegatee() {
        let a = addresses(5);
        let mut delegations = IndexMap::new();
        delegations.insert(a[0], a[2]);
        delegations.insert(a[1], a[2]);

        assert!(matches!(
            VoterRegistry::seed(a, delegations, IndexSet::new()),
            Err(ConfigError::DelegateeAlreadyTaken(_))
        ));
    }

    #[test]
    fn seed_rejects_strangers() {
        let a = addresses(4);
        let stranger = Credential::generate().address();

        let mut no_votes = IndexSet::new();
        no_votes.insert(stranger);
        assert!(matches!(
            VoterRegistry::seed(a.clone(), IndexMap::new(), no_votes),
            Err(ConfigError::NotInRoster(_))
        ));

        let mut delegations = IndexMap::new();
        delegations.insert(a[0], stranger);
        assert!(matches!(
            VoterRegistry::seed(a, delegations, IndexSet::new()),
            Err(ConfigError::NotInRoster(_))
        ));
    }

    #[test]
    fn admin_and_charity_excluded() {
        let mut keys = KeyStore::default();
        let mut a = vec![];
        for _ in 0..5 {
            let c = Credential::generate();
            a.push(c.address());
            keys.insert(c);
        }
        let text = format!("{}\n{}\n10\n", a[0], a[1]);
        let config = ElectionConfig::parse(&text, &keys).unwrap();

        let registry = VoterRegistry::from_config(&config, &keys).unwrap();
        assert!(!registry.contains(&a[0]));
        assert!(!registry.contains(&a[1]));
        assert_eq!(registry.addresses(), a[2..].to_vec());
    }

    #[test]
    fn second_registration_rejected() {
        let a = addresses(3);
        let registry = VoterRegistry::seed(a.clone(), IndexMap::new(), IndexSet::new()).unwrap();

        let secrets = registry.get(&a[0]).unwrap().fresh_secrets().unwrap();
        let x_g = public_point(&secrets.x);
        let proof = schnorr_prove(&secrets.x, &secrets.v, &x_g).unwrap();
        registry
            .record_registration(&a[0], x_g, proof.clone())
            .unwrap();

        assert!(matches!(
            registry.record_registration(&a[0], x_g, proof),
            Err(Error::AlreadyRegistered(_))
        ));
        assert_eq!(registry.get(&a[0]).unwrap().x_g().unwrap(), x_g);
        assert_eq!(registry.count_at_least(VoterStage::Registered), 1);
    }
}
