use crate::*;
use indexmap::{IndexMap, IndexSet};
use std::env::var;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Fewest registered voters for which the self-tally keeps ballots private
pub const MIN_VOTERS: usize = 3;

/// Election parameters, loaded once and immutable for the rest of the run.
///
/// The file format is five lines:
///
/// ```text
/// <admin address>
/// <charity address>
/// <phase gap in seconds>
/// <delegator>:<delegatee>,<delegator>:<delegatee>,...
/// <no-vote address>,<no-vote address>,...
/// ```
///
/// The last two lines may be blank or missing.
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    pub admin: Address,

    /// Receives forfeited deposits
    pub charity: Address,

    /// Spacing between consecutive ledger deadlines
    pub phase_gap: Duration,

    /// delegator -> delegatee
    pub delegations: IndexMap<Address, Address>,

    /// Voters whose proofs encode "no"
    pub no_votes: IndexSet<Address>,
}

impl ElectionConfig {
    pub fn from_file<P: AsRef<Path>>(path: P, keys: &KeyStore) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        ElectionConfig::parse(&contents, keys)
    }

    /// Parse and validate a config against the accounts in the key store
    pub fn parse(contents: &str, keys: &KeyStore) -> Result<Self, ConfigError> {
        let mut lines = contents.lines().map(str::trim);

        let admin = lines.next().filter(|l| !l.is_empty());
        let admin = Address::from_str(admin.ok_or(ConfigError::MissingLine("admin"))?)?;

        let charity = lines.next().filter(|l| !l.is_empty());
        let charity = Address::from_str(charity.ok_or(ConfigError::MissingLine("charity"))?)?;

        let gap = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or(ConfigError::MissingLine("phase gap"))?;
        let phase_gap = match gap.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => return Err(ConfigError::InvalidPhaseGap(gap.to_owned())),
        };

        let delegations = parse_delegations(lines.next().unwrap_or(""))?;
        let no_votes = parse_address_list(lines.next().unwrap_or(""))?;

        let config = ElectionConfig {
            admin,
            charity,
            phase_gap,
            delegations,
            no_votes,
        };
        config.validate(keys)?;

        Ok(config)
    }

    /// Check every referenced account against the key store
    pub fn validate(&self, keys: &KeyStore) -> Result<(), ConfigError> {
        if !keys.contains(&self.admin) {
            return Err(ConfigError::UnknownAdmin(self.admin));
        }
        if !keys.contains(&self.charity) {
            return Err(ConfigError::UnknownCharity(self.charity));
        }
        if self.admin == self.charity {
            return Err(ConfigError::AdminIsCharity);
        }

        for (delegator, delegatee) in self.delegations.iter() {
            if !keys.contains(delegator) {
                return Err(ConfigError::UnknownDelegator(*delegator));
            }
            if !keys.contains(delegatee) {
                return Err(ConfigError::UnknownDelegatee(*delegatee));
            }
        }
        for address in self.no_votes.iter() {
            if !keys.contains(address) {
                return Err(ConfigError::UnknownNoVoter(*address));
            }
        }

        let reserved = [self.admin, self.charity];
        validate_delegations(&self.delegations, &reserved)?;
        for address in self.no_votes.iter() {
            if reserved.contains(address) {
                return Err(ConfigError::ReservedAddress(*address));
            }
        }

        let roster = self.roster(keys);
        if roster.len() < MIN_VOTERS {
            return Err(ConfigError::TooFewVoters {
                found: roster.len(),
                minimum: MIN_VOTERS,
            });
        }

        Ok(())
    }

    /// Every key store account except admin and charity, in key store order
    pub fn roster(&self, keys: &KeyStore) -> Vec<Address> {
        keys.addresses()
            .filter(|a| **a != self.admin && **a != self.charity)
            .cloned()
            .collect()
    }
}

/// Parse `d1:e1,d2:e2`, rejecting a delegator listed twice
fn parse_delegations(line: &str) -> Result<IndexMap<Address, Address>, ConfigError> {
    let mut delegations = IndexMap::new();
    for entry in line.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let mut parts = entry.split(':');
        let (delegator, delegatee) = match (parts.next(), parts.next(), parts.next()) {
            (Some(delegator), Some(delegatee), None) => (delegator, delegatee),
            _ => return Err(ConfigError::MalformedDelegation(entry.to_owned())),
        };
        let delegator = Address::from_str(delegator)?;
        let delegatee = Address::from_str(delegatee)?;

        if delegations.insert(delegator, delegatee).is_some() {
            return Err(ConfigError::DuplicateDelegator(delegator));
        }
    }
    Ok(delegations)
}

fn parse_address_list(line: &str) -> Result<IndexSet<Address>, ConfigError> {
    line.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(Address::from_str)
        .collect()
}

/// Structural delegation rules.
///
/// A delegatee serves at most one delegator, nobody delegates to themselves,
/// and delegation is single-hop: a delegator is never a delegatee and a
/// delegatee never delegates.
pub fn validate_delegations(
    delegations: &IndexMap<Address, Address>,
    reserved: &[Address],
) -> Result<(), ConfigError> {
    let mut taken = IndexSet::new();
    for (delegator, delegatee) in delegations.iter() {
        if delegator == delegatee {
            return Err(ConfigError::SelfDelegation(*delegator));
        }
        if reserved.contains(delegator) {
            return Err(ConfigError::ReservedAddress(*delegator));
        }
        if reserved.contains(delegatee) {
            return Err(ConfigError::ReservedAddress(*delegatee));
        }
        if !taken.insert(*delegatee) {
            return Err(ConfigError::DelegateeAlreadyTaken(*delegatee));
        }
        if delegations.contains_key(delegatee) {
            return Err(ConfigError::DelegateeIsDelegator(*delegatee));
        }
    }
    Ok(())
}

/// Operational settings for a run
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Question text posted with `beginSignUp`
    pub question: String,

    /// Deposit each voter must attach to `register`
    pub deposit: u64,

    /// Width of the per-voter worker pool
    pub workers: usize,

    /// Fresh-randomness attempts for a proof before giving up on a voter
    pub proof_attempts: u32,

    pub retry: RetryPolicy,

    /// Slack added after a ledger deadline before acting on it
    pub deadline_buffer: Duration,

    /// Longest single sleep while waiting for a deadline
    pub poll_interval: Duration,

    /// Append audit entries to this file
    pub audit_log: Option<PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        RunSettings {
            question: "Do you agree?".to_owned(),
            deposit: 5_000_000_000_000_000_000,
            workers: 8,
            proof_attempts: 3,
            retry: RetryPolicy::default(),
            deadline_buffer: Duration::from_secs(1),
            poll_interval: Duration::from_secs(5),
            audit_log: None,
        }
    }
}

impl RunSettings {
    /// Defaults overridden by `OPENVOTE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = RunSettings::default();

        if let Ok(val) = var("OPENVOTE_QUESTION") {
            settings.question = val;
        }
        if let Some(val) = parse_env::<u64>("OPENVOTE_DEPOSIT")? {
            settings.deposit = val;
        }
        if let Some(val) = parse_env::<usize>("OPENVOTE_WORKERS")? {
            if val == 0 {
                return Err(ConfigError::InvalidSetting {
                    name: "OPENVOTE_WORKERS",
                    value: val.to_string(),
                });
            }
            settings.workers = val;
        }
        if let Some(val) = parse_env::<u32>("OPENVOTE_PROOF_ATTEMPTS")? {
            settings.proof_attempts = val.max(1);
        }
        if let Some(val) = parse_env::<u32>("OPENVOTE_RETRY_ATTEMPTS")? {
            settings.retry.max_attempts = val.max(1);
        }
        if let Some(val) = parse_env::<u64>("OPENVOTE_RETRY_BACKOFF_MS")? {
            settings.retry.initial_backoff = Duration::from_millis(val);
        }
        if let Some(val) = parse_env::<u64>("OPENVOTE_DEADLINE_BUFFER_MS")? {
            settings.deadline_buffer = Duration::from_millis(val);
        }
        if let Some(val) = parse_env::<u64>("OPENVOTE_POLL_INTERVAL_MS")? {
            settings.poll_interval = Duration::from_millis(val.max(1));
        }
        if let Ok(val) = var("OPENVOTE_AUDIT_LOG") {
            settings.audit_log = Some(PathBuf::from(val));
        }

        Ok(settings)
    }
}

fn parse_env<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match var(name) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidSetting { name, value: val }),
        Err(_e) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(n: usize) -> (KeyStore, Vec<Address>) {
        let mut keys = KeyStore::default();
        let mut addresses = vec![];
        for _ in 0..n {
            let credential = Credential::generate();
            addresses.push(credential.address());
            keys.insert(credential);
        }
        (keys, addresses)
    }

    #[test]
    fn parse_config() {
        let (keys, a) = store(7);
        let text = format!(
            "{}\n{}\n30\n{}:{}\n{}, {}\n",
            a[0], a[1], a[2], a[3], a[4], a[5]
        );
        let config = ElectionConfig::parse(&text, &keys).unwrap();

        assert_eq!(config.admin, a[0]);
        assert_eq!(config.charity, a[1]);
        assert_eq!(config.phase_gap, Duration::from_secs(30));
        assert_eq!(config.delegations.get(&a[2]), Some(&a[3]));
        assert!(config.no_votes.contains(&a[4]));
        assert!(config.no_votes.contains(&a[5]));

        // Admin and charity never vote
        let roster = config.roster(&keys);
        assert_eq!(roster, a[2..].to_vec());
    }

    #[test]
    fn optional_lines() {
        let (keys, a) = store(5);
        let text = format!("{}\n{}\n10", a[0], a[1]);
        let config = ElectionConfig::parse(&text, &keys).unwrap();
        assert!(config.delegations.is_empty());
        assert!(config.no_votes.is_empty());
    }

    #[test]
    fn bad_configs() {
        let (keys, a) = store(7);
        let stranger = Credential::generate().address();

        let parse = |text: String| ElectionConfig::parse(&text, &keys);

        assert!(matches!(
            parse(format!("{}\n", a[0])),
            Err(ConfigError::MissingLine("charity"))
        ));
        assert!(matches!(
            parse(format!("{}\n{}\nsoon\n", a[0], a[1])),
            Err(ConfigError::InvalidPhaseGap(_))
        ));
        assert!(matches!(
            parse(format!("{}\n{}\n10\n", stranger, a[1])),
            Err(ConfigError::UnknownAdmin(_))
        ));
        assert!(matches!(
            parse(format!("{}\n{}\n10\n", a[0], a[0])),
            Err(ConfigError::AdminIsCharity)
        ));
        assert!(matches!(
            parse(format!("{}\n{}\n10\n{}:{}\n", a[0], a[1], a[2], stranger)),
            Err(ConfigError::UnknownDelegatee(_))
        ));
        assert!(matches!(
            parse(format!("{}\n{}\n10\n{}-{}\n", a[0], a[1], a[2], a[3])),
            Err(ConfigError::MalformedDelegation(_))
        ));
        assert!(matches!(
            parse(format!("{}\n{}\n10\n{}:{}\n", a[0], a[1], a[2], a[0])),
            Err(ConfigError::ReservedAddress(_))
        ));
        assert!(matches!(
            parse(format!("{}\n{}\n10\n\n{}\n", a[0], a[1], stranger)),
            Err(ConfigError::UnknownNoVoter(_))
        ));
    }

    #[test]
    fn delegation_rules() {
        let (keys, a) = store(8);
        let parse = |line: String| {
            ElectionConfig::parse(&format!("{}\n{}\n10\n{}\n", a[0], a[1], line), &keys)
        };

        // A delegatee can only serve one delegator
        assert!(matches!(
            parse(format!("{}:{},{}:{}", a[2], a[4], a[3], a[4])),
            Err(ConfigError::DelegateeAlreadyTaken(addr)) if addr == a[4]
        ));

        assert!(matches!(
            parse(format!("{}:{}", a[2], a[2])),
            Err(ConfigError::SelfDelegation(_))
        ));

        assert!(matches!(
            parse(format!("{}:{},{}:{}", a[2], a[3], a[2], a[4])),
            Err(ConfigError::DuplicateDelegator(_))
        ));

        // No chains in either order
        assert!(matches!(
            parse(format!("{}:{},{}:{}", a[2], a[3], a[3], a[4])),
            Err(ConfigError::DelegateeIsDelegator(addr)) if addr == a[3]
        ));
        assert!(matches!(
            parse(format!("{}:{},{}:{}", a[3], a[4], a[2], a[3])),
            Err(ConfigError::DelegateeIsDelegator(addr)) if addr == a[3]
        ));

        assert!(parse(format!("{}:{},{}:{}", a[2], a[3], a[4], a[5])).is_ok());
    }

    #[test]
    fn too_few_voters() {
        let (keys, a) = store(4);
        let text = format!("{}\n{}\n10\n", a[0], a[1]);
        assert!(matches!(
            ElectionConfig::parse(&text, &keys),
            Err(ConfigError::TooFewVoters {
                found: 2,
                minimum: 3
            })
        ));
    }
}
