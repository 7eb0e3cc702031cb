use crate::*;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors found while loading the key store and election configuration.
///
/// All of these are fatal and are raised before any ledger interaction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("openvote config: unable to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("openvote config: malformed key store: {0}")]
    KeyStoreJson(#[from] serde_json::Error),

    #[error("openvote config: invalid address {0:?}")]
    InvalidAddress(String),

    #[error("openvote config: invalid private key for {0}")]
    InvalidPrivateKey(Address),

    #[error("openvote config: private key for {0} belongs to a different address")]
    AddressKeyMismatch(Address),

    #[error("openvote config: key store lists {addresses} addresses but {keys} private keys")]
    KeyCountMismatch { addresses: usize, keys: usize },

    #[error("openvote config: no private key for {0}")]
    MissingPrivateKey(Address),

    #[error("openvote config: missing {0} line")]
    MissingLine(&'static str),

    #[error("openvote config: invalid phase gap {0:?}")]
    InvalidPhaseGap(String),

    #[error("openvote config: specified admin {0} not in key store")]
    UnknownAdmin(Address),

    #[error("openvote config: specified charity {0} not in key store")]
    UnknownCharity(Address),

    #[error("openvote config: admin and charity must be different accounts")]
    AdminIsCharity,

    #[error("openvote config: delegator {0} not in key store")]
    UnknownDelegator(Address),

    #[error("openvote config: delegatee {0} not in key store")]
    UnknownDelegatee(Address),

    #[error("openvote config: no-vote address {0} not in key store")]
    UnknownNoVoter(Address),

    #[error("openvote config: malformed delegation entry {0:?}")]
    MalformedDelegation(String),

    #[error("openvote config: {0} cannot delegate to themselves")]
    SelfDelegation(Address),

    #[error("openvote config: delegator {0} is listed more than once")]
    DuplicateDelegator(Address),

    #[error("openvote config: {0} is already a delegatee, can't delegate to them again")]
    DelegateeAlreadyTaken(Address),

    #[error("openvote config: {0} already delegated their vote, can't delegate to them")]
    DelegateeIsDelegator(Address),

    #[error("openvote config: {0} is the admin or charity and cannot take part in voting")]
    ReservedAddress(Address),

    #[error("openvote config: {0} is not in the voter roster")]
    NotInRoster(Address),

    #[error("openvote config: need at least {minimum} voters, found {found}")]
    TooFewVoters { found: usize, minimum: usize },

    #[error("openvote config: invalid setting {name}={value:?}")]
    InvalidSetting { name: &'static str, value: String },
}

/// Runtime errors raised by the orchestrator and its workflows.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("openvote: ledger unreachable during {operation}: {cause}")]
    Connectivity {
        operation: &'static str,
        cause: String,
    },

    #[error("openvote: {operation} proof failed for {address} after {attempts} attempt(s): {cause}")]
    Proof {
        operation: &'static str,
        address: Address,
        attempts: u32,
        cause: String,
    },

    #[error("openvote: ledger rejected phase transition {from} -> {to}: {reason}")]
    PhaseRejected {
        from: Phase,
        to: Phase,
        reason: String,
    },

    #[error("openvote: ledger rejected registration of {address}: {reason}")]
    RegistrationRejected { address: Address, reason: String },

    #[error("openvote: vote opening for {address} (signed by {signer}) does not match commitment: {reason}")]
    OpeningMismatch {
        address: Address,
        signer: Address,
        reason: String,
    },

    #[error("openvote: reconstructed key for {address} is not on the ledger yet")]
    ReconstructionNotReady { address: Address },

    #[error("openvote: ledger rejected {operation} for {address}: {reason}")]
    TransactionRejected {
        operation: &'static str,
        address: Address,
        reason: String,
    },

    #[error("openvote: ledger rejected {operation}: {reason}")]
    LedgerRejected {
        operation: &'static str,
        reason: String,
    },

    #[error("openvote: {0} is already registered")]
    AlreadyRegistered(Address),

    #[error("openvote: {0} has already committed")]
    AlreadyCommitted(Address),

    #[error("openvote: {0} has already voted")]
    AlreadyVoted(Address),

    #[error("openvote: {0} is not in the voter registry")]
    NotFound(Address),

    #[error("openvote: {address} is {found}, expected {expected}")]
    WrongStage {
        address: Address,
        expected: VoterStage,
        found: VoterStage,
    },

    #[error("openvote: secrets for {0} have been erased")]
    SecretsErased(Address),

    #[error("openvote: invalid {what} encoding")]
    InvalidEncoding { what: &'static str },

    #[error("openvote: election has been aborted")]
    Aborted,

    #[error("openvote: signature error: {0}")]
    SignatureError(#[from] ed25519_dalek::SignatureError),
}

impl Error {
    /// Transient failures may be retried with identical parameters
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Connectivity { .. } | Error::ReconstructionNotReady { .. }
        )
    }

    /// The voter address this failure concerns, if any
    pub fn address(&self) -> Option<Address> {
        match self {
            Error::Proof { address, .. }
            | Error::RegistrationRejected { address, .. }
            | Error::OpeningMismatch { address, .. }
            | Error::ReconstructionNotReady { address }
            | Error::TransactionRejected { address, .. }
            | Error::WrongStage { address, .. } => Some(*address),
            Error::AlreadyRegistered(address)
            | Error::AlreadyCommitted(address)
            | Error::AlreadyVoted(address)
            | Error::NotFound(address)
            | Error::SecretsErased(address) => Some(*address),
            _ => None,
        }
    }

    /// The operation that failed, if the failure came from one
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Error::Connectivity { operation, .. }
            | Error::Proof { operation, .. }
            | Error::TransactionRejected { operation, .. }
            | Error::LedgerRejected { operation, .. } => Some(*operation),
            Error::PhaseRejected { .. } => Some("advanceTo"),
            Error::RegistrationRejected { .. } => Some("register"),
            Error::OpeningMismatch { .. } => Some("submitVote"),
            Error::ReconstructionNotReady { .. } => Some("submitCommitment"),
            _ => None,
        }
    }

    /// Attach a voter address to a ledger failure
    pub(crate) fn from_ledger(err: LedgerError, address: Address) -> Self {
        match err {
            LedgerError::Unavailable { operation, cause } => {
                Error::Connectivity { operation, cause }
            }
            LedgerError::Rejected { operation, reason } => Error::TransactionRejected {
                operation,
                address,
                reason,
            },
        }
    }
}

impl From<LedgerError> for Error {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Unavailable { operation, cause } => {
                Error::Connectivity { operation, cause }
            }
            LedgerError::Rejected { operation, reason } => {
                Error::LedgerRejected { operation, reason }
            }
        }
    }
}
