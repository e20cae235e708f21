//! Error types for the DvP atom protocol.

use crate::{Address, Digest, LockAction, LockId, LockStatus};
use thiserror::Error;

/// Main error type for ledger and coordinator operations.
///
/// The `Display` output of each variant is the revert reason reported to
/// callers, so keep messages stable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DvpError {
    /// A proof did not verify against its public inputs.
    #[error("Invalid proof: {0}")]
    ProofInvalid(String),

    /// A consumed input is not currently free.
    #[error("Input already spent or locked: {0}")]
    InputAlreadySpentOrLocked(String),

    /// Lock ID already used on this ledger.
    #[error("Lock ID already in use: {0}")]
    LockIdCollision(LockId),

    /// Lock is not in a state that allows the requested action.
    #[error("Lock {lock_id} is not active (status {status:?})")]
    LockNotActive { lock_id: LockId, status: LockStatus },

    /// Caller is not the registered delegate of the lock.
    #[error("Only the delegate of the lock can {action} it")]
    UnauthorizedDelegate {
        lock_id: LockId,
        caller: Address,
        action: LockAction,
    },

    /// Caller is not the approver of the operation.
    #[error("Only the approver of operation {index} can approve it")]
    UnauthorizedApprover { index: usize, caller: Address },

    /// Atom operations were already registered.
    #[error("Atom already initialized")]
    AlreadyInitialized,

    /// Caller did not deploy the atom it tries to initialize.
    #[error("Only the deployer of the atom can initialize it: {0}")]
    NotDeployer(Address),

    /// Settlement requested before every operation was approved.
    #[error("Not all operations approved: {approved} of {required}")]
    NotFullyApproved { approved: usize, required: usize },

    /// Lock does not exist on this ledger.
    #[error("Lock not found: {0}")]
    LockNotFound(LockId),

    /// Caller does not own the lock.
    #[error("Only the owner of the lock can perform this action")]
    NotLockOwner { lock_id: LockId, caller: Address },

    /// Delegation target differs from the delegate the outcomes were bound to.
    #[error("Delegate mismatch for lock {lock_id}: expected {expected}, got {actual}")]
    DelegateMismatch {
        lock_id: LockId,
        expected: Address,
        actual: Address,
    },

    /// Invalid lock lifecycle transition.
    #[error("Invalid lock transition from {from:?} to {to:?}")]
    InvalidLockTransition {
        lock_id: LockId,
        from: LockStatus,
        to: LockStatus,
    },

    /// Merkle root is not a known ledger root.
    #[error("Unknown Merkle root: {0}")]
    UnknownRoot(Digest),

    /// Output commitment already exists on the ledger.
    #[error("Commitment already exists: {0}")]
    DuplicateCommitment(Digest),

    /// Encrypted input handle or proof rejected.
    #[error("Invalid encrypted input: {0}")]
    InvalidEncryptedInput(String),

    /// Caller is not allowed to mint.
    #[error("Only the minter can mint: {0}")]
    NotMinter(Address),

    /// No ledger registered at the address.
    #[error("Unknown ledger: {0}")]
    UnknownLedger(Address),

    /// No atom deployed at the address.
    #[error("Unknown atom: {0}")]
    UnknownAtom(Address),

    /// Operation index outside the registered operations.
    #[error("Operation index {index} out of range ({len} operations)")]
    OperationIndexOutOfRange { index: usize, len: usize },

    /// Atom has no operations yet.
    #[error("Atom not initialized")]
    NotInitialized,

    /// Atom was cancelled.
    #[error("Atom already cancelled")]
    AtomCancelled,

    /// Atom was settled.
    #[error("Atom already settled")]
    AtomSettled,

    /// Operation list is empty.
    #[error("Atom requires at least one operation")]
    EmptyOperations,

    /// Operation list exceeds the configured limit.
    #[error("Too many operations: {count} exceeds maximum {max}")]
    TooManyOperations { count: usize, max: usize },

    /// Caller is not a participant of the atom.
    #[error("Caller is not a participant of the atom: {0}")]
    NotParticipant(Address),

    /// Predicted address already has an atom.
    #[error("Atom already deployed at {0}")]
    AddressAlreadyDeployed(Address),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Crypto error.
    #[error("Cryptographic error: {0}")]
    Crypto(String),
}

impl DvpError {
    /// Get error code for structured reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            DvpError::ProofInvalid(_) => "PROOF_INVALID",
            DvpError::InputAlreadySpentOrLocked(_) => "INPUT_ALREADY_SPENT_OR_LOCKED",
            DvpError::LockIdCollision(_) => "LOCK_ID_COLLISION",
            DvpError::LockNotActive { .. } => "LOCK_NOT_ACTIVE",
            DvpError::UnauthorizedDelegate { .. } => "UNAUTHORIZED_DELEGATE",
            DvpError::UnauthorizedApprover { .. } => "UNAUTHORIZED_APPROVER",
            DvpError::AlreadyInitialized => "ALREADY_INITIALIZED",
            DvpError::NotDeployer(_) => "NOT_DEPLOYER",
            DvpError::NotFullyApproved { .. } => "NOT_FULLY_APPROVED",
            DvpError::LockNotFound(_) => "LOCK_NOT_FOUND",
            DvpError::NotLockOwner { .. } => "NOT_LOCK_OWNER",
            DvpError::DelegateMismatch { .. } => "DELEGATE_MISMATCH",
            DvpError::InvalidLockTransition { .. } => "INVALID_LOCK_TRANSITION",
            DvpError::UnknownRoot(_) => "UNKNOWN_ROOT",
            DvpError::DuplicateCommitment(_) => "DUPLICATE_COMMITMENT",
            DvpError::InvalidEncryptedInput(_) => "INVALID_ENCRYPTED_INPUT",
            DvpError::NotMinter(_) => "NOT_MINTER",
            DvpError::UnknownLedger(_) => "UNKNOWN_LEDGER",
            DvpError::UnknownAtom(_) => "UNKNOWN_ATOM",
            DvpError::OperationIndexOutOfRange { .. } => "OPERATION_INDEX_OUT_OF_RANGE",
            DvpError::NotInitialized => "NOT_INITIALIZED",
            DvpError::AtomCancelled => "ATOM_CANCELLED",
            DvpError::AtomSettled => "ATOM_SETTLED",
            DvpError::EmptyOperations => "EMPTY_OPERATIONS",
            DvpError::TooManyOperations { .. } => "TOO_MANY_OPERATIONS",
            DvpError::NotParticipant(_) => "NOT_PARTICIPANT",
            DvpError::AddressAlreadyDeployed(_) => "ADDRESS_ALREADY_DEPLOYED",
            DvpError::Configuration(_) => "CONFIGURATION_ERROR",
            DvpError::Crypto(_) => "CRYPTO_ERROR",
        }
    }

    /// Human-readable revert reason.
    pub fn revert_reason(&self) -> String {
        self.to_string()
    }

    /// Revert reason in `Error(string)` ABI encoding.
    pub fn revert_data(&self) -> Vec<u8> {
        crate::revert::encode_error(&self.revert_reason())
    }
}

/// Result type alias for DvP operations.
pub type Result<T> = std::result::Result<T, DvpError>;
