//! Error taxonomy for the clinic core.
//!
//! Four families matter to callers: validation errors (reported inline, the
//! request is otherwise unaffected), authorization errors (hard fail, no
//! partial effect), integrity errors (duplicate unique identifiers, rolled
//! back and reported as a user-facing message), and storage errors (rolled
//! back, surfaced generically, logged server-side). The two redirect signals
//! are modelled as errors too so route guards can return them through `?`.

#[derive(Debug, thiserror::Error)]
pub enum ClinicError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Role/clinic scope violation. Always a hard failure, never an empty
    /// success.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Physician has no current clinic; clinic-scoped screens must send the
    /// caller to clinic selection rather than a 403 or an empty list.
    #[error("no clinic selected")]
    NeedsClinicSelection,

    /// Account exists but the role is still `pending`.
    #[error("account awaiting approval")]
    AwaitingApproval,

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("a patient with national ID {0} is already registered")]
    DuplicateNationalId(String),

    #[error("username {0} is already taken")]
    DuplicateUsername(String),

    #[error("email {0} is already registered")]
    DuplicateEmail(String),

    #[error("verification code is invalid or has expired")]
    CodeInvalid,

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("failed to hash password: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error(transparent)]
    Parse(#[from] clinica_types::ParseError),
}

pub type ClinicResult<T> = std::result::Result<T, ClinicError>;
