//! Authorization core: scoped credentials, consent, delegation
//!
//! Credentials are short-lived and narrowly scoped; delegation between agents
//! is backed by recorded human consent. Nothing here performs network I/O
//! except consent storage.

pub mod consent;
pub mod delegation;
pub mod identity;
pub mod scope;
pub mod token;

pub use consent::{ConsentManager, ConsentPolicy, ConsentRecord, ConsentStatus};
pub use delegation::{DelegationChain, DelegationValidator, ValidatedCredential};
pub use identity::IdentityClient;
pub use scope::ScopeSet;
pub use token::{AccessCredential, Claims, TokenService};
