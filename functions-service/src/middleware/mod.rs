pub mod caller;

pub use caller::{CallerClaims, CallerIdentity, CallerVerifier};
