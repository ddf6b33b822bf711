//! Authentication layer: session minting and validation, plus the
//! probe-to-identity orchestration that turns a biometric sample into a
//! session. Keep the public surface thin and split implementation across
//! sub-modules.

mod provider;
mod session;

pub use provider::Authenticator;
pub use session::{Session, SessionManager, SessionToken};
