//! Admin identity: token verification and authorization.
//!
//! # Data Flow
//! ```text
//! Authorization header ──▶ TokenAuthenticator::verify ──▶ TokenClaims
//!                                                            │
//!                        IdentityStore ◀── find_by_id ───────┤
//!                                                            ▼
//!                                   IdentityResolver::authorize ──▶ ResolvedIdentity
//! ```

pub mod model;
pub mod resolver;
pub mod token;

pub use model::{AdminId, AdminIdentity, AdminRole, ResolvedIdentity};
pub use resolver::IdentityResolver;
pub use token::{bearer_token, ClaimedRole, TokenAuthenticator, TokenClaims, TokenGrant};
