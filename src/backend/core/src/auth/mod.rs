//! Authentication: password hashing, token issuance and verification, and
//! the account flows built on them.

pub mod account;
pub mod password;
pub mod token;

pub use account::{AccountService, LoginRequest, RegisterRequest};
pub use password::{CredentialVerifier, HashingError, MIN_PASSWORD_LEN};
pub use token::{Claims, IssuedToken, TokenError, TokenService};
