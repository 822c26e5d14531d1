//! Credentials subsystem: password hashing and strength scoring, access
//! token issuance/validation, and refresh token generation.

pub mod password;
pub mod tokens;

pub use password::{
    generate_password, hash_password, score_password, validate_password_length,
    verify_password,
};
pub use tokens::{AccessClaims, TokenService};
