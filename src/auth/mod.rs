//! Bearer-token primitives. Verification is attached to the user routes only
//! when `AUTH_REQUIRED` is set.

pub mod claims;
pub mod extractors;
pub mod jwt;

pub use extractors::require_bearer;
