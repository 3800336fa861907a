mod claims;
pub(crate) mod extractors;
pub mod jwt;
pub mod policy;

pub(crate) use extractors::{enforce_policy, AuthAccount, CurrentAccount};
pub(crate) use jwt::SessionKeys;
