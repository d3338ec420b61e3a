pub mod auth;
pub mod challenges;
pub mod mfa;
pub mod sessions;
pub mod users;
