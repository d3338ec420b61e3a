//! # Stadion API
//!
//! User management backend for an athletics federation, built with Axum
//! and PostgreSQL. The engineering core is the authentication and session
//! stack; domain resources consume its identity and role decisions.
//!
//! ## Features
//!
//! - **Authentication**: short-lived access tokens plus server-tracked,
//!   rotating refresh tokens with replay detection
//! - **Two-factor**: TOTP enrollment with QR provisioning and one-shot
//!   backup codes
//! - **Challenge flows**: Redis-backed email verification and password
//!   reset codes with attempt caps
//! - **Role-based access**: admin, coach, representative, intern, athlete
//! - **Rate limiting**: per-endpoint budgets, keyed by address or identity
//!
//! ## Architecture
//!
//! ```text
//! src/
//! ├── config/           # Env-driven configuration (JWT, DB, Redis, SMTP)
//! ├── middleware/       # Auth extractor, role guards, limiter keying
//! ├── modules/          # Feature modules
//! │   ├── auth/        # Sign-in, tokens, password flows
//! │   ├── challenges/  # Redis challenge store
//! │   ├── mfa/         # Second-factor enrollment
//! │   ├── sessions/    # Refresh session store
//! │   └── users/       # Profiles and administration
//! └── utils/            # Errors, envelope, hashing, JWT, email
//! ```
//!
//! Each feature module follows the same structure: `controller.rs` (HTTP
//! handlers), `service.rs` (business logic), `model.rs` (entities and
//! DTOs), `router.rs` (route wiring).
//!
//! ## Token model
//!
//! Access tokens are bearer JWTs with a short TTL and are not tracked
//! server-side; revocation latency is bounded by their lifetime. Refresh
//! tokens are recorded in the `refresh_sessions` table and rotate on every
//! use: the old token is revoked atomically with the new one's insertion,
//! and a replayed refresh revokes every session of the identity.
//!
//! ## Security notes
//!
//! - Passwords are hashed with Argon2id; hashes are self-describing, so
//!   parameter bumps need no migration
//! - Login timing is equalized between unknown emails and wrong passwords
//! - Password reset responses do not reveal whether an email is registered
//! - Admin accounts are created from the command line only

pub mod config;
pub mod docs;
pub mod logging;
pub mod middleware;
pub mod modules;
pub mod router;
pub mod state;
pub mod utils;
pub mod validator;
