//! Matrix client-server adapter.
//!
//! `MatrixClient` speaks the v3 HTTP API and implements the core `Transport`
//! port. `SyncLoop` long-polls `/sync` and feeds decoded events to the
//! `EventRouter`. With the `e2ee` feature `OlmCrypto` handles encrypted
//! rooms; without it `DisabledCrypto` refuses them.

pub mod client;
pub mod crypto;
#[cfg(feature = "e2ee")]
pub mod olm;
pub mod sync;
pub mod types;

pub use client::MatrixClient;
pub use crypto::{DisabledCrypto, SyncCrypto};
#[cfg(feature = "e2ee")]
pub use olm::OlmCrypto;
pub use sync::{SyncLoop, sync_events};
