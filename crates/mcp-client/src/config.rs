//! Provider configuration types, re-exported from `mb-domain`.
//!
//! The canonical definitions live in `mb_domain::config` so that config
//! loading does not depend on the full client crate.

pub use mb_domain::config::{BridgeConfig, ProviderConfig, TransportKind};
