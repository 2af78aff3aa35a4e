//! rxwatch core domain logic.
//!
//! Everything in this crate is pure: snapshot types, the monitor schema,
//! the diff engine, the cooldown tracker and the message renderer. The
//! collaborator traits ([`source::SnapshotSource`], [`store::StateStore`],
//! [`notify::Notifier`], [`clock::Clock`]) are declared here and implemented
//! by the `db`, `events` and `worker` crates.

pub mod clock;
pub mod cooldown;
pub mod diff;
pub mod error;
pub mod notify;
pub mod render;
pub mod schema;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod types;
