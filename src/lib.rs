/// Coregate - credential and session lifecycle engine
///
/// Core of a shared-instrument access station: a local identity store with
/// salted credential verification, an append-mostly session event ledger,
/// idle-timeout supervision for open sessions, and an automation flow that
/// on-boards users through an external single-sign-on page.

pub mod config;
pub mod context;
pub mod credential;
pub mod db;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod monitor;
pub mod sso;
