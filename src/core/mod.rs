// ─── Geode Index Core ───
// Client SDK for the Geode mod index.
//
// Architecture:
//   core/
//     error/       — IndexError and server message classification
//     config/      — Base URL, timeout and data directory
//     http/        — Shared reqwest client
//     repository/  — One call per index endpoint (IndexRepository)
//     models/      — Payloads, cached entities and their managers
//     cache/       — Lock helpers and in-flight lookup de-duplication
//     session/     — Login flow, current user, observable state
//     store/       — Persisted token and login attempt

pub(crate) mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod repository;
pub mod session;
pub mod store;
