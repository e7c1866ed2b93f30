//! Outbound adapters implementing the domain's ports against real
//! infrastructure (SQLite persistence, HTTP collaborators).

pub mod http;
pub mod sqlite;
