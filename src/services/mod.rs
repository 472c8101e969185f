//! Store-backed operations. Each takes the shared connection and returns
//! plain data; HTTP concerns stay in `handlers`.

pub mod auth;
pub mod drivers;
pub mod passengers;
pub mod trips;
