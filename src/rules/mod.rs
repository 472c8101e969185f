//! Store-independent business rules. Services load rows, ask these modules
//! what is allowed, then persist the outcome with conditional updates.

pub mod earnings;
pub mod location_check;
pub mod matching;
pub mod trip_flow;
