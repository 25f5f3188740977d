pub mod search;
pub mod tracking;
