pub mod broadsheet;
pub mod core;
pub mod roster;
pub mod scores;
pub mod summaries;
