pub mod changes;
pub mod directory;
pub mod schedule;
pub mod status;
pub mod sync;
