pub mod filesystem;
pub mod in_memory;
pub mod persister;
