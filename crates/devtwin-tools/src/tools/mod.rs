pub mod debug;
pub mod finalize;
pub mod lint;
pub mod list_dir;
pub mod notes;
pub mod patch;
pub mod plan;
pub mod read;
pub mod replace;
pub mod search;
pub mod shell;
pub mod write;
