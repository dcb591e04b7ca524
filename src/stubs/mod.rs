pub mod channel;
pub mod launcher;
pub mod process;
