/// Native module contains implementations of core traits
/// on top of the operating system: child processes, signals
/// and the system ssh client.
pub mod launcher;
pub mod process;
pub mod ssh;
