pub mod channel;
pub mod ssh;
