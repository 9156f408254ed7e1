pub mod channel;
pub mod domain;
pub mod error;
pub mod protocol;
