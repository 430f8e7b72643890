//! MSC Resolver: answers proposal mentions in chat rooms with links.

pub mod bot;
pub mod channels;
pub mod config;
pub mod error;
pub mod markdown;
pub mod proposals;
