//! Shared code for `chrun`: run a command in a throwaway root
//! filesystem, unpacked from an image archive, inside fresh PID, UTS
//! and mount namespaces.

#![cfg(unix)]

mod err;
pub use err::*;

mod subprocess;
pub use subprocess::*;

pub mod bootstrap;
pub mod config;
pub mod image;
pub mod launcher;
pub mod pull;
pub mod rootswitch;
pub mod tmproot;
