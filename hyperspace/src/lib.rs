#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
pub(crate) mod utils;

pub mod bridge;
pub mod config;
pub mod location;
pub mod mac;
pub mod phy;
pub mod route;
pub mod sync;
pub mod time;
pub mod upper;

pub use hyperspace_frame as frame;
