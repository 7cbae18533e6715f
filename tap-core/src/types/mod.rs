//! Domain types

pub mod account;
pub mod booster;
pub mod progress;
pub mod ranking;
pub mod referral;

pub use account::*;
pub use booster::*;
pub use progress::*;
pub use ranking::*;
pub use referral::*;
