//! Bearer token models shared by the store, the adapter, and the refresh coordinator.

mod grant;
mod secret;
mod token;

pub use grant::*;
pub use secret::*;
pub use token::*;
