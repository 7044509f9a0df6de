mod account;
mod money;
mod principal;
mod transfer;
mod user;

pub use account::*;
pub use money::*;
pub use principal::*;
pub use transfer::*;
pub use user::*;
