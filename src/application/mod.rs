// Application layer: the transfer coordinator and the service the CLI (or any
// other front end) talks to.

mod coordinator;
mod credentials;
pub mod error;
mod service;

pub use coordinator::*;
pub use credentials::*;
pub use error::*;
pub use service::*;
