pub mod base;
pub mod cache;
pub mod extraction;
pub mod logging;
pub mod resolver;
pub mod server;
pub mod sources;
pub mod transport;

pub use base::*;
pub use cache::*;
pub use extraction::*;
pub use logging::*;
pub use resolver::*;
pub use server::*;
pub use sources::*;
pub use transport::*;
