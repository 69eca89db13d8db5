pub mod error;
pub mod session;

pub use error::ModelError;
pub use session::Session;
