pub mod executor;
pub mod repository;
pub mod sender;

pub use executor::*;
pub use repository::*;
pub use sender::*;
