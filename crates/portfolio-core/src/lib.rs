pub mod calendar;
pub mod error;
pub mod payload;
pub mod request;
pub mod traits;
pub mod types;

pub use error::*;
pub use payload::*;
pub use request::*;
pub use traits::*;
pub use types::*;
