mod error;
mod time;

pub use error::{ErrorCode, KesError, Result};
pub use time::now_utc;
