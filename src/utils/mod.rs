pub use bytes_pool::BytesPool;
pub use multi_error::MultiError;

mod bytes_pool;
mod multi_error;
