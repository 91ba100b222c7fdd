//! Memcached ASCII protocol codec (component C4): incremental request
//! parser, response composer, and the doubling buffer they share.

mod admin;
mod buffer;
mod compose;
mod parser;
mod request;
mod response;

pub use admin::{is_admin_request, ADMIN_VERBS};
pub use buffer::{BufferOversized, DoublingBuffer};
pub use compose::compose;
pub use parser::{ParseOutcome, Parser};
pub use request::{Request, StoreVerb};
pub use response::{Response, ValueLine};
