pub mod memory;
pub mod rest;
pub mod traits;
pub mod types;

pub use memory::MemoryGateway;
pub use rest::RestGateway;
pub use traits::{Gateway, INCREMENT_LEADS_FN, INCREMENT_LIKES_FN};
pub use types::{from_row, from_rows, to_row, AuthSession, Filter, Query, Row, Subscription, Table};
