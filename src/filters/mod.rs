//! Pure views over store collections.

pub mod chat;
pub mod location;
pub mod search;

pub use chat::{conversation, partners};
pub use location::{location_matches, normalize_location};
pub use search::{brokers_by_status, search_properties, PropertySearch, SearchBy};
