pub mod interner;
pub mod jsonl;
pub mod schema;
pub mod store;

pub use store::ResultStore;
