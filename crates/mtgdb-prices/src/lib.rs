//! mtgdb price engine.
//!
//! An independent daily ETL: fetch prices from five providers, land them in
//! a date-partitioned columnar archive, synchronize the shared object-store
//! copy, prune the rolling local window, and stream the nested snapshot
//! without holding it in memory.

pub mod archive;
pub mod builder;
pub mod context;
pub mod providers;
pub mod s3;
pub mod schema;
pub mod writers;

pub use builder::PriceBuilder;
pub use schema::PriceRow;
