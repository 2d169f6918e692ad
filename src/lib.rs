#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! Lockstripe is a concurrent hash map for Rust. It divides its entries between
//! independently locked stripes, so that writers to different stripes never
//! wait for each other, while readers never wait at all.
//!
//! # Features
//!
//! - Lock-free lookups: `get` and `contains_key` never block, even while the
//!   stripe they read from is being resized.
//! - Tunable write concurrency: the number of stripes is chosen from the
//!   expected number of concurrent writers and each stripe has its own lock.
//! - Lazily created stripes: a map with many stripes only allocates the ones
//!   that keys are inserted into.
//! - Whole-map queries such as `len` and `contains_value` that return a
//!   consistent answer without a map-wide lock in the common case.
//! - Weakly consistent iterators that tolerate concurrent writes.
//!
//! # Example
//!
//! ```rust
//! use lockstripe::HashMapBuilder;
//!
//! use std::{sync::Arc, thread};
//!
//! let map = Arc::new(
//!     HashMapBuilder::new()
//!         .concurrency_level(4)
//!         .build()
//!         .expect("valid configuration"),
//! );
//!
//! let writers: Vec<_> = ('a'..='z')
//!     .collect::<Vec<_>>()
//!     .chunks(7)
//!     .map(|letters| {
//!         let map = Arc::clone(&map);
//!         let letters = letters.to_vec();
//!         thread::spawn(move || {
//!             for c in letters {
//!                 map.insert(c, c.to_ascii_uppercase());
//!             }
//!         })
//!     })
//!     .collect();
//!
//! for w in writers {
//!     w.join().unwrap();
//! }
//!
//! assert_eq!(map.len(), 26);
//! assert_eq!(map.get(&'q'), Some('Q'));
//!
//! // Only one of racing `insert_if_absent` calls wins.
//! assert_eq!(map.insert_if_absent('q', '?'), Some('Q'));
//! ```
//!
//! # Logging
//!
//! With the `logging` feature enabled, the map emits records through the
//! [`log`](https://docs.rs/log) crate when it creates or resizes a stripe, and
//! when a whole-map query has to lock every stripe.
//!
//! # Minimum Supported Rust Versions
//!
//! This crate's minimum supported Rust version (MSRV) is 1.65.

pub(crate) mod builder;
pub(crate) mod common;
pub(crate) mod striped;

pub use builder::HashMapBuilder;
pub use common::error::Error;
pub use striped::{DefaultHashBuilder, HashMap, Iter, Keys, Values};

#[cfg(test)]
mod tests {
    #[test]
    fn map_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}

        assert_send_sync::<crate::HashMap<String, Vec<u8>>>();
        assert_send_sync::<crate::HashMapBuilder<String, Vec<u8>>>();
    }
}
