//! Library crate backing the `resolve`, `fetch`, `minhash` and
//! `lsh-dedup` binaries: a pipeline that turns archive byte ranges into
//! a deduplicated web-text corpus.

pub mod batch;
pub mod corpus;
pub mod dedup_index;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod index;
pub mod lsh;
pub mod minhash;
pub mod pairer;
pub mod rabbitmq;
pub mod telemetry;
pub mod utility;
