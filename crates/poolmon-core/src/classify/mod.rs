//! Record classifiers.
//!
//! Each classifier consumes one raw [`crate::AttrRecord`] and applies its
//! numeric contributions to a [`crate::CounterSet`]. A record missing a
//! required field is classified as "unknown", never silently dropped.

pub mod instances;
pub mod jobs;
pub mod priorities;
pub mod slots;
pub mod status;
