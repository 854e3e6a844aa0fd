//! Format collaborators that turn a payload into a [`Document`](crate::document::Document).
//!
//! PDF lives in [`crate::pdf`] because of its engine guard; everything else is here.
//! Synchronous loaders are run on blocking tasks by the factory.

pub mod image;
pub mod legacy_word;
pub mod office;
pub mod rtf;
pub mod tool;
