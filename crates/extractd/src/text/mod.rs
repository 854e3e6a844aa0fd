//! Text post-processing applied while a document streams out.

pub mod dehyphenate;
pub mod tee;

pub use dehyphenate::{Dehyphenator, Outcome, dehyphenate};
pub use tee::TeeWriter;
