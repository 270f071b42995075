//! Object types and traits
//!
//! - `object`: `Packable`/`Unpackable`/`Object` traits and the
//!   type-erased `ObjectBox`
//! - `object_id`: 20-byte SHA-1 object names
//! - `object_type`: the four first-class type tags
//! - `blob`, `commit`, `tag`, `tree`: the concrete object kinds

pub mod blob;
pub mod commit;
pub mod object;
pub mod object_id;
pub mod object_type;
pub mod tag;
pub mod tree;
