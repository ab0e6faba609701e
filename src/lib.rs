#![doc = include_str!("../README.md")]

pub use cell::AtomicCell;
pub use value::AtomicValue;
pub use value::Value;

pub(crate) mod cell;
pub(crate) mod value;

/// Deferred reclamation of replaced values.
pub(crate) mod hyaline;
pub(crate) mod statics;

pub(crate) mod utils {
    pub(crate) mod slot_list;
}
