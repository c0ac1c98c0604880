//! Storage seams implemented by `amora_storage` and by test doubles.

mod traits;

pub use traits::*;
