//! Columnar storage: datatypes, scalars, and typed arrays.

pub mod array;
pub mod bitmap;
pub mod buffer;
pub mod categorical;
pub mod datatype;
pub mod native;
pub mod object;
pub mod scalar;
pub mod schema;
