pub mod duplicate;
pub mod exif;
pub mod hash;
pub mod probe;
pub mod scanner;
pub mod sync;
