pub mod dropnull;
pub mod impute;

pub use dropnull::*;
pub use impute::*;
