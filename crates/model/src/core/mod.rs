pub mod utils;
pub mod value;
