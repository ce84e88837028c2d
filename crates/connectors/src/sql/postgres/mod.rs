pub mod classify;
pub mod options;
pub mod params;
pub mod session;
pub mod utils;
