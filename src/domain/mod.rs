pub mod region;
pub mod types;

pub use region::{DistrictProfile, StateProfile};
pub use types::*;
