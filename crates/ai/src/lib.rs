mod blocking;
mod loader;
mod traits;

pub mod blip_itm;
pub mod itm;

pub use traits::*;
