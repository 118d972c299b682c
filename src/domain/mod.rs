pub mod devices;
pub mod forecast;
pub mod household;
pub mod plan;
pub mod time;

pub use devices::*;
pub use forecast::*;
pub use household::*;
pub use plan::*;
pub use time::*;
