pub mod disease;
pub mod enums;
pub mod scan;

pub use disease::*;
pub use enums::*;
pub use scan::*;
