pub mod contact;
pub mod email;
pub mod enums;
pub mod job;
pub mod template;
pub mod trade_map;

pub use contact::*;
pub use email::*;
pub use enums::*;
pub use job::*;
pub use template::*;
pub use trade_map::*;
