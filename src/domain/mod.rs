pub mod id;
pub mod money;
pub mod transaction;
pub mod subscription;
pub mod earning;
pub mod order;
pub mod catalog;
pub mod settings;

pub use id::*;
pub use money::*;
pub use transaction::*;
pub use subscription::*;
pub use earning::*;
pub use order::*;
pub use catalog::*;
pub use settings::*;
