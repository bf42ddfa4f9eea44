mod app;
mod notification;
mod plan;
mod product;
mod profile;
mod purchase;
mod transaction;

pub use app::*;
pub use notification::*;
pub use plan::*;
pub use product::*;
pub use profile::*;
pub use purchase::*;
pub use transaction::*;
