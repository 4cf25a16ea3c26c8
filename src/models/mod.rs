pub mod api_response;
pub mod bid;
pub mod dispute;
pub mod errors;
pub mod events;
pub mod listing;
pub mod payment;
pub mod user;

pub use api_response::*;
pub use bid::*;
pub use dispute::*;
pub use errors::*;
pub use events::*;
pub use listing::*;
pub use payment::*;
pub use user::*;
