mod forecast;
mod health_check;
mod helpers;
mod subscriptions;

pub use forecast::*;
pub use health_check::*;
pub use helpers::*;
pub use subscriptions::*;
