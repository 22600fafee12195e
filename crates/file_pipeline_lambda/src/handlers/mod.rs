pub mod api;
pub mod dispatch;
pub mod processor;
pub mod response;
