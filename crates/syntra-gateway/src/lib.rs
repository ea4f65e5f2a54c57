//! Live event gateway: report and feedback changes pushed to connected
//! clients over WebSocket.

pub mod connection;
pub mod dispatcher;

pub use dispatcher::Dispatcher;
