pub mod dispatcher;
pub mod hub;

pub use dispatcher::NotificationDispatcher;
pub use hub::NotificationHub;
