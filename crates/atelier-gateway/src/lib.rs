pub mod connection;
pub mod dispatcher;
pub mod presence;
pub mod room;
pub mod service;
