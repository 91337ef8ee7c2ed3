pub mod backup;
pub mod logging;
pub mod server;
