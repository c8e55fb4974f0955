pub mod cancel;
pub mod config;
pub mod describe;
pub mod enrich;
pub mod location;
pub mod media;
pub mod server;
