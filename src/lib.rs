pub mod common;
pub mod configs;
pub mod extract;
pub mod hls;
pub mod resolver;
pub mod rest;
pub mod server;
pub mod transport;
