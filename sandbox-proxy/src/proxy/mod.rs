pub mod http_connect;
pub mod server;

pub use server::{ProxyServer, ProxyServerConfig};
