mod config;
mod id;
mod probe;
mod range;
mod registry;
mod scanner;
mod server;
mod service;
pub mod session;
pub mod store;
mod supervisor;

pub use config::parse_ports;
pub use config::Config;
pub use config::Rediscovery;
pub use config::DEFAULT_NAMESPACE;
pub use config::DEFAULT_PORTS;
pub use config::DEFAULT_STEP_TIMEOUT;
pub use id::device_id;
pub use range::AddressRange;
pub use registry::Registry;
pub use scanner::ScanError;
pub use scanner::ScanReport;
pub use scanner::ScanRequest;
pub use scanner::ScanState;
pub use scanner::Scanner;
pub use server::serve;
pub use service::Service;
pub use supervisor::Supervisor;
