//! 基础设施层
//!
//! 只有这一层直接接触网络

pub mod http_transport;

pub use http_transport::HttpTransport;
