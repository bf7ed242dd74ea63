pub mod builds;
pub mod http;
pub mod reference;
pub mod region;
pub mod session;
