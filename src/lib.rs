pub mod error;
pub mod model;
pub mod request;
pub mod runner;
pub mod worker;
