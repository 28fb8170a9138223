pub mod processed;
pub mod request;
