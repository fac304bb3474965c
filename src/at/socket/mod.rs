pub mod responses;
pub mod urc;
