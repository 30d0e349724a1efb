pub mod dialer;
pub mod forwarder;
pub mod listener;
