//! HTTP handlers mapping REST calls onto model events.

pub mod model;
