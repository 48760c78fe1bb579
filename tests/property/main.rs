// tests/property/main.rs
//! Property tests for decoding, alarm evaluation, the registry and the store

mod decode_prop;
mod alarm_prop;
mod registry_prop;
mod store_prop;
