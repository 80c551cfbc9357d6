pub mod error;
pub mod kv_store;
pub mod repository;
pub mod storage;
