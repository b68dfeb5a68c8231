pub mod audit;
pub mod registry;
pub mod storage;
pub mod vault;
