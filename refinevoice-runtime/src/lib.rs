pub mod config_store;
pub mod defaults;
pub mod fs_util;
pub mod history;
pub mod llm;
pub mod runtime_engine;
