//! Server-side Lua scripts backing the Redis adapters.

pub mod scripts;
