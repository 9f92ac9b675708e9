//! Backend implementations

mod memory;
mod none;
mod redis_list;
mod supabase;

pub use memory::MemoryBackend;
pub use none::NoneBackend;
pub use redis_list::RedisBackend;
pub use supabase::SupabaseBackend;
