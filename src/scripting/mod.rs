pub mod lua_runtime;

pub use lua_runtime::LuaRuntime;
