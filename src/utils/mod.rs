pub mod shell;
pub mod text;
pub mod time;
pub mod user_paths;
