pub mod middleware;
pub mod tokens;
