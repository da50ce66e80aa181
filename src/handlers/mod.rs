pub mod auth;
pub mod crud;
