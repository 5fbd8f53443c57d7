pub mod agent;
pub mod csrf;
pub mod fallback;
pub mod health;
