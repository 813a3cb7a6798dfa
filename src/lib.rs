pub mod api;
pub mod config;
pub mod error;
pub mod guard;
pub mod navigation;
pub mod onboarding;
pub mod permissions;
pub mod provider;
pub mod session;
pub mod storage;
