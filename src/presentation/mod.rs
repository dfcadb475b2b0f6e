pub mod app;
pub mod components;
pub mod panels;
pub mod theme;

pub use app::GrowTowerApp;
