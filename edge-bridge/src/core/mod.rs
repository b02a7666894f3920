//! 核心模块 - 配置、状态与后台任务
//!
//! - [`Config`] - 服务配置
//! - [`BridgeState`] - 组件装配
//! - [`BackgroundTasks`] - 后台任务管理

pub mod config;
pub mod state;
pub mod tasks;

pub use config::Config;
pub use state::BridgeState;
pub use tasks::{BackgroundTasks, TaskKind};
