pub mod calendar;
pub mod context;
pub mod events;
pub mod install;
pub mod notifications;
pub mod service;
pub mod store;
pub mod task;
pub mod toast;

pub use crate::context::{AppContext, EventEffect, NotificationConfig, Platforms};
pub use crate::service::{TaskService, TaskServiceBuilder};
pub use crate::task::{Task, TaskId};
pub use crate::toast::{Toast, ToastLevel};
