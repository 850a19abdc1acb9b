// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`backend`] defines the task runner contract and the static
//!   [`TaskRegistry`] mapping module names to factories.
//! - [`command`] is the production runner that executes a module's shell
//!   command for one account.

pub mod backend;
pub mod command;

pub use backend::{TaskFactory, TaskRegistry, TaskRunner};
pub use command::{CommandFactory, CommandTask};
