// SPDX-License-Identifier: MIT OR Apache-2.0
//! Server composition: backend selection, tool module registration, and the
//! stdio request loop.

#![deny(unsafe_code)]

pub mod modules;
pub mod rpc;
pub mod select;

use c64b_scheduler::Scheduler;
use c64b_tools::{ToolRegistry, RegistryError};
use std::sync::Arc;

/// Compose the full tool catalog over a scheduler.
///
/// Duplicate tool names are a composition bug and bubble up as a fatal
/// error at startup.
pub fn build_registry(scheduler: Scheduler) -> Result<ToolRegistry, RegistryError> {
    let tasks_home = scheduler.paths().home.clone();
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(modules::machine::MachineModule))?;
    registry.register(Arc::new(modules::memory::MemoryModule))?;
    registry.register(Arc::new(modules::programs::ProgramsModule))?;
    registry.register(Arc::new(modules::drives::DrivesModule))?;
    registry.register(Arc::new(modules::tasks::TasksModule::new(scheduler)))?;
    registry.register(Arc::new(modules::config::ConfigModule))?;
    registry.register(Arc::new(modules::files::FilesModule::new(tasks_home)))?;
    registry.register(Arc::new(modules::system::SystemModule))?;
    Ok(registry)
}
