//! The built-in toolbox.
//!
//! Tool modules do not register themselves as a side effect of being
//! loaded; [`bootstrap`] calls each module's `register` explicitly, so the
//! catalog's content and order are decided in exactly one place.

pub mod execute_python;
pub mod execute_shell;
pub mod mailbox;
pub mod process;
pub mod read_file;
pub mod web_browser;
pub mod write_file;

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::remote::PageFacade;
use crate::server::ToolRegistry;

/// Dependencies handed to tool constructors.
#[derive(Clone)]
pub struct ToolContext {
    /// Process configuration.
    pub config: Arc<Config>,
    /// Facade over the remote browser agent.
    pub page: PageFacade,
}

/// Register every built-in tool, in the catalog's published order.
pub fn bootstrap(registry: &mut ToolRegistry, ctx: &ToolContext) -> Result<()> {
    execute_python::register(registry, ctx)?;
    execute_shell::register(registry, ctx)?;
    read_file::register(registry, ctx)?;
    write_file::register(registry, ctx)?;
    web_browser::register(registry, ctx)?;
    mailbox::register(registry, ctx)?;
    Ok(())
}
