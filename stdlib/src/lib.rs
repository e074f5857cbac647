pub mod io;
pub mod math;
pub mod types;


use anyhow::Result;
use candy_core::{module::ModuleRegistry, vm::Vm};
use tracing::debug;

/// Register all stdlib modules with the given registry.
pub fn register_stdlib_modules(registry: &mut ModuleRegistry) -> Result<()> {
    registry.register(Box::new(io::IoModule))?;
    registry.register(Box::new(types::TypesModule))?;
    registry.register(Box::new(math::MathModule))?;
    Ok(())
}

/// Install the whole stdlib into `vm`.
pub fn install(vm: &mut Vm) -> Result<()> {
    let mut registry = ModuleRegistry::new();
    register_stdlib_modules(&mut registry)?;
    registry.install(vm)?;
    debug!(target: "candy::stdlib", modules = ?registry.names(), "stdlib installed");
    Ok(())
}
