use anyhow::{Result, anyhow, bail};
use tracing::debug;

use crate::{
    val::{Arity, NativeFn, Value},
    vm::Vm,
};

/// A native function exported by a module.
#[derive(Debug, Clone, Copy)]
pub struct Export {
    pub name: &'static str,
    pub entry: NativeFn,
    pub arity: Arity,
}

impl Export {
    pub const fn new(name: &'static str, entry: NativeFn, arity: Arity) -> Self {
        Self { name, entry, arity }
    }
}

/// A library of natives installed into a [`Vm`].
///
/// Prelude modules put their exports straight into the globals; the others
/// are installed as one global object named after the module.
pub trait Module: std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn description(&self) -> &str {
        ""
    }

    fn prelude(&self) -> bool {
        false
    }

    fn exports(&self) -> Vec<Export>;

    /// Non-function members, such as numeric constants.
    fn constants(&self) -> Vec<(&'static str, Value)> {
        Vec::new()
    }
}

#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: Vec<Box<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Box<dyn Module>) -> Result<()> {
        if self.get(module.name()).is_some() {
            bail!("module '{}' is already registered", module.name());
        }
        self.modules.push(module);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Module> {
        self.modules.iter().find(|m| m.name() == name).map(|m| m.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Define every registered module in `vm`'s globals.
    pub fn install(&self, vm: &mut Vm) -> Result<()> {
        for module in &self.modules {
            install_module(vm, module.as_ref())
                .map_err(|e| anyhow!("installing module '{}': {e}", module.name()))?;
        }
        Ok(())
    }
}

fn install_module(vm: &mut Vm, module: &dyn Module) -> Result<()> {
    let exports = module.exports();
    let constants = module.constants();
    if module.prelude() {
        for ex in &exports {
            vm.define_native(ex.name, ex.entry, ex.arity)?;
        }
        for (name, value) in constants {
            vm.define_global(name, value)?;
        }
    } else {
        let obj = vm.new_object();
        for ex in &exports {
            let f = crate::val::FuncHandle::native(ex.name, ex.entry, ex.arity);
            obj.set_member(vm.heap_mut(), ex.name, Value::Function(f))?;
        }
        for (name, value) in constants {
            obj.set_member(vm.heap_mut(), name, value)?;
        }
        vm.define_global(module.name(), Value::Object(obj))?;
    }
    debug!(
        target: "candy::vm",
        module = module.name(),
        description = module.description(),
        exports = exports.len(),
        "module installed"
    );
    Ok(())
}
