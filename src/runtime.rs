//! Native functions callable from compiled code, and the JIT they are linked
//! into.

use std::collections::HashMap;
use std::io::Write;

use cranelift::prelude::*;
use cranelift_jit::{JITBuilder, JITModule};

use super::error::Error;

/// A native function taking and returning doubles, usable behind an
/// `extern` declaration.
pub trait HostFn {
    fn arity(&self) -> usize;
    fn address(&self) -> *const u8;
}

macro_rules! host_fn {
    ($n:expr; $($arg:ident),*) => {
        impl HostFn for extern "C" fn($($arg),*) -> f64 {
            fn arity(&self) -> usize {
                $n
            }

            fn address(&self) -> *const u8 {
                *self as *const u8
            }
        }
    };
}

host_fn!(0;);
host_fn!(1; f64);
host_fn!(2; f64, f64);
host_fn!(3; f64, f64, f64);

#[derive(Debug, Clone, Copy)]
pub(crate) struct Symbol {
    pub(crate) address: *const u8,
    pub(crate) arity: usize,
}

/// Symbols the JIT resolves `extern` declarations against.
#[derive(Debug, Clone, Default)]
pub struct HostFunctions {
    symbols: HashMap<String, Symbol>,
}

impl HostFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// `putchard` and `printd`, both writing to stderr and returning 0.
    pub fn with_runtime() -> Self {
        let mut hosts = Self::new();
        hosts.register("putchard", putchard as extern "C" fn(f64) -> f64);
        hosts.register("printd", printd as extern "C" fn(f64) -> f64);
        hosts
    }

    pub fn register<F: HostFn>(&mut self, name: &str, f: F) {
        let sym = Symbol {
            address: f.address(),
            arity: f.arity(),
        };
        self.symbols.insert(name.to_owned(), sym);
    }

    pub(crate) fn get(&self, name: &str) -> Option<Symbol> {
        self.symbols.get(name).copied()
    }

    /// A JIT for the host machine with every registered symbol linked in.
    pub(crate) fn jit_module(&self) -> Result<JITModule, Error> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("opt_level", "speed")
            .map_err(|e| Error::codegen(e.to_string()))?;
        flag_builder
            .set("is_pic", "false")
            .map_err(|e| Error::codegen(e.to_string()))?;

        let isa_builder = cranelift_native::builder()
            .map_err(|e| Error::codegen(format!("Failed to create ISA builder: {}", e)))?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| Error::codegen(format!("Failed to create ISA: {}", e)))?;

        let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        for (name, sym) in &self.symbols {
            builder.symbol(name.as_str(), sym.address);
        }
        Ok(JITModule::new(builder))
    }
}

extern "C" fn putchard(c: f64) -> f64 {
    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    let _ = out.write_all(&[c as u8]);
    let _ = out.flush();
    0.0
}

extern "C" fn printd(x: f64) -> f64 {
    eprintln!("{:.6}", x);
    0.0
}
