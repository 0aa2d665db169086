use std::collections::{HashMap, HashSet};
use std::fmt;

use cranelift::codegen::ir::{self, FuncRef, UserFuncName};
use cranelift::codegen::verify_function;
use cranelift::prelude::*;
use cranelift_jit::JITModule;
use cranelift_module::{FuncId, Linkage, Module as _};

use super::ast::{Expr, ExprKind, FunctionDecl, Prototype};
use super::error::Error;
use super::operators::OperatorTable;
use super::runtime::HostFunctions;

/// A lowered body. `callees` lists every function it calls, so evaluation
/// can find what has to be linked before running it.
struct Body {
    code: ir::Function,
    callees: Vec<String>,
    compiled: bool,
}

/// A function known to the module, declared by an `extern` or a call
/// through the registry, or defined by a `def`.
pub struct Function {
    name: String,
    params: Vec<String>,
    id: FuncId,
    body: Option<Body>,
}

impl Function {
    fn declare(proto: &Prototype, id: FuncId) -> Self {
        Function {
            name: proto.name.clone(),
            params: proto.params.clone(),
            id,
            body: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn is_declaration(&self) -> bool {
        self.body.is_none()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.body {
            Some(body) => write!(f, "{}", body.code),
            None => {
                let params = vec!["f64"; self.arity()].join(", ");
                writeln!(f, "declare %{}({}) -> f64", self.name, params)
            }
        }
    }
}

/// Functions by name, in the order they first appeared.
pub struct Module {
    name: String,
    functions: Vec<Function>,
}

impl Module {
    fn new(name: &str) -> Self {
        Module {
            name: name.to_owned(),
            functions: Vec::new(),
        }
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    fn get_function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    /// Replaces a function of the same name in place.
    fn add_function(&mut self, func: Function) -> &Function {
        let idx = match self.functions.iter().position(|f| f.name == func.name) {
            Some(idx) => {
                self.functions[idx] = func;
                idx
            }
            None => {
                self.functions.push(func);
                self.functions.len() - 1
            }
        };
        &self.functions[idx]
    }

    fn remove_function(&mut self, name: &str) -> Option<Function> {
        let idx = self.functions.iter().position(|f| f.name == name)?;
        Some(self.functions.remove(idx))
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "; module '{}'", self.name)?;
        for func in &self.functions {
            writeln!(f)?;
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}

fn signature(jit: &JITModule, arity: usize) -> Signature {
    let mut sig = jit.make_signature();
    for _ in 0..arity {
        sig.params.push(AbiParam::new(types::F64));
    }
    sig.returns.push(AbiParam::new(types::F64));
    sig
}

/// Declares a function only known by name; the JIT resolves it against the
/// host symbols once something calling it is linked.
fn import(jit: &mut JITModule, proto: &Prototype) -> Result<Function, Error> {
    let sig = signature(jit, proto.params.len());
    let id = jit
        .declare_function(&proto.name, Linkage::Import, &sig)
        .map_err(|e| Error::codegen(e.to_string()).at(proto.loc))?;
    Ok(Function::declare(proto, id))
}

/// Everything that outlives a single top-level declaration: the module being
/// filled, the most recent prototype seen for each name, the binary operator
/// precedences the parser consults, and the JIT that runs the result.
pub struct Session {
    module: Module,
    operators: OperatorTable,
    prototypes: HashMap<String, Prototype>,
    hosts: HostFunctions,
    jit: JITModule,
    ctx: codegen::Context,
}

impl Session {
    /// A session linking against `putchard` and `printd`.
    pub fn new(module_name: &str) -> Result<Self, Error> {
        Self::with_host_functions(module_name, HostFunctions::with_runtime())
    }

    pub fn with_host_functions(module_name: &str, hosts: HostFunctions) -> Result<Self, Error> {
        let jit = hosts.jit_module()?;
        Ok(Session {
            module: Module::new(module_name),
            operators: OperatorTable::new(),
            prototypes: HashMap::new(),
            hosts,
            jit,
            ctx: codegen::Context::new(),
        })
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn operators(&self) -> &OperatorTable {
        &self.operators
    }

    pub fn prototype(&self, name: &str) -> Option<&Prototype> {
        self.prototypes.get(name)
    }

    pub fn remove_function(&mut self, name: &str) -> Option<Function> {
        self.module.remove_function(name)
    }

    /// Lowers one top-level declaration into the module.
    ///
    /// The prototype is registered first, whatever happens next. An `extern`
    /// then only declares the function. A definition either ends up
    /// complete in the module or, on any error, leaves no trace of itself
    /// there; a binary operator's precedence is installed before its body is
    /// lowered and rolled back on failure.
    pub fn lower(&mut self, decl: &FunctionDecl) -> Result<&Function, Error> {
        let proto = &decl.proto;
        self.prototypes.insert(proto.name.clone(), proto.clone());

        let body = match &decl.body {
            Some(body) => body,
            None => {
                if self.module.get_function(&proto.name).is_none() {
                    let func = import(&mut self.jit, proto)?;
                    self.module.add_function(func);
                }
                return self.lowered(&proto.name);
            }
        };

        let existing = match self.module.get_function(&proto.name) {
            Some(f) if !f.is_declaration() => {
                return Err(Error::codegen("Function cannot be redefined.").at(proto.loc));
            }
            Some(f) if f.arity() != proto.params.len() => {
                return Err(Error::codegen(
                    "Function redefined with a different number of arguments",
                )
                .at(proto.loc));
            }
            Some(f) => Some(f.id),
            None => None,
        };

        let sig = signature(&self.jit, proto.params.len());
        let declared_here = existing.is_none();
        let id = match existing {
            // An `extern` claimed the name as an import. Exporting it makes
            // it definable under the id earlier callers already refer to.
            Some(_) => self.jit.declare_function(&proto.name, Linkage::Export, &sig),
            None => self.jit.declare_anonymous_function(&sig),
        }
        .map_err(|e| Error::codegen(e.to_string()).at(proto.loc))?;
        if declared_here {
            self.module.add_function(Function::declare(proto, id));
        }

        let installed = match (proto.operator_name(), proto.binary_precedence()) {
            (Some(op), Some(prec)) => Some((op, self.operators.insert(op, prec))),
            _ => None,
        };

        match self.lower_function(proto, body) {
            Ok(body) => {
                let mut func = Function::declare(proto, id);
                func.body = Some(body);
                Ok(self.module.add_function(func))
            }
            Err(e) => {
                if declared_here {
                    self.module.remove_function(&proto.name);
                }
                if let Some((op, previous)) = installed {
                    self.operators.restore(op, previous);
                }
                Err(e)
            }
        }
    }

    fn lowered(&self, name: &str) -> Result<&Function, Error> {
        self.module
            .get_function(name)
            .ok_or_else(|| Error::codegen("Unknown function referenced"))
    }

    fn lower_function(&mut self, proto: &Prototype, body: &Expr) -> Result<Body, Error> {
        let sig = signature(&self.jit, proto.params.len());
        let name = UserFuncName::testcase(proto.name.as_str());
        let mut code = ir::Function::with_name_signature(name, sig);
        let mut builder_ctx = FunctionBuilderContext::new();

        let callees = {
            let lowering = FunctionLowering {
                builder: FunctionBuilder::new(&mut code, &mut builder_ctx),
                jit: &mut self.jit,
                module: &mut self.module,
                prototypes: &self.prototypes,
                named_values: HashMap::new(),
                func_refs: HashMap::new(),
                callees: Vec::new(),
                vars: 0,
            };
            lowering.lower_body(proto, body)?
        };

        verify_function(&code, self.jit.isa()).map_err(|e| {
            Error::codegen(format!("Invalid function '{}': {}", proto.name, e)).at(proto.loc)
        })?;

        Ok(Body {
            code,
            callees,
            compiled: false,
        })
    }

    /// Compiles the nullary function `name` together with everything it can
    /// reach, then calls it.
    pub fn run(&mut self, name: &str) -> Result<f64, Error> {
        let entry = match self.module.get_function(name) {
            Some(f) if f.is_declaration() => {
                return Err(Error::runtime(format!("'{}' has no body", name)));
            }
            Some(f) if f.arity() != 0 => {
                return Err(Error::runtime(format!("'{}' takes arguments", name)));
            }
            Some(f) => f.id,
            None => return Err(Error::runtime(format!("unresolved function '{}'", name))),
        };

        for pending in self.link(name)? {
            self.compile(&pending)?;
        }
        self.jit
            .finalize_definitions()
            .map_err(|e| Error::runtime(e.to_string()))?;

        let code = self.jit.get_finalized_function(entry);
        // SAFETY: `entry` is a definition with no parameters returning one
        // f64 in the target's default calling convention, and `link` checked
        // that every function it can reach is defined or backed by a host
        // symbol of the same arity.
        let f: extern "C" fn() -> f64 = unsafe { std::mem::transmute(code) };
        Ok(f())
    }

    /// Definitions reachable from `name` that the JIT has not compiled yet.
    /// Fails if a reachable declaration has nothing to resolve to.
    fn link(&self, name: &str) -> Result<Vec<String>, Error> {
        let mut pending = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![name];

        while let Some(name) = stack.pop() {
            if !seen.insert(name) {
                continue;
            }
            let f = match self.module.get_function(name) {
                Some(f) => f,
                None => return Err(Error::runtime(format!("unresolved function '{}'", name))),
            };
            match &f.body {
                Some(body) => {
                    if !body.compiled {
                        pending.push(name.to_owned());
                    }
                    stack.extend(body.callees.iter().map(String::as_str));
                }
                None => match self.hosts.get(name) {
                    Some(sym) if sym.arity == f.arity() => {}
                    Some(sym) => {
                        return Err(Error::runtime(format!(
                            "'{}' expects {} arguments, got {}",
                            name,
                            sym.arity,
                            f.arity()
                        )));
                    }
                    None => return Err(Error::runtime(format!("unresolved function '{}'", name))),
                },
            }
        }

        Ok(pending)
    }

    fn compile(&mut self, name: &str) -> Result<(), Error> {
        let func = match self.module.get_function_mut(name) {
            Some(func) => func,
            None => return Ok(()),
        };
        let body = match &mut func.body {
            Some(body) => body,
            None => return Ok(()),
        };

        self.ctx.func = body.code.clone();
        let defined = self.jit.define_function(func.id, &mut self.ctx);
        self.jit.clear_context(&mut self.ctx);
        defined.map_err(|e| Error::codegen(format!("Failed to compile '{}': {}", name, e)))?;

        body.compiled = true;
        Ok(())
    }
}

/// State for lowering one function body.
struct FunctionLowering<'a> {
    builder: FunctionBuilder<'a>,
    jit: &'a mut JITModule,
    module: &'a mut Module,
    prototypes: &'a HashMap<String, Prototype>,
    named_values: HashMap<String, Variable>,
    func_refs: HashMap<FuncId, FuncRef>,
    callees: Vec<String>,
    vars: usize,
}

impl<'a> FunctionLowering<'a> {
    fn lower_body(mut self, proto: &Prototype, body: &Expr) -> Result<Vec<String>, Error> {
        let entry = self.builder.create_block();
        self.builder.append_block_params_for_function_params(entry);
        self.builder.switch_to_block(entry);
        self.builder.seal_block(entry);

        // Repeated parameter names alias; the last one wins.
        for (i, name) in proto.params.iter().enumerate() {
            let arg = self.builder.block_params(entry)[i];
            let var = self.variable(arg);
            self.named_values.insert(name.clone(), var);
        }

        let ret = self.lower_expr(body)?;
        self.builder.ins().return_(&[ret]);
        self.builder.finalize();
        Ok(self.callees)
    }

    /// A fresh mutable variable holding `init`.
    fn variable(&mut self, init: Value) -> Variable {
        let var = Variable::new(self.vars);
        self.vars += 1;
        self.builder.declare_var(var, types::F64);
        self.builder.def_var(var, init);
        var
    }

    /// Reference and arity for a call to `name`, declaring it from its
    /// registered prototype the first time a call needs it.
    fn callee(&mut self, name: &str) -> Result<Option<(FuncRef, usize)>, Error> {
        let (id, arity) = match self.module.get_function(name) {
            Some(f) => (f.id, f.arity()),
            None => match self.prototypes.get(name) {
                Some(proto) => {
                    let func = import(self.jit, proto)?;
                    let func = self.module.add_function(func);
                    (func.id, func.arity())
                }
                None => return Ok(None),
            },
        };

        if !self.callees.iter().any(|c| c == name) {
            self.callees.push(name.to_owned());
        }

        let jit = &mut *self.jit;
        let func = &mut *self.builder.func;
        let fref = *self
            .func_refs
            .entry(id)
            .or_insert_with(|| jit.declare_func_in_func(id, func));
        Ok(Some((fref, arity)))
    }

    fn call(&mut self, fref: FuncRef, args: &[Value]) -> Value {
        let inst = self.builder.ins().call(fref, args);
        self.builder.inst_results(inst)[0]
    }

    fn bind(&mut self, name: &str, var: Option<Variable>) {
        match var {
            Some(var) => {
                self.named_values.insert(name.to_owned(), var);
            }
            None => {
                self.named_values.remove(name);
            }
        }
    }

    fn lower_expr(&mut self, e: &Expr) -> Result<Value, Error> {
        match &e.kind {
            ExprKind::Number(n) => Ok(self.builder.ins().f64const(*n)),

            ExprKind::Variable(name) => match self.named_values.get(name) {
                Some(&var) => Ok(self.builder.use_var(var)),
                None => Err(Error::codegen("Unknown variable name").at(e.loc)),
            },

            ExprKind::Unary(op, operand) => {
                let v = self.lower_expr(operand)?;
                match self.callee(&format!("unary{}", op))? {
                    Some((fref, _)) => Ok(self.call(fref, &[v])),
                    None => Err(Error::codegen("Unknown unary operator").at(e.loc)),
                }
            }

            ExprKind::Binary('=', lhs, rhs) => {
                let name = match &lhs.kind {
                    ExprKind::Variable(name) => name,
                    _ => {
                        let msg = "destination of '=' must be a variable";
                        return Err(Error::codegen(msg).at(e.loc));
                    }
                };
                let v = self.lower_expr(rhs)?;
                let var = match self.named_values.get(name) {
                    Some(&var) => var,
                    None => return Err(Error::codegen("Unknown variable name").at(lhs.loc)),
                };
                self.builder.def_var(var, v);
                Ok(v)
            }

            ExprKind::Binary(op, lhs, rhs) => {
                let l = self.lower_expr(lhs)?;
                let r = self.lower_expr(rhs)?;
                match op {
                    '+' => Ok(self.builder.ins().fadd(l, r)),
                    '-' => Ok(self.builder.ins().fsub(l, r)),
                    '*' => Ok(self.builder.ins().fmul(l, r)),
                    '<' => {
                        let cmp = self.builder.ins().fcmp(FloatCC::UnorderedOrLessThan, l, r);
                        let wide = self.builder.ins().uextend(types::I32, cmp);
                        Ok(self.builder.ins().fcvt_from_uint(types::F64, wide))
                    }
                    _ => {
                        // The parser only builds binary nodes for symbols in
                        // the operator table, and entries only get there
                        // through a `binary` definition.
                        let (fref, _) = match self.callee(&format!("binary{}", op))? {
                            Some(c) => c,
                            None => panic!("binary operator not found: {}", op),
                        };
                        Ok(self.call(fref, &[l, r]))
                    }
                }
            }

            ExprKind::Call(callee, args) => {
                let (fref, arity) = match self.callee(callee)? {
                    Some(c) => c,
                    None => return Err(Error::codegen("Unknown function referenced").at(e.loc)),
                };
                if arity != args.len() {
                    return Err(Error::codegen("Incorrect # arguments passed").at(e.loc));
                }

                let mut vals = Vec::with_capacity(args.len());
                for a in args {
                    vals.push(self.lower_expr(a)?);
                }
                Ok(self.call(fref, &vals))
            }

            ExprKind::If { cond, then, else_ } => {
                let c = self.lower_expr(cond)?;
                let zero = self.builder.ins().f64const(0.0);
                let c = self.builder.ins().fcmp(FloatCC::OrderedNotEqual, c, zero);

                let then_bb = self.builder.create_block();
                let else_bb = self.builder.create_block();
                let merge_bb = self.builder.create_block();
                self.builder.append_block_param(merge_bb, types::F64);
                self.builder.ins().brif(c, then_bb, &[], else_bb, &[]);

                self.builder.switch_to_block(then_bb);
                self.builder.seal_block(then_bb);
                let then_v = self.lower_expr(then)?;
                self.builder.ins().jump(merge_bb, &[then_v]);

                self.builder.switch_to_block(else_bb);
                self.builder.seal_block(else_bb);
                let else_v = self.lower_expr(else_)?;
                self.builder.ins().jump(merge_bb, &[else_v]);

                self.builder.switch_to_block(merge_bb);
                self.builder.seal_block(merge_bb);
                Ok(self.builder.block_params(merge_bb)[0])
            }

            ExprKind::For {
                var,
                start,
                end,
                step,
                body,
            } => {
                let start = self.lower_expr(start)?;
                let slot = self.variable(start);

                let cond_bb = self.builder.create_block();
                let loop_bb = self.builder.create_block();
                let after_bb = self.builder.create_block();
                self.builder.ins().jump(cond_bb, &[]);

                let old = self.named_values.insert(var.clone(), slot);

                // The end condition is checked before every iteration,
                // including the first.
                self.builder.switch_to_block(cond_bb);
                let end = self.lower_expr(end)?;
                let zero = self.builder.ins().f64const(0.0);
                let end = self.builder.ins().fcmp(FloatCC::OrderedNotEqual, end, zero);
                self.builder.ins().brif(end, loop_bb, &[], after_bb, &[]);

                self.builder.switch_to_block(loop_bb);
                self.builder.seal_block(loop_bb);
                self.lower_expr(body)?;
                let step = match step {
                    Some(step) => self.lower_expr(step)?,
                    None => self.builder.ins().f64const(1.0),
                };
                let cur = self.builder.use_var(slot);
                let next = self.builder.ins().fadd(cur, step);
                self.builder.def_var(slot, next);
                self.builder.ins().jump(cond_bb, &[]);
                self.builder.seal_block(cond_bb);

                self.builder.switch_to_block(after_bb);
                self.builder.seal_block(after_bb);
                self.bind(var, old);

                Ok(self.builder.ins().f64const(0.0))
            }

            ExprKind::Var { bindings, body } => {
                // What each name meant before this `var`, recorded once per
                // name so repeated names still restore the outer binding.
                let mut outer: Vec<(&str, Option<Variable>)> = Vec::new();

                for (name, init) in bindings {
                    let v = match init {
                        Some(init) => self.lower_expr(init)?,
                        None => self.builder.ins().f64const(0.0),
                    };
                    let var = self.variable(v);

                    if !outer.iter().any(|(n, _)| *n == name.as_str()) {
                        outer.push((name.as_str(), self.named_values.get(name).copied()));
                    }
                    self.named_values.insert(name.clone(), var);
                }

                let v = self.lower_expr(body)?;

                for (name, var) in outer {
                    self.bind(name, var);
                }
                Ok(v)
            }
        }
    }
}
