//! Jacobian and Hessian methods
//!
//! Both assemble their result from the partial derivative methods. With
//! [`Dispatch::Direct`] every entry is an explicit call. With
//! [`Dispatch::Reflective`] the methods are looked up by name at run time;
//! a missing method then surfaces as a runtime exception of the generated
//! code, never as a generation error.

use tracing::debug;

use crate::ast::Symbol;
use crate::config::Dispatch;
use crate::error::CompileResult;
use crate::target::{LocalNames, ReflectionNames, ReturnShape, Target};
use crate::writer::CodeWriter;

/// Preferred name of the result array inside generated methods
pub const RESULT_ARRAY: &str = "__temp";

const ROW: &str = "i";
const COL: &str = "j";

/// Locals of one Jacobian or Hessian method, renamed away from its parameters
struct Locals {
    result: String,
    row: String,
    col: String,
    reflection: ReflectionNames,
}

/// Settings shared by the Jacobian and Hessian generators
#[derive(Clone, Copy)]
pub struct DispatchContext<'a> {
    pub target: &'a dyn Target,
    pub parameters: &'a [Symbol],
    pub modifiers: &'a [&'a str],
    pub dispatch: Dispatch,
    /// Class holding the partial derivative methods
    pub class_name: &'a str,
    /// Base name of the partial derivative methods
    pub base: &'a str,
    /// Number of differentiation atoms
    pub size: usize,
}

impl<'a> DispatchContext<'a> {
    fn is_static(&self) -> bool {
        self.modifiers.contains(&"static")
    }

    fn throws(&self) -> &'static [&'static str] {
        match self.dispatch {
            Dispatch::Direct => &[],
            Dispatch::Reflective => self.target.reflection_exceptions(),
        }
    }

    fn locals(&self) -> Locals {
        let mut names = LocalNames::new(self.parameters);
        Locals {
            result: names.fresh(RESULT_ARRAY),
            row: names.fresh(ROW),
            col: names.fresh(COL),
            reflection: ReflectionNames::new(self.class_name, &mut names),
        }
    }

    fn open(&self, shape: ReturnShape, name: &str, locals: &Locals, w: &mut CodeWriter) {
        let decl = self.target.function_declaration(
            self.modifiers,
            shape,
            name,
            self.parameters,
            self.throws(),
        );
        w.blank();
        w.line(format!("{} {{", decl));
        w.indent();
        w.line(self.target.allocate(&locals.result, shape, self.size));
    }

    fn close(&self, locals: &Locals, w: &mut CodeWriter) {
        w.line(self.target.return_statement(&locals.result));
        w.dedent();
        w.line(self.target.block_end());
    }

    fn direct_call(&self, name: String) -> String {
        let args: Vec<String> = self.parameters.iter().map(|p| p.name.clone()).collect();
        self.target.call(&name, &args)
    }

    fn invoke(&self, locals: &Locals, counters: &[&str], slot: &str, w: &mut CodeWriter) {
        for line in self.target.reflective_invoke(
            &locals.reflection,
            self.base,
            counters,
            slot,
            self.parameters,
            self.is_static(),
        ) {
            w.line(line);
        }
    }

    fn reflection_setup(&self, locals: &Locals, w: &mut CodeWriter) {
        for line in self.target.reflection_setup(&locals.reflection, self.parameters) {
            w.line(line);
        }
    }
}

pub struct JacobianCodeGenerator<'a> {
    context: DispatchContext<'a>,
    func_name: String,
}

impl<'a> JacobianCodeGenerator<'a> {
    pub const DEFAULT_NAME: &'static str = "jacobian";

    pub fn new(context: DispatchContext<'a>) -> Self {
        Self {
            context,
            func_name: Self::DEFAULT_NAME.to_string(),
        }
    }

    pub fn generate(&self, w: &mut CodeWriter) -> CompileResult<()> {
        let ctx = &self.context;
        debug!(dispatch = ?ctx.dispatch, size = ctx.size, "generating jacobian");
        let locals = ctx.locals();
        let result = locals.result.as_str();
        ctx.open(ReturnShape::Vector, &self.func_name, &locals, w);

        match ctx.dispatch {
            Dispatch::Direct => {
                for i in 0..ctx.size {
                    let call = ctx.direct_call(format!("{}_{}", ctx.base, i));
                    w.line(ctx.target.store(result, &[i.to_string()], &call));
                }
            }
            Dispatch::Reflective => {
                let row = locals.row.as_str();
                ctx.reflection_setup(&locals, w);
                w.line(ctx.target.counted_loop(row, "0", ctx.size));
                w.indent();
                let slot = ctx.target.element(result, &[row.to_string()]);
                ctx.invoke(&locals, &[row], &slot, w);
                w.dedent();
                w.line(ctx.target.block_end());
            }
        }

        ctx.close(&locals, w);
        Ok(())
    }
}

pub struct HessianCodeGenerator<'a> {
    context: DispatchContext<'a>,
    func_name: String,
}

impl<'a> HessianCodeGenerator<'a> {
    pub const DEFAULT_NAME: &'static str = "hessian";

    pub fn new(context: DispatchContext<'a>) -> Self {
        Self {
            context,
            func_name: Self::DEFAULT_NAME.to_string(),
        }
    }

    pub fn generate(&self, w: &mut CodeWriter) -> CompileResult<()> {
        let ctx = &self.context;
        debug!(dispatch = ?ctx.dispatch, size = ctx.size, "generating hessian");
        let locals = ctx.locals();
        let result = locals.result.as_str();
        ctx.open(ReturnShape::Matrix, &self.func_name, &locals, w);

        match ctx.dispatch {
            Dispatch::Direct => {
                for i in 0..ctx.size {
                    for j in i..ctx.size {
                        let call = ctx.direct_call(format!("{}_{}_{}", ctx.base, i, j));
                        w.line(ctx.target.store(result, &[i.to_string(), j.to_string()], &call));
                        if i != j {
                            let upper = ctx.target.element(result, &[i.to_string(), j.to_string()]);
                            w.line(ctx.target.store(result, &[j.to_string(), i.to_string()], &upper));
                        }
                    }
                }
            }
            Dispatch::Reflective => {
                let (row, col) = (locals.row.as_str(), locals.col.as_str());
                ctx.reflection_setup(&locals, w);
                w.line(ctx.target.counted_loop(row, "0", ctx.size));
                w.indent();
                w.line(ctx.target.counted_loop(col, row, ctx.size));
                w.indent();

                let upper_idx = [row.to_string(), col.to_string()];
                let lower_idx = [col.to_string(), row.to_string()];
                let upper = ctx.target.element(result, &upper_idx);
                ctx.invoke(&locals, &[row, col], &upper, w);
                w.line(ctx.target.if_not_equal(row, col));
                w.indent();
                w.line(ctx.target.store(result, &lower_idx, &upper));
                w.dedent();
                w.line(ctx.target.block_end());

                w.dedent();
                w.line(ctx.target.block_end());
                w.dedent();
                w.line(ctx.target.block_end());
            }
        }

        ctx.close(&locals, w);
        Ok(())
    }
}
